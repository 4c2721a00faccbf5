use serde::{Deserialize, Serialize};
use tracing::instrument;

use loupe_core::ids::{FingerprintId, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorFingerprint {
    pub id: FingerprintId,
    pub session_id: SessionId,
    pub count: i64,
    pub sample_message: String,
    pub sample_stack: String,
    pub first_seen: i64,
    pub last_seen: i64,
}

pub struct FingerprintRepo {
    db: Database,
}

impl FingerprintRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Idempotent upsert keyed on the content-addressed id (spec.md §3, §8):
    /// a repeat occurrence bumps `count` and `last_seen` rather than
    /// inserting a duplicate row. Called from inside the event-batch
    /// transaction or a session import (spec.md §4.4).
    pub fn upsert_on_conn(
        conn: &rusqlite::Connection,
        session_id: &SessionId,
        id: &FingerprintId,
        message: &str,
        stack: &str,
        ts: i64,
    ) -> Result<(), StoreError> {
        let updated = conn.execute(
            "UPDATE error_fingerprints SET count = count + 1, last_seen = ?1 WHERE id = ?2",
            rusqlite::params![ts, id.as_str()],
        )?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO error_fingerprints
                    (id, session_id, count, sample_message, sample_stack, first_seen, last_seen)
                 VALUES (?1, ?2, 1, ?3, ?4, ?5, ?5)",
                rusqlite::params![id.as_str(), session_id.as_str(), message, stack, ts],
            )?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn list_for_session(
        &self,
        session_id: &SessionId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ErrorFingerprint>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, count, sample_message, sample_stack, first_seen, last_seen
                 FROM error_fingerprints
                 WHERE session_id = ?1
                 ORDER BY last_seen DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            stmt.query_map(
                rusqlite::params![session_id.as_str(), limit, offset],
                row_to_fingerprint,
            )?
            .collect::<Result<Vec<Result<ErrorFingerprint, StoreError>>, rusqlite::Error>>()?
            .into_iter()
            .collect()
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: &FingerprintId) -> Result<ErrorFingerprint, StoreError> {
        self.db.with_conn(|conn| {
            match conn.query_row(
                "SELECT id, session_id, count, sample_message, sample_stack, first_seen, last_seen
                 FROM error_fingerprints WHERE id = ?1",
                [id.as_str()],
                row_to_fingerprint,
            ) {
                Ok(r) => r,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    Err(StoreError::NotFound(format!("fingerprint {id}")))
                }
                Err(e) => Err(e.into()),
            }
        })
    }
}

fn row_to_fingerprint(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<ErrorFingerprint, StoreError>> {
    Ok((|| {
        Ok(ErrorFingerprint {
            id: FingerprintId::from_raw(row_helpers::get::<String>(
                row,
                0,
                "error_fingerprints",
                "id",
            )?),
            session_id: SessionId::from_raw(row_helpers::get::<String>(
                row,
                1,
                "error_fingerprints",
                "session_id",
            )?),
            count: row_helpers::get(row, 2, "error_fingerprints", "count")?,
            sample_message: row_helpers::get(row, 3, "error_fingerprints", "sample_message")?,
            sample_stack: row_helpers::get(row, 4, "error_fingerprints", "sample_stack")?,
            first_seen: row_helpers::get(row, 5, "error_fingerprints", "first_seen")?,
            last_seen: row_helpers::get(row, 6, "error_fingerprints", "last_seen")?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::{NewSession, SessionRepo};

    fn setup() -> (Database, SessionId) {
        let db = Database::in_memory().unwrap();
        let repo = SessionRepo::new(db.clone());
        let s = repo
            .create(
                None,
                NewSession {
                    url: "https://a.test".into(),
                    tab_ids: vec![1],
                    window_id: None,
                    user_agent: None,
                    viewport_width: None,
                    viewport_height: None,
                    dpr: None,
                    safe_mode: false,
                },
                1000,
            )
            .unwrap();
        (db, s.id)
    }

    #[test]
    fn upsert_increments_count_on_repeat() {
        let (db, sid) = setup();
        let fp = FingerprintId::from_normalized("boom", "at foo.js:1");
        db.with_conn(|conn| {
            FingerprintRepo::upsert_on_conn(conn, &sid, &fp, "boom", "at foo.js:1", 100)?;
            FingerprintRepo::upsert_on_conn(conn, &sid, &fp, "boom", "at foo.js:1", 200)?;
            Ok(())
        })
        .unwrap();

        let repo = FingerprintRepo::new(db);
        let row = repo.get(&fp).unwrap();
        assert_eq!(row.count, 2);
        assert_eq!(row.first_seen, 100);
        assert_eq!(row.last_seen, 200);
    }

    #[test]
    fn distinct_content_gets_distinct_ids() {
        let fp1 = FingerprintId::from_normalized("boom", "at foo.js:1");
        let fp2 = FingerprintId::from_normalized("crack", "at bar.js:2");
        assert_ne!(fp1.as_str(), fp2.as_str());
    }
}
