use serde::{Deserialize, Serialize};
use tracing::instrument;

use loupe_core::ids::{NetworkRecordId, SessionId};
use loupe_core::kinds::{NetworkErrorClass, NetworkInitiator};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: NetworkRecordId,
    pub session_id: SessionId,
    pub start_timestamp: i64,
    pub duration_ms: Option<i64>,
    pub method: String,
    pub url: String,
    pub origin: Option<String>,
    pub status: Option<i32>,
    pub initiator: NetworkInitiator,
    pub error_class: Option<NetworkErrorClass>,
    pub estimated_size_bytes: Option<i64>,
}

pub struct NewNetworkRecord {
    pub start_timestamp: i64,
    pub duration_ms: Option<i64>,
    pub method: String,
    pub url: String,
    pub origin: Option<String>,
    pub status: Option<i32>,
    pub initiator: NetworkInitiator,
    pub error_class: Option<NetworkErrorClass>,
    pub estimated_size_bytes: Option<i64>,
}

pub struct NetworkRepo {
    db: Database,
}

impl NetworkRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a network record row on the given connection — called from
    /// inside the event-batch transaction (spec.md §4.1) or from a session
    /// import (spec.md §4.4), never standalone.
    pub fn insert_on_conn(
        conn: &rusqlite::Connection,
        session_id: &SessionId,
        record: &NewNetworkRecord,
    ) -> Result<NetworkRecordId, StoreError> {
        let id = NetworkRecordId::new();
        conn.execute(
            "INSERT INTO network_records
                (id, session_id, start_timestamp, duration_ms, method, url, origin,
                 status, initiator, error_class, estimated_size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                id.as_str(),
                session_id.as_str(),
                record.start_timestamp,
                record.duration_ms,
                record.method,
                record.url,
                record.origin,
                record.status,
                record.initiator.as_str(),
                record.error_class.map(|c| c.as_str()),
                record.estimated_size_bytes,
            ],
        )?;
        Ok(id)
    }

    /// Failures for a session: non-2xx/3xx status, a set error class, or no
    /// status at all (request never completed) — spec.md §4.7
    /// `get_network_failures`.
    #[instrument(skip(self))]
    pub fn list_failures(
        &self,
        session_id: &SessionId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NetworkRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, start_timestamp, duration_ms, method, url, origin,
                        status, initiator, error_class, estimated_size_bytes
                 FROM network_records
                 WHERE session_id = ?1
                   AND (error_class IS NOT NULL OR status IS NULL OR status >= 400)
                 ORDER BY start_timestamp DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            stmt.query_map(
                rusqlite::params![session_id.as_str(), limit, offset],
                row_to_network,
            )?
            .collect::<Result<Vec<Result<NetworkRecord, StoreError>>, rusqlite::Error>>()?
            .into_iter()
            .collect()
        })
    }

    #[instrument(skip(self))]
    pub fn list_for_session(
        &self,
        session_id: &SessionId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NetworkRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, start_timestamp, duration_ms, method, url, origin,
                        status, initiator, error_class, estimated_size_bytes
                 FROM network_records
                 WHERE session_id = ?1
                 ORDER BY start_timestamp DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            stmt.query_map(
                rusqlite::params![session_id.as_str(), limit, offset],
                row_to_network,
            )?
            .collect::<Result<Vec<Result<NetworkRecord, StoreError>>, rusqlite::Error>>()?
            .into_iter()
            .collect()
        })
    }
}

fn row_to_network(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<NetworkRecord, StoreError>> {
    Ok((|| {
        let initiator_str: String = row_helpers::get(row, 8, "network_records", "initiator")?;
        let initiator = row_helpers::parse_enum(&initiator_str, "network_records", "initiator")?;
        let error_class: Option<String> =
            row_helpers::get_opt(row, 9, "network_records", "error_class")?;
        let error_class = error_class
            .map(|s| row_helpers::parse_enum(&s, "network_records", "error_class"))
            .transpose()?;
        Ok(NetworkRecord {
            id: NetworkRecordId::from_raw(row_helpers::get::<String>(
                row,
                0,
                "network_records",
                "id",
            )?),
            session_id: SessionId::from_raw(row_helpers::get::<String>(
                row,
                1,
                "network_records",
                "session_id",
            )?),
            start_timestamp: row_helpers::get(row, 2, "network_records", "start_timestamp")?,
            duration_ms: row_helpers::get_opt(row, 3, "network_records", "duration_ms")?,
            method: row_helpers::get(row, 4, "network_records", "method")?,
            url: row_helpers::get(row, 5, "network_records", "url")?,
            origin: row_helpers::get_opt(row, 6, "network_records", "origin")?,
            status: row_helpers::get_opt(row, 7, "network_records", "status")?,
            initiator,
            error_class,
            estimated_size_bytes: row_helpers::get_opt(
                row,
                10,
                "network_records",
                "estimated_size_bytes",
            )?,
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
    fn list_failures_filters_by_status_and_error_class() {
        let (db, sid) = setup();
        db.with_conn(|conn| {
            NetworkRepo::insert_on_conn(
                conn,
                &sid,
                &NewNetworkRecord {
                    start_timestamp: 1,
                    duration_ms: Some(10),
                    method: "GET".into(),
                    url: "https://a.test/ok".into(),
                    origin: Some("https://a.test".into()),
                    status: Some(200),
                    initiator: NetworkInitiator::Fetch,
                    error_class: None,
                    estimated_size_bytes: None,
                },
            )?;
            NetworkRepo::insert_on_conn(
                conn,
                &sid,
                &NewNetworkRecord {
                    start_timestamp: 2,
                    duration_ms: None,
                    method: "GET".into(),
                    url: "https://a.test/bad".into(),
                    origin: Some("https://a.test".into()),
                    status: Some(500),
                    initiator: NetworkInitiator::Fetch,
                    error_class: None,
                    estimated_size_bytes: None,
                },
            )?;
            NetworkRepo::insert_on_conn(
                conn,
                &sid,
                &NewNetworkRecord {
                    start_timestamp: 3,
                    duration_ms: None,
                    method: "GET".into(),
                    url: "https://a.test/cors".into(),
                    origin: Some("https://a.test".into()),
                    status: None,
                    initiator: NetworkInitiator::Xhr,
                    error_class: Some(NetworkErrorClass::Cors),
                    estimated_size_bytes: None,
                },
            )?;
            Ok(())
        })
        .unwrap();

        let repo = NetworkRepo::new(db);
        let failures = repo.list_failures(&sid, 10, 0).unwrap();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.status != Some(200)));
    }
}
