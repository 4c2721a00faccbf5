use serde::{Deserialize, Serialize};
use tracing::instrument;

use loupe_core::ids::SessionId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A new session as reported by a `session_start` frame (spec.md §6).
pub struct NewSession {
    pub url: String,
    pub tab_ids: Vec<i64>,
    pub window_id: Option<i64>,
    pub user_agent: Option<String>,
    pub viewport_width: Option<i64>,
    pub viewport_height: Option<i64>,
    pub dpr: Option<f64>,
    pub safe_mode: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: SessionId,
    pub created_at: i64,
    pub ended_at: Option<i64>,
    pub initial_url: String,
    pub latest_url: String,
    pub tab_ids: Vec<i64>,
    pub window_id: Option<i64>,
    pub user_agent: Option<String>,
    pub viewport_width: Option<i64>,
    pub viewport_height: Option<i64>,
    pub dpr: Option<f64>,
    pub safe_mode: bool,
    pub pinned: bool,
}

pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// `CreateSession` (spec.md §4.1). Session ids are server-minted
    /// (`SessionId::new()`) unless the caller already has one (reconnect
    /// after a drop reissues `session_start` with the same id, spec.md §7
    /// "Recovery" — in that case `explicit_id` is used and the insert is
    /// a no-op if the row already exists).
    #[instrument(skip(self, new), fields(url = %new.url))]
    pub fn create(
        &self,
        explicit_id: Option<SessionId>,
        new: NewSession,
        now_ms: i64,
    ) -> Result<SessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let id = explicit_id.unwrap_or_default();

            if let Some(existing) = get_by_id(conn, &id)? {
                return Ok(existing);
            }

            conn.execute(
                "INSERT INTO sessions (
                    id, created_at, ended_at, initial_url, latest_url, tab_ids_json,
                    window_id, user_agent, viewport_width, viewport_height, dpr, safe_mode, pinned
                ) VALUES (?1, ?2, NULL, ?3, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
                rusqlite::params![
                    id.as_str(),
                    now_ms,
                    new.url,
                    serde_json::to_string(&new.tab_ids)?,
                    new.window_id,
                    new.user_agent,
                    new.viewport_width,
                    new.viewport_height,
                    new.dpr,
                    new.safe_mode as i64,
                ],
            )?;

            get_by_id(conn, &id)?.ok_or_else(|| StoreError::NotFound(format!("session {id}")))
        })
    }

    /// `EndSession` — idempotent (spec.md §4.1).
    #[instrument(skip(self))]
    pub fn end(&self, id: &SessionId, now_ms: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET ended_at = ?1 WHERE id = ?2 AND ended_at IS NULL",
                rusqlite::params![now_ms, id.as_str()],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn exists(&self, id: &SessionId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: &SessionId) -> Result<SessionRow, StoreError> {
        self.db.with_conn(|conn| {
            get_by_id(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("session {id}")))
        })
    }

    /// Updates the rolling "latest seen URL" for a session, used by ingest
    /// when a `nav` event arrives mid-session.
    #[instrument(skip(self))]
    pub fn update_latest_url(&self, id: &SessionId, url: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET latest_url = ?1 WHERE id = ?2",
                rusqlite::params![url, id.as_str()],
            )?;
            Ok(())
        })
    }

    /// `PinSession`.
    #[instrument(skip(self))]
    pub fn set_pinned(&self, id: &SessionId, pinned: bool) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET pinned = ?1 WHERE id = ?2",
                rusqlite::params![pinned as i64, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("session {id}")));
            }
            Ok(())
        })
    }

    /// `ListRecentSessions` — ordered by created_at desc, optional
    /// `sinceMinutes` filter (spec.md §4.7 `list_sessions`).
    #[instrument(skip(self))]
    pub fn list_recent(
        &self,
        since_minutes: Option<i64>,
        limit: u32,
        offset: u32,
        now_ms: i64,
    ) -> Result<Vec<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let rows: Vec<Result<SessionRow, StoreError>> = if let Some(minutes) = since_minutes {
                let cutoff = now_ms - minutes * 60_000;
                let mut stmt = conn.prepare(
                    "SELECT id, created_at, ended_at, initial_url, latest_url, tab_ids_json,
                            window_id, user_agent, viewport_width, viewport_height, dpr, safe_mode, pinned
                     FROM sessions WHERE created_at >= ?1
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )?;
                stmt.query_map(rusqlite::params![cutoff, limit, offset], row_to_session)?
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                let mut stmt = conn.prepare(
                    "SELECT id, created_at, ended_at, initial_url, latest_url, tab_ids_json,
                            window_id, user_agent, viewport_width, viewport_height, dpr, safe_mode, pinned
                     FROM sessions ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
                )?;
                stmt.query_map(rusqlite::params![limit, offset], row_to_session)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            rows.into_iter().collect::<Result<Vec<_>, StoreError>>()
        })
    }

    /// Oldest unpinned session (by created_at), used by the retention
    /// engine's age/count/size phases (spec.md §4.4).
    #[instrument(skip(self))]
    pub fn oldest_unpinned(&self) -> Result<Option<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, created_at, ended_at, initial_url, latest_url, tab_ids_json,
                            window_id, user_agent, viewport_width, viewport_height, dpr, safe_mode, pinned
                     FROM sessions WHERE pinned = 0 ORDER BY created_at ASC LIMIT 1",
                    [],
                    row_to_session,
                )
                .ok();
            row.transpose()
        })
    }

    /// Oldest unpinned session created before `cutoff_ms`, used by the
    /// retention engine's age phase (spec.md §4.4 step 1).
    #[instrument(skip(self))]
    pub fn oldest_unpinned_before(&self, cutoff_ms: i64) -> Result<Option<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, created_at, ended_at, initial_url, latest_url, tab_ids_json,
                            window_id, user_agent, viewport_width, viewport_height, dpr, safe_mode, pinned
                     FROM sessions WHERE pinned = 0 AND created_at < ?1 ORDER BY created_at ASC LIMIT 1",
                    [cutoff_ms],
                    row_to_session,
                )
                .ok();
            row.transpose()
        })
    }

    #[instrument(skip(self))]
    pub fn count_all(&self) -> Result<i64, StoreError> {
        self.db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?))
    }

    #[instrument(skip(self))]
    pub fn count_unpinned(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM sessions WHERE pinned = 0", [], |r| r.get(0))?)
        })
    }

    /// Hard delete, cascading to events/network/fingerprints/snapshots via
    /// `ON DELETE CASCADE` (spec.md §8 universal invariant).
    #[instrument(skip(self))]
    pub fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
    }
}

fn get_by_id(conn: &rusqlite::Connection, id: &SessionId) -> Result<Option<SessionRow>, StoreError> {
    match conn.query_row(
        "SELECT id, created_at, ended_at, initial_url, latest_url, tab_ids_json,
                window_id, user_agent, viewport_width, viewport_height, dpr, safe_mode, pinned
         FROM sessions WHERE id = ?1",
        [id.as_str()],
        row_to_session,
    ) {
        Ok(result) => result.map(Some),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<SessionRow, StoreError>> {
    Ok((|| {
        let tab_ids_json: String = row_helpers::get(row, 5, "sessions", "tab_ids_json")?;
        let tab_ids: Vec<i64> = row_helpers::parse_json(&tab_ids_json, "sessions", "tab_ids_json")?
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_i64()).collect())
            .unwrap_or_default();

        Ok(SessionRow {
            id: SessionId::from_raw(row_helpers::get::<String>(row, 0, "sessions", "id")?),
            created_at: row_helpers::get(row, 1, "sessions", "created_at")?,
            ended_at: row_helpers::get_opt(row, 2, "sessions", "ended_at")?,
            initial_url: row_helpers::get(row, 3, "sessions", "initial_url")?,
            latest_url: row_helpers::get(row, 4, "sessions", "latest_url")?,
            tab_ids,
            window_id: row_helpers::get_opt(row, 6, "sessions", "window_id")?,
            user_agent: row_helpers::get_opt(row, 7, "sessions", "user_agent")?,
            viewport_width: row_helpers::get_opt(row, 8, "sessions", "viewport_width")?,
            viewport_height: row_helpers::get_opt(row, 9, "sessions", "viewport_height")?,
            dpr: row_helpers::get_opt(row, 10, "sessions", "dpr")?,
            safe_mode: row_helpers::get::<i64>(row, 11, "sessions", "safe_mode")? != 0,
            pinned: row_helpers::get::<i64>(row, 12, "sessions", "pinned")? != 0,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session(url: &str) -> NewSession {
        NewSession {
            url: url.to_string(),
            tab_ids: vec![1],
            window_id: Some(1),
            user_agent: None,
            viewport_width: Some(1280),
            viewport_height: Some(800),
            dpr: Some(2.0),
            safe_mode: false,
        }
    }

    #[test]
    fn create_and_get() {
        let repo = SessionRepo::new(Database::in_memory().unwrap());
        let created = repo.create(None, new_session("https://a.test"), 1000).unwrap();
        let fetched = repo.get(&created.id).unwrap();
        assert_eq!(fetched.initial_url, "https://a.test");
        assert_eq!(fetched.latest_url, "https://a.test");
        assert!(!fetched.pinned);
    }

    #[test]
    fn create_with_explicit_id_is_idempotent() {
        let repo = SessionRepo::new(Database::in_memory().unwrap());
        let id = SessionId::new();
        let a = repo.create(Some(id.clone()), new_session("https://a.test"), 1000).unwrap();
        let b = repo.create(Some(id.clone()), new_session("https://b.test"), 2000).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.initial_url, "https://a.test");
    }

    #[test]
    fn end_is_idempotent() {
        let repo = SessionRepo::new(Database::in_memory().unwrap());
        let s = repo.create(None, new_session("https://a.test"), 1000).unwrap();
        repo.end(&s.id, 2000).unwrap();
        repo.end(&s.id, 3000).unwrap();
        let fetched = repo.get(&s.id).unwrap();
        assert_eq!(fetched.ended_at, Some(2000));
    }

    #[test]
    fn pin_and_list_respect_order() {
        let repo = SessionRepo::new(Database::in_memory().unwrap());
        let s1 = repo.create(None, new_session("https://a.test"), 1000).unwrap();
        let s2 = repo.create(None, new_session("https://b.test"), 2000).unwrap();
        repo.set_pinned(&s1.id, true).unwrap();

        let list = repo.list_recent(None, 10, 0, 3000).unwrap();
        assert_eq!(list[0].id, s2.id);
        assert_eq!(list[1].id, s1.id);
        assert!(repo.get(&s1.id).unwrap().pinned);
    }

    #[test]
    fn oldest_unpinned_skips_pinned() {
        let repo = SessionRepo::new(Database::in_memory().unwrap());
        let s1 = repo.create(None, new_session("https://a.test"), 1000).unwrap();
        let s2 = repo.create(None, new_session("https://b.test"), 2000).unwrap();
        repo.set_pinned(&s1.id, true).unwrap();

        let oldest = repo.oldest_unpinned().unwrap().unwrap();
        assert_eq!(oldest.id, s2.id);
    }

    #[test]
    fn oldest_unpinned_before_respects_cutoff() {
        let repo = SessionRepo::new(Database::in_memory().unwrap());
        let s1 = repo.create(None, new_session("https://a.test"), 1000).unwrap();
        repo.create(None, new_session("https://b.test"), 5000).unwrap();

        assert_eq!(repo.oldest_unpinned_before(2000).unwrap().unwrap().id, s1.id);
        assert!(repo.oldest_unpinned_before(500).unwrap().is_none());
    }

    #[test]
    fn delete_removes_session() {
        let repo = SessionRepo::new(Database::in_memory().unwrap());
        let s = repo.create(None, new_session("https://a.test"), 1000).unwrap();
        repo.delete(&s.id).unwrap();
        assert!(!repo.exists(&s.id).unwrap());
    }

    #[test]
    fn exists_false_for_unknown() {
        let repo = SessionRepo::new(Database::in_memory().unwrap());
        assert!(!repo.exists(&SessionId::from_raw("sess-none")).unwrap());
    }
}
