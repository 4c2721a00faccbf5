use serde::{Deserialize, Serialize};
use tracing::instrument;

use loupe_core::ids::{EventId, SessionId};
use loupe_core::kinds::EventKind;
use loupe_core::origin::url_matches_origin;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRow {
    pub id: EventId,
    pub session_id: SessionId,
    pub timestamp: i64,
    pub kind: EventKind,
    pub wire_event_type: String,
    pub tab_id: Option<i64>,
    pub origin: Option<String>,
    pub payload: serde_json::Value,
}

/// Filters shared by the V1 query tools (spec.md §4.1, §4.7).
#[derive(Default)]
pub struct EventFilter {
    pub session_id: Option<SessionId>,
    pub origin: Option<String>,
    pub kinds: Option<Vec<EventKind>>,
    pub since_ts: Option<i64>,
    pub until_ts: Option<i64>,
}

pub struct EventRepo {
    db: Database,
}

impl EventRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: &EventId) -> Result<EventRow, StoreError> {
        self.db.with_conn(|conn| {
            match conn.query_row(
                "SELECT id, session_id, timestamp, kind, wire_event_type, tab_id, origin, payload
                 FROM events WHERE id = ?1",
                [id.as_str()],
                row_to_event,
            ) {
                Ok(r) => r,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    Err(StoreError::NotFound(format!("event {id}")))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Recent events, optionally filtered by session or origin, kind list,
    /// and time window; callers pass `limit+1` to compute `truncated`
    /// (spec.md §4.7 pagination rule).
    #[instrument(skip(self, filter))]
    pub fn list(
        &self,
        filter: &EventFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<EventRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT id, session_id, timestamp, kind, wire_event_type, tab_id, origin, payload
                 FROM events WHERE 1=1",
            );
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(session_id) = &filter.session_id {
                sql.push_str(" AND session_id = ?");
                params.push(Box::new(session_id.as_str().to_string()));
            }
            if let Some(kinds) = &filter.kinds {
                if !kinds.is_empty() {
                    let placeholders = kinds.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                    sql.push_str(&format!(" AND kind IN ({placeholders})"));
                    for k in kinds {
                        params.push(Box::new(k.as_str().to_string()));
                    }
                }
            }
            if let Some(since) = filter.since_ts {
                sql.push_str(" AND timestamp >= ?");
                params.push(Box::new(since));
            }
            if let Some(until) = filter.until_ts {
                sql.push_str(" AND timestamp <= ?");
                params.push(Box::new(until));
            }
            sql.push_str(" ORDER BY timestamp DESC LIMIT ? OFFSET ?");
            params.push(Box::new(limit));
            params.push(Box::new(offset));

            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt
                .query_map(param_refs.as_slice(), row_to_event)?
                .collect::<Result<Vec<Result<EventRow, StoreError>>, rusqlite::Error>>()?
                .into_iter()
                .collect::<Result<Vec<_>, StoreError>>()?;

            // Origin filtering is payload-aware (spec.md §4.1) and cannot be
            // expressed purely in SQL, so it is applied after the fetch.
            if let Some(origin) = &filter.origin {
                Ok(rows
                    .into_iter()
                    .filter(|e| event_matches_origin(e, origin))
                    .collect())
            } else {
                Ok(rows)
            }
        })
    }

    #[instrument(skip(self))]
    pub fn count_for_session(&self, session_id: &SessionId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM events WHERE session_id = ?1",
                [session_id.as_str()],
                |r| r.get(0),
            )?)
        })
    }

    #[instrument(skip(self))]
    pub fn time_range_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<(i64, i64)>, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT MIN(timestamp), MAX(timestamp) FROM events WHERE session_id = ?1",
                [session_id.as_str()],
                |row| {
                    let min: Option<i64> = row.get(0)?;
                    let max: Option<i64> = row.get(1)?;
                    Ok(min.zip(max))
                },
            )
            .map_err(StoreError::from)
        })
    }
}

/// Origin-filter matching rule (spec.md §4.1): stored origin equals the
/// filter, OR the payload carries a URL (checked under a fixed set of
/// common keys) equal to or prefixed by `<origin>/`.
pub fn event_matches_origin(event: &EventRow, origin: &str) -> bool {
    if event.origin.as_deref() == Some(origin) {
        return true;
    }
    for key in ["url", "to", "href", "location"] {
        if let Some(value) = event.payload.get(key).and_then(|v| v.as_str()) {
            if url_matches_origin(value, origin) {
                return true;
            }
        }
    }
    false
}

pub(crate) fn row_to_event(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<EventRow, StoreError>> {
    Ok((|| {
        let kind_str: String = row_helpers::get(row, 3, "events", "kind")?;
        let kind = row_helpers::parse_enum(&kind_str, "events", "kind")?;
        let payload_str: String = row_helpers::get(row, 7, "events", "payload")?;
        Ok(EventRow {
            id: EventId::from_raw(row_helpers::get::<String>(row, 0, "events", "id")?),
            session_id: SessionId::from_raw(row_helpers::get::<String>(
                row, 1, "events", "session_id",
            )?),
            timestamp: row_helpers::get(row, 2, "events", "timestamp")?,
            kind,
            wire_event_type: row_helpers::get(row, 4, "events", "wire_event_type")?,
            tab_id: row_helpers::get_opt(row, 5, "events", "tab_id")?,
            origin: row_helpers::get_opt(row, 6, "events", "origin")?,
            payload: row_helpers::parse_json(&payload_str, "events", "payload")?,
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

    fn insert_raw(
        db: &Database,
        session_id: &SessionId,
        kind: EventKind,
        ts: i64,
        payload: serde_json::Value,
        origin: Option<&str>,
    ) {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO events (id, session_id, timestamp, kind, wire_event_type, tab_id, origin, payload)
                 VALUES (?1, ?2, ?3, ?4, ?4, NULL, ?5, ?6)",
                rusqlite::params![
                    EventId::new().as_str(),
                    session_id.as_str(),
                    ts,
                    kind.as_str(),
                    origin,
                    serde_json::to_string(&payload).unwrap(),
                ],
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn list_filters_by_session_and_paginates() {
        let (db, sid) = setup();
        for i in 0..5 {
            insert_raw(&db, &sid, EventKind::Console, i, serde_json::json!({}), None);
        }
        let repo = EventRepo::new(db);
        let filter = EventFilter { session_id: Some(sid), ..Default::default() };
        let page = repo.list(&filter, 2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].timestamp, 4);
    }

    #[test]
    fn list_filters_by_kind() {
        let (db, sid) = setup();
        insert_raw(&db, &sid, EventKind::Console, 1, serde_json::json!({}), None);
        insert_raw(&db, &sid, EventKind::Error, 2, serde_json::json!({}), None);
        let repo = EventRepo::new(db);
        let filter = EventFilter {
            kinds: Some(vec![EventKind::Error]),
            ..Default::default()
        };
        let rows = repo.list(&filter, 10, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, EventKind::Error);
    }

    #[test]
    fn origin_filter_matches_stored_origin() {
        let (db, sid) = setup();
        insert_raw(&db, &sid, EventKind::Nav, 1, serde_json::json!({}), Some("https://x.test"));
        insert_raw(&db, &sid, EventKind::Nav, 2, serde_json::json!({}), Some("https://y.test"));
        let repo = EventRepo::new(db);
        let filter = EventFilter { origin: Some("https://x.test".into()), ..Default::default() };
        let rows = repo.list(&filter, 10, 0).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn origin_filter_matches_payload_url_prefix() {
        let (db, sid) = setup();
        insert_raw(
            &db,
            &sid,
            EventKind::Nav,
            1,
            serde_json::json!({"to": "https://x.test/page"}),
            None,
        );
        let repo = EventRepo::new(db);
        let filter = EventFilter { origin: Some("https://x.test".into()), ..Default::default() };
        let rows = repo.list(&filter, 10, 0).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn time_range_for_session() {
        let (db, sid) = setup();
        insert_raw(&db, &sid, EventKind::Console, 10, serde_json::json!({}), None);
        insert_raw(&db, &sid, EventKind::Console, 50, serde_json::json!({}), None);
        let repo = EventRepo::new(db);
        assert_eq!(repo.time_range_for_session(&sid).unwrap(), Some((10, 50)));
    }
}
