use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerSettings {
    pub retention_days: i64,
    pub max_db_mb: i64,
    pub max_sessions: i64,
    pub cleanup_interval_minutes: i64,
    pub last_cleanup_at: Option<i64>,
    pub export_path_override: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            retention_days: 30,
            max_db_mb: 500,
            max_sessions: 200,
            cleanup_interval_minutes: 60,
            last_cleanup_at: None,
            export_path_override: None,
        }
    }
}

#[derive(Default)]
pub struct SettingsPatch {
    pub retention_days: Option<i64>,
    pub max_db_mb: Option<i64>,
    pub max_sessions: Option<i64>,
    pub cleanup_interval_minutes: Option<i64>,
    pub export_path_override: Option<Option<String>>,
}

pub struct SettingsRepo {
    db: Database,
}

impl SettingsRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the singleton settings row, creating it with defaults on
    /// first access (migration seeds no row; spec.md §4.1 treats defaults
    /// as implicit until first mutated).
    #[instrument(skip(self))]
    pub fn get(&self) -> Result<ServerSettings, StoreError> {
        self.db.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT retention_days, max_db_mb, max_sessions, cleanup_interval_minutes,
                            last_cleanup_at, export_path_override
                     FROM server_settings WHERE id = 1",
                    [],
                    row_to_settings,
                )
                .map(Some);
            match found {
                Ok(Some(r)) => r,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    let defaults = ServerSettings::default();
                    insert_defaults(conn, &defaults)?;
                    Ok(defaults)
                }
                Ok(None) => unreachable!(),
                Err(e) => Err(e.into()),
            }
        })
    }

    #[instrument(skip(self, patch))]
    pub fn update(&self, patch: SettingsPatch) -> Result<ServerSettings, StoreError> {
        let current = self.get()?;
        let updated = ServerSettings {
            retention_days: patch.retention_days.unwrap_or(current.retention_days),
            max_db_mb: patch.max_db_mb.unwrap_or(current.max_db_mb),
            max_sessions: patch.max_sessions.unwrap_or(current.max_sessions),
            cleanup_interval_minutes: patch
                .cleanup_interval_minutes
                .unwrap_or(current.cleanup_interval_minutes),
            last_cleanup_at: current.last_cleanup_at,
            export_path_override: patch
                .export_path_override
                .unwrap_or(current.export_path_override),
        };
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE server_settings SET retention_days=?1, max_db_mb=?2, max_sessions=?3,
                    cleanup_interval_minutes=?4, export_path_override=?5 WHERE id=1",
                rusqlite::params![
                    updated.retention_days,
                    updated.max_db_mb,
                    updated.max_sessions,
                    updated.cleanup_interval_minutes,
                    updated.export_path_override,
                ],
            )?;
            Ok(())
        })?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub fn record_cleanup_run(&self, now_ms: i64) -> Result<(), StoreError> {
        self.get()?;
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE server_settings SET last_cleanup_at = ?1 WHERE id = 1",
                [now_ms],
            )?;
            Ok(())
        })
    }
}

fn insert_defaults(conn: &rusqlite::Connection, d: &ServerSettings) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO server_settings
            (id, retention_days, max_db_mb, max_sessions, cleanup_interval_minutes,
             last_cleanup_at, export_path_override)
         VALUES (1, ?1, ?2, ?3, ?4, NULL, NULL)",
        rusqlite::params![
            d.retention_days,
            d.max_db_mb,
            d.max_sessions,
            d.cleanup_interval_minutes,
        ],
    )?;
    Ok(())
}

fn row_to_settings(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<ServerSettings, StoreError>> {
    Ok((|| {
        Ok(ServerSettings {
            retention_days: row_helpers::get(row, 0, "server_settings", "retention_days")?,
            max_db_mb: row_helpers::get(row, 1, "server_settings", "max_db_mb")?,
            max_sessions: row_helpers::get(row, 2, "server_settings", "max_sessions")?,
            cleanup_interval_minutes: row_helpers::get(
                row,
                3,
                "server_settings",
                "cleanup_interval_minutes",
            )?,
            last_cleanup_at: row_helpers::get_opt(row, 4, "server_settings", "last_cleanup_at")?,
            export_path_override: row_helpers::get_opt(
                row,
                5,
                "server_settings",
                "export_path_override",
            )?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_seeds_defaults_on_first_access() {
        let db = Database::in_memory().unwrap();
        let repo = SettingsRepo::new(db);
        let s = repo.get().unwrap();
        assert_eq!(s.retention_days, 30);
        assert_eq!(s.max_sessions, 200);
    }

    #[test]
    fn update_applies_partial_patch() {
        let db = Database::in_memory().unwrap();
        let repo = SettingsRepo::new(db);
        repo.get().unwrap();
        let updated = repo
            .update(SettingsPatch { retention_days: Some(7), ..Default::default() })
            .unwrap();
        assert_eq!(updated.retention_days, 7);
        assert_eq!(updated.max_sessions, 200);
    }

    #[test]
    fn record_cleanup_run_sets_timestamp() {
        let db = Database::in_memory().unwrap();
        let repo = SettingsRepo::new(db);
        repo.record_cleanup_run(12345).unwrap();
        assert_eq!(repo.get().unwrap().last_cleanup_at, Some(12345));
    }
}
