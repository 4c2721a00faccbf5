use std::path::{Path, PathBuf};

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use loupe_core::ids::{EventId, SessionId, SnapshotId};
use loupe_core::kinds::{SnapshotMode, SnapshotTrigger, StyleMode};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

pub const MAX_DOM_BYTES: usize = 512 * 1024;
pub const MAX_STYLES_BYTES: usize = 512 * 1024;
pub const MAX_PNG_BYTES: usize = 5 * 1024 * 1024;

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: SnapshotId,
    pub session_id: SessionId,
    pub trigger_event_id: Option<EventId>,
    pub timestamp: i64,
    pub trigger_kind: SnapshotTrigger,
    pub selector: Option<String>,
    pub url: Option<String>,
    pub mode: SnapshotMode,
    pub style_mode: StyleMode,
    pub dom_json: Option<serde_json::Value>,
    pub styles_json: Option<serde_json::Value>,
    pub dom_truncated: bool,
    pub styles_truncated: bool,
    pub png_path: Option<String>,
    pub png_mime: Option<String>,
    pub png_bytes: Option<i64>,
}

pub struct NewSnapshot {
    pub trigger_event_id: Option<EventId>,
    pub timestamp: i64,
    pub trigger_kind: SnapshotTrigger,
    pub selector: Option<String>,
    pub url: Option<String>,
    pub mode: SnapshotMode,
    pub style_mode: StyleMode,
    pub dom_json: Option<serde_json::Value>,
    pub styles_json: Option<serde_json::Value>,
    pub dom_truncated: bool,
    pub styles_truncated: bool,
    /// Raw `data:image/png;base64,...` payload, if the capture included one.
    pub png_data_url: Option<String>,
}

pub struct SnapshotRepo {
    db: Database,
    /// Directory the `.db` file lives in; asset tree is `<this>/snapshot-assets/...`.
    db_dir: PathBuf,
}

impl SnapshotRepo {
    pub fn new(db: Database, db_dir: PathBuf) -> Self {
        Self { db, db_dir }
    }

    fn assets_root(&self) -> PathBuf {
        self.db_dir.join("snapshot-assets")
    }

    /// Validates size budgets, writes the PNG asset (if any) to disk, and
    /// inserts the row — called from inside the event-batch transaction
    /// (spec.md §4.1, §4.2) or a session import (spec.md §4.4).
    pub fn insert_on_conn(
        &self,
        conn: &rusqlite::Connection,
        session_id: &SessionId,
        snap: NewSnapshot,
    ) -> Result<SnapshotId, StoreError> {
        if let Some(dom) = &snap.dom_json {
            let size = serde_json::to_vec(dom)?.len();
            if size > MAX_DOM_BYTES {
                return Err(StoreError::SnapshotSizeExceeded {
                    kind: "dom",
                    actual: size,
                    limit: MAX_DOM_BYTES,
                });
            }
        }
        if let Some(styles) = &snap.styles_json {
            let size = serde_json::to_vec(styles)?.len();
            if size > MAX_STYLES_BYTES {
                return Err(StoreError::SnapshotSizeExceeded {
                    kind: "styles",
                    actual: size,
                    limit: MAX_STYLES_BYTES,
                });
            }
        }

        let id = SnapshotId::new();
        let (png_path, png_mime, png_bytes) = match &snap.png_data_url {
            Some(data_url) => {
                let (mime, bytes) = decode_data_url(data_url)?;
                if bytes.len() > MAX_PNG_BYTES {
                    return Err(StoreError::SnapshotSizeExceeded {
                        kind: "png",
                        actual: bytes.len(),
                        limit: MAX_PNG_BYTES,
                    });
                }
                let rel = self.write_asset(session_id, &id, &bytes)?;
                (Some(rel), Some(mime), Some(bytes.len() as i64))
            }
            None => (None, None, None),
        };

        conn.execute(
            "INSERT INTO snapshots
                (id, session_id, trigger_event_id, timestamp, trigger_kind, selector, url,
                 mode, style_mode, dom_json, styles_json, dom_truncated, styles_truncated,
                 png_path, png_mime, png_bytes)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            rusqlite::params![
                id.as_str(),
                session_id.as_str(),
                snap.trigger_event_id.as_ref().map(|e| e.as_str().to_string()),
                snap.timestamp,
                snap.trigger_kind.as_str(),
                snap.selector,
                snap.url,
                snap.mode.as_str(),
                snap.style_mode.as_str(),
                snap.dom_json.as_ref().map(serde_json::to_string).transpose()?,
                snap.styles_json.as_ref().map(serde_json::to_string).transpose()?,
                snap.dom_truncated as i64,
                snap.styles_truncated as i64,
                png_path,
                png_mime,
                png_bytes,
            ],
        )?;
        Ok(id)
    }

    fn write_asset(
        &self,
        session_id: &SessionId,
        id: &SnapshotId,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let rel = format!("{}/{}.png", session_id.sanitized(), id.as_str());
        let abs = self.resolve_within_root(&rel)?;
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&abs, bytes)?;
        Ok(rel)
    }

    /// Resolves a stored relative path against the asset root, rejecting any
    /// path that escapes it (spec.md §4.2 path-traversal defense).
    fn resolve_within_root(&self, rel: &str) -> Result<PathBuf, StoreError> {
        if rel.contains("..") || Path::new(rel).is_absolute() {
            return Err(StoreError::PathTraversal(rel.to_string()));
        }
        Ok(self.assets_root().join(rel))
    }

    #[instrument(skip(self))]
    pub fn read_png(&self, snapshot: &SnapshotRow) -> Result<Vec<u8>, StoreError> {
        let rel = snapshot
            .png_path
            .as_ref()
            .ok_or_else(|| StoreError::SnapshotAssetMissing(snapshot.id.as_str().to_string()))?;
        let abs = self.resolve_within_root(rel)?;
        std::fs::read(&abs)
            .map_err(|_| StoreError::SnapshotAssetMissing(rel.clone()))
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: &SnapshotId) -> Result<SnapshotRow, StoreError> {
        self.db.with_conn(|conn| {
            match conn.query_row(
                "SELECT id, session_id, trigger_event_id, timestamp, trigger_kind, selector, url,
                        mode, style_mode, dom_json, styles_json, dom_truncated, styles_truncated,
                        png_path, png_mime, png_bytes
                 FROM snapshots WHERE id = ?1",
                [id.as_str()],
                row_to_snapshot,
            ) {
                Ok(r) => r,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    Err(StoreError::NotFound(format!("snapshot {id}")))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    #[instrument(skip(self))]
    pub fn list_for_session(
        &self,
        session_id: &SessionId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SnapshotRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, trigger_event_id, timestamp, trigger_kind, selector, url,
                        mode, style_mode, dom_json, styles_json, dom_truncated, styles_truncated,
                        png_path, png_mime, png_bytes
                 FROM snapshots WHERE session_id = ?1
                 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
            )?;
            stmt.query_map(
                rusqlite::params![session_id.as_str(), limit, offset],
                row_to_snapshot,
            )?
            .collect::<Result<Vec<Result<SnapshotRow, StoreError>>, rusqlite::Error>>()?
            .into_iter()
            .collect()
        })
    }

    /// Deletes asset files not referenced by any row in `snapshots`
    /// (spec.md §4.2, §4.4 step 4). Returns the count removed.
    #[instrument(skip(self))]
    pub fn sweep_orphans(&self) -> Result<u64, StoreError> {
        let referenced: std::collections::HashSet<String> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT png_path FROM snapshots WHERE png_path IS NOT NULL")?;
            stmt.query_map([], |r| r.get::<_, String>(0))?
                .collect::<Result<_, _>>()
                .map_err(StoreError::from)
        })?;

        let root = self.assets_root();
        if !root.exists() {
            return Ok(0);
        }
        let mut removed = 0u64;
        for session_dir in std::fs::read_dir(&root)? {
            let session_dir = session_dir?;
            if !session_dir.file_type()?.is_dir() {
                continue;
            }
            for file in std::fs::read_dir(session_dir.path())? {
                let file = file?;
                let rel = format!(
                    "{}/{}",
                    session_dir.file_name().to_string_lossy(),
                    file.file_name().to_string_lossy()
                );
                if !referenced.contains(&rel) {
                    std::fs::remove_file(file.path())?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>), StoreError> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| StoreError::Conflict("snapshot png is not a data URL".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| StoreError::Conflict("malformed data URL".into()))?;
    let mime = meta.trim_end_matches(";base64").to_string();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| StoreError::Conflict(format!("invalid base64 png: {e}")))?;
    if bytes.len() < 8 || bytes[..8] != PNG_MAGIC {
        return Err(StoreError::Conflict("payload is not a valid PNG".into()));
    }
    Ok((mime, bytes))
}

fn row_to_snapshot(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<SnapshotRow, StoreError>> {
    Ok((|| {
        let trigger_kind_str: String = row_helpers::get(row, 4, "snapshots", "trigger_kind")?;
        let mode_str: String = row_helpers::get(row, 7, "snapshots", "mode")?;
        let style_mode_str: String = row_helpers::get(row, 8, "snapshots", "style_mode")?;
        let dom_json: Option<String> = row_helpers::get_opt(row, 9, "snapshots", "dom_json")?;
        let styles_json: Option<String> =
            row_helpers::get_opt(row, 10, "snapshots", "styles_json")?;
        let dom_truncated: i64 = row_helpers::get(row, 11, "snapshots", "dom_truncated")?;
        let styles_truncated: i64 = row_helpers::get(row, 12, "snapshots", "styles_truncated")?;
        let trigger_event_id: Option<String> =
            row_helpers::get_opt(row, 2, "snapshots", "trigger_event_id")?;

        Ok(SnapshotRow {
            id: SnapshotId::from_raw(row_helpers::get::<String>(row, 0, "snapshots", "id")?),
            session_id: SessionId::from_raw(row_helpers::get::<String>(
                row,
                1,
                "snapshots",
                "session_id",
            )?),
            trigger_event_id: trigger_event_id.map(EventId::from_raw),
            timestamp: row_helpers::get(row, 3, "snapshots", "timestamp")?,
            trigger_kind: row_helpers::parse_enum(&trigger_kind_str, "snapshots", "trigger_kind")?,
            selector: row_helpers::get_opt(row, 5, "snapshots", "selector")?,
            url: row_helpers::get_opt(row, 6, "snapshots", "url")?,
            mode: row_helpers::parse_enum(&mode_str, "snapshots", "mode")?,
            style_mode: row_helpers::parse_enum(&style_mode_str, "snapshots", "style_mode")?,
            dom_json: dom_json
                .map(|s| row_helpers::parse_json(&s, "snapshots", "dom_json"))
                .transpose()?,
            styles_json: styles_json
                .map(|s| row_helpers::parse_json(&s, "snapshots", "styles_json"))
                .transpose()?,
            dom_truncated: dom_truncated != 0,
            styles_truncated: styles_truncated != 0,
            png_path: row_helpers::get_opt(row, 13, "snapshots", "png_path")?,
            png_mime: row_helpers::get_opt(row, 14, "snapshots", "png_mime")?,
            png_bytes: row_helpers::get_opt(row, 15, "snapshots", "png_bytes")?,
        })
    })())
}
