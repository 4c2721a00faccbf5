use std::path::{Path, PathBuf};

use tracing::instrument;

use loupe_core::ids::{EventId, FingerprintId, SessionId};
use loupe_core::kinds::{
    normalize_event_kind, EventKind, NetworkErrorClass, NetworkInitiator, SnapshotMode,
    SnapshotTrigger, StyleMode,
};
use loupe_core::origin::normalize_origin;

use crate::database::Database;
use crate::error::StoreError;
use crate::events::EventRepo;
use crate::fingerprints::FingerprintRepo;
use crate::network::{NetworkRepo, NewNetworkRecord};
use crate::sessions::SessionRepo;
use crate::settings::SettingsRepo;
use crate::snapshots::{NewSnapshot, SnapshotRepo};

/// One inbound telemetry event, as it arrives off the wire (spec.md §4.5),
/// prior to normalization.
pub struct InboundEvent {
    pub id: Option<EventId>,
    pub timestamp: i64,
    pub wire_event_type: String,
    pub tab_id: Option<i64>,
    pub payload: serde_json::Value,
}

/// Central facade combining every repo behind the one multi-table
/// transaction that `InsertEventBatch` requires (spec.md §4.1): normalize
/// kind, extract tab/origin, insert the event row, then fan out to
/// fingerprints/network/snapshots depending on kind.
#[derive(Clone)]
pub struct Store {
    db: Database,
    db_dir: PathBuf,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::open(path)?;
        let db_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self { db, db_dir })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Database::in_memory()?;
        Ok(Self { db, db_dir: std::env::temp_dir() })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn sessions(&self) -> SessionRepo {
        SessionRepo::new(self.db.clone())
    }

    pub fn events(&self) -> EventRepo {
        EventRepo::new(self.db.clone())
    }

    pub fn network(&self) -> NetworkRepo {
        NetworkRepo::new(self.db.clone())
    }

    pub fn fingerprints(&self) -> FingerprintRepo {
        FingerprintRepo::new(self.db.clone())
    }

    pub fn snapshots(&self) -> SnapshotRepo {
        SnapshotRepo::new(self.db.clone(), self.db_dir.clone())
    }

    pub fn settings(&self) -> SettingsRepo {
        SettingsRepo::new(self.db.clone())
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    /// `InsertEventBatch` (spec.md §4.1): single transaction, per-event
    /// normalization and kind-specific side effects. Returns the number of
    /// events actually persisted (events whose session no longer exists are
    /// silently skipped rather than aborting the whole batch, matching the
    /// ingest pipeline's tolerance for late-arriving frames after a
    /// concurrent `session_end`).
    #[instrument(skip(self, events))]
    pub fn insert_event_batch(
        &self,
        session_id: &SessionId,
        events: Vec<InboundEvent>,
    ) -> Result<u32, StoreError> {
        self.insert_events(session_id, events, true)
    }

    /// Same as `insert_event_batch` but skips the kind-specific fan-out
    /// (fingerprints/network/snapshots). For session import (spec.md §4.4),
    /// where the manifest already carries the authoritative child-table
    /// rows — fanning out from the raw event payloads here as well would
    /// double-insert them.
    #[instrument(skip(self, events))]
    pub fn insert_raw_event_batch(
        &self,
        session_id: &SessionId,
        events: Vec<InboundEvent>,
    ) -> Result<u32, StoreError> {
        self.insert_events(session_id, events, false)
    }

    fn insert_events(
        &self,
        session_id: &SessionId,
        events: Vec<InboundEvent>,
        fan_out: bool,
    ) -> Result<u32, StoreError> {
        let snapshots = self.snapshots();
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let session_exists: bool = tx.query_row(
                "SELECT 1 FROM sessions WHERE id = ?1",
                [session_id.as_str()],
                |_| Ok(true),
            ).unwrap_or(false);
            if !session_exists {
                return Err(StoreError::NotFound(format!("session {session_id}")));
            }

            let mut inserted = 0u32;
            for ev in events {
                let kind = normalize_event_kind(&ev.wire_event_type);
                let origin = extract_origin(&ev.payload);
                let id = ev.id.unwrap_or_default();

                tx.execute(
                    "INSERT INTO events
                        (id, session_id, timestamp, kind, wire_event_type, tab_id, origin, payload)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                    rusqlite::params![
                        id.as_str(),
                        session_id.as_str(),
                        ev.timestamp,
                        kind.as_str(),
                        ev.wire_event_type,
                        ev.tab_id,
                        origin,
                        serde_json::to_string(&ev.payload)?,
                    ],
                )?;
                inserted += 1;

                if !fan_out {
                    continue;
                }

                match kind {
                    EventKind::Error => {
                        let message = ev.payload.get("message").and_then(|v| v.as_str()).unwrap_or("");
                        let stack = ev.payload.get("stack").and_then(|v| v.as_str()).unwrap_or("");
                        let fp_id = FingerprintId::from_normalized(
                            &normalize_fingerprint_text(message),
                            &normalize_fingerprint_text(stack),
                        );
                        FingerprintRepo::upsert_on_conn(
                            &tx, session_id, &fp_id, message, stack, ev.timestamp,
                        )?;
                    }
                    EventKind::Network => {
                        let record = network_record_from_payload(&ev.payload, ev.timestamp, origin.clone());
                        NetworkRepo::insert_on_conn(&tx, session_id, &record)?;
                    }
                    EventKind::Ui => {
                        if let Some(snap) =
                            snapshot_from_payload(&ev.payload, ev.timestamp, Some(id.clone()), &ev.wire_event_type)
                        {
                            snapshots.insert_on_conn(&tx, session_id, snap)?;
                        }
                    }
                    _ => {}
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// `POST /db/reset` (spec.md §6): wipes every row and the snapshot asset
    /// tree, leaving the schema and `server_settings` defaults in place.
    /// Destructive and unpinned-session-agnostic by design — this is an
    /// explicit operator action, not something retention ever does on its
    /// own.
    #[instrument(skip(self))]
    pub fn reset(&self) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for table in [
                "snapshots",
                "error_fingerprints",
                "network_records",
                "events",
                "sessions",
                "server_settings",
            ] {
                tx.execute(&format!("DELETE FROM {table}"), [])?;
            }
            tx.commit()?;
            Ok(())
        })?;
        let assets_root = self.db_dir.join("snapshot-assets");
        if assets_root.exists() {
            std::fs::remove_dir_all(&assets_root).map_err(|e| {
                StoreError::Conflict(format!("failed to clear snapshot assets: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Lowercase, collapse runs of whitespace to a single space, and trim —
/// the normalization `FingerprintId::from_normalized` requires of its
/// caller so that two error reports differing only in case or incidental
/// whitespace still aggregate under one fingerprint (spec.md §8).
fn normalize_fingerprint_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn extract_origin(payload: &serde_json::Value) -> Option<String> {
    for key in ["origin", "url", "href"] {
        if let Some(raw) = payload.get(key).and_then(|v| v.as_str()) {
            if let Some(origin) = normalize_origin(raw) {
                return Some(origin);
            }
        }
    }
    None
}

fn network_record_from_payload(
    payload: &serde_json::Value,
    ts: i64,
    origin: Option<String>,
) -> NewNetworkRecord {
    let initiator = payload
        .get("initiator")
        .and_then(|v| v.as_str())
        .map(NetworkInitiator::parse_or_other)
        .unwrap_or(NetworkInitiator::Other);
    let error_class = payload
        .get("errorClass")
        .and_then(|v| v.as_str())
        .and_then(NetworkErrorClass::parse);

    NewNetworkRecord {
        start_timestamp: ts,
        duration_ms: payload.get("durationMs").and_then(|v| v.as_i64()),
        method: payload
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_string(),
        url: payload
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        origin,
        status: payload.get("status").and_then(|v| v.as_i64()).map(|v| v as i32),
        initiator,
        error_class,
        estimated_size_bytes: payload.get("sizeBytes").and_then(|v| v.as_i64()),
    }
}

/// Only the literal wire type `ui_snapshot` carries a snapshot payload;
/// `normalize_event_kind` maps every other UI-ish wire type (`click`,
/// `scroll`, `input`, ...) to the same `EventKind::Ui`, so the caller must
/// pass the original wire type through to tell them apart (spec.md §4.1).
fn snapshot_from_payload(
    payload: &serde_json::Value,
    ts: i64,
    trigger_event_id: Option<EventId>,
    wire_event_type: &str,
) -> Option<NewSnapshot> {
    if wire_event_type != "ui_snapshot" {
        return None;
    }
    let trigger_kind = payload
        .get("trigger")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<SnapshotTrigger>().ok())
        .unwrap_or(SnapshotTrigger::Manual);
    let mode = payload
        .get("mode")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<SnapshotMode>().ok())
        .unwrap_or(SnapshotMode::Dom);
    let style_mode = payload
        .get("styleMode")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<StyleMode>().ok())
        .unwrap_or(StyleMode::ComputedLite);

    Some(NewSnapshot {
        trigger_event_id,
        timestamp: ts,
        trigger_kind,
        selector: payload.get("selector").and_then(|v| v.as_str()).map(str::to_string),
        url: payload.get("url").and_then(|v| v.as_str()).map(str::to_string),
        mode,
        style_mode,
        dom_json: payload.get("dom").cloned(),
        styles_json: payload.get("styles").cloned(),
        dom_truncated: payload.get("domTruncated").and_then(|v| v.as_bool()).unwrap_or(false),
        styles_truncated: payload.get("stylesTruncated").and_then(|v| v.as_bool()).unwrap_or(false),
        png_data_url: payload.get("png").and_then(|v| v.as_str()).map(str::to_string),
    })
}
