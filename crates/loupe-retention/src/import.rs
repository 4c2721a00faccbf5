use std::io::Read;

use base64::Engine;

use loupe_core::ids::SessionId;
use loupe_core::kinds::{NetworkErrorClass, NetworkInitiator};
use loupe_store::sessions::NewSession;
use loupe_store::Store;

use crate::error::RetentionError;
use crate::export::ExportManifest;

const PER_SECTION_CAP: usize = 100_000;

pub enum ImportPayload {
    Json(serde_json::Value),
    ZipBase64(String),
}

/// Imports a previously exported session (spec.md §4.4). A session-id
/// collision with an existing row remaps the import to
/// `<sanitized>-import-<ms-epoch>` rather than erroring or overwriting.
pub fn import_session(
    store: &Store,
    payload: ImportPayload,
    now_ms: i64,
) -> Result<SessionId, RetentionError> {
    let (manifest, png_bytes): (ExportManifest, std::collections::HashMap<String, Vec<u8>>) =
        match payload {
            ImportPayload::Json(value) => {
                let manifest: ExportManifest =
                    serde_json::from_value(value).map_err(|e| RetentionError::Archive(e.to_string()))?;
                let mut pngs = std::collections::HashMap::new();
                for entry in &manifest.snapshots {
                    if let Some(b64) = &entry.png_base64 {
                        let bytes = base64::engine::general_purpose::STANDARD
                            .decode(b64)
                            .map_err(|e| RetentionError::Archive(e.to_string()))?;
                        pngs.insert(entry.row.id.to_string(), bytes);
                    }
                }
                (manifest, pngs)
            }
            ImportPayload::ZipBase64(b64) => {
                let zip_bytes = base64::engine::general_purpose::STANDARD
                    .decode(&b64)
                    .map_err(|e| RetentionError::Archive(e.to_string()))?;
                let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes))
                    .map_err(|e| RetentionError::Archive(e.to_string()))?;

                let manifest_json = {
                    let mut f = archive
                        .by_name("manifest.json")
                        .map_err(|e| RetentionError::Archive(e.to_string()))?;
                    let mut s = String::new();
                    f.read_to_string(&mut s)
                        .map_err(|e| RetentionError::Archive(e.to_string()))?;
                    s
                };
                let manifest: ExportManifest = serde_json::from_str(&manifest_json)
                    .map_err(|e| RetentionError::Archive(e.to_string()))?;

                let mut pngs = std::collections::HashMap::new();
                for entry in &manifest.snapshots {
                    if let Some(zip_entry) = &entry.zip_entry {
                        let mut f = archive.by_name(zip_entry).map_err(|_| {
                            RetentionError::MissingAsset(zip_entry.clone())
                        })?;
                        let mut bytes = Vec::new();
                        f.read_to_end(&mut bytes)
                            .map_err(|e| RetentionError::Archive(e.to_string()))?;
                        pngs.insert(entry.row.id.to_string(), bytes);
                    }
                }
                (manifest, pngs)
            }
        };

    if manifest.events.len() > PER_SECTION_CAP
        || manifest.network_records.len() > PER_SECTION_CAP
        || manifest.fingerprints.len() > PER_SECTION_CAP
        || manifest.snapshots.len() > PER_SECTION_CAP
    {
        return Err(RetentionError::Archive(format!(
            "import section exceeds the {PER_SECTION_CAP}-record cap"
        )));
    }

    let sessions = store.sessions();
    let new_id = if sessions.exists(&manifest.session.id)? {
        SessionId::from_raw(format!("{}-import-{now_ms}", manifest.session.id.sanitized()))
    } else {
        manifest.session.id.clone()
    };

    let created = sessions.create(
        Some(new_id.clone()),
        NewSession {
            url: manifest.session.initial_url.clone(),
            tab_ids: manifest.session.tab_ids.clone(),
            window_id: manifest.session.window_id,
            user_agent: manifest.session.user_agent.clone(),
            viewport_width: manifest.session.viewport_width,
            viewport_height: manifest.session.viewport_height,
            dpr: manifest.session.dpr,
            safe_mode: manifest.session.safe_mode,
        },
        manifest.session.created_at,
    )?;
    if manifest.session.pinned {
        sessions.set_pinned(&created.id, true)?;
    }
    if let Some(ended_at) = manifest.session.ended_at {
        sessions.end(&created.id, ended_at)?;
    }

    // Raw insert only — the network/fingerprint/snapshot child rows below
    // are replayed from the manifest's own authoritative copies, so fanning
    // out from these event payloads too would double-insert every one of
    // them (spec.md §8 round-trip invariant).
    let batch = manifest
        .events
        .into_iter()
        .map(|e| loupe_store::InboundEvent {
            id: Some(e.id),
            timestamp: e.timestamp,
            wire_event_type: e.wire_event_type,
            tab_id: e.tab_id,
            payload: e.payload,
        })
        .collect();
    store.insert_raw_event_batch(&new_id, batch)?;

    store.db().with_conn(|conn| {
        for record in &manifest.network_records {
            loupe_store::network::NetworkRepo::insert_on_conn(
                conn,
                &new_id,
                &loupe_store::network::NewNetworkRecord {
                    start_timestamp: record.start_timestamp,
                    duration_ms: record.duration_ms,
                    method: record.method.clone(),
                    url: record.url.clone(),
                    origin: record.origin.clone(),
                    status: record.status,
                    initiator: NetworkInitiator::parse_or_other(record.initiator.as_str()),
                    error_class: NetworkErrorClass::parse(
                        record.error_class.map(|c| c.as_str()).unwrap_or(""),
                    ),
                    estimated_size_bytes: record.estimated_size_bytes,
                },
            )?;
        }
        for fp in &manifest.fingerprints {
            loupe_store::fingerprints::FingerprintRepo::upsert_on_conn(
                conn,
                &new_id,
                &loupe_core::ids::FingerprintId::from_raw(fp.id.to_string()),
                &fp.sample_message,
                &fp.sample_stack,
                fp.first_seen,
            )?;
        }
        Ok(())
    })?;

    let snapshot_repo = store.snapshots();
    for entry in manifest.snapshots {
        let png_data_url = png_bytes.get(&entry.row.id.to_string()).map(|bytes| {
            format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(bytes)
            )
        });
        if entry.row.png_path.is_some() && png_data_url.is_none() {
            return Err(RetentionError::MissingAsset(entry.row.id.to_string()));
        }
        store.db().with_conn(|conn| {
            snapshot_repo.insert_on_conn(
                conn,
                &new_id,
                loupe_store::snapshots::NewSnapshot {
                    trigger_event_id: entry.row.trigger_event_id,
                    timestamp: entry.row.timestamp,
                    trigger_kind: entry.row.trigger_kind,
                    selector: entry.row.selector,
                    url: entry.row.url,
                    mode: entry.row.mode,
                    style_mode: entry.row.style_mode,
                    dom_json: entry.row.dom_json,
                    styles_json: entry.row.styles_json,
                    dom_truncated: entry.row.dom_truncated,
                    styles_truncated: entry.row.styles_truncated,
                    png_data_url,
                },
            )
        })?;
    }

    Ok(new_id)
}
