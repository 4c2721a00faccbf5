use std::io::Write;

use base64::Engine;
use serde::{Deserialize, Serialize};

use loupe_core::ids::SessionId;
use loupe_store::Store;

use crate::error::RetentionError;

#[derive(Serialize, Deserialize)]
pub struct ExportManifest {
    pub session: loupe_store::sessions::SessionRow,
    pub events: Vec<loupe_store::events::EventRow>,
    pub network_records: Vec<loupe_store::network::NetworkRecord>,
    pub fingerprints: Vec<loupe_store::fingerprints::ErrorFingerprint>,
    pub snapshots: Vec<SnapshotManifestEntry>,
}

#[derive(Serialize, Deserialize)]
pub struct SnapshotManifestEntry {
    #[serde(flatten)]
    pub row: loupe_store::snapshots::SnapshotRow,
    /// Present only in inlined-PNG JSON export.
    pub png_base64: Option<String>,
    /// Present only in ZIP export: the archive-relative entry name.
    pub zip_entry: Option<String>,
}

const PER_SECTION_CAP: usize = 100_000;

/// Builds the full export manifest for one session (spec.md §4.4). Bounded
/// by the same per-section record cap import enforces, so a session that
/// somehow exceeds it still exports (truncated) rather than OOMing.
fn build_manifest(store: &Store, session_id: &SessionId) -> Result<ExportManifest, RetentionError> {
    let session = store
        .sessions()
        .get(session_id)
        .map_err(|_| RetentionError::SessionNotFound(session_id.to_string()))?;

    let events = store
        .events()
        .list(
            &loupe_store::events::EventFilter {
                session_id: Some(session_id.clone()),
                ..Default::default()
            },
            PER_SECTION_CAP as u32,
            0,
        )?;
    let network_records = store.network().list_for_session(session_id, PER_SECTION_CAP as u32, 0)?;
    let fingerprints = store
        .fingerprints()
        .list_for_session(session_id, PER_SECTION_CAP as u32, 0)?;
    let snapshot_rows = store
        .snapshots()
        .list_for_session(session_id, PER_SECTION_CAP as u32, 0)?;

    let snapshots = snapshot_rows
        .into_iter()
        .map(|row| SnapshotManifestEntry { row, png_base64: None, zip_entry: None })
        .collect();

    Ok(ExportManifest { session, events, network_records, fingerprints, snapshots })
}

/// JSON export, optionally inlining PNG bytes as base64 (spec.md §4.4).
pub fn export_json(
    store: &Store,
    session_id: &SessionId,
    inline_png: bool,
) -> Result<serde_json::Value, RetentionError> {
    let mut manifest = build_manifest(store, session_id)?;
    if inline_png {
        let assets = store.snapshots();
        for entry in manifest.snapshots.iter_mut() {
            if entry.row.png_path.is_some() {
                let bytes = assets.read_png(&entry.row)?;
                entry.png_base64 = Some(base64::engine::general_purpose::STANDARD.encode(bytes));
            }
        }
    }
    Ok(serde_json::to_value(manifest).map_err(|e| RetentionError::Archive(e.to_string()))?)
}

/// ZIP export: `manifest.json` plus one entry per referenced PNG, verified
/// via the PNG magic bytes before being written into the archive
/// (spec.md §4.4).
pub fn export_zip(store: &Store, session_id: &SessionId) -> Result<Vec<u8>, RetentionError> {
    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    let mut manifest = build_manifest(store, session_id)?;
    let assets = store.snapshots();

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options =
            zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for entry in manifest.snapshots.iter_mut() {
            if entry.row.png_path.is_none() {
                continue;
            }
            let bytes = assets.read_png(&entry.row)?;
            if bytes.len() < 8 || bytes[..8] != PNG_MAGIC {
                return Err(RetentionError::Archive(format!(
                    "snapshot {} asset is not a valid PNG",
                    entry.row.id
                )));
            }
            let name = format!("snapshots/{}.png", entry.row.id);
            zip.start_file(&name, options)
                .map_err(|e| RetentionError::Archive(e.to_string()))?;
            zip.write_all(&bytes).map_err(|e| RetentionError::Archive(e.to_string()))?;
            entry.zip_entry = Some(name);
        }

        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| RetentionError::Archive(e.to_string()))?;
        zip.start_file("manifest.json", options)
            .map_err(|e| RetentionError::Archive(e.to_string()))?;
        zip.write_all(&manifest_json)
            .map_err(|e| RetentionError::Archive(e.to_string()))?;

        zip.finish().map_err(|e| RetentionError::Archive(e.to_string()))?;
    }
    Ok(buf)
}
