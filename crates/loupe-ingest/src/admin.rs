use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use loupe_core::errors::ErrorKind;
use loupe_core::ids::SessionId;
use loupe_retention::{export_json, export_zip, import_session, ImportPayload, RetentionEngine, RetentionError};
use loupe_store::settings::SettingsPatch;
use loupe_store::StoreError;

use crate::server::AppState;

/// Admin HTTP surface (spec.md §6): operator-facing stats, retention
/// control, and session management, layered onto the same router as `/ws`
/// and `/health` rather than a second listener.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/retention/settings", get(get_retention_settings).post(post_retention_settings))
        .route("/retention/run-cleanup", post(run_cleanup))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}/pin", post(pin_session))
        .route("/sessions/{id}/export", post(export_session))
        .route("/sessions/import", post(import_session_handler))
        .route("/sessions/{id}/entries", get(session_entries))
        .route("/sessions/{id}/snapshots", get(session_snapshots))
        .route("/db/reset", post(reset_db))
}

/// `{error, code}` shape, matching the wire protocol's `error` frame
/// (spec.md §6).
struct AdminError {
    status: StatusCode,
    error: String,
    code: &'static str,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.error, "code": self.code }))).into_response()
    }
}

impl From<StoreError> for AdminError {
    fn from(e: StoreError) -> Self {
        let status = if matches!(e, StoreError::NotFound(_)) {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        AdminError { status, code: e.error_kind(), error: e.to_string() }
    }
}

impl From<RetentionError> for AdminError {
    fn from(e: RetentionError) -> Self {
        let status = if matches!(e, RetentionError::SessionNotFound(_)) {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        AdminError { status, code: e.error_kind(), error: e.to_string() }
    }
}

async fn stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AdminError> {
    let store = &state.ctx.store;
    let settings = store.settings().get()?;
    let sessions = store.sessions().count_all()?;
    let unpinned = store.sessions().count_unpinned()?;
    let db_bytes = std::fs::metadata(store.db().path()).map(|m| m.len()).unwrap_or(0);
    Ok(Json(json!({
        "sessions": sessions,
        "unpinnedSessions": unpinned,
        "pinnedSessions": sessions - unpinned,
        "dbSizeBytes": db_bytes,
        "lastCleanupAt": settings.last_cleanup_at,
    })))
}

async fn get_retention_settings(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let settings = state.ctx.store.settings().get()?;
    Ok(Json(serde_json::to_value(settings).expect("ServerSettings serializes")))
}

#[derive(Deserialize, Default)]
struct RetentionSettingsBody {
    #[serde(rename = "retentionDays")]
    retention_days: Option<i64>,
    #[serde(rename = "maxDbMb")]
    max_db_mb: Option<i64>,
    #[serde(rename = "maxSessions")]
    max_sessions: Option<i64>,
    #[serde(rename = "cleanupIntervalMinutes")]
    cleanup_interval_minutes: Option<i64>,
    #[serde(rename = "exportPathOverride")]
    export_path_override: Option<Option<String>>,
}

async fn post_retention_settings(
    State(state): State<AppState>,
    body: Option<Json<RetentionSettingsBody>>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let patch = SettingsPatch {
        retention_days: body.retention_days,
        max_db_mb: body.max_db_mb,
        max_sessions: body.max_sessions,
        cleanup_interval_minutes: body.cleanup_interval_minutes,
        export_path_override: body.export_path_override,
    };
    let updated = state.ctx.store.settings().update(patch)?;
    Ok(Json(serde_json::to_value(updated).expect("ServerSettings serializes")))
}

async fn run_cleanup(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AdminError> {
    let engine = RetentionEngine::new(state.ctx.store.clone());
    let report = engine.run_pass(crate::dispatch::now_ms())?;
    Ok(Json(serde_json::to_value(report).expect("RetentionReport serializes")))
}

#[derive(Deserialize)]
struct ListSessionsQuery {
    #[serde(rename = "sinceMinutes")]
    since_minutes: Option<i64>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(q): Query<ListSessionsQuery>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let sessions = state.ctx.store.sessions().list_recent(
        q.since_minutes,
        q.limit.unwrap_or(100),
        q.offset.unwrap_or(0),
        crate::dispatch::now_ms(),
    )?;
    Ok(Json(json!({ "sessions": sessions })))
}

#[derive(Deserialize, Default)]
struct PinBody {
    pinned: Option<bool>,
}

async fn pin_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    body: Option<Json<PinBody>>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let pinned = body.and_then(|Json(b)| b.pinned).unwrap_or(true);
    let sessions = state.ctx.store.sessions();
    if !sessions.exists(&id)? {
        return Err(AdminError {
            status: StatusCode::NOT_FOUND,
            error: format!("session {id} not found"),
            code: loupe_core::errors::kind::SESSION_NOT_FOUND,
        });
    }
    sessions.set_pinned(&id, pinned)?;
    Ok(Json(json!({ "id": id.to_string(), "pinned": pinned })))
}

#[derive(Deserialize, Default)]
struct ExportQuery {
    format: Option<String>,
    #[serde(rename = "includePngBase64")]
    include_png_base64: Option<bool>,
}

async fn export_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    Query(q): Query<ExportQuery>,
) -> Result<Response, AdminError> {
    if q.format.as_deref() == Some("zip") {
        let bytes = export_zip(&state.ctx.store, &id)?;
        return Ok((
            StatusCode::OK,
            [("content-type", "application/zip")],
            bytes,
        )
            .into_response());
    }
    let manifest = export_json(&state.ctx.store, &id, q.include_png_base64.unwrap_or(false))?;
    Ok(Json(manifest).into_response())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportBody {
    Zip { #[serde(rename = "zipBase64")] zip_base64: String },
    Manifest(serde_json::Value),
}

async fn import_session_handler(
    State(state): State<AppState>,
    Json(body): Json<ImportBody>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let payload = match body {
        ImportBody::Zip { zip_base64 } => ImportPayload::ZipBase64(zip_base64),
        ImportBody::Manifest(value) => ImportPayload::Json(value),
    };
    let id = import_session(&state.ctx.store, payload, crate::dispatch::now_ms())?;
    Ok(Json(json!({ "id": id.to_string() })))
}

#[derive(Deserialize, Default)]
struct PageQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn session_entries(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    Query(q): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let filter = loupe_store::events::EventFilter { session_id: Some(id), ..Default::default() };
    let events = state.ctx.store.events().list(&filter, q.limit.unwrap_or(100), q.offset.unwrap_or(0))?;
    Ok(Json(json!({ "events": events })))
}

async fn session_snapshots(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    Query(q): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let snapshots = state
        .ctx
        .store
        .snapshots()
        .list_for_session(&id, q.limit.unwrap_or(100), q.offset.unwrap_or(0))?;
    Ok(Json(json!({ "snapshots": snapshots })))
}

/// `POST /db/reset`: operator-invoked wipe, not something retention does on
/// its own.
async fn reset_db(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AdminError> {
    state.ctx.store.reset()?;
    Ok(Json(json!({ "reset": true })))
}
