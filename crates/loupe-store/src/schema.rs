/// Append-only, versioned migrations (spec.md §4.1). Each entry is applied,
/// in order, inside its own transaction on startup if its version exceeds
/// the database's recorded `schema_version`; a failing migration aborts the
/// process rather than leaving a half-applied schema.
pub const MIGRATIONS: &[(u32, &str)] = &[(1, MIGRATION_1)];

pub const SCHEMA_VERSION: u32 = 1;

pub const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
    PRAGMA synchronous = NORMAL;
";

const MIGRATION_1: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id                TEXT PRIMARY KEY,
    created_at        INTEGER NOT NULL,
    ended_at          INTEGER,
    initial_url       TEXT NOT NULL,
    latest_url        TEXT NOT NULL,
    tab_ids_json      TEXT NOT NULL DEFAULT '[]',
    window_id         INTEGER,
    user_agent        TEXT,
    viewport_width    INTEGER,
    viewport_height   INTEGER,
    dpr               REAL,
    safe_mode         INTEGER NOT NULL DEFAULT 0,
    pinned            INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at);
CREATE INDEX IF NOT EXISTS idx_sessions_pinned ON sessions(pinned);

CREATE TABLE IF NOT EXISTS events (
    id                TEXT PRIMARY KEY,
    session_id        TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    timestamp         INTEGER NOT NULL,
    kind              TEXT NOT NULL CHECK (kind IN ('console','error','network','nav','ui','element_ref')),
    wire_event_type   TEXT NOT NULL,
    tab_id            INTEGER,
    origin            TEXT,
    payload           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_session_ts ON events(session_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind);
CREATE INDEX IF NOT EXISTS idx_events_origin ON events(origin);

CREATE TABLE IF NOT EXISTS network_records (
    id                    TEXT PRIMARY KEY,
    session_id            TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    start_timestamp       INTEGER NOT NULL,
    duration_ms           INTEGER,
    method                TEXT NOT NULL,
    url                   TEXT NOT NULL,
    origin                TEXT,
    status                INTEGER,
    initiator             TEXT NOT NULL CHECK (initiator IN ('fetch','xhr','img','script','other')),
    error_class           TEXT CHECK (error_class IN ('timeout','cors','dns','blocked','http_error','unknown')),
    estimated_size_bytes  INTEGER
);
CREATE INDEX IF NOT EXISTS idx_network_session ON network_records(session_id);
CREATE INDEX IF NOT EXISTS idx_network_origin ON network_records(origin);

CREATE TABLE IF NOT EXISTS error_fingerprints (
    id              TEXT PRIMARY KEY,
    session_id      TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    count           INTEGER NOT NULL DEFAULT 1,
    sample_message  TEXT NOT NULL,
    sample_stack    TEXT NOT NULL,
    first_seen      INTEGER NOT NULL,
    last_seen       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_fingerprints_session ON error_fingerprints(session_id);

CREATE TABLE IF NOT EXISTS snapshots (
    id                TEXT PRIMARY KEY,
    session_id        TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    trigger_event_id  TEXT REFERENCES events(id) ON DELETE SET NULL,
    timestamp         INTEGER NOT NULL,
    trigger_kind      TEXT NOT NULL CHECK (trigger_kind IN ('click','manual','navigation','error')),
    selector          TEXT,
    url               TEXT,
    mode              TEXT NOT NULL CHECK (mode IN ('dom','png','both')),
    style_mode        TEXT NOT NULL CHECK (style_mode IN ('computed-lite','computed-full')),
    dom_json          TEXT,
    styles_json       TEXT,
    dom_truncated     INTEGER NOT NULL DEFAULT 0,
    styles_truncated  INTEGER NOT NULL DEFAULT 0,
    png_path          TEXT,
    png_mime          TEXT,
    png_bytes         INTEGER
);
CREATE INDEX IF NOT EXISTS idx_snapshots_session ON snapshots(session_id);
CREATE INDEX IF NOT EXISTS idx_snapshots_trigger_event ON snapshots(trigger_event_id);

CREATE TABLE IF NOT EXISTS server_settings (
    id                        INTEGER PRIMARY KEY CHECK (id = 1),
    retention_days            INTEGER NOT NULL DEFAULT 30,
    max_db_mb                 INTEGER NOT NULL DEFAULT 500,
    max_sessions              INTEGER NOT NULL DEFAULT 200,
    cleanup_interval_minutes  INTEGER NOT NULL DEFAULT 60,
    last_cleanup_at           INTEGER,
    export_path_override      TEXT
);
";
