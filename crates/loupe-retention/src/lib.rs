pub mod engine;
pub mod error;
pub mod export;
pub mod import;

pub use engine::{RetentionEngine, RetentionReport};
pub use error::RetentionError;
pub use export::{export_json, export_zip, ExportManifest};
pub use import::{import_session, ImportPayload};
