pub mod database;
pub mod error;
pub mod events;
pub mod fingerprints;
pub mod network;
pub mod row_helpers;
pub mod schema;
pub mod sessions;
pub mod settings;
pub mod snapshots;
pub mod store;

pub use database::Database;
pub use error::StoreError;
pub use store::{InboundEvent, Store};
