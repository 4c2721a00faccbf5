pub mod admin;
pub mod capture;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod server;

pub use capture::send_capture;
pub use connection::{ConnectionHandle, ConnectionRegistry, ConnectionState};
pub use dispatch::{dispatch_frame, now_ms, IngestContext};
pub use error::IngestError;
pub use server::{start, AppState, ServerConfig, ServerHandle};
