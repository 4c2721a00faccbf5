pub mod connection;
pub mod console;
pub mod pending;
pub mod registry;

pub use connection::SessionConnectionState;
pub use console::{LiveConsoleBuffer, LiveConsoleEntry, LiveConsoleFilter};
pub use pending::PendingCaptureRequest;
pub use registry::SessionRegistry;
