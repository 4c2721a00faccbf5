pub mod catalogue;
pub mod context;
pub mod envelope;
pub mod error;
pub mod pagination;
pub mod validate;

pub mod handlers;
pub mod runner;
pub mod transport;

pub use catalogue::{catalogue, ToolDefinition};
pub use context::ToolContext;
pub use error::ToolsError;
pub use runner::call_tool;
pub use transport::serve_stdio;
