pub mod errors;
pub mod ids;
pub mod kinds;
pub mod origin;
pub mod wire;
