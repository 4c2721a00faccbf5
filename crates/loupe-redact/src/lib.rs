pub mod patterns;
pub mod redactor;

pub use redactor::Redactor;
