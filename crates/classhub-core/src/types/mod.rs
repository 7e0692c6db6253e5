//! Shared domain types.

pub mod diagnostic;
pub mod identity;

pub use diagnostic::{Diagnostic, DiagnosticLevel};
pub use identity::{Credentials, UserRole};
