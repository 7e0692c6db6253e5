//! # classhub-core
//!
//! Core crate for the ClassHub notification pipeline. Contains the
//! configuration schemas, the unified error system, the shared identity
//! types and the keyed task scheduler used by the transport and the store.
//!
//! This crate has **no** internal dependencies on other ClassHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod scheduler;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
pub use scheduler::TaskScheduler;
