//! Core framework-level components
//!
//! - `error`: the crate-wide error type with stable error codes

pub mod error;

pub use error::{Result, TtsError};
