//! # AudioLevel Common Library
//!
//! Shared code between the `audiolevel-core` binary and its tests:
//! - Common error type
//! - Environment-variable configuration helpers
//! - Opaque job identifiers
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod jobid;
pub mod time;

pub use error::{Error, Result};
pub use jobid::JobId;
