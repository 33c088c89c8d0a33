//! voidx-core
//!
//! Types shared by every voidx crate: the error taxonomy, the `Embedder`
//! capability, the ingest progress reporter, cancellation plumbing and the
//! layered configuration loader.

pub mod cancel;
pub mod config;
pub mod error;
pub mod progress;
pub mod traits;
pub mod types;

pub use error::{Error, IndexAborted, Result};
