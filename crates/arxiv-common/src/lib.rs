//! arXiv ETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the arXiv metadata ETL.
//!
//! # Overview
//!
//! - **Error Handling**: the [`EtlError`] taxonomy and [`EtlResult`] alias
//! - **Types**: normalized relational rows and the staged batch formats
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use arxiv_common::{EtlError, EtlResult};
//!
//! fn require_bucket(bucket: Option<String>) -> EtlResult<String> {
//!     bucket.ok_or_else(|| EtlError::Config("S3_BUCKET is not set".to_string()))
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{EtlError, EtlResult};
