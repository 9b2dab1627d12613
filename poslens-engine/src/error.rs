//! Error types for poslens-engine
//!
//! Defines the engine error taxonomy using thiserror for clear error
//! propagation. Queries fail fast with a typed error so callers can
//! distinguish "no data in range" (valid empty result) from "query
//! failed".

use thiserror::Error;

/// Main error type for the analytics engine
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request parameter (bad date range, unknown tenant)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Query or refresh exceeded its time budget
    #[error("Operation exceeded time budget of {budget_ms} ms")]
    Timeout { budget_ms: u64 },

    /// Aggregation could not be computed (logged, usually recovered)
    #[error("Compute error: {0}")]
    Compute(String),

    /// Derived-table write partially applied
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// A builder failed; the failing table's delete+insert was rolled
    /// back, leaving the prior generation intact
    #[error("Refresh failed for table {table}: {source}")]
    Refresh {
        table: String,
        #[source]
        source: Box<Error>,
    },

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from the common layer
    #[error(transparent)]
    Common(#[from] poslens_common::Error),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
