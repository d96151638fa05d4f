//! Error kinds shared by the gateways, the engines and the lifecycle controller.
//!
//! Retry decisions are made on the error *kind*, never by catching everything:
//! [`EtlError::is_retryable`] is the single place that decides whether an
//! extract or load attempt is worth repeating.

use thiserror::Error;

use crate::etl::result::JobResult;

/// Failures raised by a warehouse gateway.
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// Connection, I/O or statement failure reported by the database driver.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A table or column name that is not a plain SQL identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Rows passed to a single write do not share the same columns.
    #[error("rows for {table} have inconsistent columns")]
    InconsistentColumns { table: String },

    /// A fetched row could not be mapped to the expected record type.
    #[error("row mapping failed for column {column}: {reason}")]
    Mapping { column: String, reason: String },
}

impl WarehouseError {
    pub fn mapping(column: &str, reason: impl Into<String>) -> Self {
        Self::Mapping {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    /// Driver-level failures may succeed on a later attempt; malformed
    /// statements and mapping problems never will.
    pub fn is_transient(&self) -> bool {
        match self {
            WarehouseError::Database(err) => !matches!(
                err,
                sqlx::Error::ColumnNotFound(_)
                    | sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::TypeNotFound { .. }
                    | sqlx::Error::Migrate(_)
            ),
            _ => false,
        }
    }
}

/// Failures raised by the financial data API gateway.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected payload: {0}")]
    Payload(String),

    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),

    #[error("FMP_API_KEY is not set")]
    MissingApiKey,
}

impl ApiError {
    /// Rate limiting and server-side failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::Payload(_) | ApiError::Url(_) | ApiError::MissingApiKey => false,
        }
    }
}

/// A per-record numeric derivation failure. Always counted, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalculationError {
    #[error("non-finite value in {field}")]
    NonFinite { field: &'static str },

    #[error("record has no warehouse key")]
    MissingKey,

    #[error("{0}")]
    Invalid(String),
}

/// Closed set of error kinds the lifecycle controller understands.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Network or API hiccup while extracting; retried.
    #[error("transient extraction error: {0}")]
    Transient(String),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// Anything the pipeline cannot recover from by trying again.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl EtlError {
    pub fn is_retryable(&self) -> bool {
        match self {
            EtlError::Transient(_) => true,
            EtlError::Warehouse(err) => err.is_transient(),
            EtlError::Api(err) => err.is_transient(),
            EtlError::Fatal(_) => false,
        }
    }
}

/// Error returned by `Pipeline::run` when extract or load exhausts its
/// retries. Carries the finalized `failed` result so callers can still
/// report counts and errors.
#[derive(Error, Debug)]
#[error("pipeline {} failed: {source}", result.job_name)]
pub struct RunError {
    pub result: Box<JobResult>,
    #[source]
    pub source: EtlError,
}
