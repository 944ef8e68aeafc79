//! Error taxonomy for the resource persistence core.
//!
//! All fallible operations in this crate return [`StoreResult<T>`]. The
//! variants mirror the kinds enumerated in the design: callers translate
//! them into ARM-facing HTTP status codes one layer up, so each variant
//! carries enough structure to do that without string matching.
use thiserror::Error;

/// The error type for every resource-store operation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A point read or get-by-resource-id found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// get-by-resource-id found two or more live documents for the same
    /// resource ID. Surfaced, never auto-repaired.
    #[error("ambiguous result: {count} documents match resource id '{resource_id}'")]
    AmbiguousResult { resource_id: String, count: usize },

    /// The envelope's `resourceType` disagrees with the type the caller
    /// asked to decode.
    #[error("invalid type: envelope declares '{found}', expected '{expected}'")]
    InvalidType { expected: String, found: String },

    /// A transaction step's item partition key does not match the
    /// transaction's partition key.
    #[error("wrong partition: step targets partition '{step}', transaction is on '{transaction}'")]
    WrongPartition { transaction: String, step: String },

    /// A transaction-result getter was asked for a cosmos ID absent from
    /// the result map.
    #[error("item not found in transaction result: {0}")]
    ItemNotFound(String),

    /// An etag precondition was not met.
    #[error("precondition failed for '{0}'")]
    PreconditionFailed(String),

    /// The resource identifier string could not be parsed.
    #[error("invalid resource id '{0}': {reason}")]
    InvalidResourceId { reason: String, id: String },

    /// Serialization/deserialization failure at the codec boundary.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Every other upstream failure, wrapped verbatim with a descriptive
    /// prefix and (when known) the HTTP status the store returned.
    #[error("transport error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Transport {
        message: String,
        status: Option<u16>,
    },
}

impl StoreError {
    /// Best-effort HTTP status code this error would present to an ARM
    /// caller. Used by upper layers; the store itself never inspects this.
    pub fn http_status(&self) -> u16 {
        match self {
            StoreError::NotFound(_) => 404,
            StoreError::AmbiguousResult { .. } => 409,
            StoreError::InvalidType { .. } => 400,
            StoreError::WrongPartition { .. } => 400,
            StoreError::ItemNotFound(_) => 500,
            StoreError::PreconditionFailed(_) => 412,
            StoreError::InvalidResourceId { .. } => 400,
            StoreError::Serialization(_) => 400,
            StoreError::Transport { status, .. } => status.unwrap_or(500),
        }
    }

    pub fn transport(message: impl Into<String>, status: Option<u16>) -> Self {
        StoreError::Transport {
            message: message.into(),
            status,
        }
    }

    /// True for a transport error carrying the given HTTP status, the
    /// shape the CRUD kernel checks for 404/409/412 handling.
    pub fn is_status(&self, status: u16) -> bool {
        matches!(self, StoreError::Transport { status: Some(s), .. } if *s == status)
    }
}

/// Result alias used throughout the crate.
pub type StoreResult<T> = Result<T, StoreError>;
