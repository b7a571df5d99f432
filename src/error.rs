//! Error types for the annotation client.
//!
//! Service-side failures (`ServiceError`) are absorbed per document and
//! recorded as a failure entry; state-store failures (`StoreError`) abort
//! the run, since progress tracking is meaningless without durability.

use thiserror::Error;

/// Failure of a single annotation call against the remote service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The service answered 503; retryable with backoff.
    #[error("service overloaded (503)")]
    Overloaded,

    #[error("annotation endpoint not found (404)")]
    EndpointNotFound,

    #[error("bad request ({status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("server error ({0})")]
    Server(u16),

    #[error("unexpected response status {0}")]
    UnexpectedStatus(u16),

    /// The per-call timeout elapsed. Distinct from the overload path: a
    /// timed-out call is not retried.
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// A 200 response whose body is not the expected annotation JSON.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The input document could not be read for upload.
    #[error("input unreadable: {0}")]
    Input(#[from] std::io::Error),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Overloaded)
    }
}

/// Failure of the embedded processing-state store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state store unavailable: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("state store transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("state store table failed: {0}")]
    Table(#[from] redb::TableError),

    #[error("state store access failed: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("state store commit failed: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("state store io failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level client error.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("candidate enumeration failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("unreadable input: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid metadata record for {id}: {reason}")]
    BadRecord { id: String, reason: String },

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document database error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("annotation could not be encoded for storage: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),
}
