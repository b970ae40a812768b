use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The provider payload is missing a correlation key or cannot be decoded.
    #[error("Malformed event: {0}")]
    Malformed(String),
    /// A checkout referenced an order that does not exist (yet).
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    /// The order exists but has not been stamped with this checkout session (yet).
    #[error("Checkout session does not match order: {0}")]
    SessionMismatch(String),
    /// The store could not be reached or timed out.
    #[error("Transient store error: {0}")]
    Transient(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl ReconcileError {
    /// Whether the provider should redeliver the event that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Malformed(_) | ReconcileError::ValidationError(_) => false,
            ReconcileError::Serialization(_) | ReconcileError::CsvError(_) => false,
            ReconcileError::OrderNotFound(_) | ReconcileError::SessionMismatch(_) => true,
            ReconcileError::Transient(_) => true,
            ReconcileError::IoError(_) | ReconcileError::InternalError(_) => true,
            #[cfg(feature = "storage-rocksdb")]
            ReconcileError::StorageError(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
