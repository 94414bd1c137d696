//! Centralized error types for the chainfold indexer

use thiserror::Error;

/// Main indexer error type
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Reduce error: {0}")]
    Reduce(#[from] ReduceError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Version conflict for {entity_id}: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        entity_id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("Gave up on {entity_id} after {attempts} conflicting saves")]
    RetryableConflict { entity_id: String, attempts: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IndexerError {
    /// Errors the caller may resolve by submitting the same batch again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IndexerError::RetryableConflict { .. } | IndexerError::VersionConflict { .. }
        )
    }
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDB(String),

    #[error("Column family not found: {0}")]
    MissingColumnFamily(String),

    #[error("Publisher closed: {0}")]
    PublisherClosed(String),
}

/// Reducer pipeline errors.
///
/// These indicate wiring bugs, not bad data: the reduction for the affected
/// entity is aborted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("Event {event} cannot be handled by the {stage} reducer")]
    InvalidEventForReducer { stage: String, event: String },

    #[error("Event for {event_entity} routed to entity {entity}")]
    EntityMismatch { entity: String, event_entity: String },
}

/// Log decoding errors, recovered by skipping the offending log
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Log has no topics")]
    MissingTopics,

    #[error("ABI mismatch for {event}: {reason}")]
    AbiMismatch { event: String, reason: String },

    #[error("Invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },

    #[error("Log {log_id} is not mined but claims status {status}")]
    InconsistentMeta { log_id: String, status: String },
}

/// Result type alias for indexer operations
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Helper to convert rocksdb errors
#[cfg(feature = "rocksdb-storage")]
impl From<rocksdb::Error> for IndexerError {
    fn from(err: rocksdb::Error) -> Self {
        IndexerError::Storage(StorageError::RocksDB(err.to_string()))
    }
}

/// Helper to convert serialization errors
impl From<bincode::Error> for IndexerError {
    fn from(err: bincode::Error) -> Self {
        IndexerError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(err: serde_json::Error) -> Self {
        IndexerError::Serialization(err.to_string())
    }
}

impl From<chainfold_types::TypesError> for DecodeError {
    fn from(err: chainfold_types::TypesError) -> Self {
        DecodeError::InvalidPayload {
            event: "creators".to_string(),
            reason: err.to_string(),
        }
    }
}
