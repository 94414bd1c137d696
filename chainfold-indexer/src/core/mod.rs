//! Core domain abstractions and types
//!
//! This module contains the foundational types, ports and error definitions
//! shared by the reduction engine, its storage adapters and services. It is
//! independent of any specific storage or transport.

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use error::{DecodeError, IndexerError, IndexerResult, ReduceError, StorageError};
pub use traits::{EntityRepository, EventConverter, EventPublisher, HistoryRepository, OutboxRepository};
pub use types::{BatchReport, EntityChange, EntityKind, UpdateType};
