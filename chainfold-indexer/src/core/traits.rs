//! Core trait abstractions (Ports in Hexagonal Architecture)

use async_trait::async_trait;

use super::error::{DecodeError, IndexerResult};
use super::types::{EntityChange, EntityKind};
use crate::domain::log::EventLog;
use crate::domain::reduce::{Entity, EntityEvent};

/// History port - append-only log storage keyed by entity
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// All logs recorded for an entity, in chain order
    async fn find_by_entity(&self, kind: EntityKind, key: &str) -> IndexerResult<Vec<EventLog>>;

    /// Record a log for an entity, replacing any earlier copy with the same log id
    async fn save(&self, kind: EntityKind, key: &str, log: &EventLog) -> IndexerResult<()>;
}

/// Entity port - versioned snapshot storage
#[async_trait]
pub trait EntityRepository<E: Entity>: Send + Sync {
    /// Get the latest revision of an entity
    async fn find_by_id(&self, id: &E::Id) -> IndexerResult<Option<E>>;

    /// Store a new revision.
    ///
    /// `expected_version` must match the stored version (`None` for a new
    /// entity), otherwise `IndexerError::VersionConflict` is returned. The
    /// returned entity carries the new version.
    async fn save(&self, entity: E, expected_version: Option<u64>) -> IndexerResult<E>;
}

/// Outbox port - highest entity version the publisher has acknowledged.
///
/// A stored revision above this mark was saved but never delivered and is
/// published again on the next reduction of the entity.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn published_version(&self, kind: EntityKind, key: &str) -> IndexerResult<Option<u64>>;

    async fn mark_published(&self, kind: EntityKind, key: &str, version: u64) -> IndexerResult<()>;
}

/// Publisher port - outgoing change notifications
#[async_trait]
pub trait EventPublisher<E: Entity>: Send + Sync {
    async fn publish(&self, change: EntityChange<E>) -> IndexerResult<()>;
}

/// Converter trait - maps one log to the domain events of an entity kind.
///
/// Pure and deterministic. A log may yield no events, or events for several
/// entities, but at most one event per entity.
pub trait EventConverter<E: Entity>: Send + Sync {
    fn convert(&self, log: &EventLog) -> Result<Vec<EntityEvent<E>>, DecodeError>;
}
