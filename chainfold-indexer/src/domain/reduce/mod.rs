//! Reduction framework
//!
//! An entity is the fold of its ordered event history. Each event is routed
//! to exactly one stage (lazy, pending or forward) and each entity kind
//! supplies one pure reducer function per stage. Reverts are handled by
//! recomputing from the history that remains once reverted logs are
//! filtered out, never by patching an entity in place.

pub mod chain;
pub mod policy;

use chainfold_types::{ChainPosition, LogId, LogMeta, LogStatus};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;

use crate::core::{EntityKind, ReduceError};

pub use chain::{ChainReducer, EntityChainReducer, ReduceSettings, Reduction, RevertedChainReducer};
pub use policy::{ApplyPolicy, StagePolicies};

/// Pipeline stage an event is reduced by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Lazy,
    Pending,
    Forward,
    Inactive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Lazy => write!(f, "lazy"),
            Stage::Pending => write!(f, "pending"),
            Stage::Forward => write!(f, "forward"),
            Stage::Inactive => write!(f, "inactive"),
        }
    }
}

/// Chain-order key of the last applied pending log
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PendingMark {
    pub at: DateTime<Utc>,
    pub position: ChainPosition,
    pub id: LogId,
}

impl PendingMark {
    pub fn of(log: &LogMeta) -> Self {
        Self {
            at: log.event_time(),
            position: log.position(),
            id: log.id.clone(),
        }
    }
}

/// Per-stage idempotence markers stored on every entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermarks {
    pub last_lazy_at: Option<DateTime<Utc>>,
    pub last_pending: Option<PendingMark>,
    pub last_confirmed: Option<ChainPosition>,
    pub last_confirmed_at: Option<DateTime<Utc>>,
    /// Most recently applied confirmed logs, oldest first
    pub revertable: VecDeque<LogId>,
}

impl Watermarks {
    pub fn is_reflected(&self, id: &LogId) -> bool {
        self.revertable.iter().any(|r| r == id)
    }
}

/// Payload of a domain event, one sealed enum per entity kind
pub trait EventBody: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Lazy payloads are reduced by the lazy stage regardless of log status
    fn is_lazy(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Typed event targeting one entity, carrying the log it came from
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent<I, B> {
    pub entity_id: I,
    pub log: LogMeta,
    pub body: B,
}

impl<I, B: EventBody> DomainEvent<I, B> {
    pub fn new(entity_id: I, log: LogMeta, body: B) -> Self {
        Self {
            entity_id,
            log,
            body,
        }
    }

    pub fn stage(&self) -> Stage {
        if self.body.is_lazy() {
            return Stage::Lazy;
        }
        match self.log.status {
            LogStatus::Pending => Stage::Pending,
            LogStatus::Confirmed => Stage::Forward,
            LogStatus::Reverted | LogStatus::Dropped | LogStatus::Inactive => Stage::Inactive,
        }
    }

    /// Time compared against lazy and pending watermarks
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.log.event_time()
    }
}

pub type EntityEvent<E> = DomainEvent<<E as Entity>::Id, <E as Entity>::Body>;

/// Pure stage reducer
pub type StageReducer<E> = fn(E, &EntityEvent<E>) -> Result<E, ReduceError>;

/// One reducer per stage for an entity kind
pub struct ReducerTable<E: Entity> {
    pub lazy: StageReducer<E>,
    pub pending: StageReducer<E>,
    pub forward: StageReducer<E>,
}

impl<E: Entity> ReducerTable<E> {
    /// Dispatch to the reducer for `stage`.
    ///
    /// Reverted logs are never reduced directly, so the inactive stage always
    /// rejects.
    pub fn reduce(&self, stage: Stage, entity: E, event: &EntityEvent<E>) -> Result<E, ReduceError> {
        if &event.entity_id != entity.id() {
            return Err(ReduceError::EntityMismatch {
                entity: entity.id().to_string(),
                event_entity: event.entity_id.to_string(),
            });
        }
        match stage {
            Stage::Lazy => (self.lazy)(entity, event),
            Stage::Pending => (self.pending)(entity, event),
            Stage::Forward => (self.forward)(entity, event),
            Stage::Inactive => Err(invalid_event(stage, &event.body)),
        }
    }
}

/// Materialized entity folded from its event history
pub trait Entity:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Id: Clone
        + Eq
        + Ord
        + Hash
        + fmt::Display
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;
    type Body: EventBody;

    const KIND: EntityKind;

    /// State before any event has been applied
    fn empty(id: Self::Id) -> Self;

    fn id(&self) -> &Self::Id;

    fn version(&self) -> Option<u64>;

    fn set_version(&mut self, version: Option<u64>);

    fn watermarks(&self) -> &Watermarks;

    fn watermarks_mut(&mut self) -> &mut Watermarks;

    /// Tombstone marker; deleted entities are kept, never removed
    fn is_deleted(&self) -> bool;

    fn reducers() -> ReducerTable<Self>;

    /// Storage key for the entity
    fn key(&self) -> String {
        self.id().to_string()
    }
}

/// Equal apart from the persisted version and the watermarks.
///
/// Watermarks are rebuilt by every fold and never reach consumers, so a
/// difference in them alone is not a change.
pub fn same_state<E: Entity>(a: &E, b: &E) -> bool {
    if a.version() == b.version() && a.watermarks() == b.watermarks() {
        return a == b;
    }
    let mut b = b.clone();
    b.set_version(a.version());
    *b.watermarks_mut() = a.watermarks().clone();
    *a == b
}

pub fn invalid_event<B: EventBody>(stage: Stage, body: &B) -> ReduceError {
    ReduceError::InvalidEventForReducer {
        stage: stage.to_string(),
        event: body.name().to_string(),
    }
}

/// Lazy reducer for kinds without off-chain events
pub fn reject_lazy<E: Entity>(_entity: E, event: &EntityEvent<E>) -> Result<E, ReduceError> {
    Err(invalid_event(Stage::Lazy, &event.body))
}
