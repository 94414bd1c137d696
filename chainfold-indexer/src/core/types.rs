//! Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of materialized entity, used to namespace storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Item,
    Ownership,
    Token,
    Balance,
    Order,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Ownership => "ownership",
            EntityKind::Token => "token",
            EntityKind::Balance => "balance",
            EntityKind::Order => "order",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Update type for tracking changes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UpdateType {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateType::Created => write!(f, "created"),
            UpdateType::Updated => write!(f, "updated"),
            UpdateType::Deleted => write!(f, "deleted"),
        }
    }
}

/// Change notification emitted after an entity revision is persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityChange<E> {
    pub event_id: Uuid,
    pub entity: E,
    pub update_type: UpdateType,
    pub previous_version: Option<u64>,
    pub emitted_at: DateTime<Utc>,
}

impl<E> EntityChange<E> {
    pub fn new(entity: E, update_type: UpdateType, previous_version: Option<u64>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            entity,
            update_type,
            previous_version,
            emitted_at: Utc::now(),
        }
    }
}

/// Outcome of one `on_events` call for a single entity kind
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    /// Entity keys whose new revision was saved and published
    pub updated: Vec<String>,
    /// Entity keys whose recomputed state matched the stored revision
    pub unchanged: Vec<String>,
    /// Entity keys whose reduction failed, with the error message
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.updated.len() + self.unchanged.len() + self.failed.len()
    }
}
