//! In-memory storage backend

use async_trait::async_trait;
use chainfold_types::LogId;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::{EntityKind, EntityRepository, HistoryRepository, IndexerError, IndexerResult, OutboxRepository};
use crate::domain::log::{sort_history, EventLog};
use crate::domain::reduce::Entity;

/// Event history held in process memory
#[derive(Default)]
pub struct MemoryHistoryRepository {
    logs: RwLock<HashMap<(EntityKind, String), BTreeMap<LogId, EventLog>>>,
}

impl MemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryRepository for MemoryHistoryRepository {
    async fn find_by_entity(&self, kind: EntityKind, key: &str) -> IndexerResult<Vec<EventLog>> {
        let logs = self.logs.read().await;
        let mut history: Vec<EventLog> = logs
            .get(&(kind, key.to_string()))
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default();
        sort_history(&mut history);
        Ok(history)
    }

    async fn save(&self, kind: EntityKind, key: &str, log: &EventLog) -> IndexerResult<()> {
        let mut logs = self.logs.write().await;
        logs.entry((kind, key.to_string()))
            .or_default()
            .insert(log.meta.id.clone(), log.clone());
        debug!(kind = %kind, entity = key, log_id = %log.meta.id, status = %log.meta.status, "Saved history log");
        Ok(())
    }
}

/// Entity snapshots held in process memory
pub struct MemoryEntityRepository<E: Entity> {
    entities: RwLock<HashMap<E::Id, E>>,
}

impl<E: Entity> MemoryEntityRepository<E> {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

impl<E: Entity> Default for MemoryEntityRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> EntityRepository<E> for MemoryEntityRepository<E> {
    async fn find_by_id(&self, id: &E::Id) -> IndexerResult<Option<E>> {
        Ok(self.entities.read().await.get(id).cloned())
    }

    async fn save(&self, mut entity: E, expected_version: Option<u64>) -> IndexerResult<E> {
        let mut entities = self.entities.write().await;
        let actual = entities.get(entity.id()).and_then(|stored| stored.version());
        if actual != expected_version {
            return Err(IndexerError::VersionConflict {
                entity_id: entity.key(),
                expected: expected_version,
                actual,
            });
        }
        entity.set_version(Some(expected_version.map_or(1, |v| v + 1)));
        entities.insert(entity.id().clone(), entity.clone());
        Ok(entity)
    }
}

/// Publish acknowledgements held in process memory
#[derive(Default)]
pub struct MemoryOutboxRepository {
    published: RwLock<HashMap<(EntityKind, String), u64>>,
}

impl MemoryOutboxRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxRepository for MemoryOutboxRepository {
    async fn published_version(&self, kind: EntityKind, key: &str) -> IndexerResult<Option<u64>> {
        Ok(self.published.read().await.get(&(kind, key.to_string())).copied())
    }

    async fn mark_published(&self, kind: EntityKind, key: &str, version: u64) -> IndexerResult<()> {
        let mut published = self.published.write().await;
        let mark = published.entry((kind, key.to_string())).or_insert(version);
        *mark = (*mark).max(version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{BalanceId, Erc20Balance};
    use crate::domain::log::LogData;
    use alloy_primitives::{Address, B256, U256};
    use chainfold_types::{LogMeta, LogStatus};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_entity_versions_increment_and_conflict() -> anyhow::Result<()> {
        let repo = MemoryEntityRepository::<Erc20Balance>::new();
        let id = BalanceId::new(Address::repeat_byte(1), Address::repeat_byte(2));

        let saved = repo.save(Erc20Balance::empty(id), None).await?;
        assert_eq!(saved.version, Some(1));
        let saved = repo.save(saved.clone(), Some(1)).await?;
        assert_eq!(saved.version, Some(2));

        let stale = repo.save(Erc20Balance::empty(id), Some(1)).await;
        assert!(matches!(
            stale,
            Err(IndexerError::VersionConflict { expected: Some(1), actual: Some(2), .. })
        ));
        assert_eq!(repo.find_by_id(&id).await?.and_then(|b| b.version), Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_history_upserts_by_log_id() -> anyhow::Result<()> {
        let repo = MemoryHistoryRepository::new();
        let token = Address::repeat_byte(1);
        let log = EventLog::new(
            LogMeta::confirmed(
                token,
                B256::repeat_byte(1),
                B256::repeat_byte(2),
                (1, 0, 0),
                Utc.timestamp_opt(1, 0).unwrap(),
            ),
            LogData::Erc20Deposit {
                token,
                owner: Address::repeat_byte(2),
                value: U256::from(1),
            },
        );
        repo.save(EntityKind::Balance, "k", &log).await?;
        repo.save(EntityKind::Balance, "k", &log.clone().with_status(LogStatus::Reverted)).await?;

        let history = repo.find_by_entity(EntityKind::Balance, "k").await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].meta.status, LogStatus::Reverted);
        assert!(repo.find_by_entity(EntityKind::Item, "k").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_outbox_mark_never_moves_back() -> anyhow::Result<()> {
        let outbox = MemoryOutboxRepository::new();
        assert_eq!(outbox.published_version(EntityKind::Balance, "k").await?, None);

        outbox.mark_published(EntityKind::Balance, "k", 3).await?;
        outbox.mark_published(EntityKind::Balance, "k", 2).await?;
        assert_eq!(outbox.published_version(EntityKind::Balance, "k").await?, Some(3));
        assert_eq!(outbox.published_version(EntityKind::Item, "k").await?, None);
        Ok(())
    }
}
