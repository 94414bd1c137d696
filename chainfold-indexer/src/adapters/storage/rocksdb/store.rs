//! History and entity repositories backed by RocksDB

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::client::{ColumnFamilies, RocksDBClient};
use crate::core::{EntityKind, EntityRepository, HistoryRepository, IndexerError, IndexerResult, OutboxRepository};
use crate::domain::log::{sort_history, EventLog};
use crate::domain::reduce::Entity;

/// Persistent store shared by every entity kind
#[derive(Clone)]
pub struct RocksDbStore {
    client: Arc<RocksDBClient>,
    // Serializes version check and write of entity snapshots
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    pub fn new(client: Arc<RocksDBClient>) -> Self {
        Self {
            client,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn history_prefix(kind: EntityKind, key: &str) -> String {
        format!("{}/{}/", kind.as_str(), key)
    }

    fn outbox_key(kind: EntityKind, key: &str) -> String {
        format!("{}/{}", kind.as_str(), key)
    }
}

#[async_trait]
impl HistoryRepository for RocksDbStore {
    async fn find_by_entity(&self, kind: EntityKind, key: &str) -> IndexerResult<Vec<EventLog>> {
        let prefix = Self::history_prefix(kind, key);
        let mut history: Vec<EventLog> = self
            .client
            .scan_prefix(ColumnFamilies::HISTORY, prefix.as_bytes())?;
        sort_history(&mut history);
        Ok(history)
    }

    async fn save(&self, kind: EntityKind, key: &str, log: &EventLog) -> IndexerResult<()> {
        let storage_key = format!("{}{}", Self::history_prefix(kind, key), log.meta.id);
        self.client
            .put(ColumnFamilies::HISTORY, storage_key.as_bytes(), log)?;
        debug!(kind = %kind, entity = key, log_id = %log.meta.id, "Stored history log");
        Ok(())
    }
}

#[async_trait]
impl<E: Entity> EntityRepository<E> for RocksDbStore {
    async fn find_by_id(&self, id: &E::Id) -> IndexerResult<Option<E>> {
        self.client
            .get(ColumnFamilies::for_kind(E::KIND), id.to_string().as_bytes())
    }

    async fn save(&self, mut entity: E, expected_version: Option<u64>) -> IndexerResult<E> {
        let cf = ColumnFamilies::for_kind(E::KIND);
        let key = entity.key();

        let _guard = self.write_lock.lock().await;
        let stored: Option<E> = self.client.get(cf, key.as_bytes())?;
        let actual = stored.and_then(|stored| stored.version());
        if actual != expected_version {
            return Err(IndexerError::VersionConflict {
                entity_id: key,
                expected: expected_version,
                actual,
            });
        }

        entity.set_version(Some(expected_version.map_or(1, |v| v + 1)));
        self.client.put(cf, key.as_bytes(), &entity)?;
        debug!(kind = %E::KIND, entity = %key, version = ?entity.version(), "Stored entity revision");
        Ok(entity)
    }
}

#[async_trait]
impl OutboxRepository for RocksDbStore {
    async fn published_version(&self, kind: EntityKind, key: &str) -> IndexerResult<Option<u64>> {
        self.client
            .get(ColumnFamilies::OUTBOX, Self::outbox_key(kind, key).as_bytes())
    }

    async fn mark_published(&self, kind: EntityKind, key: &str, version: u64) -> IndexerResult<()> {
        let storage_key = Self::outbox_key(kind, key);

        let _guard = self.write_lock.lock().await;
        let stored: Option<u64> = self.client.get(ColumnFamilies::OUTBOX, storage_key.as_bytes())?;
        if stored.map_or(true, |stored| version > stored) {
            self.client
                .put(ColumnFamilies::OUTBOX, storage_key.as_bytes(), &version)?;
        }
        Ok(())
    }
}
