//! Reduce service: group logs by entity, recompute, persist, publish

use chainfold_types::LogStatus;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::locks::EntityLocks;
use crate::config::ReduceConfig;
use crate::core::{
    BatchReport, EntityChange, EntityRepository, EventConverter, EventPublisher, HistoryRepository, IndexerError,
    IndexerResult, OutboxRepository, UpdateType,
};
use crate::domain::log::EventLog;
use crate::domain::reduce::{same_state, ChainReducer, Entity, EntityChainReducer, ReduceSettings, RevertedChainReducer};

/// Tuning knobs for a reduce service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReduceServiceSettings {
    pub reduce: ReduceSettings,
    /// Entity ids reduced concurrently within one batch
    pub max_concurrent_reductions: usize,
    /// Extra fold-and-save attempts after a version conflict
    pub conflict_retries: u32,
}

impl Default for ReduceServiceSettings {
    fn default() -> Self {
        Self {
            reduce: ReduceSettings::default(),
            max_concurrent_reductions: 16,
            conflict_retries: 1,
        }
    }
}

impl From<&ReduceConfig> for ReduceServiceSettings {
    fn from(config: &ReduceConfig) -> Self {
        Self {
            reduce: ReduceSettings {
                max_revertable_events: config.max_revertable_events,
            },
            max_concurrent_reductions: config.max_concurrent_reductions,
            conflict_retries: config.conflict_retries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Updated,
    Unchanged,
}

/// Keeps one entity kind in sync with incoming logs.
///
/// Reductions of the same id are serialized through [`EntityLocks`]; distinct
/// ids in a batch run concurrently and fail independently. Every saved
/// revision is published at least once: a revision the outbox has not
/// acknowledged is published again the next time its entity is reduced.
pub struct ReduceService<E: Entity> {
    history: Arc<dyn HistoryRepository>,
    entities: Arc<dyn EntityRepository<E>>,
    converter: Arc<dyn EventConverter<E>>,
    publisher: Arc<dyn EventPublisher<E>>,
    outbox: Arc<dyn OutboxRepository>,
    forward: Arc<EntityChainReducer<E>>,
    reverted: RevertedChainReducer<E>,
    locks: EntityLocks,
    settings: ReduceServiceSettings,
}

impl<E: Entity> ReduceService<E> {
    pub fn new(
        history: Arc<dyn HistoryRepository>,
        entities: Arc<dyn EntityRepository<E>>,
        converter: Arc<dyn EventConverter<E>>,
        publisher: Arc<dyn EventPublisher<E>>,
        outbox: Arc<dyn OutboxRepository>,
        settings: ReduceServiceSettings,
    ) -> Self {
        let forward = Arc::new(EntityChainReducer::new(
            history.clone(),
            converter.clone(),
            settings.reduce,
        ));
        let reverted = RevertedChainReducer::new(forward.clone(), entities.clone());
        Self {
            history,
            entities,
            converter,
            publisher,
            outbox,
            forward,
            reverted,
            locks: EntityLocks::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ReduceServiceSettings {
        &self.settings
    }

    /// Reduce every entity touched by `logs`
    pub async fn on_events(&self, logs: Vec<EventLog>) -> BatchReport {
        let groups = self.group_by_entity(logs);
        if groups.is_empty() {
            return BatchReport::default();
        }
        debug!(kind = %E::KIND, entities = groups.len(), "Reducing batch");

        let results: Vec<(String, IndexerResult<Outcome>)> = stream::iter(groups)
            .map(|(id, logs)| async move {
                let key = id.to_string();
                let result = self.reduce_entity(id, logs).await;
                (key, result)
            })
            .buffer_unordered(self.settings.max_concurrent_reductions.max(1))
            .collect()
            .await;

        self.locks.prune().await;

        let mut report = BatchReport::default();
        for (key, result) in results {
            match result {
                Ok(Outcome::Updated) => report.updated.push(key),
                Ok(Outcome::Unchanged) => report.unchanged.push(key),
                Err(e) => {
                    match &e {
                        IndexerError::Reduce(_) => {
                            error!(kind = %E::KIND, entity = %key, "Stage routing failed: {}", e)
                        }
                        _ => error!(kind = %E::KIND, entity = %key, retryable = e.is_retryable(), "Reduction failed: {}", e),
                    }
                    report.failed.push((key, e.to_string()));
                }
            }
        }
        report.updated.sort();
        report.unchanged.sort();
        report.failed.sort();
        report
    }

    /// Logs per affected entity id, keeping batch order within each id
    fn group_by_entity(&self, logs: Vec<EventLog>) -> BTreeMap<E::Id, Vec<EventLog>> {
        let mut groups: BTreeMap<E::Id, Vec<EventLog>> = BTreeMap::new();
        for log in logs {
            let events = match self.converter.convert(&log) {
                Ok(events) => events,
                Err(e) => {
                    warn!(kind = %E::KIND, log_id = %log.meta.id, "Dropping undecodable log: {}", e);
                    continue;
                }
            };
            for event in events {
                let entry = groups.entry(event.entity_id).or_default();
                if !entry.iter().any(|seen| seen.meta.id == log.meta.id) {
                    entry.push(log.clone());
                }
            }
        }
        groups
    }

    async fn reduce_entity(&self, id: E::Id, logs: Vec<EventLog>) -> IndexerResult<Outcome> {
        let key = id.to_string();
        let _guard = self.locks.acquire(&key).await;

        for log in &logs {
            self.history.save(E::KIND, &key, log).await?;
        }

        let has_reverted = logs.iter().any(|log| log.meta.status == LogStatus::Reverted);
        let reducer: &dyn ChainReducer<E> = if has_reverted {
            &self.reverted
        } else {
            self.forward.as_ref()
        };

        let attempts = self.settings.conflict_retries + 1;
        for attempt in 1..=attempts {
            let prior = self.entities.find_by_id(&id).await?;
            let reduction = reducer.reduce(&id).await?;
            if !reduction.reverted.is_empty() {
                info!(kind = %E::KIND, entity = %key, reverted = reduction.reverted.len(), "Recomputed after revert");
            }

            let unchanged = match &prior {
                Some(prior) => same_state(&reduction.entity, prior),
                None => same_state(&reduction.entity, &E::empty(id.clone())),
            };
            if unchanged {
                return match prior {
                    Some(stored) => self.republish_unacknowledged(&key, stored).await,
                    None => {
                        debug!(kind = %E::KIND, entity = %key, "Entity unchanged, skipping publish");
                        Ok(Outcome::Unchanged)
                    }
                };
            }

            let previous_version = prior.as_ref().and_then(|prior| prior.version());
            match self.entities.save(reduction.entity, previous_version).await {
                Ok(saved) => {
                    let update_type = if saved.is_deleted() {
                        UpdateType::Deleted
                    } else if prior.is_none() {
                        UpdateType::Created
                    } else {
                        UpdateType::Updated
                    };
                    debug!(kind = %E::KIND, entity = %key, version = ?saved.version(), update = %update_type, "Saved entity");
                    self.publish(&key, saved, update_type, previous_version).await?;
                    return Ok(Outcome::Updated);
                }
                Err(IndexerError::VersionConflict { expected, actual, .. }) => {
                    warn!(
                        kind = %E::KIND,
                        entity = %key,
                        attempt,
                        expected = ?expected,
                        actual = ?actual,
                        "Version conflict, re-reading entity"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(IndexerError::RetryableConflict {
            entity_id: key,
            attempts,
        })
    }

    /// Publish a stored revision the outbox has not acknowledged yet
    async fn republish_unacknowledged(&self, key: &str, stored: E) -> IndexerResult<Outcome> {
        let Some(version) = stored.version() else {
            return Ok(Outcome::Unchanged);
        };
        let acknowledged = self.outbox.published_version(E::KIND, key).await?;
        if acknowledged.is_some_and(|published| published >= version) {
            debug!(kind = %E::KIND, entity = %key, "Entity unchanged, skipping publish");
            return Ok(Outcome::Unchanged);
        }

        let update_type = if stored.is_deleted() {
            UpdateType::Deleted
        } else if version == 1 {
            UpdateType::Created
        } else {
            UpdateType::Updated
        };
        let previous_version = version.checked_sub(1).filter(|previous| *previous > 0);
        warn!(kind = %E::KIND, entity = %key, version, acknowledged = ?acknowledged, "Republishing undelivered revision");
        self.publish(key, stored, update_type, previous_version).await?;
        Ok(Outcome::Updated)
    }

    async fn publish(
        &self,
        key: &str,
        entity: E,
        update_type: UpdateType,
        previous_version: Option<u64>,
    ) -> IndexerResult<()> {
        let version = entity.version();
        self.publisher
            .publish(EntityChange::new(entity, update_type, previous_version))
            .await?;
        if let Some(version) = version {
            self.outbox.mark_published(E::KIND, key, version).await?;
        }
        Ok(())
    }
}
