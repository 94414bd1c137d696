//! Chain reducers: fold an entity's ordered history into its current state

use async_trait::async_trait;
use chainfold_types::{LogId, LogStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::policy::{ApplyPolicy, StagePolicies};
use super::{Entity, Stage};
use crate::core::{EntityRepository, EventConverter, HistoryRepository, IndexerResult, ReduceError};
use crate::domain::log::{sort_history, EventLog};

/// Settings injected into chain reducers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReduceSettings {
    /// Size of the per-entity window of confirmed logs that may be reverted
    pub max_revertable_events: usize,
}

impl Default for ReduceSettings {
    fn default() -> Self {
        Self {
            max_revertable_events: 100,
        }
    }
}

/// Result of folding an entity history
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction<E> {
    pub entity: E,
    /// Logs whose events were applied, in application order
    pub applied: Vec<LogId>,
    /// Logs rejected by an apply policy
    pub skipped: Vec<LogId>,
    /// Reverted logs that were reflected in the previous revision
    pub reverted: Vec<LogId>,
    /// Logs that could not be converted into events
    pub failed_conversions: Vec<LogId>,
}

#[async_trait]
pub trait ChainReducer<E: Entity>: Send + Sync {
    async fn reduce(&self, id: &E::Id) -> IndexerResult<Reduction<E>>;
}

/// Recomputes an entity from empty over its full active history
pub struct EntityChainReducer<E: Entity> {
    history: Arc<dyn HistoryRepository>,
    converter: Arc<dyn EventConverter<E>>,
    policies: StagePolicies,
}

impl<E: Entity> EntityChainReducer<E> {
    pub fn new(
        history: Arc<dyn HistoryRepository>,
        converter: Arc<dyn EventConverter<E>>,
        settings: ReduceSettings,
    ) -> Self {
        Self {
            history,
            converter,
            policies: StagePolicies::new(settings.max_revertable_events),
        }
    }

    pub fn policies(&self) -> &StagePolicies {
        &self.policies
    }

    pub async fn load_history(&self, id: &E::Id) -> IndexerResult<Vec<EventLog>> {
        self.history.find_by_entity(E::KIND, &id.to_string()).await
    }

    /// Pure fold of `logs` for entity `id`.
    ///
    /// Reverted, dropped and inactive logs are excluded. A log that fails to
    /// convert is skipped; a stage routing error aborts the fold.
    pub fn fold(&self, id: &E::Id, logs: &[EventLog]) -> Result<Reduction<E>, ReduceError> {
        let mut active: Vec<EventLog> = logs
            .iter()
            .filter(|log| log.meta.status.is_active())
            .cloned()
            .collect();
        sort_history(&mut active);

        let table = E::reducers();
        let mut entity = E::empty(id.clone());
        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        let mut failed_conversions = Vec::new();

        for log in &active {
            let events = match self.converter.convert(log) {
                Ok(events) => events,
                Err(e) => {
                    warn!(kind = %E::KIND, entity = %id, log_id = %log.meta.id, "Skipping undecodable log: {}", e);
                    failed_conversions.push(log.meta.id.clone());
                    continue;
                }
            };

            for event in events.iter().filter(|event| &event.entity_id == id) {
                if !self.policies.can_apply(&entity, event) {
                    debug!(kind = %E::KIND, entity = %id, log_id = %event.log.id, stage = %event.stage(), "Policy skipped event");
                    skipped.push(event.log.id.clone());
                    continue;
                }
                entity = table.reduce(event.stage(), entity, event)?;
                self.policies.advance(&mut entity, event);
                applied.push(event.log.id.clone());
            }
        }

        Ok(Reduction {
            entity,
            applied,
            skipped,
            reverted: Vec::new(),
            failed_conversions,
        })
    }
}

#[async_trait]
impl<E: Entity> ChainReducer<E> for EntityChainReducer<E> {
    async fn reduce(&self, id: &E::Id) -> IndexerResult<Reduction<E>> {
        let history = self.load_history(id).await?;
        Ok(self.fold(id, &history)?)
    }
}

/// Chain reducer used when reverted logs arrive for an entity.
///
/// Reports which reverted logs were reflected in the stored revision and
/// then recomputes from the remaining history.
pub struct RevertedChainReducer<E: Entity> {
    inner: Arc<EntityChainReducer<E>>,
    entities: Arc<dyn EntityRepository<E>>,
}

impl<E: Entity> RevertedChainReducer<E> {
    pub fn new(inner: Arc<EntityChainReducer<E>>, entities: Arc<dyn EntityRepository<E>>) -> Self {
        Self { inner, entities }
    }

    /// Fold `logs` against a known prior revision
    pub fn fold_with_prior(
        &self,
        id: &E::Id,
        prior: Option<&E>,
        logs: &[EventLog],
    ) -> Result<Reduction<E>, ReduceError> {
        let revert = &self.inner.policies().revert;
        let reverted: Vec<LogId> = match prior {
            Some(prior) => logs
                .iter()
                .filter(|log| log.meta.status == LogStatus::Reverted)
                .filter(|log| revert.can_apply(prior.watermarks(), &log.meta))
                .map(|log| log.meta.id.clone())
                .collect(),
            None => Vec::new(),
        };

        for log_id in &reverted {
            info!(kind = %E::KIND, entity = %id, log_id = %log_id, stage = %Stage::Inactive, "Rolling back reverted log");
        }

        let mut reduction = self.inner.fold(id, logs)?;
        reduction.reverted = reverted;
        Ok(reduction)
    }
}

#[async_trait]
impl<E: Entity> ChainReducer<E> for RevertedChainReducer<E> {
    async fn reduce(&self, id: &E::Id) -> IndexerResult<Reduction<E>> {
        let history = self.inner.load_history(id).await?;
        let prior = self.entities.find_by_id(id).await?;
        Ok(self.fold_with_prior(id, prior.as_ref(), &history)?)
    }
}
