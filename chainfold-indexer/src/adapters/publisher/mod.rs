//! Change publishers

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::core::{EntityChange, EventPublisher, IndexerResult, StorageError};
use crate::domain::reduce::Entity;

/// Forwards changes into a bounded channel
pub struct ChannelPublisher<E: Entity> {
    sender: mpsc::Sender<EntityChange<E>>,
}

impl<E: Entity> ChannelPublisher<E> {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EntityChange<E>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl<E: Entity> EventPublisher<E> for ChannelPublisher<E> {
    async fn publish(&self, change: EntityChange<E>) -> IndexerResult<()> {
        let key = change.entity.key();
        self.sender
            .send(change)
            .await
            .map_err(|_| StorageError::PublisherClosed(key))?;
        Ok(())
    }
}

/// Logs every change; used when nothing downstream consumes them
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

#[async_trait]
impl<E: Entity> EventPublisher<E> for TracingPublisher {
    async fn publish(&self, change: EntityChange<E>) -> IndexerResult<()> {
        info!(
            kind = %E::KIND,
            entity = %change.entity.key(),
            update = %change.update_type,
            version = ?change.entity.version(),
            event_id = %change.event_id,
            "Entity changed"
        );
        Ok(())
    }
}

/// Publishes each change to every inner publisher in order
pub struct FanoutPublisher<E: Entity> {
    publishers: Vec<Arc<dyn EventPublisher<E>>>,
}

impl<E: Entity> FanoutPublisher<E> {
    pub fn new(publishers: Vec<Arc<dyn EventPublisher<E>>>) -> Self {
        Self { publishers }
    }
}

#[async_trait]
impl<E: Entity> EventPublisher<E> for FanoutPublisher<E> {
    async fn publish(&self, change: EntityChange<E>) -> IndexerResult<()> {
        for publisher in &self.publishers {
            publisher.publish(change.clone()).await?;
        }
        Ok(())
    }
}
