//! Service container for dependency injection

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use crate::adapters::publisher::{ChannelPublisher, FanoutPublisher, TracingPublisher};
use crate::adapters::storage::{MemoryEntityRepository, MemoryHistoryRepository, MemoryOutboxRepository};
use crate::config::{IndexerConfig, StorageBackend};
use crate::core::{EntityChange, EntityRepository, EventPublisher, HistoryRepository, IndexerResult, OutboxRepository};
use crate::domain::entities::{
    BalanceEventConverter, Erc20Balance, Item, ItemEventConverter, Order, OrderEventConverter, Ownership,
    OwnershipEventConverter, Token, TokenEventConverter,
};
use crate::services::{IndexerPipeline, ReduceService, ReduceServiceSettings, TokenStandardCache};

#[cfg(feature = "rocksdb-storage")]
use crate::adapters::storage::{RocksDBClient, RocksDbStore};

/// Outgoing publishers, one per entity kind
#[derive(Clone)]
pub struct Publishers {
    pub items: Arc<dyn EventPublisher<Item>>,
    pub ownerships: Arc<dyn EventPublisher<Ownership>>,
    pub tokens: Arc<dyn EventPublisher<Token>>,
    pub balances: Arc<dyn EventPublisher<Erc20Balance>>,
    pub orders: Arc<dyn EventPublisher<Order>>,
}

/// Receiving ends of [`Publishers::channels`]
pub struct ChangeReceivers {
    pub items: mpsc::Receiver<EntityChange<Item>>,
    pub ownerships: mpsc::Receiver<EntityChange<Ownership>>,
    pub tokens: mpsc::Receiver<EntityChange<Token>>,
    pub balances: mpsc::Receiver<EntityChange<Erc20Balance>>,
    pub orders: mpsc::Receiver<EntityChange<Order>>,
}

impl Publishers {
    /// Log changes only
    pub fn tracing() -> Self {
        Self {
            items: Arc::new(TracingPublisher),
            ownerships: Arc::new(TracingPublisher),
            tokens: Arc::new(TracingPublisher),
            balances: Arc::new(TracingPublisher),
            orders: Arc::new(TracingPublisher),
        }
    }

    /// Bounded channels a consumer drains
    pub fn channels(capacity: usize) -> (Self, ChangeReceivers) {
        let (items, items_rx) = ChannelPublisher::new(capacity);
        let (ownerships, ownerships_rx) = ChannelPublisher::new(capacity);
        let (tokens, tokens_rx) = ChannelPublisher::new(capacity);
        let (balances, balances_rx) = ChannelPublisher::new(capacity);
        let (orders, orders_rx) = ChannelPublisher::new(capacity);
        (
            Self {
                items: Arc::new(items),
                ownerships: Arc::new(ownerships),
                tokens: Arc::new(tokens),
                balances: Arc::new(balances),
                orders: Arc::new(orders),
            },
            ChangeReceivers {
                items: items_rx,
                ownerships: ownerships_rx,
                tokens: tokens_rx,
                balances: balances_rx,
                orders: orders_rx,
            },
        )
    }
}

/// Repositories of the selected backend
#[derive(Clone)]
pub struct Repositories {
    pub history: Arc<dyn HistoryRepository>,
    pub items: Arc<dyn EntityRepository<Item>>,
    pub ownerships: Arc<dyn EntityRepository<Ownership>>,
    pub tokens: Arc<dyn EntityRepository<Token>>,
    pub balances: Arc<dyn EntityRepository<Erc20Balance>>,
    pub orders: Arc<dyn EntityRepository<Order>>,
    /// Publish acknowledgements shared by every reduce service
    pub outbox: Arc<dyn OutboxRepository>,
}

impl Repositories {
    pub fn memory() -> Self {
        Self {
            history: Arc::new(MemoryHistoryRepository::new()),
            items: Arc::new(MemoryEntityRepository::<Item>::new()),
            ownerships: Arc::new(MemoryEntityRepository::<Ownership>::new()),
            tokens: Arc::new(MemoryEntityRepository::<Token>::new()),
            balances: Arc::new(MemoryEntityRepository::<Erc20Balance>::new()),
            orders: Arc::new(MemoryEntityRepository::<Order>::new()),
            outbox: Arc::new(MemoryOutboxRepository::new()),
        }
    }

    #[cfg(feature = "rocksdb-storage")]
    pub fn rocksdb(store: RocksDbStore) -> Self {
        Self {
            history: Arc::new(store.clone()),
            items: Arc::new(store.clone()),
            ownerships: Arc::new(store.clone()),
            tokens: Arc::new(store.clone()),
            balances: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            outbox: Arc::new(store),
        }
    }
}

/// Service container managing all dependencies
pub struct ServiceContainer {
    /// Configuration
    pub config: IndexerConfig,

    /// Storage of the configured backend
    pub repositories: Repositories,

    /// Token standards, invalidated by the token reduce service
    pub token_cache: Arc<TokenStandardCache>,

    pub items: Arc<ReduceService<Item>>,
    pub ownerships: Arc<ReduceService<Ownership>>,
    pub tokens: Arc<ReduceService<Token>>,
    pub balances: Arc<ReduceService<Erc20Balance>>,
    pub orders: Arc<ReduceService<Order>>,

    /// Listener entry point
    pub pipeline: Arc<IndexerPipeline>,

    #[cfg(feature = "rocksdb-storage")]
    rocksdb: Option<Arc<RocksDBClient>>,
}

impl ServiceContainer {
    /// Initialize the container, logging every change
    pub async fn new(config: IndexerConfig) -> IndexerResult<Self> {
        Self::with_publishers(config, Publishers::tracing()).await
    }

    /// Initialize the container with caller supplied publishers
    pub async fn with_publishers(config: IndexerConfig, publishers: Publishers) -> IndexerResult<Self> {
        info!(backend = ?config.storage.backend, "Initializing service container");

        #[cfg(feature = "rocksdb-storage")]
        let mut rocksdb = None;

        let repositories = match config.storage.backend {
            StorageBackend::Memory => Repositories::memory(),
            #[cfg(feature = "rocksdb-storage")]
            StorageBackend::Rocksdb => {
                let client = Arc::new(RocksDBClient::open(&config.storage.rocksdb).await?);
                rocksdb = Some(client.clone());
                Repositories::rocksdb(RocksDbStore::new(client))
            }
            #[cfg(not(feature = "rocksdb-storage"))]
            StorageBackend::Rocksdb => {
                return Err(crate::core::IndexerError::Configuration(
                    "rocksdb backend requires the rocksdb-storage feature".to_string(),
                ))
            }
        };

        info!("Storage backend initialized");

        let settings = ReduceServiceSettings::from(&config.reduce);
        let token_cache = Arc::new(TokenStandardCache::new(
            repositories.tokens.clone(),
            Duration::from_secs(config.cache.token_standard_ttl_secs),
        ));
        let token_publisher: Arc<dyn EventPublisher<Token>> = Arc::new(FanoutPublisher::new(vec![
            token_cache.clone() as Arc<dyn EventPublisher<Token>>,
            publishers.tokens,
        ]));

        let items = Arc::new(ReduceService::<Item>::new(
            repositories.history.clone(),
            repositories.items.clone(),
            Arc::new(ItemEventConverter),
            publishers.items,
            repositories.outbox.clone(),
            settings,
        ));
        let ownerships = Arc::new(ReduceService::<Ownership>::new(
            repositories.history.clone(),
            repositories.ownerships.clone(),
            Arc::new(OwnershipEventConverter),
            publishers.ownerships,
            repositories.outbox.clone(),
            settings,
        ));
        let tokens = Arc::new(ReduceService::<Token>::new(
            repositories.history.clone(),
            repositories.tokens.clone(),
            Arc::new(TokenEventConverter),
            token_publisher,
            repositories.outbox.clone(),
            settings,
        ));
        let balances = Arc::new(ReduceService::<Erc20Balance>::new(
            repositories.history.clone(),
            repositories.balances.clone(),
            Arc::new(BalanceEventConverter),
            publishers.balances,
            repositories.outbox.clone(),
            settings,
        ));
        let orders = Arc::new(ReduceService::<Order>::new(
            repositories.history.clone(),
            repositories.orders.clone(),
            Arc::new(OrderEventConverter),
            publishers.orders,
            repositories.outbox.clone(),
            settings,
        ));

        let pipeline = Arc::new(IndexerPipeline::new(
            items.clone(),
            ownerships.clone(),
            tokens.clone(),
            balances.clone(),
            orders.clone(),
            token_cache.clone(),
            config.pipeline.require_known_collections,
        ));

        info!("Reduce services initialized");

        Ok(Self {
            config,
            repositories,
            token_cache,
            items,
            ownerships,
            tokens,
            balances,
            orders,
            pipeline,
            #[cfg(feature = "rocksdb-storage")]
            rocksdb,
        })
    }

    /// Perform health check on the storage backend
    pub async fn health_check(&self) -> IndexerResult<()> {
        info!("Performing health check");

        #[cfg(feature = "rocksdb-storage")]
        if let Some(client) = &self.rocksdb {
            client.health_check()?;
        }

        info!("All services healthy");
        Ok(())
    }

    /// Graceful shutdown
    pub async fn shutdown(&self) {
        info!("Shutting down service container");
    }
}
