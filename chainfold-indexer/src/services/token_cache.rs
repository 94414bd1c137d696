//! Read-through cache of collection token standards

use alloy_primitives::Address;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::{EntityChange, EntityRepository, EventPublisher, IndexerResult};
use crate::domain::entities::Token;
use crate::domain::log::TokenStandard;

#[derive(Debug, Clone, Copy)]
struct CachedStandard {
    standard: Option<TokenStandard>,
    loaded_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<Address, CachedStandard>,
    // Bumped by every invalidation
    generation: u64,
}

/// Token standards by contract address.
///
/// Misses and expired entries are loaded from the token repository. Entries
/// are dropped whenever a token revision is persisted, so the cache is wired
/// in as a token publisher. A load that overlaps an invalidation is returned
/// but not cached.
pub struct TokenStandardCache {
    tokens: Arc<dyn EntityRepository<Token>>,
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl TokenStandardCache {
    pub fn new(tokens: Arc<dyn EntityRepository<Token>>, ttl: Duration) -> Self {
        Self {
            tokens,
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub async fn get(&self, token: Address) -> IndexerResult<Option<TokenStandard>> {
        let generation = {
            let state = self.state.read().await;
            if let Some(cached) = state.entries.get(&token) {
                if cached.loaded_at.elapsed() < self.ttl {
                    return Ok(cached.standard);
                }
            }
            state.generation
        };

        let standard = self.tokens.find_by_id(&token).await?.and_then(|t| t.standard);
        let mut state = self.state.write().await;
        if state.generation == generation {
            state.entries.insert(
                token,
                CachedStandard {
                    standard,
                    loaded_at: Instant::now(),
                },
            );
            debug!(token = %token, standard = ?standard, "Loaded token standard");
        } else {
            debug!(token = %token, "Token invalidated while loading, not caching");
        }
        Ok(standard)
    }

    pub async fn invalidate(&self, token: &Address) {
        let mut state = self.state.write().await;
        state.entries.remove(token);
        state.generation += 1;
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

#[async_trait]
impl EventPublisher<Token> for TokenStandardCache {
    async fn publish(&self, change: EntityChange<Token>) -> IndexerResult<()> {
        self.invalidate(&change.entity.id).await;
        Ok(())
    }
}
