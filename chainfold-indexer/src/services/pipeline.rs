//! Listener callbacks: decode logs and fan them out to every reduce service

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::reduce_service::ReduceService;
use super::token_cache::TokenStandardCache;
use crate::core::BatchReport;
use crate::domain::entities::{Erc20Balance, Item, Order, Ownership, Token};
use crate::domain::log::{EventLog, LogData, RawLog};
use crate::domain::decode_raw_log;

/// Outcome of one listener callback across all entity kinds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Typed logs received, before filtering
    pub decoded: usize,
    pub decode_failures: usize,
    /// Logs dropped before reduction
    pub filtered: usize,
    pub items: BatchReport,
    pub ownerships: BatchReport,
    pub tokens: BatchReport,
    pub balances: BatchReport,
    pub orders: BatchReport,
}

impl PipelineReport {
    pub fn is_clean(&self) -> bool {
        self.decode_failures == 0
            && self.items.is_clean()
            && self.ownerships.is_clean()
            && self.tokens.is_clean()
            && self.balances.is_clean()
            && self.orders.is_clean()
    }
}

pub struct IndexerPipeline {
    items: Arc<ReduceService<Item>>,
    ownerships: Arc<ReduceService<Ownership>>,
    tokens: Arc<ReduceService<Token>>,
    balances: Arc<ReduceService<Erc20Balance>>,
    orders: Arc<ReduceService<Order>>,
    token_cache: Arc<TokenStandardCache>,
    require_known_collections: bool,
}

impl IndexerPipeline {
    pub fn new(
        items: Arc<ReduceService<Item>>,
        ownerships: Arc<ReduceService<Ownership>>,
        tokens: Arc<ReduceService<Token>>,
        balances: Arc<ReduceService<Erc20Balance>>,
        orders: Arc<ReduceService<Order>>,
        token_cache: Arc<TokenStandardCache>,
        require_known_collections: bool,
    ) -> Self {
        Self {
            items,
            ownerships,
            tokens,
            balances,
            orders,
            token_cache,
            require_known_collections,
        }
    }

    /// Decode raw chain logs and reduce them
    pub async fn post_process_logs(&self, raw_logs: Vec<RawLog>) -> PipelineReport {
        let mut decode_failures = 0;
        let mut logs = Vec::with_capacity(raw_logs.len());
        for raw in &raw_logs {
            match decode_raw_log(raw) {
                Ok(decoded) => logs.extend(decoded),
                Err(e) => {
                    warn!(address = %raw.address, tx = %raw.transaction_hash, "Dropping undecodable log: {}", e);
                    decode_failures += 1;
                }
            }
        }
        debug!(raw = raw_logs.len(), decoded = logs.len(), "Decoded log batch");

        let mut report = self.dispatch(logs).await;
        report.decode_failures = decode_failures;
        report
    }

    /// Reduce off-chain lazy logs; anything else is dropped
    pub async fn on_lazy_events(&self, logs: Vec<EventLog>) -> PipelineReport {
        let total = logs.len();
        let lazy: Vec<EventLog> = logs.into_iter().filter(|log| log.data.is_lazy()).collect();
        let dropped = total - lazy.len();
        if dropped > 0 {
            warn!(dropped, "Ignoring non-lazy logs on the lazy path");
        }
        let mut report = self.dispatch(lazy).await;
        report.filtered += dropped;
        report
    }

    async fn dispatch(&self, logs: Vec<EventLog>) -> PipelineReport {
        let mut report = PipelineReport::default();
        if logs.is_empty() {
            return report;
        }

        // Collections first, so items of a collection created in this batch pass the filter
        report.tokens = self.tokens.on_events(logs.clone()).await;

        let logs = if self.require_known_collections {
            let before = logs.len();
            let known = self.known_collection_logs(logs).await;
            report.filtered = before - known.len();
            known
        } else {
            logs
        };
        report.decoded = logs.len() + report.filtered;

        let (items, ownerships, balances, orders) = tokio::join!(
            self.items.on_events(logs.clone()),
            self.ownerships.on_events(logs.clone()),
            self.balances.on_events(logs.clone()),
            self.orders.on_events(logs),
        );
        report.items = items;
        report.ownerships = ownerships;
        report.balances = balances;
        report.orders = orders;

        info!(
            decoded = report.decoded,
            filtered = report.filtered,
            items = report.items.updated.len(),
            ownerships = report.ownerships.updated.len(),
            tokens = report.tokens.updated.len(),
            balances = report.balances.updated.len(),
            orders = report.orders.updated.len(),
            "Processed log batch"
        );
        report
    }

    async fn known_collection_logs(&self, logs: Vec<EventLog>) -> Vec<EventLog> {
        let mut kept = Vec::with_capacity(logs.len());
        for log in logs {
            let nft = matches!(
                log.data,
                LogData::NftTransfer { .. } | LogData::NftCreators { .. } | LogData::LazyMint { .. } | LogData::LazyBurn { .. }
            );
            if !nft {
                kept.push(log);
                continue;
            }
            match self.token_cache.get(log.data.token()).await {
                Ok(Some(_)) => kept.push(log),
                Ok(None) => debug!(token = %log.data.token(), log_id = %log.meta.id, "Skipping log of unknown collection"),
                Err(e) => warn!(token = %log.data.token(), "Token lookup failed, skipping log: {}", e),
            }
        }
        kept
    }
}
