//! Event log model and chain ordering

use alloy_primitives::{Address, Bytes, B256, U256};
use chainfold_types::{cmp_nulls_last, LogId, LogMeta, LogStatus, Part};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::core::DecodeError;

/// NFT contract standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStandard {
    Erc721,
    Erc1155,
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStandard::Erc721 => write!(f, "ERC721"),
            TokenStandard::Erc1155 => write!(f, "ERC1155"),
        }
    }
}

/// Decoded log payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogData {
    /// ERC721 or ERC1155 transfer; mints come from and burns go to the zero address
    NftTransfer {
        token: Address,
        token_id: U256,
        from: Address,
        to: Address,
        value: U256,
    },
    NftCreators {
        token: Address,
        token_id: U256,
        creators: Vec<Part>,
    },
    /// Signed off-chain mint, not yet on chain
    LazyMint {
        token: Address,
        token_id: U256,
        creators: Vec<Part>,
        value: U256,
    },
    LazyBurn {
        token: Address,
        token_id: U256,
        from: Address,
        creators: Vec<Part>,
        value: U256,
    },
    CollectionCreated {
        token: Address,
        owner: Address,
        name: String,
        symbol: String,
        standard: TokenStandard,
    },
    CollectionOwnershipTransferred {
        token: Address,
        previous_owner: Address,
        new_owner: Address,
    },
    Erc20Transfer {
        token: Address,
        from: Address,
        to: Address,
        value: U256,
    },
    Erc20Deposit {
        token: Address,
        owner: Address,
        value: U256,
    },
    Erc20Withdrawal {
        token: Address,
        owner: Address,
        value: U256,
    },
    /// Signed off-chain order submitted to the order API
    OrderPlaced {
        exchange: Address,
        hash: B256,
        maker: Address,
        make_value: U256,
        take_value: U256,
    },
    /// Exchange match; each side's fill is the amount this match added to it
    OrderMatch {
        exchange: Address,
        left_hash: B256,
        right_hash: B256,
        left_fill: U256,
        right_fill: U256,
    },
    OrderCancel {
        exchange: Address,
        hash: B256,
    },
}

impl LogData {
    /// Off-chain payloads, reduced by the lazy stage
    pub fn is_lazy(&self) -> bool {
        matches!(
            self,
            LogData::LazyMint { .. } | LogData::LazyBurn { .. } | LogData::OrderPlaced { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            LogData::NftTransfer { .. } => "NftTransfer",
            LogData::NftCreators { .. } => "NftCreators",
            LogData::LazyMint { .. } => "LazyMint",
            LogData::LazyBurn { .. } => "LazyBurn",
            LogData::CollectionCreated { .. } => "CollectionCreated",
            LogData::CollectionOwnershipTransferred { .. } => "CollectionOwnershipTransferred",
            LogData::Erc20Transfer { .. } => "Erc20Transfer",
            LogData::Erc20Deposit { .. } => "Erc20Deposit",
            LogData::Erc20Withdrawal { .. } => "Erc20Withdrawal",
            LogData::OrderPlaced { .. } => "OrderPlaced",
            LogData::OrderMatch { .. } => "OrderMatch",
            LogData::OrderCancel { .. } => "OrderCancel",
        }
    }

    /// Contract the payload is about; the exchange for order payloads
    pub fn token(&self) -> Address {
        match self {
            LogData::NftTransfer { token, .. }
            | LogData::NftCreators { token, .. }
            | LogData::LazyMint { token, .. }
            | LogData::LazyBurn { token, .. }
            | LogData::CollectionCreated { token, .. }
            | LogData::CollectionOwnershipTransferred { token, .. }
            | LogData::Erc20Transfer { token, .. }
            | LogData::Erc20Deposit { token, .. }
            | LogData::Erc20Withdrawal { token, .. } => *token,
            LogData::OrderPlaced { exchange, .. }
            | LogData::OrderMatch { exchange, .. }
            | LogData::OrderCancel { exchange, .. } => *exchange,
        }
    }
}

/// A single blockchain (or off-chain lazy) log with its decoded payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub meta: LogMeta,
    pub data: LogData,
}

impl EventLog {
    pub fn new(meta: LogMeta, data: LogData) -> Self {
        Self { meta, data }
    }

    /// Off-chain log recorded by the lazy mint or order API at `at`
    pub fn lazy(data: LogData, at: DateTime<Utc>) -> Self {
        let key = match &data {
            LogData::LazyMint { token, token_id, .. } | LogData::LazyBurn { token, token_id, .. } => {
                format!("{}:{}:{}", data.name(), token, token_id)
            }
            LogData::OrderPlaced { hash, .. } => format!("{}:{}", data.name(), hash),
            other => format!("{}:{}", other.name(), other.token()),
        };
        let meta = LogMeta {
            id: LogId::lazy(key, at),
            transaction_hash: B256::ZERO,
            block_hash: None,
            block_number: None,
            log_index: None,
            minor_log_index: 0,
            status: LogStatus::Confirmed,
            address: data.token(),
            created_at: at,
            block_timestamp: None,
        };
        Self { meta, data }
    }

    pub fn id(&self) -> &LogId {
        &self.meta.id
    }

    pub fn with_status(mut self, status: LogStatus) -> Self {
        self.meta.status = status;
        self
    }
}

/// Total order over an entity's history.
///
/// Lazy logs come first, then block number (pending last) and the in-block
/// position of mined logs, then observation time. Pending logs of one
/// transaction fall back to their index in it, and the log id is the final
/// tie-break.
pub fn chain_order(a: &EventLog, b: &EventLog) -> Ordering {
    b.data
        .is_lazy()
        .cmp(&a.data.is_lazy())
        .then_with(|| cmp_nulls_last(&a.meta.block_number, &b.meta.block_number))
        .then_with(|| cmp_nulls_last(&mined_index(&a.meta), &mined_index(&b.meta)))
        .then_with(|| a.meta.created_at.cmp(&b.meta.created_at))
        .then_with(|| a.meta.position().cmp(&b.meta.position()))
        .then_with(|| a.meta.id.cmp(&b.meta.id))
}

fn mined_index(meta: &LogMeta) -> Option<(u32, u32)> {
    meta.block_number
        .and(meta.log_index)
        .map(|index| (index, meta.minor_log_index))
}

pub fn sort_history(logs: &mut [EventLog]) {
    logs.sort_by(chain_order);
}

/// Undecoded log as delivered by the block listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub block_number: Option<u64>,
    /// Index within the block once mined, index within the transaction while pending
    #[serde(default)]
    pub log_index: Option<u32>,
    pub status: LogStatus,
    #[serde(default)]
    pub block_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RawLog {
    /// Build chain metadata, rejecting mined statuses without block data
    pub fn meta(&self) -> Result<LogMeta, DecodeError> {
        let mined = match (self.block_hash, self.block_number, self.log_index) {
            (Some(hash), Some(number), Some(index)) => Some((hash, number, index)),
            _ => None,
        };
        let needs_block = matches!(self.status, LogStatus::Confirmed | LogStatus::Reverted);

        match mined {
            Some((hash, number, index)) => Ok(LogMeta {
                id: LogId::confirmed(hash, index, 0),
                transaction_hash: self.transaction_hash,
                block_hash: Some(hash),
                block_number: Some(number),
                log_index: Some(index),
                minor_log_index: 0,
                status: self.status,
                address: self.address,
                created_at: self.created_at,
                block_timestamp: self.block_timestamp,
            }),
            None if needs_block => Err(DecodeError::InconsistentMeta {
                log_id: self.transaction_hash.to_string(),
                status: self.status.to_string(),
            }),
            None => Ok(LogMeta::pending(
                self.address,
                self.transaction_hash,
                self.log_index.unwrap_or_default(),
                self.created_at,
            )
            .with_status(self.status)),
        }
    }
}
