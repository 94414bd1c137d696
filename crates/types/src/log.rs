//! Log identity, status and chain ordering

use alloy_primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::errors::TypesError;

/// Lifecycle status of a log as reported by the block listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    /// Seen in the mempool, not yet mined
    Pending,
    /// Mined in a canonical block
    Confirmed,
    /// Was confirmed, then removed by a chain reorganization
    Reverted,
    /// Pending transaction that never made it on chain
    Dropped,
    /// Pending log superseded by its confirmed counterpart
    Inactive,
}

impl LogStatus {
    /// Whether logs with this status take part in a forward fold
    pub fn is_active(&self) -> bool {
        matches!(self, LogStatus::Pending | LogStatus::Confirmed)
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStatus::Pending => write!(f, "PENDING"),
            LogStatus::Confirmed => write!(f, "CONFIRMED"),
            LogStatus::Reverted => write!(f, "REVERTED"),
            LogStatus::Dropped => write!(f, "DROPPED"),
            LogStatus::Inactive => write!(f, "INACTIVE"),
        }
    }
}

/// Position of a log on chain.
///
/// Ordered by block number, then log index, then minor log index. Missing
/// block numbers and log indexes (pending logs) sort after present ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChainPosition {
    pub block_number: Option<u64>,
    pub log_index: Option<u32>,
    pub minor_log_index: u32,
}

impl ChainPosition {
    pub fn new(block_number: u64, log_index: u32, minor_log_index: u32) -> Self {
        Self {
            block_number: Some(block_number),
            log_index: Some(log_index),
            minor_log_index,
        }
    }

    /// Both block number and log index are known
    pub fn is_mined(&self) -> bool {
        self.block_number.is_some() && self.log_index.is_some()
    }
}

impl Ord for ChainPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_nulls_last(&self.block_number, &other.block_number)
            .then_with(|| cmp_nulls_last(&self.log_index, &other.log_index))
            .then_with(|| self.minor_log_index.cmp(&other.minor_log_index))
    }
}

impl PartialOrd for ChainPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ChainPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.block_number, self.log_index) {
            (Some(block), Some(index)) => write!(f, "{}:{}:{}", block, index, self.minor_log_index),
            (None, Some(index)) => write!(f, "pending:{}:{}", index, self.minor_log_index),
            _ => write!(f, "pending:{}", self.minor_log_index),
        }
    }
}

/// Compare two optional values, placing `None` after every `Some`
pub fn cmp_nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Identity of one physical log occurrence
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(String);

impl LogId {
    /// Id for a mined log: `<block hash>:<log index>:<minor index>`
    pub fn confirmed(block_hash: B256, log_index: u32, minor_log_index: u32) -> Self {
        Self(format!("{}:{}:{}", block_hash, log_index, minor_log_index))
    }

    /// Id for a mempool log: `<tx hash>:pending:<index in tx>:<minor index>`
    pub fn pending(transaction_hash: B256, log_index: u32, minor_log_index: u32) -> Self {
        Self(format!("{}:pending:{}:{}", transaction_hash, log_index, minor_log_index))
    }

    /// Id for an off-chain (lazy) event keyed by the entity it targets
    pub fn lazy(key: impl fmt::Display, at: DateTime<Utc>) -> Self {
        Self(format!("lazy:{}:{}", key, at.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LogId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(TypesError::InvalidLogId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

/// Chain metadata shared by every log, independent of its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMeta {
    pub id: LogId,
    pub transaction_hash: B256,
    pub block_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub log_index: Option<u32>,
    pub minor_log_index: u32,
    pub status: LogStatus,
    /// Contract that emitted the log
    pub address: Address,
    /// Wall-clock time the log was first observed
    pub created_at: DateTime<Utc>,
    pub block_timestamp: Option<DateTime<Utc>>,
}

impl LogMeta {
    /// Metadata for a log mined at the given position
    pub fn confirmed(
        address: Address,
        transaction_hash: B256,
        block_hash: B256,
        position: (u64, u32, u32),
        block_timestamp: DateTime<Utc>,
    ) -> Self {
        let (block_number, log_index, minor_log_index) = position;
        Self {
            id: LogId::confirmed(block_hash, log_index, minor_log_index),
            transaction_hash,
            block_hash: Some(block_hash),
            block_number: Some(block_number),
            log_index: Some(log_index),
            minor_log_index,
            status: LogStatus::Confirmed,
            address,
            created_at: block_timestamp,
            block_timestamp: Some(block_timestamp),
        }
    }

    /// Metadata for a mempool log observed at `created_at`.
    ///
    /// Without a block, `log_index` is the position of the log within its
    /// transaction. It keeps sibling logs of one transaction apart.
    pub fn pending(
        address: Address,
        transaction_hash: B256,
        log_index: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LogId::pending(transaction_hash, log_index, 0),
            transaction_hash,
            block_hash: None,
            block_number: None,
            log_index: Some(log_index),
            minor_log_index: 0,
            status: LogStatus::Pending,
            address,
            created_at,
            block_timestamp: None,
        }
    }

    pub fn position(&self) -> ChainPosition {
        ChainPosition {
            block_number: self.block_number,
            log_index: self.log_index,
            minor_log_index: self.minor_log_index,
        }
    }

    /// Block time when mined, observation time otherwise
    pub fn event_time(&self) -> DateTime<Utc> {
        self.block_timestamp.unwrap_or(self.created_at)
    }

    pub fn with_status(mut self, status: LogStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_minor_index(mut self, minor_log_index: u32) -> Self {
        self.minor_log_index = minor_log_index;
        self.id = match (self.block_hash, self.log_index) {
            (Some(hash), Some(index)) => LogId::confirmed(hash, index, minor_log_index),
            _ => LogId::pending(
                self.transaction_hash,
                self.log_index.unwrap_or_default(),
                minor_log_index,
            ),
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_pending_positions_sort_last() {
        let mined = ChainPosition::new(10, 0, 0);
        let pending = ChainPosition {
            block_number: None,
            log_index: None,
            minor_log_index: 0,
        };
        assert!(mined < pending);
        assert!(ChainPosition::new(10, 1, 0) < ChainPosition::new(11, 0, 0));
        assert!(ChainPosition::new(10, 1, 0) < ChainPosition::new(10, 1, 1));
    }

    #[test]
    fn test_log_id_formats() {
        let hash = B256::repeat_byte(0xab);
        let id = LogId::confirmed(hash, 3, 1);
        assert!(id.as_str().ends_with(":3:1"));
        assert!(LogId::pending(hash, 2, 0).as_str().ends_with(":pending:2:0"));
        assert!("".parse::<LogId>().is_err());
        assert_eq!("abc".parse::<LogId>().unwrap().as_str(), "abc");
    }

    #[test]
    fn test_minor_index_rebuilds_id() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let meta = LogMeta::confirmed(
            Address::ZERO,
            B256::repeat_byte(1),
            B256::repeat_byte(2),
            (5, 7, 0),
            at,
        );
        let split = meta.clone().with_minor_index(4);
        assert_eq!(split.minor_log_index, 4);
        assert_ne!(split.id, meta.id);
        assert_eq!(split.position(), ChainPosition::new(5, 7, 4));
        assert_eq!(split.event_time(), at);
    }

    #[test]
    fn test_pending_siblings_in_one_transaction_have_distinct_ids() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let tx = B256::repeat_byte(0x99);
        let first = LogMeta::pending(Address::ZERO, tx, 0, at);
        let second = LogMeta::pending(Address::ZERO, tx, 1, at);

        assert_ne!(first.id, second.id);
        assert!(first.position() < second.position());
        assert!(!second.position().is_mined());

        let split = second.clone().with_minor_index(2);
        assert_eq!(split.id, LogId::pending(tx, 1, 2));
        assert_ne!(split.id, first.clone().with_minor_index(2).id);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&LogStatus::Reverted).unwrap();
        assert_eq!(json, "\"REVERTED\"");
        assert!(LogStatus::Pending.is_active());
        assert!(!LogStatus::Dropped.is_active());
    }

    fn position() -> impl Strategy<Value = ChainPosition> {
        (
            proptest::option::of(0u64..50),
            proptest::option::of(0u32..5),
            0u32..3,
        )
            .prop_map(|(block_number, log_index, minor_log_index)| ChainPosition {
                block_number,
                log_index,
                minor_log_index,
            })
    }

    proptest! {
        #[test]
        fn prop_position_order_is_total(a in position(), b in position()) {
            let forward = a.cmp(&b);
            prop_assert_eq!(forward.reverse(), b.cmp(&a));
            if forward == Ordering::Equal {
                prop_assert_eq!(a, b);
            }
        }
    }
}
