//! Ownership: one holder's balance of one NFT item

use alloy_primitives::{Address, U256};
use chainfold_types::{split_by_parts, validate_parts, LogId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::{DecodeError, EntityKind, EventConverter, ReduceError};
use crate::domain::log::{EventLog, LogData};
use crate::domain::reduce::{invalid_event, DomainEvent, Entity, EntityEvent, EventBody, ReducerTable, Stage, Watermarks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnershipId {
    pub token: Address,
    pub token_id: U256,
    pub owner: Address,
}

impl OwnershipId {
    pub fn new(token: Address, token_id: U256, owner: Address) -> Self {
        Self {
            token,
            token_id,
            owner,
        }
    }
}

impl fmt::Display for OwnershipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.token, self.token_id, self.owner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipEventBody {
    /// Incoming transfer; `from` is zero for mints
    TransferTo { from: Address, value: U256 },
    /// Outgoing transfer; `to` is zero for burns
    TransferFrom { to: Address, value: U256 },
    LazyTransferTo { value: U256 },
    LazyBurn,
}

impl EventBody for OwnershipEventBody {
    fn is_lazy(&self) -> bool {
        matches!(
            self,
            OwnershipEventBody::LazyTransferTo { .. } | OwnershipEventBody::LazyBurn
        )
    }

    fn name(&self) -> &'static str {
        match self {
            OwnershipEventBody::TransferTo { .. } => "OwnershipTransferTo",
            OwnershipEventBody::TransferFrom { .. } => "OwnershipTransferFrom",
            OwnershipEventBody::LazyTransferTo { .. } => "OwnershipLazyTransferTo",
            OwnershipEventBody::LazyBurn => "OwnershipLazyBurn",
        }
    }
}

pub type OwnershipEvent = DomainEvent<OwnershipId, OwnershipEventBody>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOwnershipTransfer {
    pub log_id: LogId,
    pub incoming: bool,
    pub counterparty: Address,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub id: OwnershipId,
    /// Effective balance including the unminted lazy part
    pub value: U256,
    pub lazy_value: U256,
    pub pending: Vec<PendingOwnershipTransfer>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub watermarks: Watermarks,
    pub version: Option<u64>,
}

impl Ownership {
    fn touch(mut self, event: &OwnershipEvent) -> Self {
        self.last_updated_at = Some(event.timestamp());
        self.deleted = self.value.is_zero() && self.pending.is_empty();
        self
    }
}

impl Entity for Ownership {
    type Id = OwnershipId;
    type Body = OwnershipEventBody;

    const KIND: EntityKind = EntityKind::Ownership;

    fn empty(id: OwnershipId) -> Self {
        Self {
            id,
            value: U256::ZERO,
            lazy_value: U256::ZERO,
            pending: Vec::new(),
            last_updated_at: None,
            deleted: false,
            watermarks: Watermarks::default(),
            version: None,
        }
    }

    fn id(&self) -> &OwnershipId {
        &self.id
    }

    fn version(&self) -> Option<u64> {
        self.version
    }

    fn set_version(&mut self, version: Option<u64>) {
        self.version = version;
    }

    fn watermarks(&self) -> &Watermarks {
        &self.watermarks
    }

    fn watermarks_mut(&mut self) -> &mut Watermarks {
        &mut self.watermarks
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn reducers() -> ReducerTable<Self> {
        ReducerTable {
            lazy: reduce_lazy,
            pending: reduce_pending,
            forward: reduce_forward,
        }
    }
}

fn reduce_lazy(mut ownership: Ownership, event: &EntityEvent<Ownership>) -> Result<Ownership, ReduceError> {
    match &event.body {
        OwnershipEventBody::LazyTransferTo { value } => {
            ownership.value = ownership.value.saturating_add(*value);
            ownership.lazy_value = ownership.lazy_value.saturating_add(*value);
        }
        OwnershipEventBody::LazyBurn => {
            ownership.value = ownership.value.saturating_sub(ownership.lazy_value);
            ownership.lazy_value = U256::ZERO;
        }
        other => return Err(invalid_event(Stage::Lazy, other)),
    }
    Ok(ownership.touch(event))
}

fn reduce_pending(mut ownership: Ownership, event: &EntityEvent<Ownership>) -> Result<Ownership, ReduceError> {
    let (incoming, counterparty, value) = match &event.body {
        OwnershipEventBody::TransferTo { from, value } => (true, *from, *value),
        OwnershipEventBody::TransferFrom { to, value } => (false, *to, *value),
        other => return Err(invalid_event(Stage::Pending, other)),
    };
    if !ownership.pending.iter().any(|p| p.log_id == event.log.id) {
        ownership.pending.push(PendingOwnershipTransfer {
            log_id: event.log.id.clone(),
            incoming,
            counterparty,
            value,
        });
    }
    Ok(ownership.touch(event))
}

fn reduce_forward(mut ownership: Ownership, event: &EntityEvent<Ownership>) -> Result<Ownership, ReduceError> {
    match &event.body {
        OwnershipEventBody::TransferTo { from, value } => {
            // A mint into a lazily held ownership converts lazy value instead of adding
            let realized = if *from == Address::ZERO {
                ownership.lazy_value.min(*value)
            } else {
                U256::ZERO
            };
            ownership.lazy_value -= realized;
            ownership.value = ownership.value.saturating_add(*value - realized);
        }
        OwnershipEventBody::TransferFrom { value, .. } => {
            ownership.value = ownership.value.saturating_sub(*value);
            ownership.lazy_value = ownership.lazy_value.min(ownership.value);
        }
        other => return Err(invalid_event(Stage::Forward, other)),
    }
    Ok(ownership.touch(event))
}

/// Maps NFT logs to the ownership events of both parties
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipEventConverter;

impl EventConverter<Ownership> for OwnershipEventConverter {
    fn convert(&self, log: &EventLog) -> Result<Vec<OwnershipEvent>, DecodeError> {
        let event = |token: Address, token_id: U256, owner: Address, body: OwnershipEventBody| {
            OwnershipEvent::new(OwnershipId::new(token, token_id, owner), log.meta.clone(), body)
        };

        let events = match &log.data {
            LogData::NftTransfer {
                token,
                token_id,
                from,
                to,
                value,
            } => {
                if value.is_zero() || from == to {
                    return Ok(Vec::new());
                }
                let mut events = Vec::with_capacity(2);
                if *from != Address::ZERO {
                    events.push(event(
                        *token,
                        *token_id,
                        *from,
                        OwnershipEventBody::TransferFrom { to: *to, value: *value },
                    ));
                }
                if *to != Address::ZERO {
                    events.push(event(
                        *token,
                        *token_id,
                        *to,
                        OwnershipEventBody::TransferTo { from: *from, value: *value },
                    ));
                }
                events
            }
            LogData::LazyMint {
                token,
                token_id,
                creators,
                value,
            } => {
                validate_parts(creators)?;
                let mut shares: BTreeMap<Address, U256> = BTreeMap::new();
                for (owner, share) in split_by_parts(*value, creators) {
                    let entry = shares.entry(owner).or_insert(U256::ZERO);
                    *entry = entry.saturating_add(share);
                }
                shares
                    .into_iter()
                    .filter(|(_, share)| !share.is_zero())
                    .map(|(owner, share)| {
                        event(*token, *token_id, owner, OwnershipEventBody::LazyTransferTo { value: share })
                    })
                    .collect()
            }
            LogData::LazyBurn {
                token,
                token_id,
                creators,
                ..
            } => {
                validate_parts(creators)?;
                let mut owners: Vec<Address> = creators.iter().map(|p| p.account).collect();
                owners.sort();
                owners.dedup();
                owners
                    .into_iter()
                    .map(|owner| event(*token, *token_id, owner, OwnershipEventBody::LazyBurn))
                    .collect()
            }
            _ => Vec::new(),
        };
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use chainfold_types::{LogMeta, Part};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn token() -> Address {
        Address::repeat_byte(0xee)
    }

    fn id(owner: Address) -> OwnershipId {
        OwnershipId::new(token(), U256::from(1), owner)
    }

    fn confirmed(block: u64) -> LogMeta {
        LogMeta::confirmed(
            token(),
            B256::repeat_byte(block as u8),
            B256::repeat_byte(block as u8),
            (block, 0, 0),
            at(block as i64),
        )
    }

    #[test]
    fn test_lazy_transfer_and_mint_do_not_double_count() {
        let owner = Address::repeat_byte(1);
        let lazy = OwnershipEvent::new(
            id(owner),
            confirmed(0),
            OwnershipEventBody::LazyTransferTo { value: U256::from(10) },
        );
        let ownership = reduce_lazy(Ownership::empty(id(owner)), &lazy).unwrap();
        assert_eq!(ownership.value, U256::from(10));

        let mint = OwnershipEvent::new(
            id(owner),
            confirmed(1),
            OwnershipEventBody::TransferTo {
                from: Address::ZERO,
                value: U256::from(10),
            },
        );
        let ownership = reduce_forward(ownership, &mint).unwrap();
        assert_eq!(ownership.value, U256::from(10));
        assert_eq!(ownership.lazy_value, U256::ZERO);
    }

    #[test]
    fn test_transfer_out_tombstones() {
        let owner = Address::repeat_byte(1);
        let incoming = OwnershipEvent::new(
            id(owner),
            confirmed(1),
            OwnershipEventBody::TransferTo {
                from: Address::repeat_byte(9),
                value: U256::from(2),
            },
        );
        let outgoing = OwnershipEvent::new(
            id(owner),
            confirmed(2),
            OwnershipEventBody::TransferFrom {
                to: Address::repeat_byte(9),
                value: U256::from(5),
            },
        );
        let ownership = reduce_forward(Ownership::empty(id(owner)), &incoming).unwrap();
        let ownership = reduce_forward(ownership, &outgoing).unwrap();
        assert!(ownership.value.is_zero());
        assert!(ownership.deleted);
    }

    #[test]
    fn test_lazy_stage_rejects_transfers() {
        let owner = Address::repeat_byte(1);
        let event = OwnershipEvent::new(
            id(owner),
            confirmed(1),
            OwnershipEventBody::TransferTo {
                from: Address::ZERO,
                value: U256::from(1),
            },
        );
        assert!(matches!(
            reduce_lazy(Ownership::empty(id(owner)), &event),
            Err(ReduceError::InvalidEventForReducer { .. })
        ));
    }

    #[test]
    fn test_converter_emits_both_sides() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let log = EventLog::new(
            confirmed(1),
            LogData::NftTransfer {
                token: token(),
                token_id: U256::from(1),
                from: a,
                to: b,
                value: U256::from(3),
            },
        );
        let events = OwnershipEventConverter.convert(&log).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].entity_id, id(a));
        assert_eq!(events[1].entity_id, id(b));

        let self_transfer = EventLog::new(
            confirmed(2),
            LogData::NftTransfer {
                token: token(),
                token_id: U256::from(1),
                from: a,
                to: a,
                value: U256::from(3),
            },
        );
        assert!(OwnershipEventConverter.convert(&self_transfer).unwrap().is_empty());
    }

    #[test]
    fn test_converter_splits_lazy_mint_per_creator() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let log = EventLog::lazy(
            LogData::LazyMint {
                token: token(),
                token_id: U256::from(1),
                creators: vec![Part::new(a, 7000), Part::new(b, 3000)],
                value: U256::from(10),
            },
            at(1),
        );
        let events = OwnershipEventConverter.convert(&log).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].body, OwnershipEventBody::LazyTransferTo { value: U256::from(7) });
        assert_eq!(events[1].body, OwnershipEventBody::LazyTransferTo { value: U256::from(3) });
    }
}
