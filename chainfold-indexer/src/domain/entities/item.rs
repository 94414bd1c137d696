//! NFT item: supply, lazy supply, owners and creators of one token id

use alloy_primitives::{Address, U256};
use chainfold_types::{split_by_parts, validate_parts, LogId, Part};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::{DecodeError, EntityKind, EventConverter, ReduceError};
use crate::domain::log::{EventLog, LogData};
use crate::domain::reduce::{invalid_event, DomainEvent, Entity, EntityEvent, EventBody, ReducerTable, Stage, Watermarks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId {
    pub token: Address,
    pub token_id: U256,
}

impl ItemId {
    pub fn new(token: Address, token_id: U256) -> Self {
        Self { token, token_id }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.token, self.token_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemEventBody {
    LazyMint { creators: Vec<Part>, value: U256 },
    LazyBurn { creators: Vec<Part> },
    Mint { owner: Address, value: U256 },
    Burn { owner: Address, value: U256 },
    Transfer { from: Address, to: Address, value: U256 },
    Creators { creators: Vec<Part> },
}

impl EventBody for ItemEventBody {
    fn is_lazy(&self) -> bool {
        matches!(self, ItemEventBody::LazyMint { .. } | ItemEventBody::LazyBurn { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            ItemEventBody::LazyMint { .. } => "ItemLazyMint",
            ItemEventBody::LazyBurn { .. } => "ItemLazyBurn",
            ItemEventBody::Mint { .. } => "ItemMint",
            ItemEventBody::Burn { .. } => "ItemBurn",
            ItemEventBody::Transfer { .. } => "ItemTransfer",
            ItemEventBody::Creators { .. } => "ItemCreators",
        }
    }
}

pub type ItemEvent = DomainEvent<ItemId, ItemEventBody>;

/// Transfer seen in the mempool, not yet reflected in supply or owners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub log_id: LogId,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Total supply including the unminted lazy part
    pub supply: U256,
    pub lazy_supply: U256,
    /// Holders with a non-zero balance
    pub owners: BTreeMap<Address, U256>,
    pub creators: Vec<Part>,
    /// Creators came from a lazy mint or an explicit creators log
    pub creators_final: bool,
    pub pending: Vec<PendingTransfer>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub watermarks: Watermarks,
    pub version: Option<u64>,
}

impl Item {
    pub fn owner_value(&self, owner: &Address) -> U256 {
        self.owners.get(owner).copied().unwrap_or(U256::ZERO)
    }

    fn credit(&mut self, owner: Address, value: U256) {
        if owner == Address::ZERO || value.is_zero() {
            return;
        }
        let entry = self.owners.entry(owner).or_insert(U256::ZERO);
        *entry = entry.saturating_add(value);
    }

    fn debit(&mut self, owner: Address, value: U256) {
        if let Some(current) = self.owners.get_mut(&owner) {
            *current = current.saturating_sub(value);
            if current.is_zero() {
                self.owners.remove(&owner);
            }
        }
    }

    /// Move up to `value` of the lazy supply to `to`, returning the realized amount
    fn realize_lazy(&mut self, to: Address, value: U256) -> U256 {
        let realized = self.lazy_supply.min(value);
        if realized.is_zero() {
            return realized;
        }
        self.lazy_supply -= realized;
        let mut remaining = realized;
        for part in self.creators.clone() {
            if remaining.is_zero() {
                break;
            }
            let take = self.owner_value(&part.account).min(remaining);
            self.debit(part.account, take);
            remaining -= take;
        }
        self.credit(to, realized);
        realized
    }

    fn touch(mut self, event: &ItemEvent) -> Self {
        self.last_updated_at = Some(event.timestamp());
        self.deleted = self.supply.is_zero() && self.pending.is_empty();
        self
    }
}

impl Entity for Item {
    type Id = ItemId;
    type Body = ItemEventBody;

    const KIND: EntityKind = EntityKind::Item;

    fn empty(id: ItemId) -> Self {
        Self {
            id,
            supply: U256::ZERO,
            lazy_supply: U256::ZERO,
            owners: BTreeMap::new(),
            creators: Vec::new(),
            creators_final: false,
            pending: Vec::new(),
            last_updated_at: None,
            deleted: false,
            watermarks: Watermarks::default(),
            version: None,
        }
    }

    fn id(&self) -> &ItemId {
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

fn reduce_lazy(mut item: Item, event: &EntityEvent<Item>) -> Result<Item, ReduceError> {
    match &event.body {
        ItemEventBody::LazyMint { creators, value } => {
            item.supply = item.supply.saturating_add(*value);
            item.lazy_supply = item.lazy_supply.saturating_add(*value);
            for (account, share) in split_by_parts(*value, creators) {
                item.credit(account, share);
            }
            item.creators = creators.clone();
            item.creators_final = true;
        }
        ItemEventBody::LazyBurn { creators } => {
            let lazy = item.lazy_supply;
            for (account, share) in split_by_parts(lazy, creators) {
                item.debit(account, share);
            }
            item.supply = item.supply.saturating_sub(lazy);
            item.lazy_supply = U256::ZERO;
        }
        other => return Err(invalid_event(Stage::Lazy, other)),
    }
    Ok(item.touch(event))
}

fn reduce_pending(mut item: Item, event: &EntityEvent<Item>) -> Result<Item, ReduceError> {
    let (from, to, value) = match &event.body {
        ItemEventBody::Mint { owner, value } => (Address::ZERO, *owner, *value),
        ItemEventBody::Burn { owner, value } => (*owner, Address::ZERO, *value),
        ItemEventBody::Transfer { from, to, value } => (*from, *to, *value),
        ItemEventBody::Creators { .. } => return Ok(item),
        other => return Err(invalid_event(Stage::Pending, other)),
    };
    if !item.pending.iter().any(|p| p.log_id == event.log.id) {
        item.pending.push(PendingTransfer {
            log_id: event.log.id.clone(),
            from,
            to,
            value,
        });
    }
    Ok(item.touch(event))
}

fn reduce_forward(mut item: Item, event: &EntityEvent<Item>) -> Result<Item, ReduceError> {
    match &event.body {
        ItemEventBody::Mint { owner, value } => {
            let realized = item.realize_lazy(*owner, *value);
            let minted = *value - realized;
            item.supply = item.supply.saturating_add(minted);
            item.credit(*owner, minted);
            if item.creators.is_empty() && !item.creators_final {
                item.creators = vec![Part::full(*owner)];
            }
        }
        ItemEventBody::Burn { owner, value } => {
            item.supply = item.supply.saturating_sub(*value);
            item.debit(*owner, *value);
        }
        ItemEventBody::Transfer { from, to, value } => {
            let moved = item.owner_value(from).min(*value);
            item.debit(*from, moved);
            item.credit(*to, moved);
        }
        ItemEventBody::Creators { creators } => {
            item.creators = creators.clone();
            item.creators_final = true;
        }
        other => return Err(invalid_event(Stage::Forward, other)),
    }
    Ok(item.touch(event))
}

/// Maps NFT logs to item events
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemEventConverter;

impl EventConverter<Item> for ItemEventConverter {
    fn convert(&self, log: &EventLog) -> Result<Vec<ItemEvent>, DecodeError> {
        let event = |token: Address, token_id: U256, body: ItemEventBody| {
            vec![ItemEvent::new(ItemId::new(token, token_id), log.meta.clone(), body)]
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
                    Vec::new()
                } else if *from == Address::ZERO {
                    event(*token, *token_id, ItemEventBody::Mint { owner: *to, value: *value })
                } else if *to == Address::ZERO {
                    event(*token, *token_id, ItemEventBody::Burn { owner: *from, value: *value })
                } else {
                    event(
                        *token,
                        *token_id,
                        ItemEventBody::Transfer {
                            from: *from,
                            to: *to,
                            value: *value,
                        },
                    )
                }
            }
            LogData::LazyMint {
                token,
                token_id,
                creators,
                value,
            } => {
                validate_parts(creators)?;
                event(
                    *token,
                    *token_id,
                    ItemEventBody::LazyMint {
                        creators: creators.clone(),
                        value: *value,
                    },
                )
            }
            LogData::LazyBurn {
                token,
                token_id,
                creators,
                ..
            } => {
                validate_parts(creators)?;
                event(
                    *token,
                    *token_id,
                    ItemEventBody::LazyBurn {
                        creators: creators.clone(),
                    },
                )
            }
            LogData::NftCreators {
                token,
                token_id,
                creators,
            } => {
                validate_parts(creators)?;
                event(
                    *token,
                    *token_id,
                    ItemEventBody::Creators {
                        creators: creators.clone(),
                    },
                )
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
    use chainfold_types::{LogMeta, LogStatus};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn id() -> ItemId {
        ItemId::new(Address::repeat_byte(0xee), U256::from(1))
    }

    fn a() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn b() -> Address {
        Address::repeat_byte(0x0b)
    }

    fn confirmed(block: u64, body: ItemEventBody) -> ItemEvent {
        let meta = LogMeta::confirmed(
            id().token,
            B256::repeat_byte(block as u8),
            B256::repeat_byte(block as u8),
            (block, 0, 0),
            at(block as i64 * 10),
        );
        ItemEvent::new(id(), meta, body)
    }

    #[test]
    fn test_lazy_mint_seeds_owners_from_creators() {
        let event = ItemEvent::new(
            id(),
            LogMeta::pending(id().token, B256::ZERO, 0, at(1)).with_status(LogStatus::Confirmed),
            ItemEventBody::LazyMint {
                creators: vec![Part::new(a(), 6000), Part::new(b(), 4000)],
                value: U256::from(10),
            },
        );
        let item = reduce_lazy(Item::empty(id()), &event).unwrap();
        assert_eq!(item.supply, U256::from(10));
        assert_eq!(item.lazy_supply, U256::from(10));
        assert_eq!(item.owner_value(&a()), U256::from(6));
        assert_eq!(item.owner_value(&b()), U256::from(4));
        assert!(item.creators_final);
        assert!(!item.deleted);
    }

    #[test]
    fn test_mint_realizes_lazy_supply_once() {
        let lazy = ItemEvent::new(
            id(),
            LogMeta::pending(id().token, B256::ZERO, 0, at(1)),
            ItemEventBody::LazyMint {
                creators: vec![Part::full(a())],
                value: U256::from(10),
            },
        );
        let item = reduce_lazy(Item::empty(id()), &lazy).unwrap();
        let item = reduce_forward(item, &confirmed(1, ItemEventBody::Mint { owner: a(), value: U256::from(10) })).unwrap();

        assert_eq!(item.supply, U256::from(10));
        assert_eq!(item.lazy_supply, U256::ZERO);
        assert_eq!(item.owner_value(&a()), U256::from(10));
        assert_eq!(item.creators, vec![Part::full(a())]);
    }

    #[test]
    fn test_mint_sets_minter_as_creator() {
        let item = reduce_forward(Item::empty(id()), &confirmed(1, ItemEventBody::Mint { owner: b(), value: U256::from(1) })).unwrap();
        assert_eq!(item.creators, vec![Part::full(b())]);
        assert!(!item.creators_final);
    }

    #[test]
    fn test_burn_to_zero_marks_deleted() {
        let item = reduce_forward(Item::empty(id()), &confirmed(1, ItemEventBody::Mint { owner: a(), value: U256::from(2) })).unwrap();
        let item = reduce_forward(item, &confirmed(2, ItemEventBody::Burn { owner: a(), value: U256::from(2) })).unwrap();
        assert!(item.supply.is_zero());
        assert!(item.owners.is_empty());
        assert!(item.deleted);
    }

    #[test]
    fn test_transfer_removes_emptied_owner() {
        let item = reduce_forward(Item::empty(id()), &confirmed(1, ItemEventBody::Mint { owner: a(), value: U256::from(3) })).unwrap();
        let item = reduce_forward(
            item,
            &confirmed(2, ItemEventBody::Transfer { from: a(), to: b(), value: U256::from(3) }),
        )
        .unwrap();
        assert!(!item.owners.contains_key(&a()));
        assert_eq!(item.owner_value(&b()), U256::from(3));
    }

    #[test]
    fn test_pending_mint_keeps_item_alive() {
        let event = ItemEvent::new(
            id(),
            LogMeta::pending(id().token, B256::repeat_byte(3), 0, at(5)),
            ItemEventBody::Mint { owner: a(), value: U256::from(1) },
        );
        let item = reduce_pending(Item::empty(id()), &event).unwrap();
        assert!(item.supply.is_zero());
        assert_eq!(item.pending.len(), 1);
        assert!(!item.deleted);
    }

    #[test]
    fn test_wrong_stage_is_rejected() {
        let mint = confirmed(1, ItemEventBody::Mint { owner: a(), value: U256::from(1) });
        assert_eq!(
            reduce_lazy(Item::empty(id()), &mint),
            Err(ReduceError::InvalidEventForReducer {
                stage: "lazy".to_string(),
                event: "ItemMint".to_string(),
            })
        );
        let lazy = confirmed(1, ItemEventBody::LazyBurn { creators: vec![Part::full(a())] });
        assert!(reduce_forward(Item::empty(id()), &lazy).is_err());
        assert!(Item::reducers().reduce(Stage::Inactive, Item::empty(id()), &mint).is_err());
    }

    #[test]
    fn test_converter_maps_transfers() {
        let meta = LogMeta::confirmed(id().token, B256::ZERO, B256::ZERO, (1, 0, 0), at(1));
        let transfer = |from: Address, to: Address, value: u64| {
            EventLog::new(
                meta.clone(),
                LogData::NftTransfer {
                    token: id().token,
                    token_id: id().token_id,
                    from,
                    to,
                    value: U256::from(value),
                },
            )
        };
        let converter = ItemEventConverter;

        assert!(converter.convert(&transfer(Address::ZERO, Address::ZERO, 1)).unwrap().is_empty());
        assert!(converter.convert(&transfer(a(), b(), 0)).unwrap().is_empty());
        assert!(converter.convert(&transfer(a(), a(), 1)).unwrap().is_empty());
        assert!(matches!(
            converter.convert(&transfer(Address::ZERO, a(), 1)).unwrap()[0].body,
            ItemEventBody::Mint { .. }
        ));
        assert!(matches!(
            converter.convert(&transfer(a(), Address::ZERO, 1)).unwrap()[0].body,
            ItemEventBody::Burn { .. }
        ));
    }

    #[test]
    fn test_converter_rejects_invalid_creators() {
        let log = EventLog::lazy(
            LogData::LazyMint {
                token: id().token,
                token_id: id().token_id,
                creators: vec![Part::new(a(), 5000)],
                value: U256::from(1),
            },
            at(1),
        );
        assert!(matches!(
            ItemEventConverter.convert(&log),
            Err(DecodeError::InvalidPayload { .. })
        ));
    }
}
