//! Property tests for history folding

use alloy_primitives::{Address, B256, U256};
use chainfold_indexer::adapters::storage::MemoryHistoryRepository;
use chainfold_indexer::core::{EntityKind, EventConverter, HistoryRepository};
use chainfold_indexer::domain::entities::{
    BalanceEventConverter, BalanceId, Erc20Balance, Item, ItemEventConverter, ItemId, Ownership,
    OwnershipEventConverter, OwnershipId,
};
use chainfold_indexer::domain::reduce::{ChainReducer, Entity, EntityChainReducer, ReduceSettings};
use chainfold_indexer::domain::{EventLog, LogData};
use chainfold_types::{LogMeta, LogStatus, Part};
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;

fn token() -> Address {
    Address::repeat_byte(0xe2)
}

fn holder() -> Address {
    Address::repeat_byte(0x01)
}

fn counterparty() -> Address {
    Address::repeat_byte(0x02)
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Deposit(u64),
    Withdrawal(u64),
    Receive(u64),
    Send(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..1_000).prop_map(Op::Deposit),
        (1u64..1_000).prop_map(Op::Withdrawal),
        (1u64..1_000).prop_map(Op::Receive),
        (1u64..1_000).prop_map(Op::Send),
    ]
}

fn to_log(index: usize, op: Op) -> EventLog {
    let block = index as u64 + 1;
    let meta = LogMeta::confirmed(
        token(),
        B256::from(U256::from(block)),
        B256::from(U256::from(block + 1_000_000)),
        (block, 0, 0),
        Utc.timestamp_opt(1_600_000_000 + block as i64, 0).unwrap(),
    );
    let data = match op {
        Op::Deposit(value) => LogData::Erc20Deposit {
            token: token(),
            owner: holder(),
            value: U256::from(value),
        },
        Op::Withdrawal(value) => LogData::Erc20Withdrawal {
            token: token(),
            owner: holder(),
            value: U256::from(value),
        },
        Op::Receive(value) => LogData::Erc20Transfer {
            token: token(),
            from: counterparty(),
            to: holder(),
            value: U256::from(value),
        },
        Op::Send(value) => LogData::Erc20Transfer {
            token: token(),
            from: holder(),
            to: counterparty(),
            value: U256::from(value),
        },
    };
    EventLog::new(meta, data)
}

fn history() -> impl Strategy<Value = Vec<EventLog>> {
    prop::collection::vec(op(), 1..40)
        .prop_map(|ops| ops.into_iter().enumerate().map(|(i, op)| to_log(i, op)).collect())
}

fn collection() -> Address {
    Address::repeat_byte(0xc7)
}

fn token_id() -> U256 {
    U256::from(77)
}

fn creators() -> Vec<Part> {
    vec![Part::new(holder(), 6_000), Part::new(counterparty(), 4_000)]
}

fn party(first: bool) -> Address {
    if first {
        holder()
    } else {
        counterparty()
    }
}

/// One NFT history entry; `bool` picks the holder side
#[derive(Debug, Clone, Copy)]
enum NftOp {
    LazyMint(u64),
    LazyBurn,
    Mint(bool, u64),
    Burn(bool, u64),
    Transfer(bool, u64),
    PendingTransfer(bool, u64),
    PendingMint(bool, u64),
}

fn nft_op() -> impl Strategy<Value = NftOp> {
    prop_oneof![
        (1u64..100).prop_map(NftOp::LazyMint),
        Just(NftOp::LazyBurn),
        (any::<bool>(), 1u64..100).prop_map(|(first, value)| NftOp::Mint(first, value)),
        (any::<bool>(), 1u64..100).prop_map(|(first, value)| NftOp::Burn(first, value)),
        (any::<bool>(), 1u64..100).prop_map(|(first, value)| NftOp::Transfer(first, value)),
        (any::<bool>(), 1u64..100).prop_map(|(first, value)| NftOp::PendingTransfer(first, value)),
        (any::<bool>(), 1u64..100).prop_map(|(first, value)| NftOp::PendingMint(first, value)),
    ]
}

fn nft_transfer(from: Address, to: Address, value: u64) -> LogData {
    LogData::NftTransfer {
        token: collection(),
        token_id: token_id(),
        from,
        to,
        value: U256::from(value),
    }
}

// Every entry gets its own timestamp so lazy ids and pending marks never collide
fn to_nft_log(index: usize, op: NftOp) -> EventLog {
    let at: DateTime<Utc> = Utc.timestamp_opt(1_610_000_000 + index as i64, 0).unwrap();
    let block = index as u64 + 1;
    let confirmed = |data: LogData| {
        EventLog::new(
            LogMeta::confirmed(
                collection(),
                B256::from(U256::from(block)),
                B256::from(U256::from(block + 2_000_000)),
                (block, 0, 0),
                at,
            ),
            data,
        )
    };
    let pending = |data: LogData| {
        EventLog::new(
            LogMeta::pending(collection(), B256::from(U256::from(block + 3_000_000)), 0, at),
            data,
        )
    };
    match op {
        NftOp::LazyMint(value) => EventLog::lazy(
            LogData::LazyMint {
                token: collection(),
                token_id: token_id(),
                creators: creators(),
                value: U256::from(value),
            },
            at,
        ),
        NftOp::LazyBurn => EventLog::lazy(
            LogData::LazyBurn {
                token: collection(),
                token_id: token_id(),
                from: holder(),
                creators: creators(),
                value: U256::ZERO,
            },
            at,
        ),
        NftOp::Mint(first, value) => confirmed(nft_transfer(Address::ZERO, party(first), value)),
        NftOp::Burn(first, value) => confirmed(nft_transfer(party(first), Address::ZERO, value)),
        NftOp::Transfer(first, value) => confirmed(nft_transfer(party(first), party(!first), value)),
        NftOp::PendingTransfer(first, value) => pending(nft_transfer(party(first), party(!first), value)),
        NftOp::PendingMint(first, value) => pending(nft_transfer(Address::ZERO, party(first), value)),
    }
}

fn nft_history() -> impl Strategy<Value = Vec<EventLog>> {
    prop::collection::vec(nft_op(), 1..40)
        .prop_map(|ops| ops.into_iter().enumerate().map(|(i, op)| to_nft_log(i, op)).collect())
}

fn fold_with<E: Entity>(converter: impl EventConverter<E> + 'static, id: &E::Id, logs: &[EventLog]) -> E {
    EntityChainReducer::<E>::new(
        Arc::new(MemoryHistoryRepository::new()),
        Arc::new(converter),
        ReduceSettings::default(),
    )
    .fold(id, logs)
    .expect("nft fold never routes to an invalid stage")
    .entity
}

fn fold_item(logs: &[EventLog]) -> Item {
    fold_with(ItemEventConverter, &ItemId::new(collection(), token_id()), logs)
}

fn fold_ownership(logs: &[EventLog]) -> Ownership {
    fold_with(
        OwnershipEventConverter,
        &OwnershipId::new(collection(), token_id(), holder()),
        logs,
    )
}

fn with_reverts(logs: &[EventLog], mask: &[bool]) -> (Vec<EventLog>, Vec<EventLog>) {
    let marked = logs
        .iter()
        .zip(mask)
        .map(|(log, reverted)| if *reverted { log.clone().with_status(LogStatus::Reverted) } else { log.clone() })
        .collect();
    let kept = logs
        .iter()
        .zip(mask)
        .filter(|(_, reverted)| !**reverted)
        .map(|(log, _)| log.clone())
        .collect();
    (marked, kept)
}

fn reducer() -> EntityChainReducer<Erc20Balance> {
    EntityChainReducer::new(
        Arc::new(MemoryHistoryRepository::new()),
        Arc::new(BalanceEventConverter),
        ReduceSettings::default(),
    )
}

fn fold(logs: &[EventLog]) -> Erc20Balance {
    reducer()
        .fold(&BalanceId::new(token(), holder()), logs)
        .expect("balance fold never routes to an invalid stage")
        .entity
}

proptest! {
    #[test]
    fn prop_delivery_order_is_irrelevant(
        (logs, shuffled) in history().prop_flat_map(|logs| (Just(logs.clone()), Just(logs).prop_shuffle()))
    ) {
        prop_assert_eq!(fold(&logs), fold(&shuffled));
    }

    #[test]
    fn prop_redelivery_is_idempotent(logs in history(), repeats in 1usize..4) {
        let mut doubled = logs.clone();
        for _ in 0..repeats {
            doubled.extend(logs.iter().cloned());
        }
        prop_assert_eq!(fold(&logs), fold(&doubled));
    }

    #[test]
    fn prop_revert_equals_removal(
        (logs, mask) in history().prop_flat_map(|logs| {
            let len = logs.len();
            (Just(logs), prop::collection::vec(any::<bool>(), len))
        })
    ) {
        let marked: Vec<EventLog> = logs
            .iter()
            .zip(&mask)
            .map(|(log, reverted)| if *reverted { log.clone().with_status(LogStatus::Reverted) } else { log.clone() })
            .collect();
        let kept: Vec<EventLog> = logs
            .iter()
            .zip(&mask)
            .filter(|(_, reverted)| !**reverted)
            .map(|(log, _)| log.clone())
            .collect();
        prop_assert_eq!(fold(&marked), fold(&kept));
    }

    #[test]
    fn prop_stored_history_matches_pure_fold(logs in history()) {
        let history = Arc::new(MemoryHistoryRepository::new());
        let reducer = EntityChainReducer::<Erc20Balance>::new(
            history.clone(),
            Arc::new(BalanceEventConverter),
            ReduceSettings::default(),
        );
        let id = BalanceId::new(token(), holder());

        let reduced = tokio_test::block_on(async {
            for log in &logs {
                history.save(EntityKind::Balance, &id.to_string(), log).await?;
            }
            reducer.reduce(&id).await
        });

        prop_assert_eq!(reduced.map(|r| r.entity).ok(), Some(fold(&logs)));
    }

    #[test]
    fn prop_nft_delivery_order_is_irrelevant(
        (logs, shuffled) in nft_history().prop_flat_map(|logs| (Just(logs.clone()), Just(logs).prop_shuffle()))
    ) {
        prop_assert_eq!(fold_item(&logs), fold_item(&shuffled));
        prop_assert_eq!(fold_ownership(&logs), fold_ownership(&shuffled));
    }

    #[test]
    fn prop_nft_redelivery_is_idempotent(logs in nft_history()) {
        let mut doubled = logs.clone();
        doubled.extend(logs.iter().rev().cloned());
        prop_assert_eq!(fold_item(&logs), fold_item(&doubled));
        prop_assert_eq!(fold_ownership(&logs), fold_ownership(&doubled));
    }

    #[test]
    fn prop_nft_revert_equals_removal(
        (logs, mask) in nft_history().prop_flat_map(|logs| {
            let len = logs.len();
            (Just(logs), prop::collection::vec(any::<bool>(), len))
        })
    ) {
        let (marked, kept) = with_reverts(&logs, &mask);
        prop_assert_eq!(fold_item(&marked), fold_item(&kept));
        prop_assert_eq!(fold_ownership(&marked), fold_ownership(&kept));
    }
}
