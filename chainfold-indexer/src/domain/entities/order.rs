//! Exchange order keyed by order hash: fill, cancellation and make stock

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{DecodeError, EntityKind, EventConverter, ReduceError};
use crate::domain::log::{EventLog, LogData};
use crate::domain::reduce::{invalid_event, DomainEvent, Entity, EntityEvent, EventBody, ReducerTable, Stage, Watermarks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Exchange activity seen, but the signed order itself is unknown
    #[default]
    Historical,
    Active,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEventBody {
    /// Signed order version from the order API
    Version {
        maker: Address,
        make_value: U256,
        take_value: U256,
    },
    /// Amount of the take side one match filled
    Match { fill: U256 },
    Cancel,
}

impl EventBody for OrderEventBody {
    fn is_lazy(&self) -> bool {
        matches!(self, OrderEventBody::Version { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            OrderEventBody::Version { .. } => "OrderVersion",
            OrderEventBody::Match { .. } => "OrderMatch",
            OrderEventBody::Cancel => "OrderCancel",
        }
    }
}

pub type OrderEvent = DomainEvent<B256, OrderEventBody>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub hash: B256,
    pub maker: Option<Address>,
    pub make_value: U256,
    pub take_value: U256,
    /// Filled amount, in take units
    pub fill: U256,
    pub cancelled: bool,
    /// Make amount still on offer; zero unless the order is active
    pub make_stock: U256,
    pub status: OrderStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub watermarks: Watermarks,
    pub version: Option<u64>,
}

impl Order {
    fn remaining_make(&self) -> U256 {
        if self.take_value.is_zero() {
            return self.make_value;
        }
        let remaining_take = self.take_value.saturating_sub(self.fill);
        self.make_value.saturating_mul(remaining_take) / self.take_value
    }

    fn refresh(mut self, at: DateTime<Utc>) -> Self {
        self.status = if self.cancelled {
            OrderStatus::Cancelled
        } else if self.maker.is_none() {
            OrderStatus::Historical
        } else if !self.take_value.is_zero() && self.fill >= self.take_value {
            OrderStatus::Filled
        } else {
            OrderStatus::Active
        };
        self.make_stock = match self.status {
            OrderStatus::Active => self.remaining_make(),
            _ => U256::ZERO,
        };
        self.last_updated_at = Some(self.last_updated_at.map_or(at, |last| last.max(at)));
        self
    }
}

impl Entity for Order {
    type Id = B256;
    type Body = OrderEventBody;

    const KIND: EntityKind = EntityKind::Order;

    fn empty(hash: B256) -> Self {
        Self {
            hash,
            maker: None,
            make_value: U256::ZERO,
            take_value: U256::ZERO,
            fill: U256::ZERO,
            cancelled: false,
            make_stock: U256::ZERO,
            status: OrderStatus::Historical,
            created_at: None,
            last_updated_at: None,
            watermarks: Watermarks::default(),
            version: None,
        }
    }

    fn id(&self) -> &B256 {
        &self.hash
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
        false
    }

    fn reducers() -> ReducerTable<Self> {
        ReducerTable {
            lazy: reduce_lazy,
            pending: reduce_pending,
            forward: reduce_forward,
        }
    }
}

// A newer version replaces the terms but keeps fill and cancellation
fn reduce_lazy(mut order: Order, event: &EntityEvent<Order>) -> Result<Order, ReduceError> {
    match &event.body {
        OrderEventBody::Version {
            maker,
            make_value,
            take_value,
        } => {
            order.maker = Some(*maker);
            order.make_value = *make_value;
            order.take_value = *take_value;
            order.created_at.get_or_insert(event.timestamp());
        }
        other => return Err(invalid_event(Stage::Lazy, other)),
    }
    Ok(order.refresh(event.timestamp()))
}

// Matches and cancels only count once mined
fn reduce_pending(order: Order, event: &EntityEvent<Order>) -> Result<Order, ReduceError> {
    match &event.body {
        OrderEventBody::Match { .. } | OrderEventBody::Cancel => Ok(order),
        other => Err(invalid_event(Stage::Pending, other)),
    }
}

fn reduce_forward(mut order: Order, event: &EntityEvent<Order>) -> Result<Order, ReduceError> {
    match &event.body {
        OrderEventBody::Match { fill } => order.fill = order.fill.saturating_add(*fill),
        OrderEventBody::Cancel => order.cancelled = true,
        other => return Err(invalid_event(Stage::Forward, other)),
    }
    Ok(order.refresh(event.timestamp()))
}

/// Maps order API and exchange logs to order events
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderEventConverter;

impl EventConverter<Order> for OrderEventConverter {
    fn convert(&self, log: &EventLog) -> Result<Vec<OrderEvent>, DecodeError> {
        let event = |hash: B256, body: OrderEventBody| OrderEvent::new(hash, log.meta.clone(), body);

        let events = match &log.data {
            LogData::OrderPlaced {
                hash,
                maker,
                make_value,
                take_value,
                ..
            } => vec![event(
                *hash,
                OrderEventBody::Version {
                    maker: *maker,
                    make_value: *make_value,
                    take_value: *take_value,
                },
            )],
            LogData::OrderMatch {
                left_hash,
                right_hash,
                left_fill,
                right_fill,
                ..
            } => {
                let mut events = Vec::with_capacity(2);
                if !left_hash.is_zero() {
                    events.push(event(*left_hash, OrderEventBody::Match { fill: *left_fill }));
                }
                if !right_hash.is_zero() && right_hash != left_hash {
                    events.push(event(*right_hash, OrderEventBody::Match { fill: *right_fill }));
                }
                events
            }
            LogData::OrderCancel { hash, .. } => vec![event(*hash, OrderEventBody::Cancel)],
            _ => Vec::new(),
        };
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainfold_types::LogMeta;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn hash() -> B256 {
        B256::repeat_byte(0x0d)
    }

    fn exchange() -> Address {
        Address::repeat_byte(0xe0)
    }

    fn mined(block: u64) -> LogMeta {
        LogMeta::confirmed(
            exchange(),
            B256::repeat_byte(block as u8),
            B256::repeat_byte(0x80 + block as u8),
            (block, 0, 0),
            at(block as i64 * 10),
        )
    }

    fn placed(make: u64, take: u64, secs: i64) -> Order {
        let placed = EventLog::lazy(
            LogData::OrderPlaced {
                exchange: exchange(),
                hash: hash(),
                maker: Address::repeat_byte(1),
                make_value: U256::from(make),
                take_value: U256::from(take),
            },
            at(secs),
        );
        let events = OrderEventConverter.convert(&placed).unwrap();
        reduce_lazy(Order::empty(hash()), &events[0]).unwrap()
    }

    #[test]
    fn test_version_activates_order_with_full_stock() {
        let order = placed(10, 1_000, 1);
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.make_stock, U256::from(10));
        assert_eq!(order.created_at, Some(at(1)));
    }

    #[test]
    fn test_partial_then_full_fill() {
        let order = placed(10, 1_000, 1);
        let partial = OrderEvent::new(hash(), mined(1), OrderEventBody::Match { fill: U256::from(400) });
        let order = reduce_forward(order, &partial).unwrap();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.make_stock, U256::from(6));

        let rest = OrderEvent::new(hash(), mined(2), OrderEventBody::Match { fill: U256::from(600) });
        let order = reduce_forward(order, &rest).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.make_stock.is_zero());
        assert_eq!(order.last_updated_at, Some(at(20)));
    }

    #[test]
    fn test_cancel_zeroes_stock() {
        let order = placed(10, 1_000, 1);
        let cancel = OrderEvent::new(hash(), mined(1), OrderEventBody::Cancel);
        let order = reduce_forward(order, &cancel).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.make_stock.is_zero());
    }

    #[test]
    fn test_match_without_version_is_historical() {
        let fill = OrderEvent::new(hash(), mined(1), OrderEventBody::Match { fill: U256::from(5) });
        let order = reduce_forward(Order::empty(hash()), &fill).unwrap();
        assert_eq!(order.status, OrderStatus::Historical);
        assert_eq!(order.fill, U256::from(5));
        assert!(order.make_stock.is_zero());
    }

    #[test]
    fn test_pending_match_does_not_fill() {
        let order = placed(10, 1_000, 1);
        let pending = OrderEvent::new(
            hash(),
            LogMeta::pending(exchange(), B256::repeat_byte(3), 0, at(5)),
            OrderEventBody::Match { fill: U256::from(400) },
        );
        assert_eq!(reduce_pending(order.clone(), &pending).unwrap(), order);
    }

    #[test]
    fn test_converter_emits_one_event_per_side() {
        let left = B256::repeat_byte(0x01);
        let right = B256::repeat_byte(0x02);
        let log = EventLog::new(
            mined(1),
            LogData::OrderMatch {
                exchange: exchange(),
                left_hash: left,
                right_hash: right,
                left_fill: U256::from(1),
                right_fill: U256::from(100),
            },
        );
        let events = OrderEventConverter.convert(&log).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].entity_id, left);
        assert_eq!(events[1].body, OrderEventBody::Match { fill: U256::from(100) });

        let adhoc = EventLog::new(
            mined(2),
            LogData::OrderMatch {
                exchange: exchange(),
                left_hash: left,
                right_hash: B256::ZERO,
                left_fill: U256::from(1),
                right_fill: U256::from(100),
            },
        );
        assert_eq!(OrderEventConverter.convert(&adhoc).unwrap().len(), 1);
    }

    #[test]
    fn test_version_outside_lazy_stage_is_rejected() {
        let version = OrderEvent::new(
            hash(),
            mined(1),
            OrderEventBody::Version {
                maker: Address::repeat_byte(1),
                make_value: U256::from(1),
                take_value: U256::from(1),
            },
        );
        assert!(matches!(
            Order::reducers().reduce(Stage::Forward, Order::empty(hash()), &version),
            Err(ReduceError::InvalidEventForReducer { .. })
        ));
    }
}
