//! ERC20 balance of one owner for one token

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{DecodeError, EntityKind, EventConverter, ReduceError};
use crate::domain::log::{EventLog, LogData};
use crate::domain::reduce::{reject_lazy, DomainEvent, Entity, EntityEvent, EventBody, ReducerTable, Watermarks};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceId {
    pub token: Address,
    pub owner: Address,
}

impl BalanceId {
    pub fn new(token: Address, owner: Address) -> Self {
        Self { token, owner }
    }
}

impl fmt::Display for BalanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.token, self.owner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceEventBody {
    IncomeTransfer { from: Address, value: U256 },
    OutcomeTransfer { to: Address, value: U256 },
    Deposit { value: U256 },
    Withdrawal { value: U256 },
}

impl EventBody for BalanceEventBody {
    fn is_lazy(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        match self {
            BalanceEventBody::IncomeTransfer { .. } => "Erc20IncomeTransfer",
            BalanceEventBody::OutcomeTransfer { .. } => "Erc20OutcomeTransfer",
            BalanceEventBody::Deposit { .. } => "Erc20Deposit",
            BalanceEventBody::Withdrawal { .. } => "Erc20Withdrawal",
        }
    }
}

pub type BalanceEvent = DomainEvent<BalanceId, BalanceEventBody>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20Balance {
    pub id: BalanceId,
    pub balance: U256,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub watermarks: Watermarks,
    pub version: Option<u64>,
}

impl Entity for Erc20Balance {
    type Id = BalanceId;
    type Body = BalanceEventBody;

    const KIND: EntityKind = EntityKind::Balance;

    fn empty(id: BalanceId) -> Self {
        Self {
            id,
            balance: U256::ZERO,
            last_updated_at: None,
            watermarks: Watermarks::default(),
            version: None,
        }
    }

    fn id(&self) -> &BalanceId {
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
        false
    }

    fn reducers() -> ReducerTable<Self> {
        ReducerTable {
            lazy: reject_lazy::<Erc20Balance>,
            pending: reduce_pending,
            forward: reduce_forward,
        }
    }
}

// Balances only move on confirmation
fn reduce_pending(balance: Erc20Balance, _event: &EntityEvent<Erc20Balance>) -> Result<Erc20Balance, ReduceError> {
    Ok(balance)
}

fn reduce_forward(mut balance: Erc20Balance, event: &EntityEvent<Erc20Balance>) -> Result<Erc20Balance, ReduceError> {
    balance.balance = match &event.body {
        BalanceEventBody::IncomeTransfer { value, .. } | BalanceEventBody::Deposit { value } => {
            balance.balance.saturating_add(*value)
        }
        BalanceEventBody::OutcomeTransfer { value, .. } | BalanceEventBody::Withdrawal { value } => {
            balance.balance.saturating_sub(*value)
        }
    };
    balance.last_updated_at = Some(event.timestamp());
    Ok(balance)
}

/// Maps ERC20 and wrapped-ether logs to balance events
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceEventConverter;

impl EventConverter<Erc20Balance> for BalanceEventConverter {
    fn convert(&self, log: &EventLog) -> Result<Vec<BalanceEvent>, DecodeError> {
        let event = |token: Address, owner: Address, body: BalanceEventBody| {
            BalanceEvent::new(BalanceId::new(token, owner), log.meta.clone(), body)
        };

        let events = match &log.data {
            LogData::Erc20Transfer {
                token,
                from,
                to,
                value,
            } => {
                if from == to {
                    return Ok(Vec::new());
                }
                let mut events = Vec::with_capacity(2);
                if *from != Address::ZERO {
                    events.push(event(*token, *from, BalanceEventBody::OutcomeTransfer { to: *to, value: *value }));
                }
                if *to != Address::ZERO {
                    events.push(event(*token, *to, BalanceEventBody::IncomeTransfer { from: *from, value: *value }));
                }
                events
            }
            LogData::Erc20Deposit { token, owner, value } => {
                vec![event(*token, *owner, BalanceEventBody::Deposit { value: *value })]
            }
            LogData::Erc20Withdrawal { token, owner, value } => {
                vec![event(*token, *owner, BalanceEventBody::Withdrawal { value: *value })]
            }
            _ => Vec::new(),
        };
        Ok(events)
    }
}
