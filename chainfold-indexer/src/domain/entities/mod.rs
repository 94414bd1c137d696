//! Materialized entities with their events, stage reducers and converters

pub mod balance;
pub mod item;
pub mod order;
pub mod ownership;
pub mod token;

pub use balance::{BalanceEvent, BalanceEventBody, BalanceEventConverter, BalanceId, Erc20Balance};
pub use item::{Item, ItemEvent, ItemEventBody, ItemEventConverter, ItemId, PendingTransfer};
pub use order::{Order, OrderEvent, OrderEventBody, OrderEventConverter, OrderStatus};
pub use ownership::{Ownership, OwnershipEvent, OwnershipEventBody, OwnershipEventConverter, OwnershipId};
pub use token::{Token, TokenEvent, TokenEventBody, TokenEventConverter, TokenStatus};
