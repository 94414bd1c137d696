//! Domain layer: log model, ABI decoding, reduction framework and entities

pub mod abi;
pub mod entities;
pub mod log;
pub mod reduce;

pub use abi::decode_raw_log;
pub use log::{chain_order, sort_history, EventLog, LogData, RawLog, TokenStandard};
