/// Shared types for the chainfold reduction engine
/// 
/// This crate provides the chain-level primitives (log identity, status,
/// chain ordering and creator shares) used by the indexer, its storage
/// backends and anything that feeds logs into it.

pub mod errors;
pub mod log;
pub mod part;

// Re-export all public types
pub use errors::*;
pub use log::*;
pub use part::*;

pub use alloy_primitives::{Address, B256, U256};
