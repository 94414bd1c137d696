//! Chainfold Indexer Library
//!
//! Folds Ethereum log events into versioned entity snapshots (NFT items,
//! ownerships, collections and ERC20 balances). Every entity is recomputed
//! from its ordered event history, so chain reorganizations are handled by
//! replaying the history that remains once reverted logs are dropped.

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types
pub use config::IndexerConfig;
pub use core::{BatchReport, EntityChange, IndexerError, IndexerResult, UpdateType};
pub use domain::{decode_raw_log, EventLog, LogData, RawLog};
pub use infrastructure::ServiceContainer;
pub use services::{IndexerPipeline, PipelineReport, ReduceService};
