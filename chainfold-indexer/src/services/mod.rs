//! Application services

pub mod locks;
pub mod pipeline;
pub mod reduce_service;
pub mod token_cache;

pub use locks::EntityLocks;
pub use pipeline::{IndexerPipeline, PipelineReport};
pub use reduce_service::{ReduceService, ReduceServiceSettings};
pub use token_cache::TokenStandardCache;
