//! RocksDB storage adapter

pub mod client;
pub mod store;

pub use client::{ColumnFamilies, RocksDBClient};
pub use store::RocksDbStore;
