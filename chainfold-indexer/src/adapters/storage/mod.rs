//! Storage adapters

pub mod memory;
#[cfg(feature = "rocksdb-storage")]
pub mod rocksdb;

pub use memory::{MemoryEntityRepository, MemoryHistoryRepository, MemoryOutboxRepository};
#[cfg(feature = "rocksdb-storage")]
pub use self::rocksdb::{RocksDBClient, RocksDbStore};
