//! RocksDB client implementation

use crate::config::RocksDBConfig;
use crate::core::{EntityKind, IndexerError, IndexerResult, StorageError};
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Column family names
pub struct ColumnFamilies;

impl ColumnFamilies {
    pub const HISTORY: &'static str = "history";
    pub const ITEMS: &'static str = "items";
    pub const OWNERSHIPS: &'static str = "ownerships";
    pub const TOKENS: &'static str = "tokens";
    pub const BALANCES: &'static str = "balances";
    pub const ORDERS: &'static str = "orders";
    pub const OUTBOX: &'static str = "outbox";

    pub const ALL: [&'static str; 7] = [
        Self::HISTORY,
        Self::ITEMS,
        Self::OWNERSHIPS,
        Self::TOKENS,
        Self::BALANCES,
        Self::ORDERS,
        Self::OUTBOX,
    ];

    /// Column family holding snapshots of an entity kind
    pub fn for_kind(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Item => Self::ITEMS,
            EntityKind::Ownership => Self::OWNERSHIPS,
            EntityKind::Token => Self::TOKENS,
            EntityKind::Balance => Self::BALANCES,
            EntityKind::Order => Self::ORDERS,
        }
    }
}

/// RocksDB client for history and entity snapshots
pub struct RocksDBClient {
    db: DB,
}

impl RocksDBClient {
    /// Open RocksDB with the specified configuration
    pub async fn open(config: &RocksDBConfig) -> IndexerResult<Self> {
        let path = &config.path;

        if !path.exists() {
            std::fs::create_dir_all(path)
                .map_err(|e| IndexerError::Storage(StorageError::RocksDB(e.to_string())))?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);

        if config.enable_compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let cfs: Vec<ColumnFamilyDescriptor> = ColumnFamilies::ALL
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_max_write_buffer_number(config.max_write_buffer_number);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        info!("RocksDB opened successfully at: {:?}", path);

        Ok(Self { db })
    }

    fn cf(&self, cf_name: &str) -> IndexerResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(cf_name)
            .ok_or_else(|| IndexerError::Storage(StorageError::MissingColumnFamily(cf_name.to_string())))
    }

    /// Put a value into a column family
    pub fn put<V>(&self, cf_name: &str, key: &[u8], value: &V) -> IndexerResult<()>
    where
        V: Serialize,
    {
        let cf = self.cf(cf_name)?;
        let serialized = bincode::serialize(value)?;
        self.db.put_cf(cf, key, serialized)?;

        debug!("Put key in CF {}: {} bytes", cf_name, key.len());

        Ok(())
    }

    /// Get a value from a column family
    pub fn get<V>(&self, cf_name: &str, key: &[u8]) -> IndexerResult<Option<V>>
    where
        V: for<'de> Deserialize<'de>,
    {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All values whose key starts with `prefix`, in key order
    pub fn scan_prefix<V>(&self, cf_name: &str, prefix: &[u8]) -> IndexerResult<Vec<V>>
    where
        V: for<'de> Deserialize<'de>,
    {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = entry?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(bincode::deserialize(&value)?);
        }
        Ok(values)
    }

    /// Check if database is healthy (can perform basic operations)
    pub fn health_check(&self) -> IndexerResult<()> {
        self.db.property_value("rocksdb.stats")?;
        Ok(())
    }
}
