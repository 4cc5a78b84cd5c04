//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `balances` - User balances (key: user_id)
//! - `transactions` - Append-only transaction log (key: transaction_id)
//! - `markets` - Markets with option counters (key: market_id)
//! - `commitments` - Stakes (key: commitment_id)
//! - `resolutions` - Declared outcomes (key: resolution_id)
//! - `distributions` - Per-user payout records (key: resolution_id || user_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! # Atomic units
//!
//! Writers collect typed puts into an [`AtomicUnit`] (a `WriteBatch`
//! wrapper) together with optimistic version guards. [`AtomicUnit::commit`]
//! validates every guard under a short commit gate and writes the whole
//! batch, or fails with `VersionConflict` leaving nothing observed.

use crate::{
    error::{Error, Result},
    types::{
        Commitment, Market, PayoutDistribution, Resolution, TokenTransaction, UserBalance, UserId,
    },
    Config,
};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_BALANCES: &str = "balances";
const CF_TRANSACTIONS: &str = "transactions";
const CF_MARKETS: &str = "markets";
const CF_COMMITMENTS: &str = "commitments";
const CF_RESOLUTIONS: &str = "resolutions";
const CF_DISTRIBUTIONS: &str = "distributions";
const CF_INDICES: &str = "indices";

/// Index key tags
const IDX_USER_TX: u8 = 0x01;
const IDX_MARKET_COMMITMENT: u8 = 0x02;
const IDX_USER_COMMITMENT: u8 = 0x03;
const IDX_MARKET_RESOLUTION: u8 = 0x04;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,

    /// Serializes guard validation + batch write
    commit_gate: Mutex<()>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for write-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_append_only()),
            ColumnFamilyDescriptor::new(CF_MARKETS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_COMMITMENTS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_RESOLUTIONS, Self::cf_options_append_only()),
            ColumnFamilyDescriptor::new(CF_DISTRIBUTIONS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self {
            db: Arc::new(db),
            commit_gate: Mutex::new(()),
        })
    }

    // Column family options

    fn cf_options_hot() -> Options {
        let mut opts = Options::default();
        // Frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_append_only() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Balance operations

    /// Get balance by user, if one exists
    pub fn get_balance(&self, user_id: &UserId) -> Result<Option<UserBalance>> {
        let cf = self.cf_handle(CF_BALANCES)?;
        match self.db.get_cf(cf, user_id.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Transaction log operations

    /// Get transaction by ID
    pub fn get_transaction(&self, transaction_id: Uuid) -> Result<TokenTransaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, transaction_id.as_bytes())?
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Get a user's transactions ordered by timestamp (via index)
    pub fn transactions_for_user(
        &self,
        user_id: &UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TokenTransaction>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = index_prefix_user(IDX_USER_TX, user_id);

        let iter = self.db.prefix_iterator_cf(cf_indices, &prefix);

        let mut transactions = Vec::new();
        for item in iter.skip(offset) {
            if transactions.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            // Last 16 bytes = transaction_id
            if key.len() >= 16 {
                let id_bytes: [u8; 16] = key[key.len() - 16..].try_into().unwrap_or([0u8; 16]);
                transactions.push(self.get_transaction(Uuid::from_bytes(id_bytes))?);
            }
        }

        Ok(transactions)
    }

    // Market operations

    /// Get market by ID
    pub fn get_market(&self, market_id: Uuid) -> Result<Market> {
        let cf = self.cf_handle(CF_MARKETS)?;
        let value = self
            .db
            .get_cf(cf, market_id.as_bytes())?
            .ok_or_else(|| Error::MarketNotFound(market_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Paginated scan of all markets (unordered)
    pub fn markets(&self, offset: usize, limit: usize) -> Result<Vec<Market>> {
        let cf = self.cf_handle(CF_MARKETS)?;
        let iter = self.db.iterator_cf(cf, rocksdb::IteratorMode::Start);

        let mut markets = Vec::new();
        for item in iter.skip(offset) {
            if markets.len() >= limit {
                break;
            }
            let (_, value) = item?;
            markets.push(bincode::deserialize(&value)?);
        }

        Ok(markets)
    }

    // Commitment operations

    /// Get commitment by ID
    pub fn get_commitment(&self, commitment_id: Uuid) -> Result<Commitment> {
        let cf = self.cf_handle(CF_COMMITMENTS)?;
        let value = self
            .db
            .get_cf(cf, commitment_id.as_bytes())?
            .ok_or_else(|| Error::CommitmentNotFound(commitment_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// All commitments on a market (via index)
    pub fn commitments_for_market(&self, market_id: Uuid) -> Result<Vec<Commitment>> {
        self.commitments_for_market_page(market_id, 0, usize::MAX)
    }

    /// Paginated commitments on a market
    pub fn commitments_for_market_page(
        &self,
        market_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Commitment>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let mut prefix = vec![IDX_MARKET_COMMITMENT];
        prefix.extend_from_slice(market_id.as_bytes());

        let iter = self.db.prefix_iterator_cf(cf_indices, &prefix);

        let mut commitments = Vec::new();
        for item in iter.skip(offset) {
            if commitments.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() == prefix.len() + 16 {
                let id_bytes: [u8; 16] = key[prefix.len()..].try_into().unwrap_or([0u8; 16]);
                commitments.push(self.get_commitment(Uuid::from_bytes(id_bytes))?);
            }
        }

        Ok(commitments)
    }

    /// All commitments by a user (via index)
    pub fn commitments_for_user(&self, user_id: &UserId) -> Result<Vec<Commitment>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = index_prefix_user(IDX_USER_COMMITMENT, user_id);

        let iter = self.db.prefix_iterator_cf(cf_indices, &prefix);

        let mut commitments = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() == prefix.len() + 16 {
                let id_bytes: [u8; 16] = key[prefix.len()..].try_into().unwrap_or([0u8; 16]);
                commitments.push(self.get_commitment(Uuid::from_bytes(id_bytes))?);
            }
        }

        Ok(commitments)
    }

    // Resolution operations

    /// Get resolution by ID
    pub fn get_resolution(&self, resolution_id: Uuid) -> Result<Resolution> {
        let cf = self.cf_handle(CF_RESOLUTIONS)?;
        let value = self
            .db
            .get_cf(cf, resolution_id.as_bytes())?
            .ok_or_else(|| Error::ResolutionNotFound(resolution_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Resolution for a market, if one was recorded
    pub fn resolution_for_market(&self, market_id: Uuid) -> Result<Option<Resolution>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let mut prefix = vec![IDX_MARKET_RESOLUTION];
        prefix.extend_from_slice(market_id.as_bytes());

        let iter = self.db.prefix_iterator_cf(cf_indices, &prefix);

        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() == prefix.len() + 16 {
                let id_bytes: [u8; 16] = key[prefix.len()..].try_into().unwrap_or([0u8; 16]);
                return Ok(Some(self.get_resolution(Uuid::from_bytes(id_bytes))?));
            }
        }

        Ok(None)
    }

    // Distribution operations

    /// Get a user's distribution for a resolution, if recorded
    pub fn get_distribution(
        &self,
        resolution_id: Uuid,
        user_id: &UserId,
    ) -> Result<Option<PayoutDistribution>> {
        let cf = self.cf_handle(CF_DISTRIBUTIONS)?;
        let key = distribution_key(resolution_id, user_id);
        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// All distributions recorded for a resolution
    pub fn distributions_for_resolution(
        &self,
        resolution_id: Uuid,
    ) -> Result<Vec<PayoutDistribution>> {
        let cf = self.cf_handle(CF_DISTRIBUTIONS)?;
        let prefix = resolution_id.as_bytes().to_vec();

        let iter = self.db.prefix_iterator_cf(cf, &prefix);

        let mut distributions = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            distributions.push(bincode::deserialize(&value)?);
        }

        Ok(distributions)
    }

    // Atomic units

    /// Begin an atomic write unit
    pub fn begin_unit(&self) -> AtomicUnit<'_> {
        AtomicUnit {
            storage: self,
            batch: WriteBatch::default(),
            guards: Vec::new(),
        }
    }

    fn check_guard(&self, guard: &VersionGuard) -> Result<()> {
        match guard {
            VersionGuard::Balance { user_id, expected } => {
                let current = self.get_balance(user_id)?.map(|b| b.version);
                if current != *expected {
                    return Err(Error::VersionConflict(format!(
                        "balance {} expected version {:?}, found {:?}",
                        user_id, expected, current
                    )));
                }
            }
            VersionGuard::Market {
                market_id,
                expected,
            } => {
                let current = self.get_market(*market_id)?.version;
                if current != *expected {
                    return Err(Error::VersionConflict(format!(
                        "market {} expected version {}, found {}",
                        market_id, expected, current
                    )));
                }
            }
        }
        Ok(())
    }

    /// Get storage statistics (approximate, fast)
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_balances: self.approximate_count(CF_BALANCES)?,
            total_transactions: self.approximate_count(CF_TRANSACTIONS)?,
            total_markets: self.approximate_count(CF_MARKETS)?,
            total_commitments: self.approximate_count(CF_COMMITMENTS)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

/// Optimistic version guard validated at commit time
#[derive(Debug, Clone)]
enum VersionGuard {
    /// Balance must still hold the expected version (`None` = must not exist)
    Balance {
        user_id: UserId,
        expected: Option<u64>,
    },
    /// Market must still hold the expected version
    Market { market_id: Uuid, expected: u64 },
}

/// A collection of typed puts plus version guards, committed atomically
///
/// A failed commit leaves balance, transaction log, commitments, and market
/// counters fully unchanged — no partial write is ever observed.
pub struct AtomicUnit<'a> {
    storage: &'a Storage,
    batch: WriteBatch,
    guards: Vec<VersionGuard>,
}

impl<'a> AtomicUnit<'a> {
    /// Stage a balance write
    pub fn put_balance(&mut self, balance: &UserBalance) -> Result<()> {
        let cf = self.storage.cf_handle(CF_BALANCES)?;
        let value = bincode::serialize(balance)?;
        self.batch
            .put_cf(cf, balance.user_id.as_str().as_bytes(), &value);
        Ok(())
    }

    /// Guard on a balance's stored version (`None` = must not exist yet)
    ///
    /// At most one guard per user; later guards for the same user are
    /// ignored so multi-mutation units keep the version read first.
    pub fn guard_balance(&mut self, user_id: &UserId, expected: Option<u64>) {
        let already = self.guards.iter().any(|g| {
            matches!(g, VersionGuard::Balance { user_id: u, .. } if u == user_id)
        });
        if !already {
            self.guards.push(VersionGuard::Balance {
                user_id: user_id.clone(),
                expected,
            });
        }
    }

    /// Stage a transaction-log append with its user+timestamp index
    pub fn put_transaction(&mut self, transaction: &TokenTransaction) -> Result<()> {
        let cf = self.storage.cf_handle(CF_TRANSACTIONS)?;
        let value = bincode::serialize(transaction)?;
        self.batch
            .put_cf(cf, transaction.transaction_id.as_bytes(), &value);

        let cf_indices = self.storage.cf_handle(CF_INDICES)?;
        let mut key = index_prefix_user(IDX_USER_TX, &transaction.user_id);
        let nanos = transaction.timestamp.timestamp_nanos_opt().unwrap_or(0);
        key.extend_from_slice(&(nanos as u64).to_be_bytes());
        key.extend_from_slice(transaction.transaction_id.as_bytes());
        self.batch.put_cf(cf_indices, &key, []);

        Ok(())
    }

    /// Stage a market write
    pub fn put_market(&mut self, market: &Market) -> Result<()> {
        let cf = self.storage.cf_handle(CF_MARKETS)?;
        let value = bincode::serialize(market)?;
        self.batch.put_cf(cf, market.market_id.as_bytes(), &value);
        Ok(())
    }

    /// Guard on a market's stored version
    pub fn guard_market(&mut self, market_id: Uuid, expected: u64) {
        let already = self.guards.iter().any(|g| {
            matches!(g, VersionGuard::Market { market_id: m, .. } if *m == market_id)
        });
        if !already {
            self.guards.push(VersionGuard::Market {
                market_id,
                expected,
            });
        }
    }

    /// Stage a commitment write with its market and user indices
    pub fn put_commitment(&mut self, commitment: &Commitment) -> Result<()> {
        let cf = self.storage.cf_handle(CF_COMMITMENTS)?;
        let value = bincode::serialize(commitment)?;
        self.batch
            .put_cf(cf, commitment.commitment_id.as_bytes(), &value);

        let cf_indices = self.storage.cf_handle(CF_INDICES)?;

        let mut market_key = vec![IDX_MARKET_COMMITMENT];
        market_key.extend_from_slice(commitment.market_id.as_bytes());
        market_key.extend_from_slice(commitment.commitment_id.as_bytes());
        self.batch.put_cf(cf_indices, &market_key, []);

        let mut user_key = index_prefix_user(IDX_USER_COMMITMENT, &commitment.user_id);
        user_key.extend_from_slice(commitment.commitment_id.as_bytes());
        self.batch.put_cf(cf_indices, &user_key, []);

        Ok(())
    }

    /// Stage a resolution write with its market index
    pub fn put_resolution(&mut self, resolution: &Resolution) -> Result<()> {
        let cf = self.storage.cf_handle(CF_RESOLUTIONS)?;
        let value = bincode::serialize(resolution)?;
        self.batch
            .put_cf(cf, resolution.resolution_id.as_bytes(), &value);

        let cf_indices = self.storage.cf_handle(CF_INDICES)?;
        let mut key = vec![IDX_MARKET_RESOLUTION];
        key.extend_from_slice(resolution.market_id.as_bytes());
        key.extend_from_slice(resolution.resolution_id.as_bytes());
        self.batch.put_cf(cf_indices, &key, []);

        Ok(())
    }

    /// Stage a distribution write
    pub fn put_distribution(&mut self, distribution: &PayoutDistribution) -> Result<()> {
        let cf = self.storage.cf_handle(CF_DISTRIBUTIONS)?;
        let value = bincode::serialize(distribution)?;
        let key = distribution_key(distribution.resolution_id, &distribution.user_id);
        self.batch.put_cf(cf, &key, &value);
        Ok(())
    }

    /// Validate guards and write the whole unit atomically
    pub fn commit(self) -> Result<()> {
        let _gate = self.storage.commit_gate.lock();

        for guard in &self.guards {
            self.storage.check_guard(guard)?;
        }

        self.storage.db.write(self.batch)?;
        Ok(())
    }
}

impl std::fmt::Debug for AtomicUnit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicUnit")
            .field("guards", &self.guards.len())
            .finish_non_exhaustive()
    }
}

// Key helpers

fn index_prefix_user(tag: u8, user_id: &UserId) -> Vec<u8> {
    let mut key = vec![tag];
    key.extend_from_slice(user_id.as_str().as_bytes());
    key.push(0x00); // Separator keeps user prefixes unambiguous
    key
}

fn distribution_key(resolution_id: Uuid, user_id: &UserId) -> Vec<u8> {
    let mut key = resolution_id.as_bytes().to_vec();
    key.extend_from_slice(user_id.as_str().as_bytes());
    key
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate balance rows
    pub total_balances: u64,
    /// Approximate transaction rows
    pub total_transactions: u64,
    /// Approximate market rows
    pub total_markets: u64,
    /// Approximate commitment rows
    pub total_commitments: u64,
}
