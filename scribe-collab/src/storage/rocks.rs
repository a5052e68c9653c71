//! RocksDB-backed durable store.
//!
//! Column families:
//! - `snapshots` — latest `DocSnapshot` per document (keyed by doc_id)
//! - `log`       — every accepted update (keyed by doc_id:base_version)
//! - `history`   — compressed updates (keyed by doc_id:version)
//! - `metadata`  — per-document counters and timestamps (keyed by doc_id)
//!
//! Values are bincode-encoded, then LZ4 compressed with a size prefix.
//! Version keys are big-endian so a prefix scan returns a document's
//! entries in version order.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

use scribe_ot::{DocSnapshot, Update};

use super::{DurableStore, StoreError};

const CF_SNAPSHOTS: &str = "snapshots";
const CF_LOG: &str = "log";
const CF_HISTORY: &str = "history";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_SNAPSHOTS, CF_LOG, CF_HISTORY, CF_METADATA];

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 256MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync on every write
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 64MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("scribe_data"),
            block_cache_size: 256 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Small caches, caller-provided directory.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// Per-document bookkeeping stored alongside the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub doc_id: Uuid,
    /// Version of the saved snapshot
    pub snapshot_version: u64,
    /// Highest version reached by a logged update
    pub log_version: u64,
    /// Total log appends (including idempotent rewrites)
    pub log_count: u64,
    /// Uncompressed snapshot size in bytes
    pub snapshot_size: u64,
    /// Compressed snapshot size in bytes
    pub compressed_size: u64,
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
    /// Last modified timestamp (seconds since epoch)
    pub updated_at: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl DocumentMetadata {
    fn new(doc_id: Uuid) -> Self {
        let now = now_secs();
        Self {
            doc_id,
            snapshot_version: 0,
            log_version: 0,
            log_count: 0,
            snapshot_size: 0,
            compressed_size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(meta)
    }
}

/// Bincode-encode then LZ4 compress.
fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let raw = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&raw))
}

fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let raw = lz4_flex::decompress_size_prepended(bytes).map_err(|e| StoreError::Compression(e.to_string()))?;
    let (value, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    Ok(value)
}

/// RocksDB-backed store.
pub struct RocksStore {
    /// Single-threaded column family mode; callers serialize per document
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksStore {
    /// Open the store, creating the database and column families if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.set_max_total_wal_size(128 * 1024 * 1024);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(&db_opts, &config.path, cf_descriptors)?;
        log::info!("Opened document store at {}", config.path.display());

        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_SNAPSHOTS | CF_METADATA => {
                // Point lookups by doc_id
                opts.set_max_write_buffer_number(2);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_LOG => {
                // Many small appends, prefix-scanned by doc_id
                opts.set_max_write_buffer_number(4);
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
            }
            CF_HISTORY => {
                opts.set_max_write_buffer_number(2);
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
            }
            _ => {}
        }

        opts
    }

    // ─── Metadata ─────────────────────────────────────────────────────

    /// Load a document's metadata.
    pub fn load_metadata(&self, doc_id: Uuid) -> Result<DocumentMetadata, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(cf, doc_id.as_bytes())? {
            Some(bytes) => DocumentMetadata::decode(&bytes),
            None => Err(StoreError::NotFound(doc_id)),
        }
    }

    fn metadata_or_new(&self, doc_id: Uuid) -> Result<DocumentMetadata, StoreError> {
        match self.load_metadata(doc_id) {
            Ok(meta) => Ok(meta),
            Err(StoreError::NotFound(_)) => Ok(DocumentMetadata::new(doc_id)),
            Err(e) => Err(e),
        }
    }

    /// Force a memtable flush to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    /// Version key: doc_id (16 bytes) + version (8 bytes big-endian).
    fn version_key(doc_id: Uuid, version: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(doc_id.as_bytes());
        key.extend_from_slice(&version.to_be_bytes());
        key
    }

    fn key_version(key: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&key[16..24]);
        u64::from_be_bytes(buf)
    }

    /// Raw entries of `doc_id` in `cf_name` with versions in `from..to`.
    fn scan(&self, cf_name: &str, doc_id: Uuid, from: u64, to: u64) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, StoreError> {
        let cf = self.cf(cf_name)?;
        let start_key = Self::version_key(doc_id, from);

        let mut entries = Vec::new();
        let iter = self.db.iterator_cf(cf, IteratorMode::From(&start_key, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if key.len() < 24 || &key[..16] != doc_id.as_bytes() {
                break;
            }
            if Self::key_version(&key) >= to {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Newest entry of `doc_id` in `cf_name`.
    fn last_entry(&self, cf_name: &str, doc_id: Uuid) -> Result<Option<(Box<[u8]>, Box<[u8]>)>, StoreError> {
        let cf = self.cf(cf_name)?;
        let end_key = Self::version_key(doc_id, u64::MAX);
        let mut iter = self.db.iterator_cf(cf, IteratorMode::From(&end_key, Direction::Reverse));
        match iter.next() {
            Some(item) => {
                let (key, value) = item?;
                if key.len() < 24 || &key[..16] != doc_id.as_bytes() {
                    return Ok(None);
                }
                Ok(Some((key, value)))
            }
            None => Ok(None),
        }
    }
}

impl DurableStore for RocksStore {
    fn load(&self, doc_id: Uuid) -> Result<Option<DocSnapshot>, StoreError> {
        let cf = self.cf(CF_SNAPSHOTS)?;
        match self.db.get_cf(cf, doc_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode_value(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &DocSnapshot) -> Result<(), StoreError> {
        let cf_snap = self.cf(CF_SNAPSHOTS)?;
        let cf_meta = self.cf(CF_METADATA)?;
        let compressed = encode_value(snapshot)?;

        let mut meta = self.metadata_or_new(snapshot.doc_id)?;
        meta.snapshot_version = snapshot.version;
        meta.snapshot_size = snapshot.lines.iter().map(|l| l.len() as u64 + 1).sum();
        meta.compressed_size = compressed.len() as u64;
        meta.updated_at = now_secs();

        // Snapshot and metadata land together.
        let mut batch = WriteBatch::default();
        batch.put_cf(cf_snap, snapshot.doc_id.as_bytes(), &compressed);
        batch.put_cf(cf_meta, snapshot.doc_id.as_bytes(), meta.encode()?);
        self.write(batch)
    }

    fn append_to_log(&self, update: &Update) -> Result<(), StoreError> {
        let cf_log = self.cf(CF_LOG)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let mut meta = self.metadata_or_new(update.doc_id)?;
        meta.log_version = meta.log_version.max(update.resulting_version());
        meta.log_count += 1;
        meta.updated_at = now_secs();

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_log, Self::version_key(update.doc_id, update.version), encode_value(update)?);
        batch.put_cf(cf_meta, update.doc_id.as_bytes(), meta.encode()?);
        self.write(batch)
    }

    fn read_log(&self, doc_id: Uuid, from: u64, to: u64) -> Result<Vec<Update>, StoreError> {
        self.scan(CF_LOG, doc_id, from, to)?
            .iter()
            .map(|(_, value)| decode_value(value))
            .collect()
    }

    fn append_history(&self, doc_id: Uuid, updates: &[Update], replace_last: bool) -> Result<(), StoreError> {
        let cf = self.cf(CF_HISTORY)?;
        let mut batch = WriteBatch::default();
        if replace_last {
            if let Some((key, _)) = self.last_entry(CF_HISTORY, doc_id)? {
                batch.delete_cf(cf, key);
            }
        }
        for update in updates {
            batch.put_cf(cf, Self::version_key(doc_id, update.version), encode_value(update)?);
        }
        self.write(batch)
    }

    fn read_history(&self, doc_id: Uuid) -> Result<Vec<Update>, StoreError> {
        self.scan(CF_HISTORY, doc_id, 0, u64::MAX)?
            .iter()
            .map(|(_, value)| decode_value(value))
            .collect()
    }

    fn last_history_entry(&self, doc_id: Uuid) -> Result<Option<Update>, StoreError> {
        self.last_entry(CF_HISTORY, doc_id)?
            .map(|(_, value)| decode_value(&value))
            .transpose()
    }

    fn list_documents(&self) -> Result<Vec<Uuid>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let mut doc_ids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            if key.len() == 16 {
                let bytes = <[u8; 16]>::try_from(&key[..])
                    .map_err(|_| StoreError::Deserialization("Invalid UUID key".into()))?;
                doc_ids.push(Uuid::from_bytes(bytes));
            }
        }
        Ok(doc_ids)
    }

    fn delete_document(&self, doc_id: Uuid) -> Result<(), StoreError> {
        let cf_snap = self.cf(CF_SNAPSHOTS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(cf_snap, doc_id.as_bytes());
        batch.delete_cf(cf_meta, doc_id.as_bytes());
        for cf_name in [CF_LOG, CF_HISTORY] {
            let cf = self.cf(cf_name)?;
            for (key, _) in self.scan(cf_name, doc_id, 0, u64::MAX)? {
                batch.delete_cf(cf, key);
            }
        }

        self.db.write(batch)?;
        log::info!("Deleted document {doc_id} from store");
        Ok(())
    }
}

/// Number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
