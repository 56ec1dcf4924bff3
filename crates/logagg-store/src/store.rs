//! RocksDB-backed store with one column family per partition.
//!
//! The store owns the only database handle. Partitions are column families:
//! the set of names is read back from the on-disk catalog on open, and new
//! partitions are created on first use.
//!
//! # Concurrency
//!
//! `PartitionedStore` is `Send + Sync`. Reads and writes share the handle
//! through a read lock; `close()` takes the write lock and drops it.
//! Partition creation is serialized by `create_lock` and double-checked, and
//! the in-memory catalog is updated only after `create_cf` succeeded.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::key::StoreKey;
use logagg_common::DEFAULT_PARTITION;
use parking_lot::{Mutex, RwLock};
use rocksdb::{DBWithThreadMode, IteratorMode, MultiThreaded, Options, WriteOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type Db = DBWithThreadMode<MultiThreaded>;

/// Handle to a partition returned by [`PartitionedStore::get_or_create_partition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHandle {
    name: String,
    created: bool,
}

impl PartitionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if this call created the partition.
    pub fn was_created(&self) -> bool {
        self.created
    }
}

/// Persistent key/value store partitioned by column family.
pub struct PartitionedStore {
    path: PathBuf,
    config: StoreConfig,
    db: RwLock<Option<Db>>,
    catalog: RwLock<BTreeSet<String>>,
    create_lock: Mutex<()>,
}

impl PartitionedStore {
    /// Open (or create) a store with default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Open (or create) a store, reopening every partition already on disk.
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |message: String| StoreError::Open {
            path: path.clone(),
            message,
        };

        if config.create_if_missing {
            fs::create_dir_all(&path).map_err(|e| open_err(e.to_string()))?;
        }

        let options = db_options(&config);
        let names = if path.join("CURRENT").exists() {
            Db::list_cf(&options, &path).map_err(|e| open_err(format!("reading catalog: {e}")))?
        } else if config.create_if_missing {
            vec![DEFAULT_PARTITION.to_string()]
        } else {
            return Err(open_err("no store found".to_string()));
        };

        let db = Db::open_cf(&options, &path, &names).map_err(|e| open_err(e.to_string()))?;
        info!(
            path = %path.display(),
            partitions = names.len(),
            wal = !config.disable_wal,
            "store opened"
        );

        Ok(Self {
            path,
            config,
            db: RwLock::new(Some(db)),
            catalog: RwLock::new(names.into_iter().collect()),
            create_lock: Mutex::new(()),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    /// Sorted names of all known partitions, `default` included.
    pub fn partitions(&self) -> Result<Vec<String>> {
        self.with_db(|_| Ok(self.catalog.read().iter().cloned().collect()))
    }

    pub fn has_partition(&self, name: &str) -> bool {
        self.catalog.read().contains(name)
    }

    /// Return the partition named `name`, creating it if needed.
    pub fn get_or_create_partition(&self, name: &str) -> Result<PartitionHandle> {
        self.with_db(|db| {
            if self.has_partition(name) {
                return Ok(existing(name));
            }

            let _guard = self.create_lock.lock();
            if self.has_partition(name) {
                return Ok(existing(name));
            }

            db.create_cf(name, &Options::default())
                .map_err(|e| StoreError::rocksdb("create_cf", name, e))?;
            self.catalog.write().insert(name.to_string());
            info!(partition = name, "partition created");

            Ok(PartitionHandle {
                name: name.to_string(),
                created: true,
            })
        })
    }

    /// Write `value` under `key`, creating the partition if absent.
    pub fn put<K, V>(&self, partition: &str, key: &K, value: &V) -> Result<()>
    where
        K: StoreKey,
        V: Serialize,
    {
        self.get_or_create_partition(partition)?;
        let key_bytes = key.to_key_bytes()?;
        let value_bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::codec(partition, e))?;

        self.with_db(|db| {
            let cf = db
                .cf_handle(partition)
                .ok_or_else(|| StoreError::PartitionNotFound(partition.to_string()))?;
            db.put_cf_opt(&cf, key_bytes, value_bytes, &self.write_options())
                .map_err(|e| StoreError::rocksdb("put", partition, e))
        })
    }

    /// Read the value stored under `key`.
    pub fn get<K, V>(&self, partition: &str, key: &K) -> Result<V>
    where
        K: StoreKey,
        V: DeserializeOwned,
    {
        let key_bytes = key.to_key_bytes()?;
        self.with_db(|db| {
            let cf = db
                .cf_handle(partition)
                .ok_or_else(|| StoreError::PartitionNotFound(partition.to_string()))?;
            let bytes = db
                .get_cf(&cf, &key_bytes)
                .map_err(|e| StoreError::rocksdb("get", partition, e))?
                .ok_or_else(|| StoreError::NotFound {
                    partition: partition.to_string(),
                    key: format!("{key:?}"),
                })?;
            serde_json::from_slice(&bytes).map_err(|e| StoreError::codec(partition, e))
        })
    }

    /// Every record in the partition, in key order.
    ///
    /// A partition that was never created is empty, not an error.
    pub fn list_all<K, V>(&self, partition: &str) -> Result<Vec<(K, V)>>
    where
        K: StoreKey,
        V: DeserializeOwned,
    {
        self.list_raw(partition)?
            .into_iter()
            .map(|(key, value)| {
                let key = K::from_key_bytes(&key)?;
                let value =
                    serde_json::from_slice(&value).map_err(|e| StoreError::codec(partition, e))?;
                Ok((key, value))
            })
            .collect()
    }

    /// Every record in the partition as stored bytes, in key order.
    pub fn list_raw(&self, partition: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.with_db(|db| {
            let Some(cf) = db.cf_handle(partition) else {
                return Ok(Vec::new());
            };
            db.iterator_cf(&cf, IteratorMode::Start)
                .map(|item| {
                    item.map(|(k, v)| (k.into_vec(), v.into_vec()))
                        .map_err(|e| StoreError::rocksdb("iterate", partition, e))
                })
                .collect()
        })
    }

    /// Flush every partition and release the database handle.
    ///
    /// Any later call, including a second `close`, fails with `Closed`.
    pub fn close(&self) -> Result<()> {
        let db = self.db.write().take().ok_or(StoreError::Closed)?;
        flush_partitions(&db, &self.catalog.read())?;
        drop(db);
        info!(path = %self.path.display(), "store closed");
        Ok(())
    }

    fn with_db<T>(&self, f: impl FnOnce(&Db) -> Result<T>) -> Result<T> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        f(db)
    }

    fn write_options(&self) -> WriteOptions {
        let mut options = WriteOptions::default();
        options.disable_wal(self.config.disable_wal);
        options
    }
}

impl Drop for PartitionedStore {
    fn drop(&mut self) {
        if let Some(db) = self.db.get_mut().take() {
            warn!(path = %self.path.display(), "store dropped without close, flushing");
            if let Err(e) = flush_partitions(&db, self.catalog.get_mut()) {
                warn!(error = %e, "flush on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for PartitionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedStore")
            .field("path", &self.path)
            .field("partitions", &*self.catalog.read())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn existing(name: &str) -> PartitionHandle {
    PartitionHandle {
        name: name.to_string(),
        created: false,
    }
}

fn db_options(config: &StoreConfig) -> Options {
    let mut options = Options::default();
    options.create_if_missing(config.create_if_missing);
    options.create_missing_column_families(true);
    options.set_max_open_files(config.max_open_files);
    options
}

fn flush_partitions(db: &Db, names: &BTreeSet<String>) -> Result<()> {
    for name in names {
        if let Some(cf) = db.cf_handle(name) {
            db.flush_cf(&cf)
                .map_err(|e| StoreError::rocksdb("flush", name, e))?;
            debug!(partition = %name, "partition flushed");
        }
    }
    Ok(())
}
