// Copyright 2019, The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use lmdb_zero::{
    db,
    open,
    put,
    Database,
    DatabaseOptions,
    EnvBuilder,
    Environment,
    Ignore,
    LmdbResultExt,
    ReadTransaction,
    WriteTransaction,
};
use log::*;

use crate::{
    key_val_store::key_val_store::{IterationResult, WriteBatch, WriteOperation},
    lmdb_store::error::LMDBError,
};

const LOG_TARGET: &str = "lmdb";
const BYTES_PER_MB: usize = 1024 * 1024;

/// An LMDB database builder. Set up the environment by calling `set_nnnn` and `add_database`, then create the
/// environment with `build()`.
///
/// ```edition2018,no_run
/// # use tari_storage::lmdb_store::{db, LMDBBuilder};
/// let store = LMDBBuilder::new()
///     .set_path("/tmp/pushsync")
///     .set_environment_size(32)
///     .set_max_number_of_databases(2)
///     .add_database("queue", db::CREATE)
///     .build()
///     .unwrap();
/// let queue = store.get_handle("queue").unwrap();
/// ```
pub struct LMDBBuilder {
    path: PathBuf,
    env_size_mb: usize,
    max_dbs: usize,
    db_names: HashMap<String, db::Flags>,
}

impl LMDBBuilder {
    /// Create a new builder. The default values for the environment parameters are:
    ///
    /// | Parameter | Default |
    /// |:----------|---------|
    /// | path      | ./store/|
    /// | size      | 64 MB   |
    /// | named DBs | none    |
    pub fn new() -> LMDBBuilder {
        LMDBBuilder {
            path: "./store/".into(),
            env_size_mb: 64,
            max_dbs: 8,
            db_names: HashMap::new(),
        }
    }

    /// Set the directory where the LMDB environment exists, or must be created. Missing directories are created by
    /// `build()`.
    pub fn set_path<P: AsRef<Path>>(mut self, path: P) -> LMDBBuilder {
        self.path = path.as_ref().to_path_buf();
        self
    }

    /// Sets the size of the environment, in MB. The memory map is only allocated when `build()` is called.
    pub fn set_environment_size(mut self, size: usize) -> LMDBBuilder {
        self.env_size_mb = size;
        self
    }

    /// Sets the maximum number of named databases in the environment
    pub fn set_max_number_of_databases(mut self, size: usize) -> LMDBBuilder {
        self.max_dbs = size;
        self
    }

    /// Add a named database to the environment
    pub fn add_database(mut self, name: &str, flags: db::Flags) -> LMDBBuilder {
        self.db_names.insert(name.into(), flags);
        self
    }

    /// Open the environment and every database added with `add_database`
    pub fn build(self) -> Result<LMDBStore, LMDBError> {
        if !self.path.exists() {
            std::fs::create_dir_all(&self.path).map_err(|e| {
                error!(target: LOG_TARGET, "Could not create LMDB path {}: {}", self.path.display(), e);
                LMDBError::InvalidPath
            })?;
        }
        let path = self.path.to_str().ok_or(LMDBError::InvalidPath)?;
        let max_dbs = std::cmp::max(self.max_dbs, self.db_names.len());

        let env = unsafe {
            let mut builder = EnvBuilder::new()?;
            builder.set_mapsize(self.env_size_mb * BYTES_PER_MB)?;
            builder.set_maxdbs(max_dbs as u32)?;
            builder.open(path, open::Flags::empty(), 0o600)?
        };
        let env = Arc::new(env);
        debug!(
            target: LOG_TARGET,
            "LMDB environment created at {} ({} MB, {} databases)",
            path,
            self.env_size_mb,
            self.db_names.len()
        );

        let mut databases = HashMap::with_capacity(self.db_names.len());
        for (name, flags) in self.db_names {
            let db = Database::open(env.clone(), Some(name.as_str()), &DatabaseOptions::new(flags))?;
            trace!(target: LOG_TARGET, "LMDB database '{}' opened", name);
            databases.insert(name.clone(), LMDBDatabase {
                name,
                env: env.clone(),
                db: Arc::new(db),
            });
        }

        Ok(LMDBStore { env, databases })
    }
}

impl Default for LMDBBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An LMDB environment holding one or more named databases. Create an instance with [LMDBBuilder].
pub struct LMDBStore {
    env: Arc<Environment>,
    databases: HashMap<String, LMDBDatabase>,
}

impl LMDBStore {
    /// Returns a handle to the database with the given name, if it was added to the builder
    pub fn get_handle(&self, name: &str) -> Option<LMDBDatabase> {
        self.databases.get(name).cloned()
    }

    /// Force a synchronous flush of the environment to disk
    pub fn flush(&self) -> Result<(), LMDBError> {
        self.env.sync(true)?;
        Ok(())
    }
}

/// A cheaply cloneable handle to a single named database within an [LMDBStore]
#[derive(Clone)]
pub struct LMDBDatabase {
    name: String,
    env: Arc<Environment>,
    db: Arc<Database<'static>>,
}

impl LMDBDatabase {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the raw value stored at `key`
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LMDBError> {
        lmdb_get(&self.env, &self.db, key)
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool, LMDBError> {
        lmdb_exists(&self.env, &self.db, key)
    }

    /// Apply the batch in a single write transaction
    pub fn write(&self, batch: WriteBatch) -> Result<(), LMDBError> {
        lmdb_write(&self.env, &self.db, batch)
    }

    /// Visit every record with a key >= `start` in ascending key order
    pub fn for_each_from<F>(&self, start: &[u8], f: F) -> Result<(), LMDBError>
    where F: FnMut(&[u8], &[u8]) -> IterationResult {
        lmdb_for_each_from(&self.env, &self.db, start, f)
    }

    /// Returns the number of records in the database
    pub fn len(&self) -> Result<usize, LMDBError> {
        lmdb_len(&self.env, &self.db)
    }

    pub fn is_empty(&self) -> Result<bool, LMDBError> {
        Ok(self.len()? == 0)
    }
}

fn lmdb_get(env: &Environment, db: &Database, key: &[u8]) -> Result<Option<Vec<u8>>, LMDBError> {
    let txn = ReadTransaction::new(env)?;
    let access = txn.access();
    match access.get::<[u8], [u8]>(db, key).to_opt() {
        Ok(val) => Ok(val.map(|v| v.to_vec())),
        Err(e) => Err(LMDBError::GetError(e.to_string())),
    }
}

fn lmdb_exists(env: &Environment, db: &Database, key: &[u8]) -> Result<bool, LMDBError> {
    let txn = ReadTransaction::new(env)?;
    let access = txn.access();
    let res: lmdb_zero::error::Result<&Ignore> = access.get(db, key);
    Ok(res.to_opt()?.is_some())
}

fn lmdb_write(env: &Environment, db: &Database, batch: WriteBatch) -> Result<(), LMDBError> {
    let num_ops = batch.len();
    let txn = WriteTransaction::new(env)?;
    {
        let mut access = txn.access();
        for op in batch.into_operations() {
            match op {
                WriteOperation::Put { key, value } => {
                    access
                        .put(db, key.as_slice(), value.as_slice(), put::Flags::empty())
                        .map_err(|e| LMDBError::PutError(e.to_string()))?;
                },
                WriteOperation::Delete { key } => {
                    // Deleting a missing key is not an error
                    access.del_key(db, key.as_slice()).to_opt()?;
                },
            }
        }
    }
    txn.commit().map_err(|e| LMDBError::CommitError(e.to_string()))?;
    trace!(target: LOG_TARGET, "Committed write batch of {} operation(s)", num_ops);
    Ok(())
}

fn lmdb_for_each_from<F>(env: &Environment, db: &Database, start: &[u8], mut f: F) -> Result<(), LMDBError>
where F: FnMut(&[u8], &[u8]) -> IterationResult {
    let txn = ReadTransaction::new(env)?;
    let access = txn.access();
    let mut cursor = txn.cursor(db)?;
    let mut next = cursor.seek_range_k::<[u8], [u8]>(&access, start).to_opt()?;
    while let Some((key, value)) = next {
        if f(key, value) == IterationResult::Break {
            break;
        }
        next = cursor.next::<[u8], [u8]>(&access).to_opt()?;
    }
    Ok(())
}

fn lmdb_len(env: &Environment, db: &Database) -> Result<usize, LMDBError> {
    let txn = ReadTransaction::new(env)?;
    let stats = txn.db_stat(db)?;
    Ok(stats.entries)
}
