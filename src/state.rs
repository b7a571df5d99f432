//! Durable per-document processing state.
//!
//! The store is a single ordered table keyed by content hash. Values keep
//! the historical `"True"`/`"False"` encoding so state directories written
//! by earlier deployments stay readable. Every operation runs in its own
//! short-lived transaction; nothing here is held across network calls.

use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::error::StoreError;

const ENTRIES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("entries_software");

/// File name of the state database inside the data directory.
pub const STATE_STORE_NAME: &str = "entries_software";

/// Terminal outcome of processing one document.
///
/// A document with no entry has never reached a terminal outcome. `Success`
/// is sticky: it is never overwritten by the pipeline, only removed by
/// [`StateStore::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Success,
    Failure,
}

impl ProcessingStatus {
    fn encode(self) -> &'static str {
        match self {
            ProcessingStatus::Success => "True",
            ProcessingStatus::Failure => "False",
        }
    }

    fn decode(raw: &str) -> Self {
        // Anything that is not an explicit success marker counts as a
        // failure, matching how prior deployments interpreted the value.
        if raw == "True" {
            ProcessingStatus::Success
        } else {
            ProcessingStatus::Failure
        }
    }
}

/// Embedded store tracking which documents have been processed.
pub struct StateStore {
    path: PathBuf,
    db: Database,
}

impl StateStore {
    /// Open (or create) the state store under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        Self::open_at(data_dir.join(STATE_STORE_NAME))
    }

    fn open_at(path: PathBuf) -> Result<Self, StoreError> {
        let db = Database::create(&path)?;

        // Make sure the table exists so later read transactions never
        // observe a missing table.
        let txn = db.begin_write()?;
        {
            txn.open_table(ENTRIES_TABLE)?;
        }
        txn.commit()?;

        Ok(Self { path, db })
    }

    /// Look up the recorded status for an identifier.
    pub fn get(&self, id: &str) -> Result<Option<ProcessingStatus>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES_TABLE)?;
        Ok(table.get(id)?.map(|v| ProcessingStatus::decode(v.value())))
    }

    /// Record the terminal status for an identifier. Last writer wins.
    pub fn put(&self, id: &str, status: ProcessingStatus) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES_TABLE)?;
            table.insert(id, status.encode())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// All entries in identifier order, read in one transaction.
    pub fn scan(&self) -> Result<Vec<(String, ProcessingStatus)>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES_TABLE)?;
        let mut entries = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            entries.push((
                key.value().to_string(),
                ProcessingStatus::decode(value.value()),
            ));
        }
        Ok(entries)
    }

    /// Number of tracked documents.
    pub fn count(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES_TABLE)?;
        Ok(table.len()?)
    }

    /// Destroy the backing storage and reopen an empty store.
    ///
    /// Consumes the store so the database handle is closed before the file
    /// is removed; once this returns, no prior entry is visible.
    pub fn reset(self) -> Result<Self, StoreError> {
        let path = self.path.clone();
        drop(self.db);
        std::fs::remove_file(&path)?;
        Self::open_at(path)
    }
}
