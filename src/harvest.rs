//! Read access to the harvester record store.
//!
//! The upstream harvesting system leaves an ordered map of content hash to
//! JSON metadata record (`entries`) in its data directory. This client only
//! reads it: collection runs page over the entries, and reprocessing looks
//! individual records back up by identifier. Paging keeps each read
//! transaction short instead of pinning one transaction for a multi-day run.

use std::ops::Bound;
use std::path::Path;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::error::StoreError;

/// Table of harvested records: content hash -> JSON metadata.
pub const HARVEST_TABLE: TableDefinition<&str, &str> = TableDefinition::new("entries");

/// File name of the harvester record store inside the data directory.
pub const HARVEST_STORE_NAME: &str = "entries";

pub struct HarvestStore {
    db: Database,
}

impl HarvestStore {
    /// Open an existing record store under `data_dir`. Fails if the
    /// harvester has not populated one.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let db = Database::open(data_dir.join(HARVEST_STORE_NAME))?;
        Ok(Self { db })
    }

    /// Number of harvested records.
    pub fn count(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(HARVEST_TABLE)?;
        Ok(table.len()?)
    }

    /// Metadata record for one identifier, as raw JSON text.
    pub fn get(&self, id: &str) -> Result<Option<String>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(HARVEST_TABLE)?;
        Ok(table.get(id)?.map(|v| v.value().to_string()))
    }

    /// Up to `limit` records strictly after `after`, in identifier order.
    ///
    /// `after == None` starts from the beginning. A page shorter than
    /// `limit` means the store is exhausted.
    pub fn page_after(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(HARVEST_TABLE)?;
        let range = match after {
            Some(last) => table.range::<&str>((Bound::Excluded(last), Bound::Unbounded))?,
            None => table.range::<&str>(..)?,
        };

        let mut page = Vec::with_capacity(limit);
        for item in range.take(limit) {
            let (key, value) = item?;
            page.push((key.value().to_string(), value.value().to_string()));
        }
        Ok(page)
    }
}
