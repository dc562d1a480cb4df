//! Redb-backed backing store.
//!
//! Provides durable storage with ACID commits.

use super::BackingStore;
use anyhow::{Context, Result};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Table holding every backing store key.
pub(crate) const STORE_TABLE: TableDefinition<'static, &'static str, &'static str> =
    TableDefinition::new("persistor");

/// Redb-backed backing store.
///
/// Every write is its own transaction, so a crash never leaves a torn
/// registry blob behind.
///
/// # Thread Safety
///
/// `RedbStore` is `Clone` and can be shared across threads. The underlying
/// database handles concurrent access safely.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Opens or creates a redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directory cannot be created
    /// - Database file cannot be opened or created (permissions, disk full, etc.)
    /// - Initialization transaction fails to begin or commit
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory: {}", parent.display())
            })?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open store database: {}", path.display()))?;

        // Create the table up front so reads never see it missing
        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            let _table = write_txn
                .open_table(STORE_TABLE)
                .context("Failed to initialize store table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        Ok(Self { db: Arc::new(db) })
    }

    fn write<F>(&self, what: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&redb::WriteTransaction) -> Result<()>,
    {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        apply(&write_txn)?;
        write_txn
            .commit()
            .with_context(|| format!("Failed to commit {what} transaction"))?;
        Ok(())
    }
}

impl BackingStore for RedbStore {
    fn len(&self) -> Result<usize> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(STORE_TABLE)
            .context("Failed to open store table")?;
        let len = table.len().context("Failed to count store entries")?;
        Ok(usize::try_from(len)?)
    }

    fn key(&self, index: usize) -> Result<Option<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(STORE_TABLE)
            .context("Failed to open store table")?;

        match table.iter().context("Failed to iterate store table")?.nth(index) {
            Some(entry) => {
                let (key, _) = entry.context("Failed to read store entry")?;
                Ok(Some(key.value().to_string()))
            },
            None => Ok(None),
        }
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(STORE_TABLE)
            .context("Failed to open store table")?;

        let value = table
            .get(key)
            .with_context(|| format!("Failed to read key '{key}'"))?;
        Ok(value.map(|guard| guard.value().to_string()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.write("set", |txn| {
            let mut table = txn
                .open_table(STORE_TABLE)
                .context("Failed to open store table")?;
            table
                .insert(key, value)
                .with_context(|| format!("Failed to insert key '{key}'"))?;
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.write("remove", |txn| {
            let mut table = txn
                .open_table(STORE_TABLE)
                .context("Failed to open store table")?;
            table
                .remove(key)
                .with_context(|| format!("Failed to remove key '{key}'"))?;
            Ok(())
        })
    }

    fn clear(&self) -> Result<()> {
        self.write("clear", |txn| {
            txn.delete_table(STORE_TABLE)
                .context("Failed to drop store table")?;
            let _table = txn
                .open_table(STORE_TABLE)
                .context("Failed to recreate store table")?;
            Ok(())
        })
    }
}
