//! The backing store selected by the configuration.

use anyhow::Result;
use persistor::backend::{BackingStore, FileStore, RedbStore};
use persistor::config::{BackendKind, Settings};
use tracing::debug;

/// One of the bundled stores, chosen at runtime.
#[derive(Clone)]
pub enum ConfiguredStore {
    File(FileStore),
    Redb(RedbStore),
}

impl ConfiguredStore {
    /// Opens the store described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or created.
    pub fn open(settings: &Settings) -> Result<Self> {
        let path = settings.store_path();
        debug!(backend = ?settings.backend, path = %path.display(), "opening store");

        Ok(match settings.backend {
            BackendKind::File => Self::File(FileStore::open(&path)?),
            BackendKind::Redb => Self::Redb(RedbStore::open(&path)?),
        })
    }

    fn inner(&self) -> &dyn BackingStore {
        match self {
            Self::File(store) => store,
            Self::Redb(store) => store,
        }
    }
}

impl BackingStore for ConfiguredStore {
    fn len(&self) -> Result<usize> {
        self.inner().len()
    }

    fn key(&self, index: usize) -> Result<Option<String>> {
        self.inner().key(index)
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.inner().get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.inner().set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.inner().remove_item(key)
    }

    fn clear(&self) -> Result<()> {
        self.inner().clear()
    }
}
