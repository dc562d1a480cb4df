//! File-backed backing store.
//!
//! Keeps the whole map in memory and rewrites it as a single JSON object on
//! every mutation.

use super::BackingStore;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Backing store persisted to one JSON file.
///
/// # Thread Safety
///
/// `FileStore` is `Clone`; clones share the same in-memory map and file.
/// Writes hold the map's write lock while the file is rewritten, so the file
/// always matches the map.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    data: Arc<RwLock<BTreeMap<String, String>>>,
}

impl FileStore {
    /// Opens the store at `path`, loading existing contents.
    ///
    /// A missing file starts an empty store. A file that exists but is not a
    /// JSON object of strings is logged and replaced by an empty store on the
    /// next write.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file exists but cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory: {}", parent.display())
            })?;
        }

        let data = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store file: {}", path.display()))?;
            match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(data) => {
                    debug!(path = %path.display(), keys = data.len(), "store file loaded");
                    data
                },
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "store file is corrupted, starting with an empty store"
                    );
                    BTreeMap::new()
                },
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            data: Arc::new(RwLock::new(data)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `mutate` and rewrites the file.
    ///
    /// The map is rolled back if the file cannot be written.
    fn write_with<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut data = self.data.write();
        let previous = data.clone();
        mutate(&mut *data);

        if let Err(e) = self.flush(&*data) {
            *data = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Sibling of the store file with `.tmp` appended to its full name.
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(OsString::from).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn flush(&self, data: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string(data).context("Failed to serialize store")?;

        // Write then rename so a crash never leaves a half-written file
        let tmp = self.temp_path();
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write store file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace store file: {}", self.path.display()))?;
        Ok(())
    }
}

impl BackingStore for FileStore {
    fn len(&self) -> Result<usize> {
        Ok(self.data.read().len())
    }

    fn key(&self, index: usize) -> Result<Option<String>> {
        Ok(self.data.read().keys().nth(index).cloned())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.write_with(|data| {
            data.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.write_with(|data| {
            data.remove(key);
        })
    }

    fn clear(&self) -> Result<()> {
        self.write_with(BTreeMap::clear)
    }
}
