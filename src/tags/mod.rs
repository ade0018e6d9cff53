use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use thiserror::Error;

use crate::storage::{layout, FileStore, StoreError};

#[derive(Debug, Error)]
pub enum TagError {
    #[error("tag name cannot be empty")]
    Empty,

    #[error("tag {0:?} already exists")]
    AlreadyExists(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reusable tag names shared by every scope, kept in insertion order.
///
/// Removing a tag here never touches notes that carry it.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    folder: PathBuf,
    tags: IndexSet<String>,
}

impl TagRegistry {
    /// Loads the registry, installing and persisting `defaults` when no list
    /// exists yet. A corrupt list is moved aside and reseeded.
    pub fn open(
        store: &FileStore,
        folder: impl Into<PathBuf>,
        defaults: &[String],
    ) -> Result<Self, TagError> {
        let folder = folder.into();
        match store.read_json::<IndexSet<String>>(&folder, layout::TAGS_FILE) {
            Ok(Some(tags)) => Ok(Self { folder, tags }),
            Ok(None) => Self::seed(store, folder, defaults),
            Err(err @ (StoreError::Parse { .. } | StoreError::Encoding { .. })) => {
                tracing::warn!(%err, "tag list corrupt, reseeding defaults");
                store.quarantine(&folder, layout::TAGS_FILE)?;
                Self::seed(store, folder, defaults)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn seed(store: &FileStore, folder: PathBuf, defaults: &[String]) -> Result<Self, TagError> {
        let mut registry = Self {
            folder,
            tags: IndexSet::new(),
        };
        let seeded = defaults.iter().cloned().collect::<IndexSet<_>>();
        registry.commit(store, seeded)?;
        tracing::info!(count = registry.tags.len(), "seeded default tags");
        Ok(registry)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn list(&self) -> impl Iterator<Item = &str> + '_ {
        self.tags.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains(name.trim())
    }

    /// Returns the stored (trimmed) name.
    pub fn add(&mut self, store: &FileStore, name: &str) -> Result<String, TagError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TagError::Empty);
        }
        if self.tags.contains(name) {
            return Err(TagError::AlreadyExists(name.to_string()));
        }
        let mut next = self.tags.clone();
        next.insert(name.to_string());
        self.commit(store, next)?;
        tracing::info!(tag = name, "tag added");
        Ok(name.to_string())
    }

    /// Removing an unknown name succeeds without writing. Returns whether a
    /// tag was removed.
    pub fn remove(&mut self, store: &FileStore, name: &str) -> Result<bool, TagError> {
        let name = name.trim();
        if !self.tags.contains(name) {
            return Ok(false);
        }
        let mut next = self.tags.clone();
        next.shift_remove(name);
        self.commit(store, next)?;
        tracing::info!(tag = name, "tag removed");
        Ok(true)
    }

    fn commit(&mut self, store: &FileStore, next: IndexSet<String>) -> Result<(), TagError> {
        store.write_json(&self.folder, layout::TAGS_FILE, &next)?;
        self.tags = next;
        Ok(())
    }
}
