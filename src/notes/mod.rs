use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::storage::{FileStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Milliseconds since the Unix epoch of creation or last edit.
    pub timestamp: i64,
}

impl Note {
    pub fn edited_at(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.timestamp) * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    /// `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        self.content.to_lowercase().contains(needle)
            || self
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Error)]
pub enum NoteError {
    #[error("note content cannot be empty")]
    EmptyContent,

    #[error("note {id} not found")]
    NotFound { id: NoteId },

    #[error("project notes need a saved project file")]
    NoProject,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The notes of one scope, newest first, persisted as one JSON array.
///
/// Mutations are staged on a copy and only replace the in-memory list once
/// the write succeeded, so memory never shows notes the file lacks.
#[derive(Debug, Clone)]
pub struct NoteCollection {
    folder: PathBuf,
    file_name: String,
    notes: Vec<Note>,
}

impl NoteCollection {
    pub fn empty(folder: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            file_name: file_name.into(),
            notes: Vec::new(),
        }
    }

    pub fn load(
        store: &FileStore,
        folder: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> Result<Self, NoteError> {
        let mut collection = Self::empty(folder, file_name);
        if let Some(notes) = store.read_json::<Vec<Note>>(&collection.folder, &collection.file_name)? {
            collection.notes = notes;
        }
        tracing::debug!(
            file = %collection.file_name,
            count = collection.notes.len(),
            "loaded notes"
        );
        Ok(collection)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    /// Case-insensitive substring match on content or any tag. A blank
    /// filter returns every note.
    pub fn list(&self, filter: &str) -> Vec<&Note> {
        let needle = filter.trim().to_lowercase();
        if needle.is_empty() {
            return self.notes.iter().collect();
        }
        self.notes
            .iter()
            .filter(|note| note.matches(&needle))
            .collect()
    }

    pub fn create(
        &mut self,
        store: &FileStore,
        content: &str,
        tags: &[String],
    ) -> Result<Note, NoteError> {
        let content = normalize_content(content)?;
        let now = now_millis();
        let note = Note {
            id: self.next_id(now),
            content,
            tags: normalize_tags(tags),
            timestamp: now,
        };
        let mut next = Vec::with_capacity(self.notes.len() + 1);
        next.push(note.clone());
        next.extend(self.notes.iter().cloned());
        self.commit(store, next)?;
        tracing::info!(id = %note.id, file = %self.file_name, "note created");
        Ok(note)
    }

    /// Replaces content and tags; the timestamp moves to now.
    pub fn update(
        &mut self,
        store: &FileStore,
        id: &NoteId,
        content: &str,
        tags: &[String],
    ) -> Result<Note, NoteError> {
        let content = normalize_content(content)?;
        let index = self.position(id)?;
        let mut next = self.notes.clone();
        let note = &mut next[index];
        note.content = content;
        note.tags = normalize_tags(tags);
        note.timestamp = now_millis();
        let updated = note.clone();
        self.commit(store, next)?;
        tracing::info!(id = %updated.id, file = %self.file_name, "note updated");
        Ok(updated)
    }

    pub fn delete(&mut self, store: &FileStore, id: &NoteId) -> Result<Note, NoteError> {
        let index = self.position(id)?;
        let mut next = self.notes.clone();
        let removed = next.remove(index);
        self.commit(store, next)?;
        tracing::info!(id = %removed.id, file = %self.file_name, "note deleted");
        Ok(removed)
    }

    fn position(&self, id: &NoteId) -> Result<usize, NoteError> {
        self.notes
            .iter()
            .position(|note| &note.id == id)
            .ok_or_else(|| NoteError::NotFound { id: id.clone() })
    }

    fn commit(&mut self, store: &FileStore, next: Vec<Note>) -> Result<(), NoteError> {
        store.write_json(&self.folder, &self.file_name, &next)?;
        self.notes = next;
        Ok(())
    }

    fn next_id(&self, now: i64) -> NoteId {
        let mut candidate = now;
        loop {
            let id = NoteId::new(candidate.to_string());
            if self.get(&id).is_none() {
                return id;
            }
            candidate += 1;
        }
    }
}

fn normalize_content(content: &str) -> Result<String, NoteError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(NoteError::EmptyContent);
    }
    Ok(trimmed.to_string())
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
