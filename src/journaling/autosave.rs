use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::AutoSaveConfig;
use crate::notes::{NoteCollection, NoteId};
use crate::scope::ScopeIdentity;
use crate::storage::FileStore;

const SNAPSHOT_PREFIX: &str = "draft-";
const SNAPSHOT_EXTENSION: &str = "json";
const SNAPSHOT_TMP_EXTENSION: &str = "json.tmp";
const NEW_NOTE_MARKER: &str = "new";

/// Identifies the editor draft: which note space, and which note (`None`
/// while composing a note that has not been saved yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftKey {
    pub scope: ScopeIdentity,
    pub note_id: Option<NoteId>,
}

impl DraftKey {
    fn file_name(&self) -> String {
        let note = self
            .note_id
            .as_ref()
            .map(NoteId::as_str)
            .unwrap_or(NEW_NOTE_MARKER);
        format!("{SNAPSHOT_PREFIX}{}-{note}.{SNAPSHOT_EXTENSION}", self.scope)
    }
}

#[derive(Debug, Clone)]
pub struct RecoverySnapshot {
    pub scope: String,
    pub note_id: Option<NoteId>,
    pub saved_at: OffsetDateTime,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum AutoSaveEvent {
    Saved {
        note_id: NoteId,
        timestamp: OffsetDateTime,
    },
    Error {
        note_id: NoteId,
        message: String,
    },
}

#[derive(Debug)]
pub struct AutoSaveRuntime {
    enabled: bool,
    crash_recovery: bool,
    debounce: Duration,
    journal_dir: PathBuf,
    session: Option<Session>,
}

#[derive(Debug)]
struct Session {
    key: DraftKey,
    buffer: String,
    tags: Vec<String>,
    dirty: bool,
    dirty_since: Option<Instant>,
    snapshot_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    scope: String,
    note_id: Option<NoteId>,
    saved_at: i64,
    content: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl AutoSaveRuntime {
    /// `enabled` mirrors the user's `autoSaveEnabled` setting; drafts are
    /// journaled whenever crash recovery is on, even with autosave off.
    pub fn new(journal_dir: PathBuf, config: &AutoSaveConfig, enabled: bool) -> Result<Self> {
        if config.crash_recovery {
            fs::create_dir_all(&journal_dir).with_context(|| {
                format!("creating draft journal dir {}", journal_dir.display())
            })?;
        }
        Ok(Self {
            enabled,
            crash_recovery: config.crash_recovery,
            debounce: config.debounce(),
            journal_dir,
            session: None,
        })
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn has_dirty_changes(&self) -> bool {
        self.session.as_ref().map(|s| s.dirty).unwrap_or(false)
    }

    /// Opens a draft session. A leftover snapshot for the same draft wins
    /// over `initial` and is returned so the caller can show it.
    pub fn start_session(
        &mut self,
        key: DraftKey,
        initial: &str,
        initial_tags: &[String],
    ) -> Result<Option<RecoverySnapshot>> {
        let snapshot_path = self.journal_dir.join(key.file_name());
        let snapshot = if self.crash_recovery {
            read_snapshot(&snapshot_path)?
        } else {
            None
        };

        let (buffer, tags) = match &snapshot {
            Some(snap) => (snap.content.clone(), snap.tags.clone()),
            None => (initial.to_string(), initial_tags.to_vec()),
        };

        let mut session = Session::new(key, buffer, tags, snapshot_path);
        if snapshot.is_some() {
            session.mark_dirty_immediate(self.debounce);
        }

        self.session = Some(session);
        Ok(snapshot)
    }

    pub fn update_buffer(&mut self, contents: &str, tags: &[String]) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.buffer == contents && session.tags == tags {
            return Ok(());
        }
        session.buffer.clear();
        session.buffer.push_str(contents);
        session.tags = tags.to_vec();
        session.mark_dirty_now();
        if self.crash_recovery {
            write_snapshot(&self.journal_dir, session)?;
        }
        Ok(())
    }

    /// Flushes an existing note's draft once the debounce has elapsed.
    /// Drafts of unsaved notes are only journaled, never auto-created.
    pub fn poll(
        &mut self,
        notes: &mut NoteCollection,
        store: &FileStore,
    ) -> Result<Option<AutoSaveEvent>> {
        if !self.enabled {
            return Ok(None);
        }
        self.flush(notes, store)
    }

    pub fn end_session(&mut self, clear_snapshot: bool) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        if clear_snapshot && self.crash_recovery {
            remove_snapshot_path(&session.snapshot_path)?;
        }
        Ok(())
    }

    pub fn list_recovery(&self) -> Result<Vec<RecoverySnapshot>> {
        if !self.crash_recovery {
            return Ok(Vec::new());
        }
        let mut snapshots = Vec::new();
        let dir = match fs::read_dir(&self.journal_dir) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("reading draft journal {}", self.journal_dir.display())
                })
            }
        };

        for entry in dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(?err, "skipping unreadable draft entry");
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            match read_snapshot_path(&path) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => {
                    tracing::warn!(?err, "failed to parse draft snapshot {}", path.display());
                }
            }
        }

        snapshots.sort_by(|a, b| match b.saved_at.cmp(&a.saved_at) {
            Ordering::Equal => a.scope.cmp(&b.scope),
            other => other,
        });
        Ok(snapshots)
    }

    fn flush(
        &mut self,
        notes: &mut NoteCollection,
        store: &FileStore,
    ) -> Result<Option<AutoSaveEvent>> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        if !session.dirty {
            return Ok(None);
        }
        let Some(note_id) = session.key.note_id.clone() else {
            return Ok(None);
        };
        if notes.file_name() != session.key.scope.file_name() {
            tracing::debug!(
                draft = %session.key.scope,
                collection = notes.file_name(),
                "draft belongs to another scope, not flushing"
            );
            return Ok(None);
        }
        if session.buffer.trim().is_empty() {
            return Ok(None);
        }
        let ready = session
            .dirty_since
            .map(|since| since.elapsed() >= self.debounce)
            .unwrap_or(false);
        if !ready {
            return Ok(None);
        }
        let timestamp = OffsetDateTime::now_utc();
        match notes.update(store, &note_id, &session.buffer, &session.tags) {
            Ok(_) => {
                session.dirty = false;
                session.dirty_since = None;
                if self.crash_recovery {
                    remove_snapshot_path(&session.snapshot_path)?;
                }
                Ok(Some(AutoSaveEvent::Saved { note_id, timestamp }))
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(%note_id, %message, "autosave failed");
                if self.crash_recovery {
                    write_snapshot(&self.journal_dir, session)?;
                }
                Ok(Some(AutoSaveEvent::Error { note_id, message }))
            }
        }
    }
}

fn write_snapshot(dir: &Path, session: &Session) -> Result<()> {
    let record = SnapshotRecord {
        scope: session.key.scope.to_string(),
        note_id: session.key.note_id.clone(),
        saved_at: OffsetDateTime::now_utc().unix_timestamp(),
        content: session.buffer.clone(),
        tags: session.tags.clone(),
    };
    let json = serde_json::to_vec_pretty(&record).context("serialising draft snapshot")?;
    fs::create_dir_all(dir).with_context(|| format!("ensuring draft dir {}", dir.display()))?;
    let final_path = session.snapshot_path.clone();
    let tmp_path = final_path.with_extension(SNAPSHOT_TMP_EXTENSION);
    fs::write(&tmp_path, &json)
        .with_context(|| format!("writing temporary draft snapshot {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &final_path).with_context(|| {
        format!(
            "atomically persisting draft snapshot {}",
            final_path.display()
        )
    })?;
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<Option<RecoverySnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    read_snapshot_path(path).map(Some)
}

fn read_snapshot_path(path: &Path) -> Result<RecoverySnapshot> {
    let raw =
        fs::read(path).with_context(|| format!("reading draft snapshot {}", path.display()))?;
    let record: SnapshotRecord = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing draft snapshot {}", path.display()))?;
    let saved_at = OffsetDateTime::from_unix_timestamp(record.saved_at)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(RecoverySnapshot {
        scope: record.scope,
        note_id: record.note_id,
        saved_at,
        content: record.content,
        tags: record.tags,
    })
}

fn remove_snapshot_path(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("removing draft snapshot {}", path.display())),
    }
}

impl Session {
    fn new(key: DraftKey, buffer: String, tags: Vec<String>, snapshot_path: PathBuf) -> Self {
        Self {
            key,
            buffer,
            tags,
            dirty: false,
            dirty_since: None,
            snapshot_path,
        }
    }

    fn mark_dirty_now(&mut self) {
        self.dirty = true;
        self.dirty_since = Some(Instant::now());
    }

    fn mark_dirty_immediate(&mut self, debounce: Duration) {
        let now = Instant::now();
        self.dirty = true;
        self.dirty_since = Some(now.checked_sub(debounce).unwrap_or(now));
    }
}
