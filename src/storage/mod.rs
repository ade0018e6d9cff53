use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::StorageOptions;

pub mod layout;

const TMP_EXTENSION: &str = "tmp";
const UTF8_BOM: char = '\u{FEFF}';

/// Failures reported by [`FileStore`]. A missing file is not one of them:
/// reads return `Ok(None)` for that.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    Encoding { path: PathBuf },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialise document for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied { path: path.into() },
            _ => StoreError::Io {
                path: path.into(),
                source: error,
            },
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, StoreError::Parse { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            StoreError::PermissionDenied { path }
            | StoreError::InvalidPath { path, .. }
            | StoreError::Io { path, .. }
            | StoreError::Encoding { path }
            | StoreError::Parse { path, .. }
            | StoreError::Serialize { path, .. } => path,
        }
    }
}

/// Whole-document reads and writes of UTF-8 files addressed by `(folder, name)`.
#[derive(Debug, Clone, Default)]
pub struct FileStore {
    pretty: bool,
}

impl FileStore {
    pub fn new(options: &StorageOptions) -> Self {
        Self {
            pretty: options.pretty_json,
        }
    }

    /// Writes `content` to `folder/name`, creating `folder` first. The
    /// document is written to a sibling temp file and renamed into place, so
    /// on failure the previous content is left as it was.
    pub fn write(&self, folder: &Path, name: &str, content: &str) -> Result<PathBuf, StoreError> {
        let target = resolve(folder, name)?;
        if folder.is_file() {
            return Err(StoreError::InvalidPath {
                path: folder.into(),
                reason: "data folder is a file",
            });
        }
        fs::create_dir_all(folder).map_err(|err| StoreError::from_io(folder, err))?;

        let tmp_path = folder.join(format!(".{name}.{TMP_EXTENSION}"));
        fs::write(&tmp_path, content.as_bytes())
            .map_err(|err| StoreError::from_io(&tmp_path, err))?;
        if let Err(err) = fs::rename(&tmp_path, &target) {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                tracing::warn!(?cleanup, path = %tmp_path.display(), "leaving stale temp file");
            }
            return Err(StoreError::from_io(&target, err));
        }
        tracing::debug!(path = %target.display(), bytes = content.len(), "document written");
        Ok(target)
    }

    pub fn read(&self, folder: &Path, name: &str) -> Result<Option<String>, StoreError> {
        let path = resolve(folder, name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::from_io(&path, err)),
        };
        let text = String::from_utf8(bytes).map_err(|_| StoreError::Encoding { path })?;
        Ok(Some(match text.strip_prefix(UTF8_BOM) {
            Some(stripped) => stripped.to_owned(),
            None => text,
        }))
    }

    pub fn read_json<T: DeserializeOwned>(
        &self,
        folder: &Path,
        name: &str,
    ) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.read(folder, name)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Parse {
                path: folder.join(name),
                source,
            })
    }

    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        folder: &Path,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, StoreError> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|source| StoreError::Serialize {
            path: folder.join(name),
            source,
        })?;
        self.write(folder, name, &encoded)
    }

    /// Moves an unreadable document aside as `<stem>.corrupt-<unix>.json` so
    /// a degraded load can start fresh without destroying the original.
    pub fn quarantine(&self, folder: &Path, name: &str) -> Result<Option<PathBuf>, StoreError> {
        let path = resolve(folder, name)?;
        if !path.exists() {
            return Ok(None);
        }
        let stem = Path::new(name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(name);
        let stamp = OffsetDateTime::now_utc().unix_timestamp();
        let aside = folder.join(format!(
            "{stem}.corrupt-{stamp}.{}",
            layout::DOCUMENT_EXTENSION
        ));
        fs::rename(&path, &aside).map_err(|err| StoreError::from_io(&path, err))?;
        tracing::warn!(from = %path.display(), to = %aside.display(), "quarantined corrupt document");
        Ok(Some(aside))
    }
}

fn resolve(folder: &Path, name: &str) -> Result<PathBuf, StoreError> {
    if folder.as_os_str().is_empty() {
        return Err(StoreError::InvalidPath {
            path: folder.into(),
            reason: "folder is empty",
        });
    }
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StoreError::InvalidPath {
            path: folder.join(name),
            reason: "file name must be a single path component",
        });
    }
    Ok(folder.join(name))
}
