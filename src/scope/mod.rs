use std::fmt;
use std::path::{Path, PathBuf};

use strum::{Display, EnumString};

use crate::host::HostBridge;
use crate::storage::layout;

const FILLER: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ScopeKind {
    #[default]
    Global,
    Project,
}

/// Filesystem-safe name of a note space, used to name its JSON file.
///
/// Project identities are lossy: `/a/b.aep` and `/a-b.aep` map to the same
/// identity. Existing note files depend on this naming, so it is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeIdentity(String);

impl ScopeIdentity {
    pub fn global() -> Self {
        Self(layout::GLOBAL_IDENTITY.to_string())
    }

    pub fn for_project(project_path: &Path) -> Self {
        let raw = project_path.to_string_lossy();
        let mut sanitized = String::with_capacity(layout::PROJECT_FILE_PREFIX.len() + raw.len());
        sanitized.push_str(layout::PROJECT_FILE_PREFIX);
        for ch in raw.chars() {
            if ch.is_ascii_alphanumeric() {
                sanitized.push(ch);
            } else {
                // one filler per UTF-16 unit keeps names stable with existing files
                for _ in 0..ch.len_utf16() {
                    sanitized.push(FILLER);
                }
            }
        }
        Self(sanitized)
    }

    pub fn is_global(&self) -> bool {
        self.0 == layout::GLOBAL_IDENTITY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        if self.is_global() {
            layout::GLOBAL_NOTES_FILE.to_string()
        } else {
            format!("{}.{}", self.0, layout::DOCUMENT_EXTENSION)
        }
    }
}

impl fmt::Display for ScopeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Global,
    Project {
        identity: ScopeIdentity,
        path: PathBuf,
    },
    /// Project scope is active but the host has no saved project file.
    NeedsProject,
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Global => ScopeKind::Global,
            Scope::Project { .. } | Scope::NeedsProject => ScopeKind::Project,
        }
    }

    pub fn identity(&self) -> Option<ScopeIdentity> {
        match self {
            Scope::Global => Some(ScopeIdentity::global()),
            Scope::Project { identity, .. } => Some(identity.clone()),
            Scope::NeedsProject => None,
        }
    }

    pub fn needs_project(&self) -> bool {
        matches!(self, Scope::NeedsProject)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScopeRouter {
    active: ScopeKind,
    project_path: Option<PathBuf>,
}

impl ScopeRouter {
    pub fn new(host: &dyn HostBridge) -> Self {
        Self {
            active: ScopeKind::Global,
            project_path: host.current_project_path(),
        }
    }

    pub fn identity(project_path: &Path) -> ScopeIdentity {
        ScopeIdentity::for_project(project_path)
    }

    pub fn active(&self) -> ScopeKind {
        self.active
    }

    pub fn project_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    pub fn current_scope(&self) -> Scope {
        match self.active {
            ScopeKind::Global => Scope::Global,
            ScopeKind::Project => self.project_scope(),
        }
    }

    /// The project note space regardless of which scope is active.
    pub fn project_scope(&self) -> Scope {
        match &self.project_path {
            Some(path) => Scope::Project {
                identity: Self::identity(path),
                path: path.clone(),
            },
            None => Scope::NeedsProject,
        }
    }

    /// Activates `target`. Switching to the project scope asks the host for
    /// the project path again, since it may have been saved meanwhile. The
    /// caller must reload the returned scope's notes before listing them.
    pub fn switch_scope(&mut self, target: ScopeKind, host: &dyn HostBridge) -> Scope {
        self.active = target;
        if target == ScopeKind::Project {
            self.refresh_project(host);
        }
        let scope = self.current_scope();
        tracing::debug!(?scope, "scope switched");
        scope
    }

    /// Re-reads the project path; returns whether it changed.
    pub fn refresh_project(&mut self, host: &dyn HostBridge) -> bool {
        let latest = host.current_project_path();
        if latest == self.project_path {
            return false;
        }
        tracing::info!(
            from = ?self.project_path,
            to = ?latest,
            "host project changed"
        );
        self.project_path = latest;
        true
    }

    /// Project file name without its extension, for headers.
    pub fn project_display_name(&self) -> Option<String> {
        let path = self.project_path.as_deref()?;
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    }
}
