//! Capabilities the panel borrows from the host application.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

/// What the core needs from the host: the path of the open project file (if
/// it has ever been saved) and a folder picker.
pub trait HostBridge: Send + Sync {
    fn current_project_path(&self) -> Option<PathBuf>;

    /// `None` when the user cancelled the dialog.
    fn select_folder(&self) -> Option<PathBuf>;
}

pub type SharedHost = Arc<dyn HostBridge>;

/// Standalone runs: no project is ever open and every pick is cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl HostBridge for NullHost {
    fn current_project_path(&self) -> Option<PathBuf> {
        None
    }

    fn select_folder(&self) -> Option<PathBuf> {
        None
    }
}

/// A host whose answers are set by the caller; the project can change while
/// the panel is open (e.g. an unsaved project gets saved).
#[derive(Debug, Default)]
pub struct StaticHost {
    project: Mutex<Option<PathBuf>>,
    folder: Mutex<Option<PathBuf>>,
}

impl StaticHost {
    pub fn new(project: Option<PathBuf>) -> Self {
        Self {
            project: Mutex::new(project),
            folder: Mutex::new(None),
        }
    }

    pub fn set_project(&self, project: Option<PathBuf>) {
        *self.project.lock() = project;
    }

    pub fn set_folder_choice(&self, folder: Option<PathBuf>) {
        *self.folder.lock() = folder;
    }
}

impl HostBridge for StaticHost {
    fn current_project_path(&self) -> Option<PathBuf> {
        self.project.lock().clone()
    }

    fn select_folder(&self) -> Option<PathBuf> {
        self.folder.lock().clone()
    }
}
