//! File names of the persisted documents.

pub const DOCUMENT_EXTENSION: &str = "json";

/// Folder created under the user's documents directory for `settings.json`
/// and, in default storage mode, the note files as well.
pub const HOME_FOLDER_NAME: &str = "MemoNotes";

pub const PREFERENCES_FILE: &str = "settings.json";
pub const GLOBAL_NOTES_FILE: &str = "global-notes.json";
pub const TAGS_FILE: &str = "available-tags.json";

pub const PROJECT_FILE_PREFIX: &str = "project-";
pub const GLOBAL_IDENTITY: &str = "global";
