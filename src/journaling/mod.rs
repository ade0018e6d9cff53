mod autosave;

pub use autosave::{AutoSaveEvent, AutoSaveRuntime, DraftKey, RecoverySnapshot};
