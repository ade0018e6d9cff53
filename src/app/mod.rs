use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;

use crate::config::{AppConfig, ConfigPaths};
use crate::host::SharedHost;
use crate::journaling::{AutoSaveEvent, AutoSaveRuntime, DraftKey, RecoverySnapshot};
use crate::notes::{Note, NoteCollection, NoteError, NoteId};
use crate::preferences::{
    NoteCounts, Preferences, PreferencesPatch, PreferencesStore, Settings, SettingsPatch,
    StorageChoice, StorageMode,
};
use crate::scope::{Scope, ScopeIdentity, ScopeKind, ScopeRouter};
use crate::storage::{FileStore, StoreError};
use crate::tags::{TagError, TagRegistry};

pub mod state;

pub use state::{DeleteOutcome, EditorState, NoteListing, PanelState};

#[derive(Debug, Error)]
pub enum PanelError {
    #[error(transparent)]
    Note(#[from] NoteError),

    #[error(transparent)]
    Tag(#[from] TagError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Journal(#[from] anyhow::Error),
}

/// The note panel controller. Every load and save for a scope goes through
/// `&mut self`, so a save can never be reordered behind a later load.
pub struct Panel {
    config: Arc<AppConfig>,
    paths: ConfigPaths,
    store: FileStore,
    preferences: PreferencesStore,
    host: SharedHost,
    state: PanelState,
    auto_save: AutoSaveRuntime,
    /// Recorded data folder that failed to load at open; notes are served
    /// from the default folder until storage is set again.
    unavailable_folder: Option<PathBuf>,
}

impl Panel {
    pub fn open(config: Arc<AppConfig>, paths: ConfigPaths, host: SharedHost) -> Result<Self, PanelError> {
        let store = FileStore::new(&config.storage);
        let preferences = PreferencesStore::new(store.clone(), paths.home_dir.clone());
        let prefs = preferences.load();
        let data_folder = prefs
            .data_folder()
            .unwrap_or_else(|| paths.home_dir.clone());
        let router = ScopeRouter::new(host.as_ref());

        let (data_folder, loaded, unavailable_folder) =
            match load_folder(&store, &data_folder, &router, &config.default_tags) {
                Ok(loaded) => (data_folder, loaded, None),
                Err(err) if data_folder != paths.home_dir => {
                    tracing::warn!(
                        %err,
                        folder = %data_folder.display(),
                        "data folder unavailable, falling back to the default folder"
                    );
                    let loaded =
                        load_folder(&store, &paths.home_dir, &router, &config.default_tags)?;
                    (paths.home_dir.clone(), loaded, Some(data_folder))
                }
                Err(err) => return Err(err),
            };

        let auto_save = AutoSaveRuntime::new(
            paths.journal_dir.clone(),
            &config.auto_save,
            prefs.settings.auto_save_enabled,
        )
        .context("initialising draft journal")?;

        tracing::info!(
            data_folder = %data_folder.display(),
            setup_completed = prefs.setup_completed,
            global = loaded.global.len(),
            "panel opened"
        );

        Ok(Self {
            config,
            paths,
            store,
            preferences,
            host,
            state: PanelState {
                prefs,
                data_folder,
                router,
                global: loaded.global,
                project: loaded.project,
                tags: loaded.tags,
                editor: None,
            },
            auto_save,
            unavailable_folder,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn preferences(&self) -> &Preferences {
        &self.state.prefs
    }

    pub fn settings(&self) -> &Settings {
        &self.state.prefs.settings
    }

    pub fn data_folder(&self) -> &Path {
        &self.state.data_folder
    }

    /// The recorded data folder, when it could not be loaded and the panel
    /// fell back to the default folder.
    pub fn unavailable_folder(&self) -> Option<&Path> {
        self.unavailable_folder.as_deref()
    }

    pub fn needs_setup(&self) -> bool {
        !self.state.prefs.setup_completed
    }

    pub fn complete_setup(&mut self, choice: StorageChoice) -> Result<(), PanelError> {
        let folder = match &choice {
            StorageChoice::Default => self.paths.home_dir.clone(),
            StorageChoice::Custom(folder) => folder.clone(),
        };
        let loaded = self.load_data_folder(&folder)?;
        let prefs = self.preferences.complete_setup(&choice)?;
        self.install(prefs, folder, loaded);
        Ok(())
    }

    /// Asks the host for a folder; returns `None` when the pick was cancelled.
    pub fn choose_storage_folder(&mut self) -> Result<Option<PathBuf>, PanelError> {
        let Some(folder) = self.host.select_folder() else {
            tracing::debug!("storage folder pick cancelled");
            return Ok(None);
        };
        self.relocate(StorageMode::Custom, folder.clone())?;
        Ok(Some(folder))
    }

    pub fn use_default_storage(&mut self) -> Result<(), PanelError> {
        let home = self.paths.home_dir.clone();
        self.relocate(StorageMode::Default, home)
    }

    /// Points the panel at another data folder. Notes are not copied over;
    /// the new folder's own files are loaded.
    pub fn relocate(&mut self, mode: StorageMode, folder: PathBuf) -> Result<(), PanelError> {
        let loaded = self.load_data_folder(&folder)?;
        let patch = PreferencesPatch {
            setup_completed: Some(true),
            ..PreferencesPatch::storage(mode, &folder)
        };
        let prefs = self.preferences.save(&patch)?;
        tracing::info!(%mode, folder = %folder.display(), "storage folder changed");
        self.install(prefs, folder, loaded);
        Ok(())
    }

    pub fn scope(&self) -> Scope {
        self.state.router.current_scope()
    }

    pub fn project_name(&self) -> Option<String> {
        self.state.router.project_display_name()
    }

    /// Activates a scope and reloads its notes from disk. An open editor is
    /// closed; its draft stays in the journal for recovery. When the notes
    /// cannot be loaded the previous scope stays active.
    pub fn switch_scope(&mut self, kind: ScopeKind) -> Result<Scope, PanelError> {
        let mut router = self.state.router.clone();
        let scope = router.switch_scope(kind, self.host.as_ref());
        let loaded = match scope.identity() {
            Some(identity) => Some(load_collection(
                &self.store,
                &self.state.data_folder,
                &identity,
            )?),
            None => None,
        };
        self.detach_editor(false)?;
        match loaded {
            Some(notes) if kind == ScopeKind::Global => self.state.global = notes,
            project => self.state.project = project,
        }
        self.state.router = router;
        Ok(scope)
    }

    /// Asks the host for the project path again and reloads the project
    /// notes when it changed. Returns whether it changed; on a failed load
    /// the previous project stays in place.
    pub fn refresh_project(&mut self) -> Result<bool, PanelError> {
        let mut router = self.state.router.clone();
        if !router.refresh_project(self.host.as_ref()) {
            return Ok(false);
        }
        let project = match router.project_scope().identity() {
            Some(identity) => Some(load_collection(
                &self.store,
                &self.state.data_folder,
                &identity,
            )?),
            None => None,
        };
        if router.active() == ScopeKind::Project {
            self.detach_editor(false)?;
        }
        self.state.project = project;
        self.state.router = router;
        Ok(true)
    }

    pub fn list_notes(&self, filter: &str) -> NoteListing<'_> {
        let scope = self.scope();
        let needs_project = scope.needs_project();
        let notes = self
            .state
            .active_collection()
            .map(|notes| notes.list(filter))
            .unwrap_or_default();
        NoteListing {
            scope,
            notes,
            needs_project,
        }
    }

    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.state.active_collection()?.get(id)
    }

    pub fn create_note(&mut self, content: &str, tags: &[String]) -> Result<Note, NoteError> {
        let notes = self
            .state
            .active_collection_mut()
            .ok_or(NoteError::NoProject)?;
        notes.create(&self.store, content, tags)
    }

    pub fn update_note(
        &mut self,
        id: &NoteId,
        content: &str,
        tags: &[String],
    ) -> Result<Note, NoteError> {
        let notes = self
            .state
            .active_collection_mut()
            .ok_or(NoteError::NoProject)?;
        notes.update(&self.store, id, content, tags)
    }

    /// Deletes a note. When `confirmDeleteEnabled` is set, `confirm` decides
    /// whether to go ahead; otherwise it is not called.
    pub fn delete_note<F>(&mut self, id: &NoteId, confirm: F) -> Result<DeleteOutcome, PanelError>
    where
        F: FnOnce(&Note) -> bool,
    {
        let confirm_first = self.state.prefs.settings.confirm_delete_enabled;
        let notes = self
            .state
            .active_collection_mut()
            .ok_or(NoteError::NoProject)?;
        let note = notes
            .get(id)
            .ok_or_else(|| NoteError::NotFound { id: id.clone() })?;
        if confirm_first && !confirm(note) {
            tracing::debug!(%id, "delete declined");
            return Ok(DeleteOutcome::Cancelled);
        }
        let removed = notes.delete(&self.store, id)?;
        if self
            .state
            .editor
            .as_ref()
            .is_some_and(|editor| editor.note_id.as_ref() == Some(id))
        {
            self.detach_editor(true)?;
        }
        Ok(DeleteOutcome::Deleted(removed))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.state.tags.list()
    }

    pub fn add_tag(&mut self, name: &str) -> Result<String, TagError> {
        self.state.tags.add(&self.store, name)
    }

    /// Drops the tag from the registry and from the editor selection. Notes
    /// that carry it keep it.
    pub fn remove_tag(&mut self, name: &str) -> Result<bool, PanelError> {
        let removed = self.state.tags.remove(&self.store, name)?;
        if let Some(editor) = self.state.editor.as_mut() {
            editor.deselect(name.trim());
            let (content, tags) = (editor.content.clone(), editor.selected_tags());
            self.auto_save.update_buffer(&content, &tags)?;
        }
        Ok(removed)
    }

    pub fn editor(&self) -> Option<&EditorState> {
        self.state.editor.as_ref()
    }

    /// Opens an empty editor in the active scope. Returns a recovered draft
    /// when one was journaled for a new note in this scope.
    pub fn begin_new_note(&mut self) -> Result<Option<RecoverySnapshot>, PanelError> {
        let identity = self.scope().identity().ok_or(NoteError::NoProject)?;
        self.detach_editor(false)?;
        let mut editor = EditorState::new_note();
        let recovered = self.auto_save.start_session(
            DraftKey {
                scope: identity,
                note_id: None,
            },
            "",
            &[],
        )?;
        if let Some(snapshot) = &recovered {
            editor.restore(snapshot);
        }
        self.state.editor = Some(editor);
        Ok(recovered)
    }

    pub fn begin_edit(&mut self, id: &NoteId) -> Result<Option<RecoverySnapshot>, PanelError> {
        let identity = self.scope().identity().ok_or(NoteError::NoProject)?;
        let note = self
            .note(id)
            .cloned()
            .ok_or_else(|| NoteError::NotFound { id: id.clone() })?;
        self.detach_editor(false)?;
        let mut editor = EditorState::editing(&note);
        let recovered = self.auto_save.start_session(
            DraftKey {
                scope: identity,
                note_id: Some(note.id.clone()),
            },
            &note.content,
            &note.tags,
        )?;
        if let Some(snapshot) = &recovered {
            editor.restore(snapshot);
        }
        self.state.editor = Some(editor);
        Ok(recovered)
    }

    pub fn set_editor_content(&mut self, content: &str) -> Result<(), PanelError> {
        let Some(editor) = self.state.editor.as_mut() else {
            return Ok(());
        };
        editor.content = content.to_string();
        let tags = editor.selected_tags();
        self.auto_save.update_buffer(content, &tags)?;
        Ok(())
    }

    /// Returns whether the tag is selected afterwards; `false` when no
    /// editor is open.
    pub fn toggle_editor_tag(&mut self, tag: &str) -> Result<bool, PanelError> {
        let Some(editor) = self.state.editor.as_mut() else {
            return Ok(false);
        };
        let selected = editor.toggle_tag(tag);
        let (content, tags) = (editor.content.clone(), editor.selected_tags());
        self.auto_save.update_buffer(&content, &tags)?;
        Ok(selected)
    }

    /// Stores the editor's note. Blank content is rejected and the editor
    /// stays open.
    pub fn save_editor(&mut self) -> Result<Option<Note>, PanelError> {
        let Some(editor) = self.state.editor.clone() else {
            return Ok(None);
        };
        let tags = editor.selected_tags();
        let saved = match &editor.note_id {
            Some(id) => self.update_note(id, &editor.content, &tags)?,
            None => self.create_note(&editor.content, &tags)?,
        };
        self.detach_editor(true)?;
        Ok(Some(saved))
    }

    /// Cancels the editor and discards its draft.
    pub fn close_editor(&mut self) -> Result<(), PanelError> {
        self.detach_editor(true)
    }

    /// Whether the open editor holds changes autosave has not written yet.
    pub fn has_unsaved_edits(&self) -> bool {
        self.state.editor.is_some() && self.auto_save.has_dirty_changes()
    }

    pub fn poll_autosave(&mut self) -> Result<Option<AutoSaveEvent>, PanelError> {
        let Some(notes) = self.state.active_collection_mut() else {
            return Ok(None);
        };
        Ok(self.auto_save.poll(notes, &self.store)?)
    }

    pub fn recovery_drafts(&self) -> Result<Vec<RecoverySnapshot>, PanelError> {
        Ok(self.auto_save.list_recovery()?)
    }

    /// Read-merge-writes the changed settings.
    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<&Settings, StoreError> {
        let prefs = self.preferences.save(&PreferencesPatch::settings(patch))?;
        self.apply_preferences(prefs);
        Ok(&self.state.prefs.settings)
    }

    /// Picks up changes another surface made to `settings.json`.
    pub fn reload_preferences(&mut self) -> &Preferences {
        let prefs = self.preferences.load();
        self.apply_preferences(prefs);
        &self.state.prefs
    }

    /// Writes the current note counts into the preferences document for the
    /// settings window to display.
    pub fn publish_note_counts(&mut self) -> Result<NoteCounts, StoreError> {
        let counts = NoteCounts {
            global: self.state.global.len(),
            project: self.state.project_len(),
        };
        let prefs = self.preferences.save(&PreferencesPatch::note_counts(counts))?;
        self.apply_preferences(prefs);
        Ok(counts)
    }

    fn apply_preferences(&mut self, prefs: Preferences) {
        self.auto_save.set_enabled(prefs.settings.auto_save_enabled);
        self.state.prefs = prefs;
    }

    fn detach_editor(&mut self, discard_draft: bool) -> Result<(), PanelError> {
        if self.state.editor.take().is_some() {
            self.auto_save.end_session(discard_draft)?;
        }
        Ok(())
    }

    fn load_data_folder(&self, folder: &Path) -> Result<LoadedFolder, PanelError> {
        load_folder(&self.store, folder, &self.state.router, &self.config.default_tags)
    }

    fn install(&mut self, prefs: Preferences, folder: PathBuf, loaded: LoadedFolder) {
        if let Err(err) = self.detach_editor(false) {
            tracing::warn!(%err, "closing editor after storage change");
        }
        self.apply_preferences(prefs);
        self.unavailable_folder = None;
        self.state.data_folder = folder;
        self.state.global = loaded.global;
        self.state.project = loaded.project;
        self.state.tags = loaded.tags;
    }
}

struct LoadedFolder {
    global: NoteCollection,
    project: Option<NoteCollection>,
    tags: TagRegistry,
}

fn load_folder(
    store: &FileStore,
    folder: &Path,
    router: &ScopeRouter,
    default_tags: &[String],
) -> Result<LoadedFolder, PanelError> {
    let global = load_collection(store, folder, &ScopeIdentity::global())?;
    let project = match router.project_scope().identity() {
        Some(identity) => Some(load_collection(store, folder, &identity)?),
        None => None,
    };
    let tags = TagRegistry::open(store, folder, default_tags)?;
    Ok(LoadedFolder {
        global,
        project,
        tags,
    })
}

/// Loads a scope's notes; an unreadable file is moved aside and the scope
/// starts empty instead of failing the panel.
fn load_collection(
    store: &FileStore,
    folder: &Path,
    identity: &ScopeIdentity,
) -> Result<NoteCollection, NoteError> {
    let file_name = identity.file_name();
    match NoteCollection::load(store, folder, file_name.clone()) {
        Err(NoteError::Store(err @ (StoreError::Parse { .. } | StoreError::Encoding { .. }))) => {
            tracing::warn!(%err, scope = %identity, "notes unreadable, starting scope empty");
            store.quarantine(folder, &file_name)?;
            Ok(NoteCollection::empty(folder, file_name))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{NullHost, StaticHost};
    use crate::storage::layout;
    use assert_matches::assert_matches;
    use std::fs;
    use tempfile::TempDir;

    const PROJECT: &str = "/work/clients/teaser v3.aep";

    fn test_config() -> Arc<AppConfig> {
        let mut config = AppConfig::default();
        config.auto_save.debounce_ms = 0;
        Arc::new(config)
    }

    fn open_with(temp: &TempDir, host: SharedHost) -> anyhow::Result<Panel> {
        Ok(Panel::open(test_config(), ConfigPaths::rooted(temp.path()), host)?)
    }

    fn open_standalone(temp: &TempDir) -> anyhow::Result<Panel> {
        open_with(temp, Arc::new(NullHost))
    }

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn first_run_needs_setup_and_defaults_to_home_folder() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        assert!(panel.needs_setup());

        panel.complete_setup(StorageChoice::Default)?;
        let note = panel.create_note("Buy milk", &[])?;

        assert!(!panel.needs_setup());
        let home = panel.paths().home_dir.clone();
        assert_eq!(panel.data_folder(), home.as_path());
        assert!(home.join(layout::GLOBAL_NOTES_FILE).exists());
        assert!(home.join(layout::TAGS_FILE).exists());
        assert_eq!(panel.list_notes("").notes, vec![&note]);
        Ok(())
    }

    #[test]
    fn custom_storage_survives_reopen() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let custom = temp.path().join("Dropbox").join("memos");
        {
            let mut panel = open_standalone(&temp)?;
            panel.complete_setup(StorageChoice::Custom(custom.clone()))?;
            panel.create_note("lives in the custom folder", &[])?;
        }

        let panel = open_standalone(&temp)?;

        assert_eq!(panel.data_folder(), custom.as_path());
        assert_eq!(panel.preferences().storage_mode, StorageMode::Custom);
        assert_eq!(panel.list_notes("").notes.len(), 1);
        assert!(custom.join(layout::GLOBAL_NOTES_FILE).exists());
        Ok(())
    }

    #[test]
    fn create_update_then_filter_scenario() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        let note = panel.create_note("Buy milk", &[])?;
        panel.update_note(&note.id, "Buy milk and eggs", &tags(&["TODO"]))?;

        let listing = panel.list_notes("eggs");

        assert_eq!(listing.notes.len(), 1);
        assert_eq!(listing.notes[0].id, note.id);
        assert_eq!(listing.notes[0].content, "Buy milk and eggs");
        assert!(!listing.needs_project);
        Ok(())
    }

    #[test]
    fn project_scope_without_project_is_empty_and_flagged() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        panel.create_note("a global note", &[])?;

        let scope = panel.switch_scope(ScopeKind::Project)?;
        let listing = panel.list_notes("");

        assert!(scope.needs_project());
        assert!(listing.needs_project);
        assert!(listing.notes.is_empty());
        assert_matches!(panel.create_note("orphan", &[]), Err(NoteError::NoProject));
        assert_matches!(
            panel.begin_new_note(),
            Err(PanelError::Note(NoteError::NoProject))
        );
        let project_files = fs::read_dir(&panel.paths().home_dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(layout::PROJECT_FILE_PREFIX))
            .count();
        assert_eq!(project_files, 0);
        Ok(())
    }

    #[test]
    fn project_notes_are_isolated_from_global_notes() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let host = Arc::new(StaticHost::new(Some(PathBuf::from(PROJECT))));
        let mut panel = open_with(&temp, host)?;
        panel.create_note("global idea", &[])?;

        panel.switch_scope(ScopeKind::Project)?;
        let project_note = panel.create_note("shot 12 needs a retime", &[])?;

        assert_eq!(panel.project_name().as_deref(), Some("teaser v3"));
        assert_eq!(panel.list_notes("").notes, vec![&project_note]);
        let file = ScopeIdentity::for_project(Path::new(PROJECT)).file_name();
        assert!(panel.data_folder().join(file).exists());

        panel.switch_scope(ScopeKind::Global)?;
        let global = panel.list_notes("");
        assert_eq!(global.notes.len(), 1);
        assert_eq!(global.notes[0].content, "global idea");
        Ok(())
    }

    #[test]
    fn project_saved_later_is_picked_up_on_switch() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let host = Arc::new(StaticHost::new(None));
        let mut panel = open_with(&temp, host.clone())?;
        assert!(panel.switch_scope(ScopeKind::Project)?.needs_project());

        host.set_project(Some(PathBuf::from(PROJECT)));
        let scope = panel.switch_scope(ScopeKind::Project)?;

        assert_matches!(scope, Scope::Project { .. });
        panel.create_note("now it works", &[])?;
        assert_eq!(panel.publish_note_counts()?, NoteCounts { global: 0, project: 1 });
        Ok(())
    }

    #[test]
    fn refresh_project_follows_the_host() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let host = Arc::new(StaticHost::new(None));
        let mut panel = open_with(&temp, host.clone())?;
        assert!(!panel.refresh_project()?);

        host.set_project(Some(PathBuf::from(PROJECT)));
        assert!(panel.refresh_project()?);
        assert_matches!(panel.scope(), Scope::Global);
        assert_eq!(panel.project_name().as_deref(), Some("teaser v3"));
        Ok(())
    }

    #[test]
    fn removing_a_tag_keeps_it_on_existing_notes() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        let note = panel.create_note("fix audio sync", &tags(&["TODO"]))?;

        assert!(panel.remove_tag("TODO")?);

        assert!(!panel.tags().any(|tag| tag == "TODO"));
        assert_eq!(panel.note(&note.id).map(|n| n.tags.clone()), Some(tags(&["TODO"])));
        let reopened = open_standalone(&temp)?;
        assert_eq!(reopened.list_notes("todo").notes.len(), 1);
        assert!(!reopened.tags().any(|tag| tag == "TODO"));
        Ok(())
    }

    #[test]
    fn removing_a_tag_deselects_it_in_the_editor() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        panel.begin_new_note()?;
        assert!(panel.toggle_editor_tag("Idea")?);

        panel.remove_tag("Idea")?;

        assert!(!panel.editor().expect("editor open").is_selected("Idea"));
        Ok(())
    }

    #[test]
    fn delete_honours_confirmation_policy() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        let note = panel.create_note("maybe delete me", &[])?;

        let outcome = panel.delete_note(&note.id, |_| false)?;
        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert_eq!(panel.list_notes("").notes.len(), 1);

        panel.update_settings(SettingsPatch {
            confirm_delete_enabled: Some(false),
            ..SettingsPatch::default()
        })?;
        let outcome = panel.delete_note(&note.id, |_| panic!("confirmation is disabled"))?;
        assert_eq!(outcome, DeleteOutcome::Deleted(note));
        assert!(panel.list_notes("").notes.is_empty());
        Ok(())
    }

    #[test]
    fn delete_of_unknown_note_is_not_found() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        assert_matches!(
            panel.delete_note(&NoteId::from("123"), |_| true),
            Err(PanelError::Note(NoteError::NotFound { .. }))
        );
        Ok(())
    }

    #[test]
    fn editor_creates_note_with_selected_tags() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        panel.create_note("older", &[])?;

        panel.begin_new_note()?;
        panel.toggle_editor_tag("Lyrics")?;
        panel.toggle_editor_tag("Idea")?;
        panel.toggle_editor_tag("Lyrics")?;
        panel.set_editor_content("chorus: neon rain\n")?;
        let saved = panel.save_editor()?.expect("editor was open");

        assert!(panel.editor().is_none());
        assert_eq!(saved.content, "chorus: neon rain");
        assert_eq!(saved.tags, tags(&["Idea"]));
        assert_eq!(panel.list_notes("").notes[0], &saved);
        assert!(panel.recovery_drafts()?.is_empty());
        Ok(())
    }

    #[test]
    fn blank_editor_save_is_rejected_and_editor_stays_open() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        panel.begin_new_note()?;
        panel.set_editor_content("   \n")?;

        assert_matches!(
            panel.save_editor(),
            Err(PanelError::Note(NoteError::EmptyContent))
        );
        assert!(panel.editor().is_some());
        assert!(panel.list_notes("").notes.is_empty());
        Ok(())
    }

    #[test]
    fn autosave_flushes_edits_of_existing_notes() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        let note = panel.create_note("draft v1", &[])?;

        panel.begin_edit(&note.id)?;
        panel.set_editor_content("draft v2")?;
        assert!(panel.has_unsaved_edits());
        let event = panel.poll_autosave()?;

        assert_matches!(event, Some(AutoSaveEvent::Saved { .. }));
        assert!(!panel.has_unsaved_edits());
        assert_eq!(panel.note(&note.id).map(|n| n.content.as_str()), Some("draft v2"));
        Ok(())
    }

    #[test]
    fn autosave_respects_setting() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        let note = panel.create_note("draft v1", &[])?;
        panel.update_settings(SettingsPatch {
            auto_save_enabled: Some(false),
            ..SettingsPatch::default()
        })?;

        panel.begin_edit(&note.id)?;
        panel.set_editor_content("draft v2")?;

        assert!(panel.poll_autosave()?.is_none());
        assert_eq!(panel.note(&note.id).map(|n| n.content.as_str()), Some("draft v1"));
        Ok(())
    }

    #[test]
    fn interrupted_edit_is_recovered_when_reopened() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        {
            let mut panel = open_standalone(&temp)?;
            panel.update_settings(SettingsPatch {
                auto_save_enabled: Some(false),
                ..SettingsPatch::default()
            })?;
            panel.begin_new_note()?;
            panel.toggle_editor_tag("TODO")?;
            panel.set_editor_content("unsaved thought")?;
        }

        let mut panel = open_standalone(&temp)?;
        assert_eq!(panel.recovery_drafts()?.len(), 1);
        let recovered = panel.begin_new_note()?.expect("draft recovered");

        assert_eq!(recovered.content, "unsaved thought");
        let editor = panel.editor().expect("editor open");
        assert_eq!(editor.content, "unsaved thought");
        assert_eq!(editor.selected_tags(), tags(&["TODO"]));
        Ok(())
    }

    #[test]
    fn note_counts_and_settings_window_edits_both_survive() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        panel.complete_setup(StorageChoice::Default)?;
        panel.create_note("one", &[])?;
        panel.create_note("two", &[])?;
        let settings_window =
            PreferencesStore::new(FileStore::default(), panel.paths().home_dir.clone());

        panel.publish_note_counts()?;
        settings_window.save(&PreferencesPatch::settings(SettingsPatch {
            note_font_size: Some(18),
            ..SettingsPatch::default()
        }))?;

        let prefs = panel.reload_preferences();
        assert_eq!(prefs.note_counts, NoteCounts { global: 2, project: 0 });
        assert_eq!(prefs.settings.note_font_size, 18);
        assert!(prefs.setup_completed);
        Ok(())
    }

    #[test]
    fn corrupt_notes_file_opens_empty_and_is_kept_aside() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted(temp.path());
        fs::create_dir_all(&paths.home_dir)?;
        fs::write(paths.home_dir.join(layout::GLOBAL_NOTES_FILE), "[{\"id\":")?;

        let mut panel = open_standalone(&temp)?;
        assert!(panel.list_notes("").notes.is_empty());
        panel.create_note("fresh start", &[])?;

        let kept = fs::read_dir(&paths.home_dir)?
            .filter_map(Result::ok)
            .any(|entry| entry.file_name().to_string_lossy().starts_with("global-notes.corrupt-"));
        assert!(kept);
        Ok(())
    }

    #[test]
    fn folder_pick_cancel_changes_nothing() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let host = Arc::new(StaticHost::new(None));
        let mut panel = open_with(&temp, host.clone())?;
        panel.complete_setup(StorageChoice::Default)?;
        let before = panel.data_folder().to_path_buf();

        assert_eq!(panel.choose_storage_folder()?, None);
        assert_eq!(panel.data_folder(), before.as_path());

        let picked = temp.path().join("picked");
        host.set_folder_choice(Some(picked.clone()));
        assert_eq!(panel.choose_storage_folder()?, Some(picked.clone()));
        assert_eq!(panel.data_folder(), picked.as_path());
        assert_eq!(panel.preferences().storage_mode, StorageMode::Custom);
        assert!(picked.join(layout::TAGS_FILE).exists());

        panel.use_default_storage()?;
        assert_eq!(panel.data_folder(), before.as_path());
        assert_eq!(panel.preferences().storage_mode, StorageMode::Default);
        Ok(())
    }

    #[test]
    fn configured_default_tags_seed_a_new_folder() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut config = AppConfig::default();
        config.default_tags = tags(&["リリック", "アイデア", "作業中", "TODO"]);
        let panel = Panel::open(
            Arc::new(config),
            ConfigPaths::rooted(temp.path()),
            Arc::new(NullHost),
        )?;

        assert_eq!(
            panel.tags().collect::<Vec<_>>(),
            vec!["リリック", "アイデア", "作業中", "TODO"]
        );
        let persisted: Vec<String> = serde_json::from_str(&fs::read_to_string(
            panel.data_folder().join(layout::TAGS_FILE),
        )?)?;
        assert_eq!(persisted, tags(&["リリック", "アイデア", "作業中", "TODO"]));
        Ok(())
    }

    #[test]
    fn unusable_recorded_folder_falls_back_to_default() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted(temp.path());
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "")?;
        fs::create_dir_all(&paths.home_dir)?;
        fs::write(
            &paths.preferences_file,
            serde_json::json!({
                "setupCompleted": true,
                "storageMode": "custom",
                "dataFolderPath": blocker.to_string_lossy(),
            })
            .to_string(),
        )?;

        let mut panel = open_standalone(&temp)?;

        assert_eq!(panel.unavailable_folder(), Some(blocker.as_path()));
        assert_eq!(panel.data_folder(), paths.home_dir.as_path());
        panel.create_note("still usable", &[])?;

        panel.use_default_storage()?;
        assert_eq!(panel.unavailable_folder(), None);
        assert_eq!(panel.preferences().storage_mode, StorageMode::Default);
        assert_eq!(panel.list_notes("").notes.len(), 1);
        Ok(())
    }

    #[test]
    fn failed_project_reload_keeps_previous_project() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let host = Arc::new(StaticHost::new(Some(PathBuf::from("/work/a.aep"))));
        let mut panel = open_with(&temp, host.clone())?;
        panel.switch_scope(ScopeKind::Project)?;
        let note_a = panel.create_note("note for A", &[])?;
        let file_b = ScopeIdentity::for_project(Path::new("/work/b.aep")).file_name();
        fs::create_dir_all(panel.data_folder().join(&file_b))?;

        host.set_project(Some(PathBuf::from("/work/b.aep")));
        assert!(panel.refresh_project().is_err());

        assert_eq!(panel.project_name().as_deref(), Some("a"));
        assert_eq!(panel.list_notes("").notes, vec![&note_a]);
        panel.create_note("second note for A", &[])?;
        let file_a = ScopeIdentity::for_project(Path::new("/work/a.aep")).file_name();
        let on_disk: Vec<Note> =
            serde_json::from_str(&fs::read_to_string(panel.data_folder().join(file_a))?)?;
        assert_eq!(on_disk.len(), 2);
        assert!(panel.data_folder().join(&file_b).is_dir());
        Ok(())
    }

    #[test]
    fn failed_switch_to_project_keeps_global_scope() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let host = Arc::new(StaticHost::new(None));
        let mut panel = open_with(&temp, host.clone())?;
        let global = panel.create_note("global idea", &[])?;
        let file_b = ScopeIdentity::for_project(Path::new("/work/b.aep")).file_name();
        fs::create_dir_all(panel.data_folder().join(file_b))?;
        host.set_project(Some(PathBuf::from("/work/b.aep")));

        assert!(panel.switch_scope(ScopeKind::Project).is_err());

        assert_matches!(panel.scope(), Scope::Global);
        assert_eq!(panel.list_notes("").notes, vec![&global]);
        Ok(())
    }

    #[test]
    fn failed_editor_save_keeps_editor_and_notes() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        let note = panel.create_note("verse one", &[])?;
        panel.begin_edit(&note.id)?;
        panel.set_editor_content("verse one, revised")?;
        let notes_file = panel.data_folder().join(layout::GLOBAL_NOTES_FILE);
        fs::remove_file(&notes_file)?;
        fs::create_dir(&notes_file)?;

        assert_matches!(
            panel.save_editor(),
            Err(PanelError::Note(NoteError::Store(_)))
        );

        let editor = panel.editor().expect("editor stays open");
        assert_eq!(editor.content, "verse one, revised");
        assert_eq!(panel.note(&note.id).map(|n| n.content.as_str()), Some("verse one"));
        assert_eq!(panel.recovery_drafts()?.len(), 1);
        Ok(())
    }

    #[test]
    fn unwritable_data_folder_aborts_relocation() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut panel = open_standalone(&temp)?;
        panel.complete_setup(StorageChoice::Default)?;
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "")?;

        let result = panel.relocate(StorageMode::Custom, blocker);

        assert!(result.is_err());
        assert_eq!(panel.preferences().storage_mode, StorageMode::Default);
        assert_eq!(panel.data_folder(), panel.paths().home_dir.as_path());
        Ok(())
    }
}
