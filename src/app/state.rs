use std::path::PathBuf;

use indexmap::IndexSet;

use crate::journaling::RecoverySnapshot;
use crate::notes::{Note, NoteCollection, NoteId};
use crate::preferences::Preferences;
use crate::scope::{Scope, ScopeRouter};
use crate::tags::TagRegistry;

/// Everything the panel keeps in memory between actions. Owned by
/// [`super::Panel`]; nothing here is shared with other surfaces.
#[derive(Debug)]
pub struct PanelState {
    pub(super) prefs: Preferences,
    pub(super) data_folder: PathBuf,
    pub(super) router: ScopeRouter,
    pub(super) global: NoteCollection,
    pub(super) project: Option<NoteCollection>,
    pub(super) tags: TagRegistry,
    pub(super) editor: Option<EditorState>,
}

impl PanelState {
    /// The collection of the active scope. A project collection only counts
    /// when it was loaded from that project's file.
    pub(super) fn active_collection(&self) -> Option<&NoteCollection> {
        match self.router.current_scope() {
            Scope::Global => Some(&self.global),
            Scope::Project { identity, .. } => self
                .project
                .as_ref()
                .filter(|notes| notes.file_name() == identity.file_name()),
            Scope::NeedsProject => None,
        }
    }

    pub(super) fn active_collection_mut(&mut self) -> Option<&mut NoteCollection> {
        match self.router.current_scope() {
            Scope::Global => Some(&mut self.global),
            Scope::Project { identity, .. } => self
                .project
                .as_mut()
                .filter(|notes| notes.file_name() == identity.file_name()),
            Scope::NeedsProject => None,
        }
    }

    pub(super) fn project_len(&self) -> usize {
        self.project.as_ref().map(NoteCollection::len).unwrap_or(0)
    }
}

/// The open editor: a new note (`note_id == None`) or an edit of an
/// existing one, with the tags currently toggled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorState {
    pub note_id: Option<NoteId>,
    pub content: String,
    selected_tags: IndexSet<String>,
}

impl EditorState {
    pub(super) fn new_note() -> Self {
        Self {
            note_id: None,
            content: String::new(),
            selected_tags: IndexSet::new(),
        }
    }

    pub(super) fn editing(note: &Note) -> Self {
        Self {
            note_id: Some(note.id.clone()),
            content: note.content.clone(),
            selected_tags: note.tags.iter().cloned().collect(),
        }
    }

    pub fn selected_tags(&self) -> Vec<String> {
        self.selected_tags.iter().cloned().collect()
    }

    pub fn is_selected(&self, tag: &str) -> bool {
        self.selected_tags.contains(tag)
    }

    /// Returns whether the tag is selected afterwards.
    pub(super) fn toggle_tag(&mut self, tag: &str) -> bool {
        if self.selected_tags.shift_remove(tag) {
            false
        } else {
            self.selected_tags.insert(tag.to_string());
            true
        }
    }

    pub(super) fn deselect(&mut self, tag: &str) {
        self.selected_tags.shift_remove(tag);
    }

    /// Replaces the buffer with a journaled draft.
    pub(super) fn restore(&mut self, snapshot: &RecoverySnapshot) {
        self.content = snapshot.content.clone();
        self.selected_tags = snapshot.tags.iter().cloned().collect();
    }
}

/// Result of listing the active scope.
#[derive(Debug)]
pub struct NoteListing<'a> {
    pub scope: Scope,
    pub notes: Vec<&'a Note>,
    /// Project scope is active but no project file has been saved.
    pub needs_project: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(Note),
    /// Confirmation was required and declined; nothing was touched.
    Cancelled,
}
