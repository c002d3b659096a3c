// ── UI-facing contracts ───────────────────────────────────────────────────────
//
// The session never talks to widgets.  A UI layer subscribes a
// `SessionListener` for state changes and passes a `Prompter` into the
// operations that may need to ask the user something.

use std::path::{Path, PathBuf};

use crate::config::Preferences;

use super::StatusInfo;

/// Receives state-change notifications from a `Session`.
///
/// Every method has an empty default so a listener only implements what it
/// displays.
pub trait SessionListener {
    /// The modification flag flipped.
    fn on_modified_changed(&mut self, _modified: bool) {}

    fn on_title_changed(&mut self, _title: &str) {}

    fn on_status_changed(&mut self, _status: &StatusInfo) {}

    fn on_recent_files_changed(&mut self, _recent: &[String]) {}

    /// Theme, font or default encoding changed.
    fn on_preferences_changed(&mut self, _prefs: &Preferences) {}

    /// An operation failed; `message` is suitable for an error dialog.
    fn on_error(&mut self, _message: &str) {}
}

/// Answer to "the document has unsaved changes".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveChoice {
    Save,
    Discard,
    Cancel,
}

/// Where (and how) an untitled document should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTarget {
    pub path: PathBuf,
    /// `None` keeps the document's current encoding.
    pub encoding: Option<String>,
}

/// Modal questions a session may need answered.
pub trait Prompter {
    /// Three-way save prompt for a dirty document.
    fn ask_save_changes(&mut self, document_name: &str) -> SaveChoice;

    /// Save-as dialog.  `None` means the user cancelled.
    fn ask_save_target(&mut self, suggested: &Path) -> Option<SaveTarget>;
}
