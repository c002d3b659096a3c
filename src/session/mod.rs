// ── Document session ──────────────────────────────────────────────────────────
//
// A single `Session` is created on startup and owned by the UI layer for the
// lifetime of the process.  It owns the preferences store, the text buffer
// and the current document's file state.  All mutations happen on the UI
// thread; there is no global mutable state.
//
// States (derived, see `Session::state`):
//
//   Empty  ── edit ──▶ Dirty ── save ──▶ Loaded
//     ▲                  │                  │
//     └──── new ─────────┴──── edit ◀───────┘
//
// Every I/O failure is reported through `SessionListener::on_error` and
// leaves the session exactly as it was.

mod events;

pub use events::{Prompter, SaveChoice, SaveTarget, SessionListener};

use std::{
    borrow::Cow,
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, error, info, warn};

use crate::{
    config::{ConfigStore, Preferences, Theme},
    encoding::{self, Decoded},
    error::{EncodeError, JotpadError, Result},
};

/// Shown in the title bar.
pub const APP_NAME: &str = "Jotpad";

/// Display name of a document that has never been saved.
pub const UNTITLED: &str = "Untitled";

// ── EOL mode ──────────────────────────────────────────────────────────────────

/// The end-of-line convention of the document on disk.
///
/// The buffer always holds `\n`; the convention is reapplied when saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EolMode {
    /// Unix-style `\n`.
    #[default]
    Lf,
    /// Windows-style `\r\n`.
    Crlf,
    /// Old Mac-style `\r`.
    Cr,
}

impl EolMode {
    /// Short display string shown in the status bar.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "LF",
            Self::Crlf => "CRLF",
            Self::Cr => "CR",
        }
    }

    /// Detect the dominant EOL style in `text`.
    ///
    /// Counts `\r\n`, `\r` and `\n` and returns whichever appears most,
    /// preferring LF on ties.  Falls back to LF when there are no line
    /// endings at all.
    pub fn detect(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut crlf = 0usize;
        let mut lf = 0usize;
        let mut cr = 0usize;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                    crlf += 1;
                    i += 2;
                }
                b'\r' => {
                    cr += 1;
                    i += 1;
                }
                b'\n' => {
                    lf += 1;
                    i += 1;
                }
                _ => i += 1,
            }
        }
        if lf >= crlf && lf >= cr {
            Self::Lf
        } else if crlf >= cr {
            Self::Crlf
        } else {
            Self::Cr
        }
    }

    /// Convert `\n`-only buffer text to this convention.
    fn apply(self, text: &str) -> Cow<'_, str> {
        match self {
            Self::Lf => Cow::Borrowed(text),
            Self::Crlf => Cow::Owned(text.replace('\n', "\r\n")),
            Self::Cr => Cow::Owned(text.replace('\n', "\r")),
        }
    }
}

/// `path` made absolute against the working directory, so one file is
/// always recorded under one name.  `.` components are dropped; symlinks
/// are left alone.
fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_owned())
}

/// Rewrite every `\r\n` and lone `\r` as `\n`.
fn normalize_eol(text: String) -> String {
    if !text.contains('\r') {
        return text;
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocState {
    /// No path, no unsaved changes.
    Empty,
    /// Path set, buffer matches the file.
    Loaded,
    /// Unsaved changes, with or without a path.
    Dirty,
}

/// Snapshot for the status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    /// Full path, or `None` for an untitled buffer.
    pub path: Option<PathBuf>,
    pub modified: bool,
    pub encoding: String,
    pub eol: EolMode,
}

impl fmt::Display for StatusInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(p) => write!(f, "{}", p.display())?,
            None => f.write_str("Unsaved")?,
        }
        let state = if self.modified { "Modified" } else { "Saved" };
        write!(f, " | {state} | {} | {}", self.encoding, self.eol.as_str())
    }
}

/// File-related state of the open document.
#[derive(Debug)]
struct DocumentState {
    /// Absolute path on disk, or `None` for an untitled buffer.
    path: Option<PathBuf>,
    /// Encoding used to read the file, and that will be used to write it.
    encoding: String,
    eol: EolMode,
    /// `true` when the buffer contains changes not yet saved to disk.
    dirty: bool,
}

impl DocumentState {
    fn new_untitled(encoding: &str) -> Self {
        Self {
            path: None,
            encoding: encoding.to_owned(),
            eol: EolMode::default(),
            dirty: false,
        }
    }

    /// The bare filename component, or `"Untitled"` if no path is set.
    fn display_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNTITLED.to_owned())
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Editor core: one document plus the user's preferences.
pub struct Session {
    store: ConfigStore,
    prefs: Preferences,
    doc: DocumentState,
    text: String,
    listeners: Vec<Box<dyn SessionListener>>,
}

impl Session {
    /// Load preferences from `store` and start with an untitled document.
    pub fn new(store: ConfigStore) -> Self {
        let prefs = store.load();
        let doc = DocumentState::new_untitled(prefs.encoding());
        Self {
            store,
            prefs,
            doc,
            text: String::new(),
            listeners: Vec::new(),
        }
    }

    /// Register a listener.  It receives every notification from now on.
    pub fn subscribe(&mut self, listener: Box<dyn SessionListener>) {
        self.listeners.push(listener);
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn state(&self) -> DocState {
        match (self.doc.dirty, &self.doc.path) {
            (true, _) => DocState::Dirty,
            (false, Some(_)) => DocState::Loaded,
            (false, None) => DocState::Empty,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.doc.path.as_deref()
    }

    /// Encoding of the current document; never empty.
    pub fn encoding(&self) -> &str {
        if self.doc.encoding.trim().is_empty() {
            self.prefs.encoding()
        } else {
            &self.doc.encoding
        }
    }

    pub fn eol(&self) -> EolMode {
        self.doc.eol
    }

    pub fn is_modified(&self) -> bool {
        self.doc.dirty
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn display_name(&self) -> String {
        self.doc.display_name()
    }

    /// Compute the title string for the main window.
    ///
    /// | State | Title |
    /// |---|---|
    /// | No path, clean | `"Jotpad"` |
    /// | Path set, clean | `"filename — Jotpad"` |
    /// | Path set, dirty | `"*filename — Jotpad"` |
    /// | No path, dirty | `"*Untitled — Jotpad"` |
    pub fn window_title(&self) -> String {
        // Untitled + clean → bare app name (startup state)
        if self.doc.path.is_none() && !self.doc.dirty {
            return APP_NAME.to_owned();
        }
        let dirty = if self.doc.dirty { "*" } else { "" };
        format!("{dirty}{} \u{2014} {APP_NAME}", self.doc.display_name())
    }

    pub fn status(&self) -> StatusInfo {
        StatusInfo {
            path: self.doc.path.clone(),
            modified: self.doc.dirty,
            encoding: self.encoding().to_owned(),
            eol: self.doc.eol,
        }
    }

    /// Default location offered by the save-as dialog.
    pub fn suggested_save_path(&self) -> PathBuf {
        match &self.doc.path {
            Some(p) => p.clone(),
            None => dirs::home_dir()
                .unwrap_or_default()
                .join("untitled.txt"),
        }
    }

    // ── Editing ───────────────────────────────────────────────────────────────

    /// Called by the UI on every content change.
    pub fn edit(&mut self) {
        self.set_dirty(true);
    }

    /// Replace the whole buffer, as a user edit.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = normalize_eol(text.into());
        self.edit();
    }

    // ── New / open ────────────────────────────────────────────────────────────

    /// Start a fresh untitled document.  Returns `false` if the user kept
    /// the current one.
    pub fn new_document(&mut self, prompter: &mut dyn Prompter) -> bool {
        if !self.maybe_discard_or_save(prompter) {
            return false;
        }
        let was_dirty = self.doc.dirty;
        self.text.clear();
        self.doc = DocumentState::new_untitled(self.prefs.encoding());
        debug!("new untitled document");
        if was_dirty {
            self.notify_modified();
        }
        self.refresh();
        true
    }

    /// Open `path`, auto-detecting its encoding.
    pub fn open(&mut self, path: &Path, prompter: &mut dyn Prompter) -> bool {
        if !self.maybe_discard_or_save(prompter) {
            return false;
        }
        self.load(path, None)
    }

    /// Open `path` under a pinned encoding, failing on invalid bytes.
    pub fn open_with_encoding(
        &mut self,
        path: &Path,
        encoding: &str,
        prompter: &mut dyn Prompter,
    ) -> bool {
        if !self.maybe_discard_or_save(prompter) {
            return false;
        }
        self.load(path, Some(encoding))
    }

    /// Open an entry of the recent-files list.
    ///
    /// A path that no longer exists is dropped from the list.
    pub fn open_recent(&mut self, path: &str, prompter: &mut dyn Prompter) -> bool {
        if !Path::new(path).exists() {
            if self.prefs.remove_recent(path) {
                self.persist();
                self.notify_recent();
            }
            self.report_message(&format!("{path} no longer exists"));
            return false;
        }
        self.open(Path::new(path), prompter)
    }

    fn load(&mut self, path: &Path, pinned: Option<&str>) -> bool {
        match self.try_load(path, pinned) {
            Ok(()) => true,
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    fn try_load(&mut self, path: &Path, pinned: Option<&str>) -> Result<()> {
        let Decoded { text, encoding } = match pinned {
            None => encoding::decode(path)?,
            Some(label) => Decoded {
                text: encoding::decode_with(path, label)?,
                encoding: encoding::canonical_name(label).unwrap_or_else(|| label.to_owned()),
            },
        };

        // Nothing below can fail: commit.
        let path = absolute_path(path);
        let was_dirty = self.doc.dirty;
        self.doc.eol = EolMode::detect(&text);
        self.text = normalize_eol(text);
        self.doc.encoding = encoding;
        self.doc.dirty = false;
        info!("opened {} as {}", path.display(), self.doc.encoding);

        if was_dirty {
            self.notify_modified();
        }
        self.remember(&path);
        self.doc.path = Some(path);
        self.refresh();
        Ok(())
    }

    // ── Save ──────────────────────────────────────────────────────────────────

    /// Save to the current path, or ask for one if the document is untitled.
    pub fn save(&mut self, prompter: &mut dyn Prompter) -> bool {
        let Some(path) = self.doc.path.clone() else {
            let Some(target) = prompter.ask_save_target(&self.suggested_save_path()) else {
                debug!("save-as cancelled");
                return false;
            };
            let encoding = target
                .encoding
                .unwrap_or_else(|| self.encoding().to_owned());
            return self.save_as(&target.path, &encoding);
        };
        let encoding = self.encoding().to_owned();
        self.write(&path, &encoding)
    }

    /// Write to `path` under `encoding` and adopt both on success.
    pub fn save_as(&mut self, path: &Path, encoding: &str) -> bool {
        self.write(path, encoding)
    }

    fn write(&mut self, path: &Path, encoding: &str) -> bool {
        match self.try_write(path, encoding) {
            Ok(()) => true,
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    fn try_write(&mut self, path: &Path, encoding: &str) -> Result<()> {
        let on_disk = self.doc.eol.apply(&self.text);
        let outcome = encoding::encode_and_write(path, &on_disk, encoding)?;
        if outcome.fell_back {
            warn!("{} saved as {} instead of {encoding}", path.display(), outcome.encoding);
        }

        let path = absolute_path(path);
        let was_dirty = self.doc.dirty;
        self.doc.encoding = outcome.encoding;
        self.doc.dirty = false;
        info!("saved {} as {}", path.display(), self.doc.encoding);

        if was_dirty {
            self.notify_modified();
        }
        self.remember(&path);
        self.doc.path = Some(path);
        self.refresh();
        Ok(())
    }

    /// Save-prompt policy run before any action that would drop the buffer.
    ///
    /// Returns `true` if the pending action may proceed.
    pub fn maybe_discard_or_save(&mut self, prompter: &mut dyn Prompter) -> bool {
        if !self.doc.dirty {
            return true;
        }
        match prompter.ask_save_changes(&self.doc.display_name()) {
            SaveChoice::Save => self.save(prompter),
            SaveChoice::Discard => {
                debug!("discarding unsaved changes");
                true
            }
            SaveChoice::Cancel => false,
        }
    }

    /// Clean shutdown.  Returns `false` if the user cancelled.
    pub fn close(&mut self, prompter: &mut dyn Prompter) -> bool {
        if !self.maybe_discard_or_save(prompter) {
            return false;
        }
        self.persist();
        true
    }

    // ── Preferences ───────────────────────────────────────────────────────────

    pub fn set_theme(&mut self, theme: Theme) {
        self.prefs.set_theme(theme);
        self.preferences_changed();
    }

    pub fn toggle_theme(&mut self) {
        self.prefs.toggle_theme();
        self.preferences_changed();
    }

    /// Set family and size together; a blank family keeps the current one.
    pub fn set_font(&mut self, family: &str, size: u32) {
        self.prefs.set_font_family(family);
        self.prefs.set_font_size(size);
        self.preferences_changed();
    }

    pub fn set_font_size(&mut self, size: u32) {
        self.prefs.set_font_size(size);
        self.preferences_changed();
    }

    pub fn grow_font(&mut self) {
        self.prefs.grow_font();
        self.preferences_changed();
    }

    pub fn shrink_font(&mut self) {
        self.prefs.shrink_font();
        self.preferences_changed();
    }

    /// Change the default encoding and the current document's encoding.
    ///
    /// Unknown labels are rejected with an error notification.
    pub fn set_encoding(&mut self, label: &str) -> bool {
        let Some(name) = encoding::canonical_name(label) else {
            let err: JotpadError = EncodeError::UnknownEncoding(label.trim().to_owned()).into();
            self.report(&err);
            return false;
        };
        self.prefs.set_encoding(&name);
        self.doc.encoding = name;
        self.preferences_changed();
        self.refresh();
        true
    }

    pub fn clear_recent_files(&mut self) {
        self.prefs.clear_recent();
        self.persist();
        self.notify_recent();
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn set_dirty(&mut self, dirty: bool) {
        if self.doc.dirty == dirty {
            return;
        }
        self.doc.dirty = dirty;
        self.notify_modified();
        self.refresh();
    }

    fn remember(&mut self, path: &Path) {
        self.prefs.push_recent(&path.to_string_lossy());
        self.persist();
        self.notify_recent();
    }

    /// Best effort: a failed save is logged, never shown.
    fn persist(&self) {
        if let Err(e) = self.store.save(&self.prefs) {
            warn!("preferences not saved: {e}");
        }
    }

    fn preferences_changed(&mut self) {
        self.persist();
        for l in self.listeners.iter_mut() {
            l.on_preferences_changed(&self.prefs);
        }
    }

    fn notify_modified(&mut self) {
        let dirty = self.doc.dirty;
        for l in self.listeners.iter_mut() {
            l.on_modified_changed(dirty);
        }
    }

    fn notify_recent(&mut self) {
        for l in self.listeners.iter_mut() {
            l.on_recent_files_changed(self.prefs.recent_files());
        }
    }

    /// Push title and status to every listener.
    fn refresh(&mut self) {
        let title = self.window_title();
        let status = self.status();
        for l in self.listeners.iter_mut() {
            l.on_title_changed(&title);
            l.on_status_changed(&status);
        }
    }

    fn report(&mut self, err: &JotpadError) {
        self.report_message(&err.to_string());
    }

    fn report_message(&mut self, message: &str) {
        error!("{message}");
        for l in self.listeners.iter_mut() {
            l.on_error(message);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
