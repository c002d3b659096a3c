// ── Preferences persistence ───────────────────────────────────────────────────
//
// Reads and writes `~/.jotpad_config.json`.
// No `unsafe`: pure safe Rust + serde_json.
//
// Single process, single writer: there is no file locking, the last save wins.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

use crate::error::{ConfigLoadError, ConfigSaveError};

// ── Defaults & bounds ─────────────────────────────────────────────────────────

/// File name of the preferences record inside the home directory.
pub const CONFIG_FILE_NAME: &str = ".jotpad_config.json";

pub const DEFAULT_FONT_FAMILY: &str = "Sans Serif";
pub const DEFAULT_FONT_SIZE: u32 = 14;
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Smallest point size the editor will render.
pub const MIN_FONT_SIZE: u32 = 6;
/// Largest point size accepted from the font controls.
pub const MAX_FONT_SIZE: u32 = 200;

/// Capacity of the recent-files list.
pub const MAX_RECENT: usize = 8;

// ── Theme ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }
}

// ── Preferences ───────────────────────────────────────────────────────────────

/// The user's persisted preferences.
///
/// Fields are private so that the recent-files and font-size invariants can
/// only be changed through the mutators below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preferences {
    theme: Theme,
    font_family: String,
    font_size: u32,
    encoding: String,
    /// Most recent first, no duplicates, at most `MAX_RECENT` entries.
    recent_files: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            font_family: DEFAULT_FONT_FAMILY.to_owned(),
            font_size: DEFAULT_FONT_SIZE,
            encoding: DEFAULT_ENCODING.to_owned(),
            recent_files: Vec::new(),
        }
    }
}

impl Preferences {
    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn font_family(&self) -> &str {
        &self.font_family
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    /// Default encoding for new documents and pinned opens.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn recent_files(&self) -> &[String] {
        &self.recent_files
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn toggle_theme(&mut self) {
        self.theme = self.theme.toggled();
    }

    /// Ignores blank family names.
    pub fn set_font_family(&mut self, family: &str) {
        let family = family.trim();
        if !family.is_empty() {
            self.font_family = family.to_owned();
        }
    }

    /// Stores `size` clamped into `[MIN_FONT_SIZE, MAX_FONT_SIZE]`.
    pub fn set_font_size(&mut self, size: u32) {
        self.font_size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
    }

    pub fn grow_font(&mut self) {
        self.set_font_size(self.font_size.saturating_add(1));
    }

    pub fn shrink_font(&mut self) {
        self.set_font_size(self.font_size.saturating_sub(1));
    }

    /// Ignores blank labels.  Label validity is the caller's concern.
    pub fn set_encoding(&mut self, encoding: &str) {
        let encoding = encoding.trim();
        if !encoding.is_empty() {
            self.encoding = encoding.to_owned();
        }
    }

    /// Move `path` to the front of the recent list, evicting the oldest entry
    /// once the list is full.  Ignores blank paths.
    pub fn push_recent(&mut self, path: &str) {
        if path.trim().is_empty() {
            return;
        }
        self.recent_files.retain(|p| p != path);
        self.recent_files.insert(0, path.to_owned());
        self.recent_files.truncate(MAX_RECENT);
    }

    /// Returns `true` if the path was present.
    pub fn remove_recent(&mut self, path: &str) -> bool {
        let before = self.recent_files.len();
        self.recent_files.retain(|p| p != path);
        self.recent_files.len() != before
    }

    pub fn clear_recent(&mut self) {
        self.recent_files.clear();
    }
}

// ── On-disk record ────────────────────────────────────────────────────────────
//
// Every key is optional and parsed on its own, so one malformed value costs
// only that value.  Unknown keys are ignored by serde.

#[derive(Default, Deserialize)]
#[serde(default)]
struct PreferencesFile {
    #[serde(deserialize_with = "lenient")]
    theme: Option<String>,
    #[serde(deserialize_with = "lenient")]
    font_family: Option<String>,
    #[serde(deserialize_with = "lenient")]
    font_size: Option<serde_json::Number>,
    #[serde(deserialize_with = "lenient")]
    encoding: Option<String>,
    #[serde(deserialize_with = "lenient")]
    recent_files: Option<Vec<serde_json::Value>>,
}

/// Accept any JSON value and keep it only if it has the expected shape.
fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(de)?;
    Ok(serde_json::from_value(value).ok())
}

impl From<PreferencesFile> for Preferences {
    fn from(file: PreferencesFile) -> Self {
        let mut prefs = Preferences::default();

        if let Some(theme) = file.theme.as_deref().and_then(Theme::parse) {
            prefs.theme = theme;
        }
        if let Some(family) = file.font_family {
            prefs.set_font_family(&family);
        }
        if let Some(size) = file.font_size.as_ref().and_then(font_size_from_number) {
            prefs.set_font_size(size);
        }
        if let Some(encoding) = file.encoding {
            prefs.set_encoding(&encoding);
        }
        if let Some(entries) = file.recent_files {
            let paths = entries.into_iter().filter_map(|v| match v {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            });
            prefs.recent_files = dedup_keep_first(paths);
            prefs.recent_files.truncate(MAX_RECENT);
        }

        prefs
    }
}

fn font_size_from_number(n: &serde_json::Number) -> Option<u32> {
    if let Some(i) = n.as_i64() {
        return Some(i.clamp(0, i64::from(u32::MAX)) as u32);
    }
    n.as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.clamp(0.0, f64::from(u32::MAX)) as u32)
}

/// The file is already most-recent first, so the first occurrence wins.
fn dedup_keep_first(paths: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in paths {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

// ── Path ──────────────────────────────────────────────────────────────────────

/// `~/.jotpad_config.json`, or `None` if no home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Owns the location of the preferences file.
///
/// Created once at startup and handed to the document session; there is no
/// global instance.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn at_default_path() -> Self {
        Self {
            path: default_config_path(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ── Load ──────────────────────────────────────────────────────────────────

    /// Read the preferences, falling back to defaults on any failure.
    ///
    /// A missing file is the normal first-run case and is logged at debug
    /// level; anything else is a warning.
    pub fn load(&self) -> Preferences {
        match self.try_load() {
            Ok(prefs) => prefs,
            Err(ConfigLoadError::Read { ref source, .. })
                if source.kind() == io::ErrorKind::NotFound =>
            {
                debug!("no preferences file yet, using defaults");
                Preferences::default()
            }
            Err(e) => {
                warn!("preferences not loaded, using defaults: {e}");
                Preferences::default()
            }
        }
    }

    pub fn try_load(&self) -> Result<Preferences, ConfigLoadError> {
        let path = self.path.as_deref().ok_or(ConfigLoadError::NoPath)?;
        let data = fs::read(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_owned(),
            source,
        })?;
        let value: serde_json::Value =
            serde_json::from_slice(&data).map_err(|source| ConfigLoadError::Parse {
                path: path.to_owned(),
                source,
            })?;
        if !value.is_object() {
            return Err(ConfigLoadError::NotAnObject {
                path: path.to_owned(),
            });
        }
        let file: PreferencesFile =
            serde_json::from_value(value).map_err(|source| ConfigLoadError::Parse {
                path: path.to_owned(),
                source,
            })?;
        Ok(file.into())
    }

    // ── Save ──────────────────────────────────────────────────────────────────

    /// Replace the preferences file.
    ///
    /// The record is written to a sibling `.tmp` file and renamed into place,
    /// so a failed save leaves the previous file as it was.  Creates the
    /// parent directory if needed.
    pub fn save(&self, prefs: &Preferences) -> Result<(), ConfigSaveError> {
        let path = self.path.as_deref().ok_or(ConfigSaveError::NoPath)?;
        let io_err = |source| ConfigSaveError::Io {
            path: path.to_owned(),
            source,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(prefs)?;
        let tmp = tmp_path(path);
        if let Err(e) = fs::write(&tmp, &json).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        debug!("preferences saved to {}", path.display());
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("prefs.json"))
    }

    fn write_raw(store: &ConfigStore, raw: &str) {
        fs::write(store.path().expect("path"), raw).expect("write raw");
    }

    #[test]
    fn missing_file_yields_documented_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prefs = store_in(&dir).load();
        assert_eq!(prefs.theme(), Theme::Dark);
        assert_eq!(prefs.font_family(), "Sans Serif");
        assert_eq!(prefs.font_size(), 14);
        assert_eq!(prefs.encoding(), "utf-8");
        assert!(prefs.recent_files().is_empty());
    }

    #[test]
    fn store_without_path_loads_defaults_and_refuses_to_save() {
        let store = ConfigStore { path: None };
        assert_eq!(store.load(), Preferences::default());
        assert!(matches!(
            store.save(&Preferences::default()),
            Err(ConfigSaveError::NoPath)
        ));
    }

    #[test]
    fn garbage_and_non_objects_yield_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        for raw in ["", "{", "not json", "[1, 2, 3]", "42", "null", "\"dark\""] {
            write_raw(&store, raw);
            assert_eq!(store.load(), Preferences::default(), "input: {raw:?}");
        }
    }

    #[test]
    fn malformed_keys_fall_back_individually() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        write_raw(
            &store,
            r#"{
                "theme": "light",
                "font_family": 17,
                "font_size": "huge",
                "encoding": "gbk",
                "recent_files": ["/a.txt", 3, null, "/b.txt"],
                "window_width": 900
            }"#,
        );
        let prefs = store.load();
        assert_eq!(prefs.theme(), Theme::Light);
        assert_eq!(prefs.font_family(), DEFAULT_FONT_FAMILY);
        assert_eq!(prefs.font_size(), DEFAULT_FONT_SIZE);
        assert_eq!(prefs.encoding(), "gbk");
        assert_eq!(prefs.recent_files(), ["/a.txt", "/b.txt"]);
    }

    #[test]
    fn loaded_values_are_normalised() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let recent: Vec<String> = (0..12).map(|i| format!("/f{i}")).collect();
        let raw = serde_json::json!({
            "theme": "LIGHT",
            "font_family": "   ",
            "font_size": 2,
            "encoding": "",
            "recent_files": (["/f0", "/f1", "/f0"].iter().map(|s| s.to_string())
                .chain(recent.iter().cloned()).collect::<Vec<_>>()),
        });
        write_raw(&store, &raw.to_string());
        let prefs = store.load();
        assert_eq!(prefs.theme(), Theme::Light);
        assert_eq!(prefs.font_family(), DEFAULT_FONT_FAMILY);
        assert_eq!(prefs.font_size(), MIN_FONT_SIZE);
        assert_eq!(prefs.encoding(), DEFAULT_ENCODING);
        assert_eq!(prefs.recent_files().len(), MAX_RECENT);
        assert_eq!(&prefs.recent_files()[..3], ["/f0", "/f1", "/f2"]);
    }

    #[test]
    fn fractional_font_size_is_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        write_raw(&store, r#"{"font_size": 16.0}"#);
        assert_eq!(store.load().font_size(), 16);
    }

    #[test]
    fn save_writes_pretty_json_with_verbatim_unicode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let mut prefs = Preferences::default();
        prefs.push_recent("/home/用户/笔记.txt");
        store.save(&prefs).expect("save");

        let raw = fs::read_to_string(store.path().expect("path")).expect("read");
        assert!(raw.contains("笔记.txt"));
        assert!(raw.contains("\n  \"theme\": \"dark\""));
        assert!(!dir.path().join("prefs.json.tmp").exists());
    }

    #[test]
    fn save_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path().join("nested").join("prefs.json"));
        store.save(&Preferences::default()).expect("save");
        assert_eq!(store.load(), Preferences::default());
    }

    #[test]
    fn failed_save_is_reported_and_keeps_previous_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let mut first = Preferences::default();
        first.set_theme(Theme::Light);
        store.save(&first).expect("first save");

        // Occupy the temp slot with a directory so the next write fails.
        fs::create_dir(dir.path().join("prefs.json.tmp")).expect("mkdir");
        let mut second = first.clone();
        second.set_font_size(30);
        assert!(matches!(store.save(&second), Err(ConfigSaveError::Io { .. })));

        assert_eq!(store.load(), first);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn short_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let tmp = dir.path().join("prefs.json.tmp");
        // Every write through this link fails with ENOSPC.
        std::os::unix::fs::symlink("/dev/full", &tmp).expect("symlink");

        assert!(matches!(
            store.save(&Preferences::default()),
            Err(ConfigSaveError::Io { .. })
        ));
        assert!(fs::symlink_metadata(&tmp).is_err());
        assert!(!dir.path().join("prefs.json").exists());
    }

    #[test]
    fn save_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").expect("write");
        let store = ConfigStore::new(blocker.join("prefs.json"));
        assert!(store.save(&Preferences::default()).is_err());
    }

    #[test]
    fn recent_reinsert_moves_to_front() {
        let mut prefs = Preferences::default();
        prefs.push_recent("/a");
        prefs.push_recent("/b");
        prefs.push_recent("/c");
        prefs.push_recent("/a");
        assert_eq!(prefs.recent_files(), ["/a", "/c", "/b"]);
    }

    #[test]
    fn recent_overflow_evicts_oldest() {
        let mut prefs = Preferences::default();
        for i in 0..=MAX_RECENT {
            prefs.push_recent(&format!("/f{i}"));
        }
        assert_eq!(prefs.recent_files().len(), MAX_RECENT);
        assert_eq!(prefs.recent_files()[0], format!("/f{MAX_RECENT}"));
        assert!(!prefs.recent_files().contains(&"/f0".to_owned()));
    }

    #[test]
    fn blank_recent_paths_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let mut prefs = Preferences::default();
        prefs.push_recent("/a");
        prefs.push_recent("");
        prefs.push_recent("   ");
        assert_eq!(prefs.recent_files(), ["/a"]);

        store.save(&prefs).expect("save");
        assert_eq!(store.load(), prefs);
    }

    #[test]
    fn remove_and_clear_recent() {
        let mut prefs = Preferences::default();
        prefs.push_recent("/a");
        prefs.push_recent("/b");
        assert!(prefs.remove_recent("/a"));
        assert!(!prefs.remove_recent("/a"));
        assert_eq!(prefs.recent_files(), ["/b"]);
        prefs.clear_recent();
        assert!(prefs.recent_files().is_empty());
    }

    #[test]
    fn font_size_is_bounded() {
        let mut prefs = Preferences::default();
        prefs.set_font_size(MIN_FONT_SIZE);
        prefs.shrink_font();
        assert_eq!(prefs.font_size(), MIN_FONT_SIZE);
        prefs.set_font_size(10_000);
        assert_eq!(prefs.font_size(), MAX_FONT_SIZE);
        prefs.grow_font();
        assert_eq!(prefs.font_size(), MAX_FONT_SIZE);
    }

    #[test]
    fn theme_toggles() {
        let mut prefs = Preferences::default();
        prefs.toggle_theme();
        assert_eq!(prefs.theme(), Theme::Light);
        prefs.toggle_theme();
        assert_eq!(prefs.theme(), Theme::Dark);
    }

    prop_compose! {
        fn arb_preferences()(
            light in any::<bool>(),
            family in "[A-Za-z][A-Za-z ]{0,20}",
            size in MIN_FONT_SIZE..=MAX_FONT_SIZE,
            encoding in prop::sample::select(vec!["utf-8", "gb18030", "gbk", "latin-1"]),
            recent in prop::collection::vec("/[a-z0-9/]{1,12}\\.txt", 0..12),
        ) -> Preferences {
            let mut prefs = Preferences::default();
            if light {
                prefs.set_theme(Theme::Light);
            }
            prefs.set_font_family(&family);
            prefs.set_font_size(size);
            prefs.set_encoding(encoding);
            for path in &recent {
                prefs.push_recent(path);
            }
            prefs
        }
    }

    proptest! {
        #[test]
        fn save_then_load_roundtrips(prefs in arb_preferences()) {
            let dir = tempfile::tempdir().expect("tempdir");
            let store = store_in(&dir);
            store.save(&prefs).expect("save");
            prop_assert_eq!(store.load(), prefs);
        }

        #[test]
        fn recent_list_invariants_hold(paths in prop::collection::vec("[a-d]", 1..40)) {
            let mut prefs = Preferences::default();
            for p in &paths {
                prefs.push_recent(p);
            }
            let recent = prefs.recent_files();
            prop_assert!(recent.len() <= MAX_RECENT);
            prop_assert_eq!(&recent[0], paths.last().expect("non-empty"));
            let mut seen = std::collections::HashSet::new();
            prop_assert!(recent.iter().all(|p| seen.insert(p)));
        }

        #[test]
        fn arbitrary_bytes_never_break_load(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let dir = tempfile::tempdir().expect("tempdir");
            let store = store_in(&dir);
            fs::write(store.path().expect("path"), &bytes).expect("write");
            let prefs = store.load();
            prop_assert!(prefs.font_size() >= MIN_FONT_SIZE);
            prop_assert!(!prefs.encoding().is_empty());
        }
    }
}
