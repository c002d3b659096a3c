// ── Central error types ───────────────────────────────────────────────────────
//
// Library-level failures are caught at the boundary of every public session
// operation and turned into either a silent default (config) or a
// user-facing message (open/save).  Nothing here is allowed to escape as a
// panic.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Reading the preferences file failed.  Always recovered via defaults.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// No per-user location could be determined.
    #[error("no preferences path available")]
    NoPath,

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Valid JSON, but the top level is not an object.
    #[error("{} does not contain a JSON object", path.display())]
    NotAnObject { path: PathBuf },
}

/// Writing the preferences file failed.  Logged, never shown to the user.
#[derive(Debug, Error)]
pub enum ConfigSaveError {
    #[error("no preferences path available")]
    NoPath,

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot serialise preferences: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A file could not be turned into text.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown encoding \"{0}\"")]
    UnknownEncoding(String),

    /// The bytes are not valid under the pinned encoding.
    #[error("{} is not valid {encoding}", path.display())]
    Malformed { path: PathBuf, encoding: String },
}

/// Text could not be written to disk under the requested encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("unknown encoding \"{0}\"")]
    UnknownEncoding(String),

    /// The label is known but cannot be used for output (e.g. `replacement`).
    #[error("encoding \"{0}\" cannot be used for saving")]
    Unwritable(String),

    #[error("the text contains characters that {encoding} cannot represent (first: {first:?})")]
    Unmappable { encoding: String, first: char },

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Every error that Jotpad can produce.
#[derive(Debug, Error)]
pub enum JotpadError {
    #[error(transparent)]
    ConfigLoad(#[from] ConfigLoadError),

    #[error(transparent)]
    ConfigSave(#[from] ConfigSaveError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, JotpadError>;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmappable_message_names_the_character() {
        let e = EncodeError::Unmappable {
            encoding: "latin-1".to_owned(),
            first: '中',
        };
        let msg = e.to_string();
        assert!(msg.contains("latin-1"));
        assert!(msg.contains("'中'"));
    }

    #[test]
    fn umbrella_is_transparent() {
        let e: JotpadError = DecodeError::UnknownEncoding("klingon".to_owned()).into();
        assert_eq!(e.to_string(), "unknown encoding \"klingon\"");
    }

    #[test]
    fn io_source_is_preserved() {
        use std::error::Error as _;
        let e = EncodeError::Io {
            path: PathBuf::from("/nope/out.txt"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.source().is_some());
    }
}
