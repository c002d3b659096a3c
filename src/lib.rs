// ── Safety policy ────────────────────────────────────────────────────────────
// No module needs `unsafe`: file I/O goes through `std::fs` and all
// transcoding through `encoding_rs`.
#![forbid(unsafe_code)]

//! Jotpad: a small plain-text editor core.
//!
//! * [`config`]: per-user preferences, persisted as JSON.
//! * [`encoding`]: encoding detection with a guaranteed fallback, and
//!   strict writes with a single UTF-8 retry.
//! * [`session`]: the document state machine a UI drives.
//! * [`platform`]: front ends; currently a console shell.

pub mod config;
pub mod encoding;
pub mod error;
pub mod platform;
pub mod session;

pub use config::{ConfigStore, Preferences, Theme};
pub use error::{JotpadError, Result};
pub use session::{DocState, Prompter, SaveChoice, SaveTarget, Session, SessionListener};
