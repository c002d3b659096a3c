// ── Safety policy ────────────────────────────────────────────────────────────
// The binary is a thin launcher; all logic lives in the library.
#![forbid(unsafe_code)]

use std::{path::PathBuf, process::ExitCode};

use log::LevelFilter;

fn main() -> ExitCode {
    init_logging();

    // `jotpad [PATH]`: no flags, the first argument (if any) is opened.
    let initial = std::env::args_os().nth(1).map(PathBuf::from);

    if let Err(e) = jotpad::platform::console::run(initial) {
        // Startup failed or the terminal went away mid-session.
        log::error!("{e:#}");
        eprintln!("jotpad: {e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Log to stderr with a fixed level: debug builds are verbose, release
/// builds report only what the user might care about.
fn init_logging() {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}
