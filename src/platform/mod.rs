// ── Front ends ────────────────────────────────────────────────────────────────
//
// Everything that talks to a human lives below this module.  The session
// core never reaches in here; front ends implement `SessionListener` and
// `Prompter` and drive a `Session`.

pub mod console;
