// ── Console shell ─────────────────────────────────────────────────────────────
//
// Line-oriented front end over `Session`.  Stands in for the widget toolkit:
//   • the command loop replaces menus and toolbars,
//   • `Prompter` questions replace the open/save/confirm dialogs,
//   • `ConsoleListener` replaces the title bar, status bar and error boxes.
//
// Generic over the reader and writer so the loop can be driven from tests.

use std::{
    cell::RefCell,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use log::{debug, warn};

use crate::{
    config::{ConfigStore, Preferences},
    encoding::CANDIDATE_ENCODINGS,
    session::{Prompter, SaveChoice, SaveTarget, Session, SessionListener},
};

const HELP: &str = "\
commands:
  new                         start an untitled document
  open <path>                 open a file, detecting its encoding
  open-as <encoding> <path>   open a file under one encoding
  recent                      list recent files
  open-recent <n>             open entry <n> of the recent list
  clear-recent                forget all recent files
  save                        save (asks for a path if untitled)
  save-as <path> [encoding]   save under a new path
  append <text>               add a line to the document
  show                        print the document
  theme                       toggle dark/light
  font <family> <size>        set the editor font
  font+ | font-               grow or shrink the font
  encoding <label>            set the default encoding
  status                      print the status line
  help                        this text
  quit                        exit (asks about unsaved changes)";

// ── Commands ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    New,
    Open(PathBuf),
    OpenAs { encoding: String, path: PathBuf },
    Recent,
    OpenRecent(usize),
    ClearRecent,
    Save,
    SaveAs { path: PathBuf, encoding: Option<String> },
    Append(String),
    Show,
    Theme,
    Font { family: String, size: u32 },
    FontBigger,
    FontSmaller,
    Encoding(String),
    Status,
    Help,
    Quit,
}

/// Parse one input line.  `Ok(None)` for a blank line.
fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map(|(v, r)| (v, r.trim()))
        .unwrap_or((line, ""));

    let cmd = match verb {
        "new" => Command::New,
        "open" => Command::Open(PathBuf::from(need(verb, rest, "path")?)),
        "open-as" => {
            let (encoding, path) = need(verb, rest, "encoding and path")?
                .split_once(char::is_whitespace)
                .ok_or_else(|| format!("{verb}: missing path"))?;
            Command::OpenAs {
                encoding: encoding.to_owned(),
                path: PathBuf::from(path.trim()),
            }
        }
        "recent" => Command::Recent,
        "open-recent" => {
            let n = need(verb, rest, "index")?;
            let n: usize = n
                .parse()
                .map_err(|_| format!("{verb}: \"{n}\" is not a number"))?;
            Command::OpenRecent(n)
        }
        "clear-recent" => Command::ClearRecent,
        "save" => Command::Save,
        "save-as" => {
            let args = need(verb, rest, "path")?;
            match args.rsplit_once(char::is_whitespace) {
                Some((path, enc)) if crate::encoding::canonical_name(enc).is_some() => {
                    Command::SaveAs {
                        path: PathBuf::from(path.trim()),
                        encoding: Some(enc.to_owned()),
                    }
                }
                _ => Command::SaveAs {
                    path: PathBuf::from(args),
                    encoding: None,
                },
            }
        }
        "append" => Command::Append(rest.to_owned()),
        "show" => Command::Show,
        "theme" => Command::Theme,
        "font" => {
            let (family, size) = need(verb, rest, "family and size")?
                .rsplit_once(char::is_whitespace)
                .ok_or_else(|| format!("{verb}: missing size"))?;
            let size: u32 = size
                .parse()
                .map_err(|_| format!("{verb}: \"{size}\" is not a size"))?;
            Command::Font {
                family: family.trim().to_owned(),
                size,
            }
        }
        "font+" => Command::FontBigger,
        "font-" => Command::FontSmaller,
        "encoding" => Command::Encoding(need(verb, rest, "label")?.to_owned()),
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command \"{other}\" (try `help`)")),
    };
    Ok(Some(cmd))
}

fn need<'a>(verb: &str, rest: &'a str, what: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("{verb}: missing {what}"))
    } else {
        Ok(rest)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Lines queued by a `ConsoleListener`, printed by the `Console` that owns
/// the same queue.
type Notices = Rc<RefCell<Vec<String>>>;

/// Queues session notifications for the console's output.
pub struct ConsoleListener {
    notices: Notices,
}

impl ConsoleListener {
    fn push(&self, line: String) {
        self.notices.borrow_mut().push(line);
    }
}

impl SessionListener for ConsoleListener {
    fn on_title_changed(&mut self, title: &str) {
        self.push(format!("== {title} =="));
    }

    fn on_preferences_changed(&mut self, prefs: &Preferences) {
        self.push(describe_preferences(prefs));
    }

    fn on_error(&mut self, message: &str) {
        self.push(format!("error: {message}"));
    }
}

fn describe_preferences(prefs: &Preferences) -> String {
    format!(
        "theme {} | font {} {}pt | encoding {}",
        prefs.theme().as_str(),
        prefs.font_family(),
        prefs.font_size(),
        prefs.encoding()
    )
}

// ── Console ───────────────────────────────────────────────────────────────────

/// Reads commands and dialog answers from `input`, writes to `out`.
pub struct Console<R, W> {
    input: R,
    out: W,
    notices: Notices,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self {
            input,
            out,
            notices: Notices::default(),
        }
    }

    /// A listener whose notifications this console prints.
    pub fn listener(&self) -> ConsoleListener {
        ConsoleListener {
            notices: Rc::clone(&self.notices),
        }
    }

    /// Print everything the listener queued since the last call.
    fn flush_notices(&mut self) -> io::Result<()> {
        let pending = std::mem::take(&mut *self.notices.borrow_mut());
        for line in pending {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()
    }

    /// `Ok(None)` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
    }

    /// Dialog helper: output errors are ignored, input errors count as cancel.
    fn ask(&mut self, question: &str) -> Option<String> {
        let _ = self.flush_notices();
        let _ = write!(self.out, "{question} ");
        let _ = self.out.flush();
        self.read_line().ok().flatten()
    }

    /// Run the command loop until `quit` or end of input.
    pub fn drive(&mut self, session: &mut Session) -> io::Result<()> {
        loop {
            write!(self.out, "> ")?;
            self.out.flush()?;
            let Some(line) = self.read_line()? else {
                if !session.close(self) {
                    warn!("input closed with unsaved changes; they are lost");
                }
                return self.flush_notices();
            };
            match parse(&line) {
                Ok(None) => {}
                Ok(Some(cmd)) => {
                    debug!("command {cmd:?}");
                    let flow = self.execute(cmd, session)?;
                    self.flush_notices()?;
                    if flow == Flow::Exit {
                        return Ok(());
                    }
                }
                Err(msg) => writeln!(self.out, "error: {msg}")?,
            }
        }
    }

    fn execute(&mut self, cmd: Command, session: &mut Session) -> io::Result<Flow> {
        match cmd {
            Command::New => {
                session.new_document(self);
            }
            Command::Open(path) => {
                session.open(&path, self);
            }
            Command::OpenAs { encoding, path } => {
                session.open_with_encoding(&path, &encoding, self);
            }
            Command::Recent => {
                let recent = session.preferences().recent_files();
                if recent.is_empty() {
                    writeln!(self.out, "(none)")?;
                }
                for (i, path) in recent.iter().enumerate() {
                    writeln!(self.out, "{:>2}  {path}", i + 1)?;
                }
            }
            Command::OpenRecent(n) => {
                let entry = n
                    .checked_sub(1)
                    .and_then(|i| session.preferences().recent_files().get(i))
                    .cloned();
                match entry {
                    Some(path) => {
                        session.open_recent(&path, self);
                    }
                    None => writeln!(self.out, "error: no recent file #{n}")?,
                }
            }
            Command::ClearRecent => session.clear_recent_files(),
            Command::Save => {
                session.save(self);
            }
            Command::SaveAs { path, encoding } => {
                let encoding = encoding.unwrap_or_else(|| session.encoding().to_owned());
                session.save_as(&path, &encoding);
            }
            Command::Append(line) => {
                let mut text = session.text().to_owned();
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&line);
                text.push('\n');
                session.set_text(text);
            }
            Command::Show => {
                write!(self.out, "{}", session.text())?;
                if !session.text().is_empty() && !session.text().ends_with('\n') {
                    writeln!(self.out)?;
                }
            }
            Command::Theme => session.toggle_theme(),
            Command::Font { family, size } => session.set_font(&family, size),
            Command::FontBigger => session.grow_font(),
            Command::FontSmaller => session.shrink_font(),
            Command::Encoding(label) => {
                session.set_encoding(&label);
            }
            Command::Status => {
                writeln!(self.out, "{}", session.status())?;
                writeln!(self.out, "{}", describe_preferences(session.preferences()))?;
            }
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Quit => {
                if session.close(self) {
                    return Ok(Flow::Exit);
                }
            }
        }
        Ok(Flow::Continue)
    }
}

impl<R: BufRead, W: Write> Prompter for Console<R, W> {
    fn ask_save_changes(&mut self, document_name: &str) -> SaveChoice {
        let question = format!("{document_name} has unsaved changes. [s]ave, [d]iscard or [c]ancel?");
        loop {
            let Some(answer) = self.ask(&question) else {
                return SaveChoice::Cancel;
            };
            match answer.trim().to_ascii_lowercase().as_str() {
                "s" | "save" => return SaveChoice::Save,
                "d" | "discard" => return SaveChoice::Discard,
                "c" | "cancel" => return SaveChoice::Cancel,
                _ => {}
            }
        }
    }

    fn ask_save_target(&mut self, suggested: &Path) -> Option<SaveTarget> {
        let path = self.ask(&format!("Save as [{}]:", suggested.display()))?;
        let path = match path.trim() {
            "" => suggested.to_owned(),
            p => PathBuf::from(p),
        };
        let encoding = self.ask(&format!(
            "Encoding ({}) [keep]:",
            CANDIDATE_ENCODINGS.join(", ")
        ))?;
        let encoding = Some(encoding.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_owned);
        Some(SaveTarget { path, encoding })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Start a session on the per-user preferences, optionally open `initial`,
/// and serve stdin until the user quits.
pub fn run(initial: Option<PathBuf>) -> anyhow::Result<()> {
    let store = ConfigStore::at_default_path();
    match store.path() {
        Some(p) => debug!("preferences at {}", p.display()),
        None => warn!("no home directory; preferences will not be saved"),
    }

    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stdout());
    let mut session = Session::new(store);
    session.subscribe(Box::new(console.listener()));

    writeln!(console.out, "{} (type `help` for commands)", session.window_title())?;
    writeln!(console.out, "{}", describe_preferences(session.preferences()))?;

    if let Some(path) = initial {
        session.open(&path, &mut console);
        console.flush_notices()?;
    }
    console.drive(&mut session)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
