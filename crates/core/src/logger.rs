use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};

use chrono::Local;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: File,
    tui_tx: Option<mpsc::Sender<LogLine>>,
    echo: bool,
    min_level: Level,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices for TUI rendering (mapped in ui.rs)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log record as delivered to the TUI.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub level: Level,
    pub prefix: String,
    pub color: u8,
    pub timestamp: String,
    pub message: String,
}

/// Initialize the global logger. Clears `app.log` in `log_dir`.
pub fn init(log_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_dir.join("app.log"))?;

    LOGGER
        .set(Mutex::new(Logger {
            file,
            tui_tx: None,
            echo: false,
            min_level: Level::Info,
            prefixes: HashMap::new(),
        }))
        .ok();
    Ok(())
}

/// Wire the TUI log channel.
pub fn set_tui_sender(tx: mpsc::Sender<LogLine>) {
    with_logger(|l| l.tui_tx = Some(tx));
}

/// Also print every line to stderr (headless mode).
pub fn set_echo(echo: bool) {
    with_logger(|l| l.echo = echo);
}

pub fn set_min_level(level: Level) {
    with_logger(|l| l.min_level = level);
}

/// Register a prefix with a color used by the `*_p` helpers.
pub fn register_prefix(prefix: &str, color: u8) {
    with_logger(|l| {
        l.prefixes.insert(prefix.to_string(), color);
    });
}

fn with_logger(f: impl FnOnce(&mut Logger)) {
    if let Some(logger) = LOGGER.get() {
        if let Ok(mut l) = logger.lock() {
            f(&mut l);
        }
    }
}

/// Write one record to the file, stderr echo and TUI channel.
pub fn log(level: Level, prefix: &str, msg: &str) {
    with_logger(|l| {
        if level < l.min_level {
            return;
        }
        let ts = Local::now().format("%H:%M:%S").to_string();

        // File always gets plain text
        let file_line = if prefix.is_empty() {
            format!("[{}] [{}] {}", ts, level, msg)
        } else {
            format!("[{}] [{}] [{}] {}", ts, level, prefix, msg)
        };
        writeln!(l.file, "{}", file_line).ok();
        if l.echo {
            eprintln!("{}", file_line);
        }

        if let Some(tx) = &l.tui_tx {
            let color = l.prefixes.get(prefix).copied().unwrap_or(0);
            tx.send(LogLine {
                level,
                prefix: prefix.to_string(),
                color,
                timestamp: ts,
                message: msg.to_string(),
            })
            .ok();
        }
    });
}

pub fn debug(msg: &str) {
    log(Level::Debug, "", msg);
}

pub fn info(msg: &str) {
    log(Level::Info, "", msg);
}

pub fn warn(msg: &str) {
    log(Level::Warn, "", msg);
}

pub fn error(msg: &str) {
    log(Level::Error, "", msg);
}

pub fn debug_p(prefix: &str, msg: &str) {
    log(Level::Debug, prefix, msg);
}

pub fn info_p(prefix: &str, msg: &str) {
    log(Level::Info, prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    log(Level::Warn, prefix, msg);
}
