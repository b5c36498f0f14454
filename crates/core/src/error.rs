use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    /// No usable template in the directory. `created` is set when the
    /// directory did not exist and was created empty.
    #[error("no templates found in {}", dir.display())]
    NoTemplates { dir: PathBuf, created: bool },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("screenshot failed: {0}")]
    Capture(String),

    #[error("pointer fail-safe triggered (pointer moved to a screen corner)")]
    FailSafe,

    #[error("pointer error: {0}")]
    Pointer(String),

    #[error("matcher error: {0}")]
    Match(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("loop was not started")]
    NotStarted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Errors that must stop the loop instead of being skipped for a tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::Capture(_) | BotError::FailSafe)
    }
}

pub type Result<T, E = BotError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BotError::FailSafe.is_fatal());
        assert!(BotError::Capture("gone".into()).is_fatal());
        assert!(!BotError::Match("too big".into()).is_fatal());
        assert!(!BotError::Pointer("busy".into()).is_fatal());
    }
}
