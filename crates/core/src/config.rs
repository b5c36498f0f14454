use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::logger;
use crate::types::Point;

/// Which matcher implementation drives the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Correlation,
    Feature,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "correlation" => Ok(Strategy::Correlation),
            "feature" => Ok(Strategy::Feature),
            other => Err(format!("unknown strategy \"{}\" (expected correlation or feature)", other)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Correlation => f.write_str("correlation"),
            Strategy::Feature => f.write_str("feature"),
        }
    }
}

/// Where the pointer goes after a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostClick {
    /// Back to where it was before the click.
    #[default]
    Restore,
    /// To a fixed parking coordinate.
    Park(Point),
}

/// Loop configuration. Doubles as the on-disk settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub confidence: f32,
    pub grayscale: bool,
    pub min_sleep: f64,
    pub max_sleep: f64,
    pub templates_path: PathBuf,
    pub tol_pixels: u32,
    pub retries_before_scroll: u32,
    pub transparent_ads_fix: bool,
    pub overlay_streak: u32,
    pub scroll_amount: i32,
    pub strategy: Strategy,
    pub post_click: PostClick,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            confidence: 0.7,
            grayscale: true,
            min_sleep: 1.0,
            max_sleep: 5.0,
            templates_path: PathBuf::from("templates"),
            tol_pixels: 30,
            retries_before_scroll: 3,
            transparent_ads_fix: true,
            overlay_streak: 5,
            scroll_amount: 5,
            strategy: Strategy::Correlation,
            post_click: PostClick::Restore,
        }
    }
}

impl LoopConfig {
    /// Load settings from `path`. A missing file yields the defaults; an
    /// unreadable one is logged and also yields the defaults.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                logger::warn(&format!("cannot read {}: {}, using defaults", path.display(), e));
                return Self::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                logger::warn(&format!("ignoring malformed {}: {}", path.display(), e));
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BotError::Config(format!("cannot serialize settings: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(BotError::Config(format!(
                "confidence must be between 0 and 1, got {}",
                self.confidence
            )));
        }
        if !self.min_sleep.is_finite() || self.min_sleep < 0.0 {
            return Err(BotError::Config(format!(
                "min sleep must be a non-negative number of seconds, got {}",
                self.min_sleep
            )));
        }
        if !self.max_sleep.is_finite() || self.max_sleep < self.min_sleep {
            return Err(BotError::Config(format!(
                "max sleep ({}) must not be lower than min sleep ({})",
                self.max_sleep, self.min_sleep
            )));
        }
        if self.tol_pixels > i32::MAX as u32 {
            return Err(BotError::Config(format!("jitter tolerance {} is too large", self.tol_pixels)));
        }
        if self.overlay_streak == 0 {
            return Err(BotError::Config("overlay streak must be at least 1".into()));
        }
        if self.scroll_amount == 0 {
            return Err(BotError::Config("scroll amount must not be zero".into()));
        }
        Ok(())
    }
}
