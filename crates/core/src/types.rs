use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Screen-space point, in screenshot pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Parses `X,Y`, as taken by `--park-at`.
impl FromStr for Point {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected X,Y, got \"{}\"", s))?;
        let x = x.trim().parse::<i32>().map_err(|e| format!("bad x in \"{}\": {}", s, e))?;
        let y = y.trim().parse::<i32>().map_err(|e| format!("bad y in \"{}\": {}", s, e))?;
        Ok(Point { x, y })
    }
}

/// Axis-aligned rectangle in screenshot coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.w / 2,
            y: self.y + self.h / 2,
        }
    }
}

/// What a matcher found for one template on one screenshot.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// Correlation window and its normalized score.
    Region { rect: Rect, score: f32 },
    /// Median of the matched feature keypoints, with the number of pairs kept.
    Point { point: Point, pairs: usize },
}

impl MatchResult {
    /// Where a click should land before jitter is applied.
    pub fn target(&self) -> Point {
        match self {
            MatchResult::Region { rect, .. } => rect.center(),
            MatchResult::Point { point, .. } => *point,
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchResult::Region { rect, score } => write!(
                f,
                "region {}x{} at ({}, {}) score {:.3}",
                rect.w, rect.h, rect.x, rect.y, score
            ),
            MatchResult::Point { point, pairs } => {
                write!(f, "point {} from {} feature pair(s)", point, pairs)
            }
        }
    }
}

/// Pointer action decided by the action selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Click(Point),
    /// Positive scrolls down.
    Scroll(i32),
}

/// Loop controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Paused,
    Stopped,
    /// Start was refused because no template could be loaded.
    FatalIdle,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Stopped | LoopState::FatalIdle)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::Paused => "paused",
            LoopState::Stopped => "stopped",
            LoopState::FatalIdle => "no templates",
        };
        f.write_str(s)
    }
}

/// Summary of one tick, published to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub matched: Option<String>,
    pub target: Option<Point>,
    pub scrolled: bool,
    pub sleep: Duration,
}
