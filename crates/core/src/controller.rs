use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::action::ActionSelector;
use crate::config::{LoopConfig, PostClick};
use crate::error::{BotError, Result};
use crate::events::{Event, EventSink};
use crate::logger::Level;
use crate::matcher::{Matcher, Screenshot};
use crate::platform::Platform;
use crate::sleep::{random_interval, sleep_interruptible, POLL_INTERVAL};
use crate::templates::TemplateSet;
use crate::types::{LoopState, MatchResult, Point, PointerAction, TickReport};

#[derive(Default)]
struct Requests {
    pause: AtomicBool,
    stop: AtomicBool,
}

/// Pause/resume/stop requests for a running loop. Cheap to clone, safe to
/// use from any thread; the loop observes requests between ticks.
#[derive(Clone, Default)]
pub struct ControlHandle(Arc<Requests>);

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_pause(&self) {
        self.0.pause.store(true, Ordering::Release);
    }

    pub fn request_resume(&self) {
        self.0.pause.store(false, Ordering::Release);
    }

    /// Flip between paused and running; returns true if now paused.
    pub fn toggle_pause(&self) -> bool {
        !self.0.pause.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn request_stop(&self) {
        self.0.stop.store(true, Ordering::Release);
    }

    pub fn pause_requested(&self) -> bool {
        self.0.pause.load(Ordering::Acquire)
    }

    pub fn stop_requested(&self) -> bool {
        self.0.stop.load(Ordering::Acquire)
    }
}

/// What the scheduler should do after `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A tick ran; wait this long before the next step.
    Ticked(Duration),
    /// Paused; poll again after this long.
    Paused(Duration),
    Stopped,
}

/// Owns the match-and-act loop and its state machine.
pub struct LoopController {
    config: LoopConfig,
    templates: Arc<TemplateSet>,
    matcher: Box<dyn Matcher>,
    platform: Box<dyn Platform>,
    sink: Box<dyn EventSink>,
    control: ControlHandle,
    selector: ActionSelector,
    rng: StdRng,
    state: LoopState,
    ticks: u64,
}

impl LoopController {
    pub fn new(
        config: LoopConfig,
        templates: Arc<TemplateSet>,
        matcher: Box<dyn Matcher>,
        platform: Box<dyn Platform>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let selector = ActionSelector::new(&config);
        Self {
            config,
            templates,
            matcher,
            platform,
            sink,
            control: ControlHandle::new(),
            selector,
            rng: StdRng::from_entropy(),
            state: LoopState::Idle,
            ticks: 0,
        }
    }

    /// Use a handle created elsewhere (e.g. shared with the UI thread).
    pub fn with_control(mut self, control: ControlHandle) -> Self {
        self.control = control;
        self
    }

    /// Deterministic jitter and sleeps.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn log(&self, level: Level, message: impl Into<String>) {
        self.sink.emit(Event::Log { level, message: message.into() });
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            self.state = state;
            self.sink.emit(Event::State(state));
        }
    }

    /// Idle -> Running, or Idle -> FatalIdle when there is nothing to look
    /// for. An invalid config leaves the controller Idle.
    pub fn start(&mut self) -> Result<()> {
        if self.state != LoopState::Idle {
            return Ok(());
        }
        if let Err(e) = self.config.validate() {
            self.log(Level::Error, e.to_string());
            return Err(e);
        }
        if self.templates.is_empty() {
            let dir = self.config.templates_path.clone();
            self.log(
                Level::Error,
                format!(
                    "no templates in {}: save screenshots of the element to click there as images and restart",
                    dir.display()
                ),
            );
            self.set_state(LoopState::FatalIdle);
            return Err(BotError::NoTemplates { dir, created: false });
        }
        self.log(
            Level::Info,
            format!(
                "started with {} template(s): {}",
                self.templates.len(),
                self.templates.names().join(", ")
            ),
        );
        self.set_state(LoopState::Running);
        Ok(())
    }

    /// Advance the state machine by one quantum. Stop and pause requests are
    /// honored here, never in the middle of a tick. A fatal tick error moves
    /// the loop to Stopped and is returned.
    pub fn step(&mut self) -> Result<Step> {
        match self.state {
            LoopState::Idle => return Err(BotError::NotStarted),
            LoopState::Stopped | LoopState::FatalIdle => return Ok(Step::Stopped),
            LoopState::Running | LoopState::Paused => {}
        }

        // A requested stop is silent: nothing is emitted past this point.
        if self.control.stop_requested() {
            self.state = LoopState::Stopped;
            return Ok(Step::Stopped);
        }
        if self.control.pause_requested() {
            if self.state == LoopState::Running {
                self.log(Level::Info, "paused");
                self.set_state(LoopState::Paused);
            }
            return Ok(Step::Paused(POLL_INTERVAL));
        }
        if self.state == LoopState::Paused {
            self.log(Level::Info, "resumed");
            self.set_state(LoopState::Running);
        }

        match self.tick() {
            Ok(report) => Ok(Step::Ticked(report.sleep)),
            Err(e) => {
                self.log(Level::Error, format!("stopping: {}", e));
                self.set_state(LoopState::Stopped);
                Err(e)
            }
        }
    }

    /// Run on the current thread until stopped. Sleeps are cut short by
    /// pause and stop requests.
    pub fn run(&mut self) -> Result<()> {
        if self.state == LoopState::Idle {
            self.start()?;
        }
        loop {
            match self.step()? {
                Step::Ticked(sleep) => {
                    let control = self.control.clone();
                    sleep_interruptible(sleep, || control.stop_requested() || control.pause_requested());
                }
                Step::Paused(poll) => thread::sleep(poll),
                Step::Stopped => return Ok(()),
            }
        }
    }

    /// Screenshot, first matching template, act, pick the next sleep.
    pub fn tick(&mut self) -> Result<TickReport> {
        self.ticks += 1;
        let image = self.platform.capture_screen().map_err(|e| match e {
            BotError::Capture(_) | BotError::FailSafe => e,
            other => BotError::Capture(other.to_string()),
        })?;
        let screenshot = Screenshot::new(self.ticks, image);

        let found = self.first_match(&screenshot)?;
        let mut target = None;
        let mut scrolled = false;
        let matched = match found {
            Some((name, found)) => {
                let actions = self.selector.on_match(&name, &found, &mut self.rng);
                for action in actions {
                    match action {
                        PointerAction::Click(p) => {
                            self.log(
                                Level::Info,
                                format!("clicking on {} at x={} y={} ({})", name, p.x, p.y, found),
                            );
                            target = Some(p);
                        }
                        PointerAction::Scroll(amount) => {
                            self.log(
                                Level::Info,
                                format!("{} keeps matching, assuming an overlay and scrolling {}", name, amount),
                            );
                            scrolled = true;
                        }
                    }
                    self.perform(action)?;
                }
                Some(name)
            }
            None => {
                self.log(Level::Info, "no matches found");
                if let Some(action) = self.selector.on_miss() {
                    if let PointerAction::Scroll(amount) = action {
                        self.log(
                            Level::Info,
                            format!("{} misses in a row, scrolling {}", self.config.retries_before_scroll, amount),
                        );
                        scrolled = true;
                    }
                    self.perform(action)?;
                }
                None
            }
        };

        let sleep = random_interval(&mut self.rng, self.config.min_sleep, self.config.max_sleep);
        self.log(Level::Debug, format!("sleeping for {:.2}s", sleep.as_secs_f64()));
        let report = TickReport { tick: self.ticks, matched, target, scrolled, sleep };
        self.sink.emit(Event::Tick(report.clone()));
        Ok(report)
    }

    /// Templates in order; the first hit ends the search.
    fn first_match(&self, screenshot: &Screenshot) -> Result<Option<(String, MatchResult)>> {
        for template in self.templates.iter() {
            let confidence = template.threshold.unwrap_or(self.config.confidence);
            match self.matcher.find(template, screenshot, self.config.grayscale, confidence) {
                Ok(Some(found)) => return Ok(Some((template.name.clone(), found))),
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => self.log(Level::Debug, format!("skipping {} this tick: {}", template.name, e)),
            }
        }
        Ok(None)
    }

    fn perform(&mut self, action: PointerAction) -> Result<()> {
        match action {
            PointerAction::Click(at) => self.click_and_leave(at),
            PointerAction::Scroll(amount) => {
                let r = self.platform.scroll(amount);
                self.tolerate(r)
            }
        }
    }

    /// Click, then move the pointer off the control.
    fn click_and_leave(&mut self, at: Point) -> Result<()> {
        let before = match self.platform.pointer_position() {
            Ok(p) => Some(p),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.log(Level::Warn, format!("pointer position unavailable: {}", e));
                None
            }
        };
        let r = self.platform.click(at);
        self.tolerate(r)?;

        let rest = match self.config.post_click {
            PostClick::Restore => before,
            PostClick::Park(p) => Some(p),
        };
        if let Some(p) = rest {
            let r = self.platform.move_to(p);
            self.tolerate(r)?;
        }
        Ok(())
    }

    /// Fatal pointer errors propagate; anything else becomes a warning.
    fn tolerate(&self, r: Result<()>) -> Result<()> {
        match r {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.log(Level::Warn, e.to_string());
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}
