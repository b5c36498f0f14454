use std::sync::mpsc;

use autodl_core::config::LoopConfig;
use autodl_core::controller::ControlHandle;
use autodl_core::events::Event;
use autodl_core::logger::LogLine;
use autodl_core::types::{LoopState, Point};

/// Keep the log panel bounded on long runs.
const MAX_LOG_LINES: usize = 2000;

pub struct App {
    pub config: LoopConfig,
    pub templates: Vec<String>,
    pub state: LoopState,
    pub ticks: u64,
    pub clicks: u64,
    pub scrolls: u64,
    pub last_match: Option<String>,
    pub last_target: Option<Point>,
    pub log_visible: bool,
    pub log_messages: Vec<LogLine>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<LogLine>,
    pub event_rx: mpsc::Receiver<Event>,
    pub control: ControlHandle,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        config: LoopConfig,
        templates: Vec<String>,
        log_rx: mpsc::Receiver<LogLine>,
        event_rx: mpsc::Receiver<Event>,
        control: ControlHandle,
    ) -> Self {
        Self {
            config,
            templates,
            state: LoopState::Idle,
            ticks: 0,
            clicks: 0,
            scrolls: 0,
            last_match: None,
            last_target: None,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            event_rx,
            control,
            should_quit: false,
        }
    }

    pub fn drain_logs(&mut self) {
        while let Ok(line) = self.log_rx.try_recv() {
            self.log_messages.push(line);
        }
        if self.log_messages.len() > MAX_LOG_LINES {
            let excess = self.log_messages.len() - MAX_LOG_LINES;
            self.log_messages.drain(..excess);
        }
    }

    pub fn drain_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::State(state) => self.state = state,
            Event::Tick(report) => {
                self.ticks = report.tick;
                if report.target.is_some() {
                    self.clicks += 1;
                    self.last_target = report.target;
                }
                if report.scrolled {
                    self.scrolls += 1;
                }
                self.last_match = report.matched;
            }
            // Log events reach the panel through the logger channel.
            Event::Log { .. } => {}
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn toggle_pause(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.control.toggle_pause();
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    pub fn quit(&mut self) {
        self.control.request_stop();
        self.should_quit = true;
    }
}
