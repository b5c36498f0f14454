use std::sync::mpsc;

use crate::logger::{self, Level};
use crate::types::{LoopState, TickReport};

/// Something the loop wants observers to know about.
#[derive(Debug, Clone)]
pub enum Event {
    Log { level: Level, message: String },
    State(LoopState),
    Tick(TickReport),
}

/// Receives loop events. Implementations must not block the loop.
pub trait EventSink {
    fn emit(&self, event: Event);
}

/// Log events go through the global logger (file, stderr echo, TUI log
/// channel); state and tick events go to the presentation layer, if any.
pub struct LoggerSink {
    tx: Option<mpsc::Sender<Event>>,
}

impl LoggerSink {
    pub fn new(tx: Option<mpsc::Sender<Event>>) -> Self {
        Self { tx }
    }
}

impl EventSink for LoggerSink {
    fn emit(&self, event: Event) {
        match event {
            Event::Log { level, message } => logger::log(level, "", &message),
            other => {
                if let Some(tx) = &self.tx {
                    tx.send(other).ok();
                }
            }
        }
    }
}

/// Unbounded channel; `send` never blocks the producer.
impl EventSink for mpsc::Sender<Event> {
    fn emit(&self, event: Event) {
        self.send(event).ok();
    }
}
