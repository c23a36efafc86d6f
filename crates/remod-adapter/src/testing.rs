//! Test doubles for adapter consumers.

use crate::adapter::ConsoleSink;
use parking_lot::Mutex;
use remod_event::{ConsoleEvent, ConsoleKind};

/// Console sink that keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingConsole {
    events: Mutex<Vec<ConsoleEvent>>,
}

impl RecordingConsole {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far.
    #[must_use]
    pub fn events(&self) -> Vec<ConsoleEvent> {
        self.events.lock().clone()
    }

    /// Messages only, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.message.clone()).collect()
    }
}

impl ConsoleSink for RecordingConsole {
    fn emit(&self, kind: ConsoleKind, message: &str) {
        self.events.lock().push(ConsoleEvent::new(kind, message));
    }
}
