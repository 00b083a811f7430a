use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Maximum number of events retained in the ring buffer.
const EVENT_LOG_CAPACITY: usize = 200;

/// A typed event from the detection/session pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A detection tick started.
    Tick,
    PlayerDetected {
        player_name: String,
        window: String,
        title: String,
    },
    TitleChanged {
        title: String,
    },
    NothingDetected,
    Recognized {
        anime_id: i64,
        anime_title: String,
        episode: Option<u32>,
    },
    Unrecognized {
        raw_title: String,
        /// Not an episode file, so no failure was reported.
        ignored: bool,
    },
    SessionEnded {
        anime_id: i64,
        reason: EndReason,
    },
}

/// Why a watching session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    PlayerClosed,
    TitleChanged,
}

/// A timestamped event entry.
pub type EventEntry = (DateTime<Utc>, TrackerEvent);

/// Bounded ring buffer of tracker events.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<EventEntry>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    /// Push a new event, evicting the oldest if at capacity.
    pub fn push(&mut self, event: TrackerEvent) {
        if self.entries.len() >= EVENT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((Utc::now(), event));
    }

    /// Return a snapshot of all entries (newest last).
    pub fn snapshot(&self) -> Vec<EventEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Events without timestamps, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &TrackerEvent> {
        self.entries.iter().map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
