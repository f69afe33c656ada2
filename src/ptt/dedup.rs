use std::time::Duration;

use crate::input::modifiers::ModifierSet;

/// Default window within which two events count as the same physical transition
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 5;

/// Collapses near-simultaneous duplicates reported by both dispatch channels
#[derive(Debug, Clone)]
pub struct Deduplicator {
    window: Duration,
    last_processed: Option<Duration>,
    last_snapshot: Option<ModifierSet>,
}

impl Deduplicator {
    /// Creates a deduplicator with the given window
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            last_processed: None,
            last_snapshot: None,
        }
    }

    /// Returns `true` if the event should be processed.
    ///
    /// An event is a duplicate only when it carries the same snapshot as the last
    /// accepted one and falls within the window. Accepting an event records its
    /// timestamp and snapshot; rejected events leave both unchanged.
    pub fn accept(&mut self, timestamp: Duration, snapshot: ModifierSet) -> bool {
        if let (Some(last), Some(last_snapshot)) = (self.last_processed, self.last_snapshot) {
            let delta = if timestamp > last {
                timestamp - last
            } else {
                last - timestamp
            };
            if delta < self.window && snapshot == last_snapshot {
                return false;
            }
        }
        self.last_processed = Some(timestamp);
        self.last_snapshot = Some(snapshot);
        true
    }

    /// Timestamp of the most recently accepted event
    #[must_use]
    pub const fn last_processed(&self) -> Option<Duration> {
        self.last_processed
    }

    /// Forgets the last accepted event
    pub fn reset(&mut self) {
        self.last_processed = None;
        self.last_snapshot = None;
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DEDUP_WINDOW_MS))
    }
}
