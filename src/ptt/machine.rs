//! Press/release classification and the start-acknowledgement gate.
//!
//! The machine is synchronous and takes the current time as a parameter; the
//! coordinator task owns it and drives the timers.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use super::dedup::{Deduplicator, DEFAULT_DEDUP_WINDOW_MS};
use crate::input::modifiers::{ModifierSet, TargetCombination};
use crate::input::source::ModifierEvent;

/// Default minimum hold before a release is honored (500ms)
pub const DEFAULT_MINIMUM_HOLD_MS: u64 = 500;
/// Default delay between a release and its confirmation (200ms)
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;
/// Default safety-poll period (200ms)
pub const DEFAULT_SAFETY_POLL_MS: u64 = 200;

/// Timing and target for one push-to-talk monitoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushToTalkSettings {
    /// Keys that must all be held
    pub target: TargetCombination,
    /// Releases earlier than this after acknowledged start are discarded
    pub minimum_hold: Duration,
    /// Delay before a release is re-verified and committed
    pub debounce_delay: Duration,
    /// Period of the fail-safe key-state re-check
    pub safety_poll_interval: Duration,
    /// Identical snapshots closer together than this are treated as duplicates
    pub dedup_window: Duration,
}

impl Default for PushToTalkSettings {
    fn default() -> Self {
        Self {
            target: TargetCombination::default(),
            minimum_hold: Duration::from_millis(DEFAULT_MINIMUM_HOLD_MS),
            debounce_delay: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            safety_poll_interval: Duration::from_millis(DEFAULT_SAFETY_POLL_MS),
            dedup_window: Duration::from_millis(DEFAULT_DEDUP_WINDOW_MS),
        }
    }
}

/// Whether the target combination is considered held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressState {
    /// Not held
    #[default]
    Released,
    /// Held (possibly awaiting release confirmation)
    Pressed,
}

/// Consumer's answer to a press request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Recording actually began
    Started,
    /// Permission denied, device unavailable, etc.
    Failed,
}

/// Why a release signal was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Consumer has not yet acknowledged the start
    AwaitingStart,
    /// Acknowledged, but held for less than the minimum duration
    BelowMinimumHold {
        /// How long recording had been running
        held: Duration,
    },
}

/// Result of feeding one raw event through the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Dropped by the deduplicator
    Duplicate,
    /// Nothing changed
    Unchanged,
    /// Target became satisfied; the delegate must be asked to start
    Press {
        /// Identifier the start acknowledgement must carry
        gesture: u64,
    },
    /// A release confirmation is due at `deadline`
    ReleaseScheduled {
        /// When to re-verify the key state
        deadline: Instant,
    },
    /// Release observed but not trusted
    ReleaseIgnored(IgnoreReason),
    /// Target satisfied again before the pending release fired
    ReleaseCancelled,
}

/// Inspectable copy of every state field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MachineState {
    /// Press state
    pub press: PressState,
    /// Start-acknowledgement gate
    pub awaiting_start: bool,
    /// Set when the consumer acknowledged a successful start
    pub recording_started_at: Option<Instant>,
    /// Deadline of the pending release confirmation, if any
    pub pending_release: Option<Instant>,
    /// Timestamp of the most recently accepted raw event
    pub last_event_timestamp: Option<Duration>,
    /// Counter identifying the current press gesture
    pub gesture: u64,
}

impl MachineState {
    /// Whether every field holds its initial value
    #[must_use]
    pub fn is_initial(&self) -> bool {
        *self == Self::default()
    }
}

/// Push-to-talk key-state machine
#[derive(Debug, Clone)]
pub struct PressMachine {
    settings: PushToTalkSettings,
    dedup: Deduplicator,
    press: PressState,
    awaiting_start: bool,
    recording_started_at: Option<Instant>,
    pending_release: Option<Instant>,
    gesture: u64,
}

impl PressMachine {
    /// Creates a machine in the released state
    #[must_use]
    pub const fn new(settings: PushToTalkSettings) -> Self {
        Self {
            settings,
            dedup: Deduplicator::new(settings.dedup_window),
            press: PressState::Released,
            awaiting_start: false,
            recording_started_at: None,
            pending_release: None,
            gesture: 0,
        }
    }

    /// Session settings
    #[must_use]
    pub const fn settings(&self) -> &PushToTalkSettings {
        &self.settings
    }

    /// Deadline of the pending release confirmation
    #[must_use]
    pub const fn pending_release(&self) -> Option<Instant> {
        self.pending_release
    }

    /// Copy of all state fields
    #[must_use]
    pub const fn state(&self) -> MachineState {
        MachineState {
            press: self.press,
            awaiting_start: self.awaiting_start,
            recording_started_at: self.recording_started_at,
            pending_release: self.pending_release,
            last_event_timestamp: self.dedup.last_processed(),
            gesture: self.gesture,
        }
    }

    /// Deduplicates and classifies one raw event
    pub fn on_event(&mut self, event: &ModifierEvent, now: Instant) -> EventOutcome {
        if !self.dedup.accept(event.timestamp, event.snapshot) {
            trace!(
                channel = ?event.channel,
                timestamp_us = event.timestamp.as_micros(),
                "duplicate modifier event dropped"
            );
            return EventOutcome::Duplicate;
        }

        let satisfied = self.settings.target.is_satisfied_by(event.snapshot);
        match (satisfied, self.press) {
            (true, PressState::Released) => self.begin_press(),
            (true, PressState::Pressed) => {
                if self.pending_release.take().is_some() {
                    debug!(gesture = self.gesture, "re-press before confirmation, release cancelled");
                    EventOutcome::ReleaseCancelled
                } else {
                    EventOutcome::Unchanged
                }
            }
            (false, PressState::Pressed) => self.request_release(now),
            (false, PressState::Released) => EventOutcome::Unchanged,
        }
    }

    fn begin_press(&mut self) -> EventOutcome {
        self.pending_release = None;
        self.press = PressState::Pressed;
        self.awaiting_start = true;
        self.recording_started_at = None;
        self.gesture = self.gesture.wrapping_add(1);
        EventOutcome::Press {
            gesture: self.gesture,
        }
    }

    fn request_release(&mut self, now: Instant) -> EventOutcome {
        if self.awaiting_start {
            return EventOutcome::ReleaseIgnored(IgnoreReason::AwaitingStart);
        }
        let Some(started_at) = self.recording_started_at else {
            return EventOutcome::ReleaseIgnored(IgnoreReason::AwaitingStart);
        };

        let held = now.saturating_duration_since(started_at);
        if held < self.settings.minimum_hold {
            return EventOutcome::ReleaseIgnored(IgnoreReason::BelowMinimumHold { held });
        }

        let deadline = now + self.settings.debounce_delay;
        self.pending_release = Some(deadline);
        EventOutcome::ReleaseScheduled { deadline }
    }

    /// Applies the consumer's start acknowledgement for `gesture`.
    ///
    /// Returns `false` if the acknowledgement is stale and was ignored.
    pub fn acknowledge(&mut self, gesture: u64, outcome: StartOutcome, now: Instant) -> bool {
        if gesture != self.gesture || !self.awaiting_start || self.press != PressState::Pressed {
            return false;
        }

        self.awaiting_start = false;
        match outcome {
            StartOutcome::Started => self.recording_started_at = Some(now),
            StartOutcome::Failed => {
                // Nothing was recorded, so no release callback is owed
                self.press = PressState::Released;
                self.recording_started_at = None;
                self.pending_release = None;
            }
        }
        true
    }

    /// Fires the pending release confirmation against a direct snapshot.
    ///
    /// Returns `true` if the release was committed and the delegate must be told.
    pub fn confirm_release(&mut self, snapshot: ModifierSet, now: Instant) -> bool {
        let Some(deadline) = self.pending_release else {
            return false;
        };
        if now < deadline {
            return false;
        }
        self.pending_release = None;

        if self.press != PressState::Pressed {
            return false;
        }
        if self.settings.target.is_satisfied_by(snapshot) {
            debug!(
                gesture = self.gesture,
                snapshot = %snapshot,
                "release not confirmed, combination held again"
            );
            return false;
        }

        self.commit_release();
        true
    }

    /// Fail-safe re-check for a release that no channel delivered.
    ///
    /// Returns `true` if the release was committed and the delegate must be told.
    pub fn safety_poll(&mut self, snapshot: ModifierSet, now: Instant) -> bool {
        if self.press != PressState::Pressed || self.awaiting_start || self.pending_release.is_some()
        {
            return false;
        }
        let Some(started_at) = self.recording_started_at else {
            return false;
        };
        if now.saturating_duration_since(started_at) < self.settings.minimum_hold {
            return false;
        }
        if self.settings.target.is_satisfied_by(snapshot) {
            return false;
        }

        self.commit_release();
        true
    }

    fn commit_release(&mut self) {
        self.press = PressState::Released;
        self.awaiting_start = false;
        self.recording_started_at = None;
        self.pending_release = None;
    }

    /// Returns every field to its initial value
    pub fn reset(&mut self) {
        *self = Self::new(self.settings);
    }
}
