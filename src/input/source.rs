use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

use super::modifiers::ModifierSet;

/// Dispatch channel a modifier event arrived on.
///
/// Both channels may report the same physical transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Delivered only while the application has focus
    Local,
    /// Delivered regardless of focus
    Global,
}

/// "Modifier set changed" notification from one dispatch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifierEvent {
    /// Monotonic event time (arbitrary epoch, shared by both channels)
    pub timestamp: Duration,
    /// Which listener delivered the event
    pub channel: Channel,
    /// Modifiers active at the time of the event
    pub snapshot: ModifierSet,
}

impl ModifierEvent {
    /// Convenience constructor
    #[must_use]
    pub const fn new(timestamp: Duration, channel: Channel, snapshot: ModifierSet) -> Self {
        Self {
            timestamp,
            channel,
            snapshot,
        }
    }
}

/// Errors raised while installing or removing event listeners
#[derive(Debug, Error)]
pub enum SourceError {
    /// The platform refused to install a listener (usually a missing permission)
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Listener could not be created
    #[error("failed to install {channel:?} listener: {reason}")]
    ListenerInstall {
        /// Channel that failed
        channel: Channel,
        /// Platform-specific detail
        reason: String,
    },

    /// No event source exists for this platform
    #[error("modifier monitoring is not supported on this platform")]
    Unsupported,
}

/// Single logical event bus both channel adapters publish into
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ModifierEvent>,
}

impl EventSink {
    /// Creates a sink and the receiving end consumed by the coordinator
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ModifierEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publishes an event. Returns `false` once monitoring has stopped.
    pub fn publish(&self, event: ModifierEvent) -> bool {
        if self.tx.send(event).is_err() {
            trace!(channel = ?event.channel, "event dropped, monitor not running");
            return false;
        }
        true
    }

    /// Whether the receiving coordinator is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Capability to observe modifier keys.
///
/// Implementations own the two dispatch-channel listeners. `start` and `stop`
/// must be idempotent.
pub trait ModifierSource: Send + Sync {
    /// Installs both channel listeners, publishing into `sink`
    ///
    /// # Errors
    /// Returns error if a listener cannot be installed
    fn start(&self, sink: EventSink) -> Result<(), SourceError>;

    /// Removes both listeners
    fn stop(&self);

    /// Reads the currently pressed modifiers directly
    fn snapshot(&self) -> ModifierSet;
}
