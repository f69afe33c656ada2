use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::machine::{EventOutcome, MachineState, PressMachine, PushToTalkSettings, StartOutcome};
use crate::input::modifiers::TargetCombination;
use crate::input::source::{EventSink, ModifierEvent, ModifierSource, SourceError};

/// Lower bound for the safety-poll period (a zero period would spin)
const MIN_SAFETY_POLL: Duration = Duration::from_millis(1);

/// Receives push-to-talk notifications.
///
/// Callbacks run on the coordinator task and must not block.
#[cfg_attr(test, mockall::automock)]
pub trait PushToTalkDelegate: Send + Sync {
    /// The target combination was pressed. The consumer starts recording and
    /// resolves `ack` once recording actually began (or failed).
    fn on_press_requested(&self, ack: StartAck);

    /// The release was confirmed; the consumer stops recording.
    fn on_release_confirmed(&self);
}

/// Push-to-talk monitoring errors
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The modifier source could not install its listeners
    #[error("failed to start modifier source")]
    Source(#[from] SourceError),

    /// Monitoring was started outside a Tokio runtime
    #[error("push-to-talk monitoring requires a Tokio runtime")]
    NoRuntime,
}

#[derive(Debug)]
enum Command {
    Acknowledge { gesture: u64, outcome: StartOutcome },
    Inspect(oneshot::Sender<MachineState>),
    Shutdown,
}

/// One-shot start acknowledgement for a single press gesture.
///
/// Dropping it without calling [`StartAck::started`] or [`StartAck::failed`]
/// counts as a failed start, so the gate can never stay closed.
pub struct StartAck {
    gesture: u64,
    tx: Option<mpsc::UnboundedSender<Command>>,
}

impl StartAck {
    fn new(gesture: u64, tx: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            gesture,
            tx: Some(tx),
        }
    }

    /// Gesture this acknowledgement belongs to
    #[must_use]
    pub const fn gesture(&self) -> u64 {
        self.gesture
    }

    /// Recording actually started
    pub fn started(mut self) {
        self.send(StartOutcome::Started);
    }

    /// Recording could not be started; no release will be reported for this gesture
    pub fn failed(mut self) {
        self.send(StartOutcome::Failed);
    }

    fn send(&mut self, outcome: StartOutcome) {
        if let Some(tx) = self.tx.take() {
            let gesture = self.gesture;
            if tx.send(Command::Acknowledge { gesture, outcome }).is_err() {
                debug!(gesture, "start acknowledged after monitoring stopped");
            }
        }
    }
}

impl Drop for StartAck {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!(gesture = self.gesture, "start acknowledgement dropped unresolved");
            self.send(StartOutcome::Failed);
        }
    }
}

impl fmt::Debug for StartAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartAck")
            .field("gesture", &self.gesture)
            .field("resolved", &self.tx.is_none())
            .finish()
    }
}

/// Coordinator task state; the only place the machine is mutated
struct Session {
    machine: PressMachine,
    source: Arc<dyn ModifierSource>,
    delegate: Arc<dyn PushToTalkDelegate>,
    commands_tx: mpsc::UnboundedSender<Command>,
}

impl Session {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ModifierEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let period = self
            .machine
            .settings()
            .safety_poll_interval
            .max(MIN_SAFETY_POLL);
        let mut poll = time::interval(period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.machine.pending_release();
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Acknowledge { gesture, outcome }) => {
                        self.acknowledge(gesture, outcome);
                    }
                    Some(Command::Inspect(reply)) => {
                        let _ = reply.send(self.machine.state());
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = events.recv() => self.handle_event(&event),
                () = wait_until(deadline) => self.confirm_release(),
                _ = poll.tick() => self.safety_poll(),
            }
        }

        self.machine.reset();
        debug!("push-to-talk session ended");
    }

    fn acknowledge(&mut self, gesture: u64, outcome: StartOutcome) {
        if self.machine.acknowledge(gesture, outcome, Instant::now()) {
            info!(gesture, ?outcome, "recording start acknowledged");
        } else {
            debug!(gesture, ?outcome, "stale start acknowledgement ignored");
        }
    }

    fn handle_event(&mut self, event: &ModifierEvent) {
        match self.machine.on_event(event, Instant::now()) {
            EventOutcome::Press { gesture } => {
                info!(
                    gesture,
                    snapshot = %event.snapshot,
                    channel = ?event.channel,
                    "push-to-talk pressed"
                );
                let ack = StartAck::new(gesture, self.commands_tx.clone());
                self.delegate.on_press_requested(ack);
            }
            EventOutcome::ReleaseScheduled { deadline } => {
                debug!(
                    snapshot = %event.snapshot,
                    delay_ms = deadline.saturating_duration_since(Instant::now()).as_millis(),
                    "release detected, awaiting confirmation"
                );
            }
            EventOutcome::ReleaseIgnored(reason) => {
                debug!(?reason, snapshot = %event.snapshot, "release ignored");
            }
            EventOutcome::Duplicate | EventOutcome::Unchanged | EventOutcome::ReleaseCancelled => {}
        }
    }

    fn confirm_release(&mut self) {
        let snapshot = self.source.snapshot();
        if self.machine.confirm_release(snapshot, Instant::now()) {
            info!(snapshot = %snapshot, "push-to-talk released");
            self.delegate.on_release_confirmed();
        }
    }

    fn safety_poll(&mut self) {
        let snapshot = self.source.snapshot();
        if self.machine.safety_poll(snapshot, Instant::now()) {
            warn!(snapshot = %snapshot, "release event lost, safety poll forced release");
            self.delegate.on_release_confirmed();
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct RunningSession {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Owns the push-to-talk lifecycle: listeners, coordinator task, and timers.
///
/// Every start creates fresh state; every stop discards it.
pub struct PushToTalkMonitor {
    settings: PushToTalkSettings,
    source: Arc<dyn ModifierSource>,
    delegate: Arc<dyn PushToTalkDelegate>,
    running: Option<RunningSession>,
}

impl PushToTalkMonitor {
    /// Creates an idle monitor
    pub fn new(
        settings: PushToTalkSettings,
        source: Arc<dyn ModifierSource>,
        delegate: Arc<dyn PushToTalkDelegate>,
    ) -> Self {
        Self {
            settings,
            source,
            delegate,
            running: None,
        }
    }

    /// Current settings
    #[must_use]
    pub const fn settings(&self) -> &PushToTalkSettings {
        &self.settings
    }

    /// Whether monitoring is active
    #[must_use]
    pub const fn is_monitoring(&self) -> bool {
        self.running.is_some()
    }

    /// Installs both channel listeners and starts the coordinator task.
    ///
    /// Calling it while already monitoring is a no-op.
    ///
    /// # Errors
    /// Returns error if called outside a Tokio runtime or if the source fails to start
    pub fn start_monitoring(&mut self) -> Result<(), MonitorError> {
        if self.running.is_some() {
            debug!("push-to-talk monitoring already running");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let (sink, events) = EventSink::channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        self.source.start(sink)?;

        let session = Session {
            machine: PressMachine::new(self.settings),
            source: Arc::clone(&self.source),
            delegate: Arc::clone(&self.delegate),
            commands_tx: commands_tx.clone(),
        };
        let task = runtime.spawn(session.run(events, commands_rx));

        info!(
            target_combination = %self.settings.target,
            minimum_hold_ms = self.settings.minimum_hold.as_millis(),
            debounce_ms = self.settings.debounce_delay.as_millis(),
            "push-to-talk monitoring started"
        );
        self.running = Some(RunningSession {
            commands: commands_tx,
            task,
        });
        Ok(())
    }

    /// Removes listeners, cancels timers, and discards all state.
    ///
    /// No delegate callback fires after this returns, including a release for a
    /// gesture that is still held: the consumer owns stopping any recording it
    /// started. Calling it while stopped is a no-op.
    pub async fn stop_monitoring(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.source.stop();
        let _ = running.commands.send(Command::Shutdown);
        if let Err(e) = running.task.await {
            warn!(error = %e, "push-to-talk task ended abnormally");
        }
        info!("push-to-talk monitoring stopped");
    }

    /// Changes the target combination via a full stop/start cycle
    ///
    /// # Errors
    /// Returns error if monitoring was running and fails to restart
    pub async fn set_target(&mut self, target: TargetCombination) -> Result<(), MonitorError> {
        if self.settings.target == target {
            return Ok(());
        }

        let was_running = self.is_monitoring();
        self.stop_monitoring().await;
        self.settings.target = target;
        info!(target_combination = %target, "push-to-talk target changed");

        if was_running {
            self.start_monitoring()?;
        }
        Ok(())
    }

    /// Copy of the coordinator's state; initial values while stopped
    pub async fn state(&self) -> MachineState {
        let Some(running) = &self.running else {
            return MachineState::default();
        };

        let (tx, rx) = oneshot::channel();
        if running.commands.send(Command::Inspect(tx)).is_err() {
            return MachineState::default();
        }
        rx.await.unwrap_or_default()
    }
}

impl Drop for PushToTalkMonitor {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            self.source.stop();
            running.task.abort();
        }
    }
}
