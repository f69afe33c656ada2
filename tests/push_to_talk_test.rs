//! Integration tests for the push-to-talk coordinator
//!
//! Drives the public API with a fake modifier source on a paused Tokio clock,
//! so every timing boundary (dedup window, minimum hold, debounce, safety poll)
//! is deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ptt_hotkey::input::modifiers::{Modifier, ModifierSet, TargetCombination};
use ptt_hotkey::input::source::{Channel, EventSink, ModifierEvent, ModifierSource, SourceError};
use ptt_hotkey::ptt::{
    PressState, PushToTalkDelegate, PushToTalkMonitor, PushToTalkSettings, StartAck,
};
use tokio::time::{sleep_until, Instant};

const OPT: ModifierSet = ModifierSet::EMPTY.with(Modifier::Option);
const OPT_CMD: ModifierSet = OPT.with(Modifier::Command);
const NONE: ModifierSet = ModifierSet::EMPTY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Callback {
    Press,
    Release,
}

#[derive(Default)]
struct FakeSource {
    current: Mutex<ModifierSet>,
    sink: Mutex<Option<EventSink>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeSource {
    /// Changes the key state and reports it on `channel`
    fn emit_on(&self, channel: Channel, at_ms: u64, snapshot: ModifierSet) {
        *self.current.lock().unwrap() = snapshot;
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.publish(ModifierEvent::new(
                Duration::from_millis(at_ms),
                channel,
                snapshot,
            ));
        }
    }

    fn emit(&self, at_ms: u64, snapshot: ModifierSet) {
        self.emit_on(Channel::Global, at_ms, snapshot);
    }

    /// Changes the key state without any channel reporting it
    fn change_silently(&self, snapshot: ModifierSet) {
        *self.current.lock().unwrap() = snapshot;
    }
}

impl ModifierSource for FakeSource {
    fn start(&self, sink: EventSink) -> Result<(), SourceError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = None;
    }

    fn snapshot(&self) -> ModifierSet {
        *self.current.lock().unwrap()
    }
}

/// Records callbacks; holds start acknowledgements until the test resolves them
#[derive(Default)]
struct RecordingDelegate {
    callbacks: Mutex<Vec<Callback>>,
    acks: Mutex<Vec<StartAck>>,
}

impl RecordingDelegate {
    fn callbacks(&self) -> Vec<Callback> {
        self.callbacks.lock().unwrap().clone()
    }

    fn ack_started(&self) {
        let ack = self.acks.lock().unwrap().pop().expect("no pending ack");
        ack.started();
    }

    fn ack_failed(&self) {
        let ack = self.acks.lock().unwrap().pop().expect("no pending ack");
        ack.failed();
    }
}

impl PushToTalkDelegate for RecordingDelegate {
    fn on_press_requested(&self, ack: StartAck) {
        self.callbacks.lock().unwrap().push(Callback::Press);
        self.acks.lock().unwrap().push(ack);
    }

    fn on_release_confirmed(&self) {
        self.callbacks.lock().unwrap().push(Callback::Release);
    }
}

struct Harness {
    source: Arc<FakeSource>,
    delegate: Arc<RecordingDelegate>,
    monitor: PushToTalkMonitor,
    t0: Instant,
}

impl Harness {
    fn start() -> Self {
        let source = Arc::new(FakeSource::default());
        let delegate = Arc::new(RecordingDelegate::default());
        let mut monitor = PushToTalkMonitor::new(
            PushToTalkSettings::default(),
            source.clone(),
            delegate.clone(),
        );
        monitor.start_monitoring().unwrap();
        Self {
            source,
            delegate,
            monitor,
            t0: Instant::now(),
        }
    }

    /// Advances the paused clock to `ms` after start
    async fn at(&self, ms: u64) {
        sleep_until(self.t0 + Duration::from_millis(ms)).await;
    }

    /// Press at t=0, acknowledged at t=50ms
    async fn press_and_ack(&self) {
        self.source.emit(0, OPT_CMD);
        self.at(50).await;
        self.delegate.ack_started();
    }
}

#[tokio::test(start_paused = true)]
async fn test_clean_press_release_emits_exactly_two_callbacks() {
    let h = Harness::start();
    h.press_and_ack().await;

    h.at(1000).await;
    h.source.emit(1000, NONE);
    h.at(1500).await;

    assert_eq!(h.delegate.callbacks(), vec![Callback::Press, Callback::Release]);
    assert_eq!(h.monitor.state().await.press, PressState::Released);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_events_from_both_channels_processed_once() {
    let h = Harness::start();
    h.source.emit_on(Channel::Local, 0, OPT_CMD);
    h.source.emit_on(Channel::Global, 1, OPT_CMD);
    h.at(10).await;

    assert_eq!(h.delegate.callbacks(), vec![Callback::Press]);
    let state = h.monitor.state().await;
    assert_eq!(state.last_event_timestamp, Some(Duration::ZERO));
    assert_eq!(state.gesture, 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_modifier_within_dedup_window_still_presses() {
    let h = Harness::start();
    h.source.emit(0, OPT);
    h.at(3).await;
    h.source.emit(3, OPT_CMD);
    h.at(5000).await;

    assert_eq!(h.delegate.callbacks(), vec![Callback::Press]);
    let state = h.monitor.state().await;
    assert_eq!(state.press, PressState::Pressed);
    assert_eq!(state.last_event_timestamp, Some(Duration::from_millis(3)));
}

#[tokio::test(start_paused = true)]
async fn test_release_while_awaiting_start_is_discarded() {
    let h = Harness::start();
    h.source.emit(0, OPT_CMD);
    h.at(100).await;
    h.source.emit(100, NONE);
    h.at(1000).await;

    assert_eq!(h.delegate.callbacks(), vec![Callback::Press]);
    let state = h.monitor.state().await;
    assert_eq!(state.press, PressState::Pressed);
    assert!(state.awaiting_start);
}

#[tokio::test(start_paused = true)]
async fn test_release_before_minimum_hold_then_safety_poll_corrects() {
    // {Option, Command} pressed at 0, ack at 50ms, both released at 300ms
    let h = Harness::start();
    h.press_and_ack().await;

    h.at(300).await;
    h.source.emit(300, NONE);
    h.at(450).await;

    assert_eq!(h.delegate.callbacks(), vec![Callback::Press]);
    assert_eq!(h.monitor.state().await.press, PressState::Pressed);

    // Minimum hold ends at 550ms; the 600ms poll notices the keys are up
    h.at(650).await;
    assert_eq!(h.delegate.callbacks(), vec![Callback::Press, Callback::Release]);
    assert_eq!(h.monitor.state().await.press, PressState::Released);
}

#[tokio::test(start_paused = true)]
async fn test_partial_release_confirmed_after_debounce() {
    // {Option, Command} pressed at 0, ack at 50ms, Command released at 610ms
    let h = Harness::start();
    h.press_and_ack().await;

    h.at(610).await;
    h.source.emit(610, OPT);

    h.at(760).await;
    assert_eq!(h.delegate.callbacks(), vec![Callback::Press], "still debouncing");

    h.at(850).await;
    assert_eq!(h.delegate.callbacks(), vec![Callback::Press, Callback::Release]);
}

#[tokio::test(start_paused = true)]
async fn test_repress_within_debounce_cancels_release() {
    let h = Harness::start();
    h.press_and_ack().await;

    h.at(610).await;
    h.source.emit(610, OPT);
    h.at(690).await;
    h.source.emit(690, OPT_CMD);
    h.at(2000).await;

    assert_eq!(h.delegate.callbacks(), vec![Callback::Press]);
    let state = h.monitor.state().await;
    assert_eq!(state.press, PressState::Pressed);
    assert_eq!(state.pending_release, None);
}

#[tokio::test(start_paused = true)]
async fn test_flicker_without_repress_event_is_absorbed_by_reverification() {
    let h = Harness::start();
    h.press_and_ack().await;

    h.at(610).await;
    h.source.emit(610, OPT);
    // Keys come back but neither channel reports it
    h.source.change_silently(OPT_CMD);
    h.at(2000).await;

    assert_eq!(h.delegate.callbacks(), vec![Callback::Press]);
    assert_eq!(h.monitor.state().await.press, PressState::Pressed);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_release_recovered_by_safety_poll() {
    let h = Harness::start();
    h.press_and_ack().await;

    h.at(1000).await;
    h.source.change_silently(NONE);

    // Next poll tick is at 1000 or 1200ms
    h.at(1210).await;
    assert_eq!(h.delegate.callbacks(), vec![Callback::Press, Callback::Release]);

    // Idempotent afterwards
    h.at(3000).await;
    assert_eq!(h.delegate.callbacks().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_start_emits_no_release() {
    let h = Harness::start();
    h.source.emit(0, OPT_CMD);
    h.at(50).await;
    h.delegate.ack_failed();
    h.at(100).await;

    let state = h.monitor.state().await;
    assert_eq!(state.press, PressState::Released);
    assert!(!state.awaiting_start);

    h.source.emit(800, NONE);
    h.at(2000).await;
    assert_eq!(h.delegate.callbacks(), vec![Callback::Press]);
}

#[tokio::test(start_paused = true)]
async fn test_gestures_alternate_press_and_release() {
    let h = Harness::start();
    h.press_and_ack().await;
    h.at(700).await;
    h.source.emit(700, NONE);

    h.at(1000).await;
    h.source.emit(1000, OPT_CMD);
    h.at(1050).await;
    h.delegate.ack_started();
    h.at(1700).await;
    h.source.emit(1700, NONE);
    h.at(2000).await;

    assert_eq!(
        h.delegate.callbacks(),
        vec![
            Callback::Press,
            Callback::Release,
            Callback::Press,
            Callback::Release
        ]
    );
    assert_eq!(h.monitor.state().await.gesture, 2);
}

#[tokio::test(start_paused = true)]
async fn test_start_then_stop_leaves_initial_state() {
    let mut h = Harness::start();
    h.monitor.stop_monitoring().await;

    assert!(!h.monitor.is_monitoring());
    assert!(h.monitor.state().await.is_initial());
    assert_eq!(h.source.starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.source.stops.load(Ordering::SeqCst), 1);

    // Idempotent
    h.monitor.stop_monitoring().await;
    assert_eq!(h.source.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_pending_release_and_state() {
    let mut h = Harness::start();
    h.press_and_ack().await;
    h.at(610).await;
    h.source.emit(610, NONE);
    h.at(650).await;
    assert!(h.monitor.state().await.pending_release.is_some());

    h.monitor.stop_monitoring().await;
    h.at(2000).await;
    assert_eq!(h.delegate.callbacks(), vec![Callback::Press]);

    // Restart begins from scratch
    h.monitor.start_monitoring().unwrap();
    let state = h.monitor.state().await;
    assert!(state.is_initial());
    h.monitor.stop_monitoring().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_held_sends_no_release() {
    let mut h = Harness::start();
    h.press_and_ack().await;
    h.at(1000).await;

    h.monitor.stop_monitoring().await;
    h.source.change_silently(NONE);
    h.at(3000).await;

    // The consumer stops its own recording on stop; no callback arrives
    assert_eq!(h.delegate.callbacks(), vec![Callback::Press]);
}

#[tokio::test(start_paused = true)]
async fn test_start_monitoring_twice_installs_listeners_once() {
    let mut h = Harness::start();
    h.monitor.start_monitoring().unwrap();
    assert_eq!(h.source.starts.load(Ordering::SeqCst), 1);
    h.monitor.stop_monitoring().await;
}

#[tokio::test(start_paused = true)]
async fn test_acknowledgement_after_stop_is_harmless() {
    let mut h = Harness::start();
    h.source.emit(0, OPT_CMD);
    h.at(10).await;
    h.monitor.stop_monitoring().await;

    h.delegate.ack_started();
    h.monitor.start_monitoring().unwrap();
    h.at(100).await;
    assert!(h.monitor.state().await.is_initial());
    h.monitor.stop_monitoring().await;
}

#[tokio::test(start_paused = true)]
async fn test_changing_target_restarts_monitoring() {
    let mut h = Harness::start();
    let target = TargetCombination::new(ModifierSet::EMPTY.with(Modifier::Control));

    h.monitor.set_target(target).await.unwrap();
    assert!(h.monitor.is_monitoring());
    assert_eq!(h.monitor.settings().target, target);
    assert_eq!(h.source.starts.load(Ordering::SeqCst), 2);
    assert_eq!(h.source.stops.load(Ordering::SeqCst), 1);

    // Old combination no longer triggers
    h.source.emit(100, OPT_CMD);
    h.at(150).await;
    assert!(h.delegate.callbacks().is_empty());

    // Extra modifiers alongside the target still count
    h.source.emit(200, ModifierSet::EMPTY.with(Modifier::Control).with(Modifier::Shift));
    h.at(250).await;
    assert_eq!(h.delegate.callbacks(), vec![Callback::Press]);
    h.monitor.stop_monitoring().await;
}
