//! Modifier source backed by two `CGEventTap` listeners.
//!
//! The session-level tap stands in for the focused-application channel and the
//! HID-level tap for the global one. Both see the same hardware transition, which
//! is what the deduplicator downstream is for.

use std::sync::{mpsc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventTapProxy, CGEventType, CallbackResult,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use tracing::{debug, error, warn};

use super::modifiers::{Modifier, ModifierSet};
use super::source::{Channel, EventSink, ModifierEvent, ModifierSource, SourceError};

/// Maps Core Graphics event flags to a modifier set
#[must_use]
pub fn modifiers_from_flags(flags: CGEventFlags) -> ModifierSet {
    [
        (CGEventFlags::CGEventFlagAlternate, Modifier::Option),
        (CGEventFlags::CGEventFlagCommand, Modifier::Command),
        (CGEventFlags::CGEventFlagControl, Modifier::Control),
        (CGEventFlags::CGEventFlagShift, Modifier::Shift),
        (CGEventFlags::CGEventFlagSecondaryFn, Modifier::Function),
    ]
    .into_iter()
    .filter(|(flag, _)| flags.contains(*flag))
    .map(|(_, modifier)| modifier)
    .collect()
}

struct TapThread {
    run_loop: CFRunLoop,
    join_handle: JoinHandle<()>,
}

/// macOS [`ModifierSource`]
pub struct MacModifierSource {
    epoch: Instant,
    thread: Mutex<Option<TapThread>>,
}

impl Default for MacModifierSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MacModifierSource {
    /// Creates a stopped source
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            thread: Mutex::new(None),
        }
    }
}

impl ModifierSource for MacModifierSource {
    fn start(&self, sink: EventSink) -> Result<(), SourceError> {
        crate::permissions::check_input_monitoring_permission()
            .map_err(|e| SourceError::PermissionDenied(e.to_string()))?;

        let mut thread = self
            .thread
            .lock()
            .map_err(|_| SourceError::ListenerInstall {
                channel: Channel::Global,
                reason: "tap state lock poisoned".to_owned(),
            })?;
        if thread.is_some() {
            return Ok(());
        }

        let (startup_tx, startup_rx) = mpsc::channel::<Result<CFRunLoop, SourceError>>();
        let epoch = self.epoch;
        let join_handle = thread::Builder::new()
            .name("ptt-modifier-taps".to_owned())
            .spawn(move || run_tap_thread(&sink, epoch, &startup_tx))
            .map_err(|e| SourceError::ListenerInstall {
                channel: Channel::Global,
                reason: e.to_string(),
            })?;

        match startup_rx.recv() {
            Ok(Ok(run_loop)) => {
                *thread = Some(TapThread {
                    run_loop,
                    join_handle,
                });
                debug!("modifier event taps installed");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = join_handle.join();
                Err(e)
            }
            Err(e) => {
                let _ = join_handle.join();
                Err(SourceError::ListenerInstall {
                    channel: Channel::Global,
                    reason: format!("tap thread exited during startup: {e}"),
                })
            }
        }
    }

    fn stop(&self) {
        let Ok(mut thread) = self.thread.lock() else {
            return;
        };
        if let Some(TapThread {
            run_loop,
            join_handle,
        }) = thread.take()
        {
            run_loop.stop();
            if join_handle.join().is_err() {
                error!("modifier tap thread panicked while stopping");
            }
            debug!("modifier event taps removed");
        }
    }

    fn snapshot(&self) -> ModifierSet {
        CGEventSource::new(CGEventSourceStateID::CombinedSessionState)
            .and_then(CGEvent::new)
            .map_or_else(
                |()| {
                    warn!("failed to read modifier state, assuming released");
                    ModifierSet::EMPTY
                },
                |event| modifiers_from_flags(event.get_flags()),
            )
    }
}

impl Drop for MacModifierSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_tap_thread(
    sink: &EventSink,
    epoch: Instant,
    startup: &mpsc::Sender<Result<CFRunLoop, SourceError>>,
) {
    let listener = |channel: Channel| {
        let sink = sink.clone();
        move |_proxy: CGEventTapProxy, event_type: CGEventType, event: &CGEvent| {
            if matches!(event_type, CGEventType::FlagsChanged) {
                sink.publish(ModifierEvent::new(
                    epoch.elapsed(),
                    channel,
                    modifiers_from_flags(event.get_flags()),
                ));
            }
            CallbackResult::Keep
        }
    };

    let taps = [
        (Channel::Local, CGEventTapLocation::Session),
        (Channel::Global, CGEventTapLocation::HID),
    ]
    .map(|(channel, location)| {
        CGEventTap::new(
            location,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![CGEventType::FlagsChanged],
            listener(channel),
        )
        .map_err(|()| SourceError::ListenerInstall {
            channel,
            reason: "CGEventTap creation failed".to_owned(),
        })
    });

    let run_loop = CFRunLoop::get_current();
    let mut installed = Vec::with_capacity(taps.len());
    for tap in taps {
        let tap = match tap {
            Ok(tap) => tap,
            Err(e) => {
                let _ = startup.send(Err(e));
                return;
            }
        };
        let Ok(source) = tap.mach_port().create_runloop_source(0) else {
            let _ = startup.send(Err(SourceError::ListenerInstall {
                channel: Channel::Global,
                reason: "failed to create run loop source".to_owned(),
            }));
            return;
        };
        // SAFETY: kCFRunLoopCommonModes is an immutable CFString constant
        #[allow(unsafe_code)]
        run_loop.add_source(&source, unsafe { kCFRunLoopCommonModes });
        tap.enable();
        installed.push(tap);
    }

    if startup.send(Ok(run_loop)).is_err() {
        return;
    }
    CFRunLoop::run_current();
    drop(installed);
    debug!("modifier tap thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_mapping() {
        let flags = CGEventFlags::CGEventFlagAlternate | CGEventFlags::CGEventFlagCommand;
        let set = modifiers_from_flags(flags);
        assert!(set.contains(Modifier::Option));
        assert!(set.contains(Modifier::Command));
        assert!(!set.contains(Modifier::Shift));
    }

    #[test]
    fn test_empty_flags() {
        assert!(modifiers_from_flags(CGEventFlags::CGEventFlagNull).is_empty());
    }

    #[test]
    #[ignore = "requires Input Monitoring permission on macOS"]
    fn test_start_and_stop_taps() {
        let source = MacModifierSource::new();
        let (sink, _rx) = EventSink::channel();
        source.start(sink).unwrap();
        source.stop();
        source.stop();
    }
}
