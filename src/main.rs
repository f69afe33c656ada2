use std::sync::Arc;

use anyhow::Result;
use global_hotkey::GlobalHotKeyEvent;
use ptt_hotkey::config::Config;
use ptt_hotkey::controller::HotkeyController;
use ptt_hotkey::input::hotkey::{GlobalToggleBackend, ToggleDelegate};
use ptt_hotkey::input::source::ModifierSource;
use ptt_hotkey::ptt::{PushToTalkDelegate, PushToTalkMonitor, StartAck};
use ptt_hotkey::{permissions, telemetry};
use tracing::{info, warn};

/// Stand-in consumer: logs recording transitions
struct DemoRecorder;

impl PushToTalkDelegate for DemoRecorder {
    fn on_press_requested(&self, ack: StartAck) {
        // Starting a recorder is asynchronous; acknowledge from a task
        tokio::spawn(async move {
            match permissions::check_microphone_permission() {
                Ok(()) => {
                    info!(gesture = ack.gesture(), "recording started");
                    ack.started();
                }
                Err(e) => {
                    warn!(error = %e, "recording could not start");
                    ack.failed();
                }
            }
        });
    }

    fn on_release_confirmed(&self) {
        info!("recording stopped");
    }
}

impl ToggleDelegate for DemoRecorder {
    fn on_toggle(&self, active: bool) {
        info!(active, "recording toggled");
    }
}

#[cfg(target_os = "macos")]
fn platform_source() -> Arc<dyn ModifierSource> {
    Arc::new(ptt_hotkey::input::macos::MacModifierSource::new())
}

#[cfg(not(target_os = "macos"))]
fn platform_source() -> Arc<dyn ModifierSource> {
    use ptt_hotkey::input::modifiers::ModifierSet;
    use ptt_hotkey::input::source::{EventSink, SourceError};

    struct UnsupportedSource;

    impl ModifierSource for UnsupportedSource {
        fn start(&self, _sink: EventSink) -> Result<(), SourceError> {
            Err(SourceError::Unsupported)
        }

        fn stop(&self) {}

        fn snapshot(&self) -> ModifierSet {
            ModifierSet::EMPTY
        }
    }

    Arc::new(UnsupportedSource)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    println!("✓ Config loaded from ~/.ptt-hotkey.toml");

    telemetry::init(&config.telemetry)?;
    info!("ptt-hotkey starting");

    let settings = config.push_to_talk_settings()?;
    let recorder = Arc::new(DemoRecorder);
    let monitor = PushToTalkMonitor::new(settings, platform_source(), recorder.clone());
    let backend = GlobalToggleBackend::new()?;
    let mut controller =
        HotkeyController::new(monitor, backend, recorder, config.hotkey.key.clone());

    controller.activate(config.hotkey.mode).await?;
    println!(
        "✓ {:?} active on {} (press Ctrl+C to exit)",
        config.hotkey.mode,
        controller.target()
    );

    let receiver = GlobalHotKeyEvent::receiver();
    loop {
        while let Ok(event) = receiver.try_recv() {
            controller.handle_hotkey_event(event.id, event.state);
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            () = tokio::time::sleep(tokio::time::Duration::from_millis(10)) => {}
        }
    }

    controller.deactivate().await;
    println!("\nShutting down...");
    Ok(())
}
