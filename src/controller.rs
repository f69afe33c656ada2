use std::sync::Arc;

use global_hotkey::HotKeyState;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::input::hotkey::{ToggleBackend, ToggleDelegate, ToggleError, ToggleState};
use crate::input::modifiers::TargetCombination;
use crate::ptt::{MonitorError, PushToTalkMonitor};

/// How the hotkey drives recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotkeyMode {
    /// Hold the modifier combination to record
    #[default]
    PushToTalk,
    /// Each press-and-release of a fixed hotkey flips recording on/off
    Toggle,
}

/// Mode activation errors
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Push-to-talk monitoring failed to start
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    /// Toggle hotkey registration failed
    #[error(transparent)]
    Toggle(#[from] ToggleError),
}

#[derive(Debug)]
enum ActiveMode {
    Inactive,
    PushToTalk,
    Toggle { id: u32, state: ToggleState },
}

/// Switches between push-to-talk and toggle mode.
///
/// At most one mode is installed at a time; the previous mode is fully torn
/// down before the next one is installed.
pub struct HotkeyController<B: ToggleBackend> {
    target: TargetCombination,
    toggle_key: String,
    push_to_talk: PushToTalkMonitor,
    toggle_backend: B,
    toggle_delegate: Arc<dyn ToggleDelegate>,
    active: ActiveMode,
}

impl<B: ToggleBackend> HotkeyController<B> {
    /// Creates an inactive controller
    pub fn new(
        push_to_talk: PushToTalkMonitor,
        toggle_backend: B,
        toggle_delegate: Arc<dyn ToggleDelegate>,
        toggle_key: impl Into<String>,
    ) -> Self {
        Self {
            target: push_to_talk.settings().target,
            toggle_key: toggle_key.into(),
            push_to_talk,
            toggle_backend,
            toggle_delegate,
            active: ActiveMode::Inactive,
        }
    }

    /// Currently installed mode
    #[must_use]
    pub const fn mode(&self) -> Option<HotkeyMode> {
        match self.active {
            ActiveMode::Inactive => None,
            ActiveMode::PushToTalk => Some(HotkeyMode::PushToTalk),
            ActiveMode::Toggle { .. } => Some(HotkeyMode::Toggle),
        }
    }

    /// Active target combination
    #[must_use]
    pub const fn target(&self) -> TargetCombination {
        self.target
    }

    /// The push-to-talk monitor (for state inspection)
    #[must_use]
    pub const fn push_to_talk(&self) -> &PushToTalkMonitor {
        &self.push_to_talk
    }

    /// Tears down the current mode, then installs `mode`
    ///
    /// # Errors
    /// Returns error if the new mode cannot be installed; the controller is then inactive
    pub async fn activate(&mut self, mode: HotkeyMode) -> Result<(), ControllerError> {
        self.deactivate().await;

        match mode {
            HotkeyMode::PushToTalk => {
                self.push_to_talk.start_monitoring()?;
                self.active = ActiveMode::PushToTalk;
            }
            HotkeyMode::Toggle => {
                let id = self.toggle_backend.register(self.target, &self.toggle_key)?;
                self.active = ActiveMode::Toggle {
                    id,
                    state: ToggleState::default(),
                };
            }
        }
        info!(?mode, combination = %self.target, "hotkey mode activated");
        Ok(())
    }

    /// Removes whichever mode is installed. Idempotent.
    ///
    /// A toggle session that is still on is switched off first, so the toggle
    /// delegate always sees a matching `false` for every `true`.
    pub async fn deactivate(&mut self) {
        match std::mem::replace(&mut self.active, ActiveMode::Inactive) {
            ActiveMode::Inactive => {}
            ActiveMode::PushToTalk => self.push_to_talk.stop_monitoring().await,
            ActiveMode::Toggle { state, .. } => {
                self.toggle_backend.unregister();
                if state.is_active() {
                    info!("toggle mode removed while on, switching off");
                    self.toggle_delegate.on_toggle(false);
                }
            }
        }
    }

    /// Changes the target combination, reinstalling the active mode
    ///
    /// # Errors
    /// Returns error if the active mode cannot be reinstalled
    pub async fn update_target(&mut self, target: TargetCombination) -> Result<(), ControllerError> {
        if target == self.target {
            return Ok(());
        }

        let mode = self.mode();
        self.deactivate().await;
        self.target = target;
        self.push_to_talk.set_target(target).await?;

        if let Some(mode) = mode {
            self.activate(mode).await?;
        }
        Ok(())
    }

    /// Routes a toggle hotkey event
    pub fn handle_hotkey_event(&mut self, id: u32, key_state: HotKeyState) {
        let ActiveMode::Toggle {
            id: registered,
            state,
        } = &mut self.active
        else {
            debug!(id, "hotkey event outside toggle mode (ignored)");
            return;
        };
        if id != *registered {
            return;
        }

        if let Some(active) = state.on_key(key_state) {
            info!(active, "toggle hotkey flipped");
            self.toggle_delegate.on_toggle(active);
        }
    }
}
