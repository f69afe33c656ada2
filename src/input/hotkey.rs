use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyManager, HotKeyState,
};
use thiserror::Error;
use tracing::{debug, info};

use super::modifiers::{Modifier, TargetCombination};

/// Toggle hotkey errors
#[derive(Debug, Error)]
pub enum ToggleError {
    /// Platform hotkey manager could not be created
    #[error("failed to create hotkey manager")]
    Manager(#[source] global_hotkey::Error),

    /// Registration was refused (usually taken by another app)
    #[error("failed to register hotkey {0}")]
    Register(String, #[source] global_hotkey::Error),

    /// Modifier cannot be part of a registered hotkey
    #[error("modifier {0} is not supported for toggle hotkeys")]
    UnsupportedModifier(Modifier),

    /// Key name not recognized
    #[error("unsupported key: {0}")]
    UnknownKey(String),
}

/// Receives toggle-mode state changes
pub trait ToggleDelegate: Send + Sync {
    /// Called once per full press-and-release with the new state
    fn on_toggle(&self, active: bool);
}

/// Flip-flop driven by one registered hotkey.
///
/// A press arms it; the following release flips the active flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToggleState {
    active: bool,
    armed: bool,
}

impl ToggleState {
    /// Whether the toggle is currently on
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Feeds a hotkey state; returns the new active flag when it flipped
    pub fn on_key(&mut self, state: HotKeyState) -> Option<bool> {
        match state {
            HotKeyState::Pressed => {
                if self.armed {
                    debug!("hotkey press repeated (ignored)");
                }
                self.armed = true;
                None
            }
            HotKeyState::Released if self.armed => {
                self.armed = false;
                self.active = !self.active;
                Some(self.active)
            }
            HotKeyState::Released => {
                debug!("hotkey released without press (ignored)");
                None
            }
        }
    }
}

/// Registration capability for the toggle hotkey
pub trait ToggleBackend {
    /// Registers `target` + `key`, returning the id carried by its events
    ///
    /// # Errors
    /// Returns error if the combination is invalid or cannot be registered
    fn register(&mut self, target: TargetCombination, key: &str) -> Result<u32, ToggleError>;

    /// Removes the registered hotkey, if any
    fn unregister(&mut self);
}

/// [`ToggleBackend`] on top of the `global-hotkey` crate
pub struct GlobalToggleBackend {
    manager: GlobalHotKeyManager,
    registered: Option<HotKey>,
}

impl GlobalToggleBackend {
    /// Creates the platform hotkey manager
    ///
    /// # Errors
    /// Returns error if the platform manager cannot be created
    pub fn new() -> Result<Self, ToggleError> {
        let manager = GlobalHotKeyManager::new().map_err(ToggleError::Manager)?;
        Ok(Self {
            manager,
            registered: None,
        })
    }
}

impl ToggleBackend for GlobalToggleBackend {
    fn register(&mut self, target: TargetCombination, key: &str) -> Result<u32, ToggleError> {
        self.unregister();

        let modifiers = to_hotkey_modifiers(target)?;
        let code = parse_key(key)?;
        let hotkey = HotKey::new(Some(modifiers), code);
        self.manager
            .register(hotkey)
            .map_err(|e| ToggleError::Register(format!("{target}+{key}"), e))?;

        info!(combination = %target, key, "registered toggle hotkey");
        self.registered = Some(hotkey);
        Ok(hotkey.id())
    }

    fn unregister(&mut self) {
        if let Some(hotkey) = self.registered.take() {
            if let Err(e) = self.manager.unregister(hotkey) {
                tracing::error!("failed to unregister hotkey: {}", e);
            } else {
                debug!(id = hotkey.id(), "unregistered toggle hotkey");
            }
        }
    }
}

impl Drop for GlobalToggleBackend {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Converts a target combination to `global-hotkey` modifiers
///
/// # Errors
/// Returns error for modifiers the platform hotkey APIs cannot register (Fn)
pub fn to_hotkey_modifiers(target: TargetCombination) -> Result<Modifiers, ToggleError> {
    let mut result = Modifiers::empty();
    for modifier in target.modifiers().iter() {
        result |= match modifier {
            Modifier::Control => Modifiers::CONTROL,
            Modifier::Option => Modifiers::ALT,
            Modifier::Command => Modifiers::SUPER,
            Modifier::Shift => Modifiers::SHIFT,
            Modifier::Function => return Err(ToggleError::UnsupportedModifier(modifier)),
        };
    }
    Ok(result)
}

/// Parses a key name: a single letter ("Z"), a digit ("5"), or a W3C code name ("Space", "F5")
///
/// # Errors
/// Returns error if the name maps to no key code
pub fn parse_key(key: &str) -> Result<Code, ToggleError> {
    let key = key.trim();
    let mut chars = key.chars();
    let code_name = match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => format!("Key{}", c.to_ascii_uppercase()),
        (Some(c), None) if c.is_ascii_digit() => format!("Digit{c}"),
        _ => key.to_owned(),
    };
    code_name
        .parse::<Code>()
        .map_err(|_| ToggleError::UnknownKey(key.to_owned()))
}
