/// Toggle hotkey registration
pub mod hotkey;
/// macOS modifier event taps
#[cfg(target_os = "macos")]
pub mod macos;
/// Modifier keys and target combinations
pub mod modifiers;
/// Abstract modifier event source
pub mod source;

pub use modifiers::{Modifier, ModifierSet, TargetCombination};
pub use source::{Channel, EventSink, ModifierEvent, ModifierSource, SourceError};
