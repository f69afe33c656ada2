//! Push-to-talk hotkey coordinator
//!
//! Turns a noisy, duplicate-prone stream of modifier-change events into exactly
//! one press and one release notification per hold-to-talk gesture.

/// Hotkey mode switching
pub mod controller;
/// Configuration management
pub mod config;
/// Input handling (modifier sources, toggle hotkey)
pub mod input;
/// Platform permission checks
pub mod permissions;
/// Push-to-talk key-state coordinator
pub mod ptt;
/// Logging setup
pub mod telemetry;
