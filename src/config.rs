use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::controller::HotkeyMode;
use crate::input::modifiers::TargetCombination;
use crate::ptt::machine::{
    PushToTalkSettings, DEFAULT_DEBOUNCE_MS, DEFAULT_MINIMUM_HOLD_MS, DEFAULT_SAFETY_POLL_MS,
};
use crate::ptt::dedup::DEFAULT_DEDUP_WINDOW_MS;

const DEFAULT_CONFIG: &str = r#"[hotkey]
mode = "push_to_talk"
modifiers = ["Option", "Command"]
key = "Z"

[push_to_talk]
minimum_hold_ms = 500
debounce_ms = 200
safety_poll_ms = 200
dedup_window_ms = 5

[telemetry]
enabled = true
log_path = "~/.ptt-hotkey/ptt.log"
"#;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub hotkey: HotkeyConfig,
    pub push_to_talk: PushToTalkConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HotkeyConfig {
    pub mode: HotkeyMode,
    pub modifiers: Vec<String>,
    /// Non-modifier key, toggle mode only
    pub key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            mode: HotkeyMode::PushToTalk,
            modifiers: vec!["Option".to_owned(), "Command".to_owned()],
            key: "Z".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PushToTalkConfig {
    pub minimum_hold_ms: u64,
    pub debounce_ms: u64,
    pub safety_poll_ms: u64,
    pub dedup_window_ms: u64,
}

impl Default for PushToTalkConfig {
    fn default() -> Self {
        Self {
            minimum_hold_ms: DEFAULT_MINIMUM_HOLD_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            safety_poll_ms: DEFAULT_SAFETY_POLL_MS,
            dedup_window_ms: DEFAULT_DEDUP_WINDOW_MS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub log_path: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: "~/.ptt-hotkey/ptt.log".to_owned(),
        }
    }
}

impl Config {
    /// Load config from ~/.ptt-hotkey.toml, creating it with defaults if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;
        Self::from_toml_str(&contents)
    }

    /// Parse config from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse config TOML")
    }

    /// Target combination; an empty modifier list falls back to the default key
    pub fn target(&self) -> Result<TargetCombination> {
        TargetCombination::from_names(&self.hotkey.modifiers)
            .context("invalid modifier in [hotkey] modifiers")
    }

    /// Push-to-talk settings for the coordinator
    pub fn push_to_talk_settings(&self) -> Result<PushToTalkSettings> {
        let timing = &self.push_to_talk;
        Ok(PushToTalkSettings {
            target: self.target()?,
            minimum_hold: Duration::from_millis(timing.minimum_hold_ms),
            debounce_delay: Duration::from_millis(timing.debounce_ms),
            safety_poll_interval: Duration::from_millis(timing.safety_poll_ms),
            dedup_window: Duration::from_millis(timing.dedup_window_ms),
        })
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".ptt-hotkey.toml"))
    }

    fn create_default(path: &Path) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        tracing::info!("wrote default config to {}", path.display());
        Ok(())
    }

    /// Expand ~ in paths to home directory
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}
