use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What a session does when a dependency callback fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DependencyFaultPolicy {
    /// Return the failure to the caller of `commit`.
    #[default]
    Propagate,
    /// Log the failure and keep the committed value.
    Log,
}

/// Defaults for list-of-values pickers that do not set their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LovSettings {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for LovSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl LovSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Attempts allowed per identifier within a sliding window on submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubmitLimit {
    pub max_attempts: u32,
    pub window_secs: u64,
}

impl SubmitLimit {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Engine-wide runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngineSettings {
    #[serde(default = "default_max_depth")]
    pub max_dependency_depth: usize,
    #[serde(default = "default_true")]
    pub validate_on_change: bool,
    #[serde(default)]
    pub dependency_faults: DependencyFaultPolicy,
    #[serde(default)]
    pub lov: LovSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_limit: Option<SubmitLimit>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_dependency_depth: default_max_depth(),
            validate_on_change: true,
            dependency_faults: DependencyFaultPolicy::default(),
            lov: LovSettings::default(),
            submit_limit: None,
        }
    }
}

impl EngineSettings {
    /// Parses settings JSON; blank input yields the defaults.
    pub fn from_json(settings_json: &str) -> Result<Self, ConfigError> {
        if settings_json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(settings_json).map_err(ConfigError::SettingsParse)
    }
}

fn default_max_depth() -> usize {
    16
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    20
}

fn default_debounce_ms() -> u64 {
    300
}
