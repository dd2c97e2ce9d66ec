use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Interpreter limits and module lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Lua instructions a single load or hook call may execute.
    pub step_budget: u64,
    /// Instructions between two budget checks.
    pub hook_interval: u32,
    /// Lua heap ceiling in bytes.
    pub memory_limit: Option<usize>,
    /// Directories searched by `require`, in order.
    pub module_paths: Vec<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            step_budget: 10_000_000,
            hook_interval: 1_000,
            memory_limit: None,
            module_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub runtime: RuntimeConfig,
    pub event_capacity: usize,
    pub log_capacity: usize,
    pub script_capacity: usize,
    pub max_scheduled_notes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            event_capacity: 4096,
            log_capacity: 1024,
            script_capacity: 4,
            max_scheduled_notes: 1024,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron(&text)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.step_budget == 0 {
            return Err(ConfigError::Invalid("step_budget must be positive"));
        }
        if self.runtime.hook_interval == 0 {
            return Err(ConfigError::Invalid("hook_interval must be positive"));
        }
        if self.event_capacity < crate::events::MIDI_CHANNELS as usize {
            return Err(ConfigError::Invalid(
                "event_capacity must hold at least one all-notes-off sweep",
            ));
        }
        if self.log_capacity == 0 || self.script_capacity == 0 {
            return Err(ConfigError::Invalid("queue capacities must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
