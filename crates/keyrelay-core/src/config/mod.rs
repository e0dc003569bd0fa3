// Keyrelay Config
// Engine configuration, loaded from TOML and adjusted from the command line

mod keys;
mod parser;
mod policy;

use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::input::MatchRule;
use crate::output::{OutputCapabilities, DEFAULT_OUTPUT_PREFIX};

pub use keys::{axis_code, key_code};
pub use policy::{ChordRuleConfig, JogDialConfig, KeymapConfig, PolicyConfig, PolicyKind, PushToTalkConfig};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    Toml(String),

    #[error("Invalid device pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

/// Synthetic output device settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Without an output device events are tracked but go nowhere
    pub enabled: bool,
    pub name_prefix: String,
    pub keys: Vec<u16>,
    pub relative_axes: Vec<u16>,
}

impl OutputConfig {
    pub fn capabilities(&self) -> OutputCapabilities {
        OutputCapabilities {
            keys: self.keys.clone(),
            relative_axes: self.relative_axes.clone(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        let caps = OutputCapabilities::default();
        Self {
            enabled: true,
            name_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            keys: caps.keys,
            relative_axes: caps.relative_axes,
        }
    }
}

/// Hot-plug debounce window in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DebounceConfig {
    pub fn range(&self) -> RangeInclusive<Duration> {
        Duration::from_millis(self.min_ms)..=Duration::from_millis(self.max_ms.max(self.min_ms))
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            min_ms: 1000,
            max_ms: 2000,
        }
    }
}

/// Base name of the running executable, so copies and symlinks of the
/// binary lock independently. Falls back to `keyrelay`.
pub fn default_lock_name() -> String {
    std::env::current_exe()
        .ok()
        .or_else(|| std::env::args_os().next().map(PathBuf::from))
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "keyrelay".to_string())
}

/// Everything the engine needs, passed down explicitly at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub match_rule: MatchRule,
    /// Take exclusive capture of matched devices
    pub grab: bool,
    pub output: OutputConfig,
    pub debounce: DebounceConfig,
    /// Single-instance lock name
    pub lock_name: String,
    pub lock_dir: PathBuf,
    pub debug: bool,
    pub quiet: bool,
    pub policy: PolicyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_rule: MatchRule::any_keyboard(),
            grab: true,
            output: OutputConfig::default(),
            debounce: DebounceConfig::default(),
            lock_name: default_lock_name(),
            lock_dir: std::env::temp_dir(),
            debug: false,
            quiet: false,
            policy: PolicyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string; unspecified fields keep
    /// their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: parser::ConfigToml = toml::from_str(content).map_err(|e| ConfigError::Toml(e.to_string()))?;
        let mut config = Self::default();
        raw.apply(&mut config)?;
        Ok(config)
    }

    /// `~/.config/keyrelay/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("keyrelay").join("config.toml"))
    }

    /// Load `path`, or the default file if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            log::debug!("Loading config from {}", path.display());
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                log::debug!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Replace parts of the match rule, keeping the rest.
    pub fn override_match(
        &mut self,
        name: Option<&str>,
        id: Option<&str>,
        non_keyboards: Option<bool>,
    ) -> Result<(), ConfigError> {
        let rule = &self.match_rule;
        self.match_rule = MatchRule::new(
            name.unwrap_or(rule.name_pattern()),
            id.unwrap_or(rule.id_pattern()),
            non_keyboards.unwrap_or(rule.non_keyboards_allowed()),
        )?;
        Ok(())
    }

    /// Log verbosity selected by the debug and quiet flags
    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            log::LevelFilter::Debug
        } else if self.quiet {
            log::LevelFilter::Warn
        } else {
            log::LevelFilter::Info
        }
    }
}
