//! Bootstrap configuration loading and resolution
//!
//! Configuration is read once at startup from a TOML file. The file location
//! is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`<config_dir>/playout/config.toml`)
//! 4. Built-in defaults (fallback, no file)
//!
//! A missing or unreadable file never aborts startup: a warning is logged and
//! the built-in defaults are used instead.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable consulted when no config path is given on the command line
pub const CONFIG_ENV_VAR: &str = "PLAYOUT_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// One entry per output channel
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Per-output-channel scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    /// Channel name, unique within the configuration
    pub name: String,

    /// Audio channel count handed to the device when inputs are prepared
    #[serde(default = "default_audio_channel_count")]
    pub audio_channel_count: u16,

    /// How long before the end of a clip the next item is staged
    #[serde(default = "default_preload_lead_ms")]
    pub preload_lead_ms: u64,

    /// Wrap to the start of the rundown when looking for the next item
    #[serde(default)]
    pub looping: bool,

    /// Mark items disabled once they have been unloaded from the playing slot
    #[serde(default)]
    pub disable_after_unload: bool,

    /// New items are added with auto-start already set
    #[serde(default)]
    pub add_items_with_autoplay: bool,
}

impl ChannelConfig {
    /// Channel with default settings
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            audio_channel_count: default_audio_channel_count(),
            preload_lead_ms: default_preload_lead_ms(),
            looping: false,
            disable_after_unload: false,
            add_items_with_autoplay: false,
        }
    }

    /// Preload lead time as a Duration
    pub fn preload_lead(&self) -> Duration {
        Duration::from_millis(self.preload_lead_ms)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audio_channel_count() -> u16 {
    2
}

fn default_preload_lead_ms() -> u64 {
    2000
}

fn default_channels() -> Vec<ChannelConfig> {
    vec![ChannelConfig::named("main")]
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            channels: default_channels(),
        }
    }
}

impl TomlConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config file and load it, falling back to defaults
    ///
    /// Only a file that exists but is invalid is reported as an error.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check channel definitions for consistency
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::Config("at least one channel must be configured".to_string()));
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(Error::Config("channel name must not be empty".to_string()));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate channel name: {}",
                    channel.name
                )));
            }
            if channel.audio_channel_count == 0 {
                return Err(Error::Config(format!(
                    "channel {}: audio_channel_count must be at least 1",
                    channel.name
                )));
            }
        }
        Ok(())
    }
}

/// Config file resolution following the priority order in the module docs
///
/// Returns `None` when neither an explicit path nor a user config file exists.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    default_config_file().filter(|path| path.exists())
}

/// Platform default location of the config file
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("playout").join("config.toml"))
}
