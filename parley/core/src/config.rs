//! Engine Configuration
//!
//! Tunables for the dialog engine, the interruption router and the resolver,
//! loaded from an optional TOML file at `~/.config/parley/parley.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied in this order (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`PARLEY_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [dialog]
//! max_prompt_attempts = 5
//! max_steps_per_turn = 256
//!
//! [thresholds]
//! general_intent = 0.5
//! reject = 0.8
//! topic_switch = 0.9
//!
//! [resolver]
//! page_size = 3
//! contact_retry_limit = 3
//! max_contacts = 20
//! max_display_size = 3
//!
//! [store]
//! directory = "/var/lib/parley/conversations"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Dialog section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogToml {
    /// Consecutive unrecognized answers before a prompt gives up
    pub max_prompt_attempts: Option<u32>,

    /// Step executions allowed in one turn without suspending
    pub max_steps_per_turn: Option<usize>,
}

/// Thresholds section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsToml {
    /// Minimum score for cancel/help/logout
    pub general_intent: Option<f64>,

    /// Minimum score for a reject answer to count
    pub reject: Option<f64>,

    /// Minimum task score for switching topics mid-task
    pub topic_switch: Option<f64>,
}

/// Resolver section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverToml {
    /// Candidates per choice page
    pub page_size: Option<usize>,

    /// Not-found prompts before a name is abandoned
    pub contact_retry_limit: Option<u32>,

    /// Attendee cap for the "add more" offer
    pub max_contacts: Option<usize>,

    /// Events per page when listing meetings
    pub max_display_size: Option<usize>,
}

/// Store section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreToml {
    /// Directory for per-conversation records
    pub directory: Option<PathBuf>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyToml {
    /// Dialog section
    pub dialog: DialogToml,

    /// Thresholds section
    pub thresholds: ThresholdsToml,

    /// Resolver section
    pub resolver: ResolverToml,

    /// Store section
    pub store: StoreToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Configuration for the engine and everything it drives
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Consecutive unrecognized answers before a prompt gives up
    pub max_prompt_attempts: u32,

    /// Step executions allowed in one turn without suspending
    pub max_steps_per_turn: usize,

    /// Minimum score for cancel/help/logout
    pub general_intent_threshold: f64,

    /// Minimum score for a reject answer to count
    pub reject_threshold: f64,

    /// Minimum task score for switching topics mid-task
    pub topic_switch_threshold: f64,

    /// Candidates per choice page
    pub page_size: usize,

    /// Not-found prompts before a name is abandoned
    pub contact_retry_limit: u32,

    /// Attendee cap for the "add more" offer
    pub max_contacts: usize,

    /// Events per page when listing meetings
    pub max_display_size: usize,

    /// Directory for per-conversation records (`None` = platform default)
    pub store_dir: Option<PathBuf>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_prompt_attempts: 5,
            max_steps_per_turn: 256,
            general_intent_threshold: 0.5,
            reject_threshold: 0.8,
            topic_switch_threshold: 0.9,
            page_size: 3,
            contact_retry_limit: 3,
            max_contacts: 20,
            max_display_size: 3,
            store_dir: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that every value is usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("general_intent", self.general_intent_threshold),
            ("reject", self.reject_threshold),
            ("topic_switch", self.topic_switch_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "threshold {name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.max_prompt_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_prompt_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_steps_per_turn == 0 {
            return Err(ConfigError::ValidationError(
                "max_steps_per_turn must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 || self.max_display_size == 0 {
            return Err(ConfigError::ValidationError(
                "page sizes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/parley/parley.toml` on Linux.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("parley").join("parley.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// merged values do not validate. A missing config file is not an error.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the merged values do not validate.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ParleyToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut EngineConfig, toml: &ParleyToml) {
    if let Some(attempts) = toml.dialog.max_prompt_attempts {
        config.max_prompt_attempts = attempts;
    }
    if let Some(steps) = toml.dialog.max_steps_per_turn {
        config.max_steps_per_turn = steps;
    }

    if let Some(score) = toml.thresholds.general_intent {
        config.general_intent_threshold = score;
    }
    if let Some(score) = toml.thresholds.reject {
        config.reject_threshold = score;
    }
    if let Some(score) = toml.thresholds.topic_switch {
        config.topic_switch_threshold = score;
    }

    if let Some(size) = toml.resolver.page_size {
        config.page_size = size;
    }
    if let Some(limit) = toml.resolver.contact_retry_limit {
        config.contact_retry_limit = limit;
    }
    if let Some(max) = toml.resolver.max_contacts {
        config.max_contacts = max;
    }
    if let Some(size) = toml.resolver.max_display_size {
        config.max_display_size = size;
    }

    if toml.store.directory.is_some() {
        config.store_dir = toml.store.directory.clone();
    }
}

/// Parse an environment variable, ignoring it when unset or malformed
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn apply_env_config(config: &mut EngineConfig) {
    if let Some(n) = env_parse("PARLEY_MAX_PROMPT_ATTEMPTS") {
        config.max_prompt_attempts = n;
        config.source = ConfigSource::Env;
    }
    if let Some(n) = env_parse("PARLEY_MAX_STEPS_PER_TURN") {
        config.max_steps_per_turn = n;
        config.source = ConfigSource::Env;
    }
    if let Some(score) = env_parse("PARLEY_GENERAL_THRESHOLD") {
        config.general_intent_threshold = score;
        config.source = ConfigSource::Env;
    }
    if let Some(score) = env_parse("PARLEY_REJECT_THRESHOLD") {
        config.reject_threshold = score;
        config.source = ConfigSource::Env;
    }
    if let Some(score) = env_parse("PARLEY_TOPIC_SWITCH_THRESHOLD") {
        config.topic_switch_threshold = score;
        config.source = ConfigSource::Env;
    }
    if let Some(n) = env_parse("PARLEY_PAGE_SIZE") {
        config.page_size = n;
        config.source = ConfigSource::Env;
    }
    if let Some(n) = env_parse("PARLEY_CONTACT_RETRY_LIMIT") {
        config.contact_retry_limit = n;
        config.source = ConfigSource::Env;
    }
    if let Some(n) = env_parse("PARLEY_MAX_CONTACTS") {
        config.max_contacts = n;
        config.source = ConfigSource::Env;
    }
    if let Ok(dir) = std::env::var("PARLEY_STORE_DIR") {
        config.store_dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Store directory override
    pub store_dir: Option<PathBuf>,

    /// Prompt attempts override
    pub max_prompt_attempts: Option<u32>,

    /// Page size override
    pub page_size: Option<usize>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set store directory override
    #[must_use]
    pub fn with_store_dir(mut self, dir: PathBuf) -> Self {
        self.store_dir = Some(dir);
        self
    }

    /// Set prompt attempts override
    #[must_use]
    pub fn with_max_prompt_attempts(mut self, attempts: u32) -> Self {
        self.max_prompt_attempts = Some(attempts);
        self
    }

    /// Set page size override
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut EngineConfig) {
        if self.store_dir.is_some() || self.max_prompt_attempts.is_some() || self.page_size.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref dir) = self.store_dir {
            config.store_dir = Some(dir.clone());
        }
        if let Some(attempts) = self.max_prompt_attempts {
            config.max_prompt_attempts = attempts;
        }
        if let Some(size) = self.page_size {
            config.page_size = size;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
