use crate::error::ConfigError;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Default deep-research model. Overridable via `model` in config.toml.
pub const DEFAULT_MODEL: &str = "o4-mini-deep-research-2025-06-26";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Provider API key. The `OPENAI_API_KEY` environment variable wins.
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub research: ResearchTuning,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub pricing: PricingConfig,
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::new(),
            config_path: PathBuf::new(),
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            server: ServerConfig::default(),
            research: ResearchTuning::default(),
            reliability: ReliabilityConfig::default(),
            pricing: PricingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Request-construction knobs for the research prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchTuning {
    /// Maximum items the provider is asked to return per run.
    #[serde(default = "default_max_items")]
    pub max_items: u32,
    /// Only content published within this trailing window is requested.
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: u32,
    /// Minimum trust score for a domain to be offered as a source hint.
    #[serde(default = "default_min_trust_score")]
    pub min_trust_score: f64,
    /// Cap on trust-scorer domains merged into the preferred-source hints.
    #[serde(default = "default_trusted_hints_limit")]
    pub trusted_hints_limit: u32,
}

fn default_max_items() -> u32 {
    5
}

fn default_recency_window_days() -> u32 {
    7
}

fn default_min_trust_score() -> f64 {
    0.7
}

fn default_trusted_hints_limit() -> u32 {
    5
}

impl Default for ResearchTuning {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            recency_window_days: default_recency_window_days(),
            min_trust_score: default_min_trust_score(),
            trusted_hints_limit: default_trusted_hints_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Additional attempts after the first, taken only for rate-limit errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay before the first retry; doubles per subsequent retry.
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    /// Interval between background-operation status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Wall-clock polling budget per attempt.
    #[serde(default = "default_max_poll_ms")]
    pub max_poll_ms: u64,
}

fn default_max_retries() -> u32 {
    1
}

fn default_initial_retry_delay_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_max_poll_ms() -> u64 {
    10 * 60 * 1000
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_ms: default_max_poll_ms(),
        }
    }
}

/// Deep-research rates: cents per million tokens, cents per web search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_input_cents_per_million")]
    pub input_cents_per_million: f64,
    #[serde(default = "default_output_cents_per_million")]
    pub output_cents_per_million: f64,
    #[serde(default = "default_web_search_cents_per_call")]
    pub web_search_cents_per_call: f64,
}

fn default_input_cents_per_million() -> f64 {
    110.0
}

fn default_output_cents_per_million() -> f64 {
    440.0
}

fn default_web_search_cents_per_call() -> f64 {
    1.0
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_cents_per_million: default_input_cents_per_million(),
            output_cents_per_million: default_output_cents_per_million(),
            web_search_cents_per_call: default_web_search_cents_per_call(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let lookout_dir = home.join(".lookout");
        let config_path = lookout_dir.join("config.toml");

        if !lookout_dir.exists() {
            fs::create_dir_all(&lookout_dir).context("Failed to create .lookout directory")?;
            fs::create_dir_all(lookout_dir.join("workspace"))
                .context("Failed to create workspace directory")?;
        }

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            config.workspace_dir = lookout_dir.join("workspace");
            config.validate()?;
            Ok(config)
        } else {
            let config = Self {
                config_path: config_path.clone(),
                workspace_dir: lookout_dir.join("workspace"),
                ..Self::default()
            };
            config.validate()?;
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reliability.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "reliability.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.reliability.max_poll_ms < self.reliability.poll_interval_ms {
            return Err(ConfigError::Validation(
                "reliability.max_poll_ms must be at least one poll interval".into(),
            ));
        }
        let rates = [
            self.pricing.input_cents_per_million,
            self.pricing.output_cents_per_million,
            self.pricing.web_search_cents_per_call,
        ];
        if rates.iter().any(|rate| !rate.is_finite() || *rate < 0.0) {
            return Err(ConfigError::Validation(
                "pricing rates must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }

    /// SQLite database path under the workspace.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.workspace_dir.join("data").join("lookout.db")
    }

    /// Environment takes precedence over config.toml so a key never has to
    /// be written to disk.
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .or_else(|| self.api_key.clone())
    }
}
