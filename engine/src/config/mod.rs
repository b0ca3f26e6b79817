//! Configuration management
//!
//! This module handles loading, validation, and management of the Scout configuration.
//! Configuration is stored in TOML format at ~/.scout/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Reasoning engine provider, models and token rates
//! - **orchestrator**: Iteration cap, budget ceiling, timeouts, dispatch mode
//! - **providers**: HTTP enrichment providers (optional, repeatable)
//! - **scoring**: Company and contact scoring rules
//! - **targeting**: Roles, industries and company sizes the run is looking for
//!
//! API keys never live in this file. Each provider names the environment
//! variable its key is read from.
//!
//! # Examples
//!
//! ```no_run
//! use scout_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Provider: {}", config.llm.provider);
//! println!("Budget: {:.2}", config.orchestrator.budget_ceiling);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fusion::{ScoringPolicy, Targeting};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub llm: LLMConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Enrichment providers consulted by research and contact discovery
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub scoring: ScoringPolicy,

    #[serde(default)]
    pub targeting: Targeting,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl CoreConfig {
    /// SQLite file holding stored opportunities
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("scout.db")
    }
}

/// Reasoning engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider driving the loop (openai, anthropic)
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default)]
    pub openai: OpenAIConfig,

    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            openai: OpenAIConfig::default(),
            anthropic: AnthropicConfig::default(),
        }
    }
}

/// Per-thousand-token rates, in the same currency as the budget ceiling
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderPricing {
    #[serde(default)]
    pub input_cost_per_1k: f64,

    #[serde(default)]
    pub output_cost_per_1k: f64,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(flatten)]
    pub pricing: ProviderPricing,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key_env: default_openai_key_env(),
            max_tokens: default_max_tokens(),
            pricing: ProviderPricing {
                input_cost_per_1k: 0.00015,
                output_cost_per_1k: 0.0006,
            },
        }
    }
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    #[serde(default = "default_anthropic_model")]
    pub model: String,

    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(flatten)]
    pub pricing: ProviderPricing,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            api_key_env: default_anthropic_key_env(),
            max_tokens: default_max_tokens(),
            pricing: ProviderPricing {
                input_cost_per_1k: 0.003,
                output_cost_per_1k: 0.015,
            },
        }
    }
}

/// How the invocations of one turn are run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One after another; the budget can stop the turn between invocations
    #[default]
    Sequential,
    /// All at once, joined before folding
    Concurrent,
}

/// Orchestration loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Spend ceiling per run, in the currency of the provider rates
    #[serde(default = "default_budget_ceiling")]
    pub budget_ceiling: f64,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    #[serde(default = "default_capability_timeout_secs")]
    pub capability_timeout_secs: u64,

    #[serde(default)]
    pub dispatch: DispatchMode,

    /// Estimated token budget for the conversation sent to the engine
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            budget_ceiling: default_budget_ceiling(),
            llm_timeout_secs: default_llm_timeout_secs(),
            capability_timeout_secs: default_capability_timeout_secs(),
            dispatch: DispatchMode::default(),
            context_limit: default_context_limit(),
        }
    }
}

/// What an enrichment provider knows about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Company,
    Contacts,
}

/// One HTTP enrichment provider
///
/// Company providers are called as `GET {base_url}?domain=...`, contact
/// providers as `GET {base_url}?domain=...&limit=...`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    pub kind: ProviderKind,

    pub base_url: String,

    /// Environment variable holding the API key; unauthenticated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Confidence attached to every piece of evidence this provider returns
    #[serde(default = "default_provider_confidence")]
    pub confidence: f64,

    /// Flat cost charged per request
    #[serde(default)]
    pub cost_per_request: f64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.scout/data")
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_iterations() -> usize {
    12
}

fn default_budget_ceiling() -> f64 {
    1.00
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_capability_timeout_secs() -> u64 {
    60
}

fn default_context_limit() -> usize {
    32_000
}

fn default_provider_confidence() -> f64 {
    0.7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LLMConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            providers: Vec::new(),
            scoring: ScoringPolicy::default(),
            targeting: Targeting::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.scout/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();
        let toml_string = config.to_toml()?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Get the default configuration file path (~/.scout/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".scout").join("config.toml"))
    }

    /// Validate ranges and expand paths
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["openai", "anthropic"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid llm provider '{}'. Must be one of: {}",
                self.llm.provider,
                valid_providers.join(", ")
            )));
        }

        for (name, pricing) in [
            ("openai", &self.llm.openai.pricing),
            ("anthropic", &self.llm.anthropic.pricing),
        ] {
            if !is_non_negative(pricing.input_cost_per_1k)
                || !is_non_negative(pricing.output_cost_per_1k)
            {
                return Err(EngineError::Config(format!(
                    "llm.{} token rates must be finite and >= 0",
                    name
                )));
            }
        }

        let orch = &self.orchestrator;
        if orch.max_iterations == 0 {
            return Err(EngineError::Config(
                "orchestrator.max_iterations must be at least 1".to_string(),
            ));
        }
        if !(orch.budget_ceiling.is_finite() && orch.budget_ceiling > 0.0) {
            return Err(EngineError::Config(
                "orchestrator.budget_ceiling must be greater than 0".to_string(),
            ));
        }
        if orch.llm_timeout_secs == 0 || orch.capability_timeout_secs == 0 {
            return Err(EngineError::Config(
                "orchestrator timeouts must be greater than 0".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for p in &self.providers {
            if p.name.trim().is_empty() {
                return Err(EngineError::Config(
                    "provider name must not be empty".to_string(),
                ));
            }
            if !seen.insert(p.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate provider '{}'",
                    p.name
                )));
            }
            if !(0.0..=1.0).contains(&p.confidence) {
                return Err(EngineError::Config(format!(
                    "provider '{}': confidence must be between 0.0 and 1.0",
                    p.name
                )));
            }
            if !is_non_negative(p.cost_per_request) {
                return Err(EngineError::Config(format!(
                    "provider '{}': cost_per_request must be >= 0",
                    p.name
                )));
            }
            if !(p.base_url.starts_with("http://") || p.base_url.starts_with("https://")) {
                return Err(EngineError::Config(format!(
                    "provider '{}': base_url must be an http(s) URL",
                    p.name
                )));
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        Ok(())
    }

    /// Make sure the data directory exists
    pub fn ensure_data_dir(&self) -> Result<(), EngineError> {
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }
        Ok(())
    }
}

fn is_non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
