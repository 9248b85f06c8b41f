use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::search::{DEFAULT_DUCKDUCKGO_ENDPOINT, SafeSearch, SearchOptions, TimeLimit};
use crate::{ResearchError, SecretValue, require_env};

const DEFAULT_CONFIG_PATH: &str = "researchflow.toml";
const CONFIG_PATH_ENV: &str = "RESEARCHFLOW_CONFIG";

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

impl Config {
    /// Resolve the configured LLM secret value (from environment only).
    pub fn llm_api_key(&self) -> Result<SecretValue, ResearchError> {
        require_env(&self.llm.api_key_env)
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `RESEARCHFLOW_CONFIG` environment variable.
    /// 3. `researchflow.toml` in the current working directory, falling back to
    ///    built-in defaults when that file does not exist.
    pub fn load(path: Option<PathBuf>) -> Result<Config, ResearchError> {
        let (candidate, explicit) = resolve_path(path);
        if !explicit && !candidate.exists() {
            let config = Config::default();
            Self::validate(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| ResearchError::config_io(candidate.clone(), err))?;
        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(raw: &str) -> Result<Config, ResearchError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| ResearchError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ResearchError> {
        if config.llm.api_key_env.trim().is_empty() {
            return Err(ResearchError::InvalidConfiguration(
                "llm.api_key_env must reference an environment variable".into(),
            ));
        }
        if config.llm.base_url.trim().is_empty() {
            return Err(ResearchError::InvalidConfiguration(
                "llm.base_url must not be empty".into(),
            ));
        }
        if config.search.max_results == 0 {
            return Err(ResearchError::InvalidConfiguration(
                "search.max_results must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "LlmConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "LlmConfig::default_model")]
    pub model: String,
    #[serde(default = "LlmConfig::default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "LlmConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_model() -> String {
        "gpt-4o-mini".to_string()
    }

    fn default_api_key_env() -> String {
        "OPENAI_API_KEY".to_string()
    }

    const fn default_timeout_secs() -> u64 {
        120
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            model: Self::default_model(),
            api_key_env: Self::default_api_key_env(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "SearchConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "SearchConfig::default_region")]
    pub region: String,
    #[serde(default = "SearchConfig::default_safesearch")]
    pub safesearch: SafeSearch,
    #[serde(default = "SearchConfig::default_timelimit")]
    pub timelimit: TimeLimit,
    #[serde(default = "SearchConfig::default_max_results")]
    pub max_results: usize,
    #[serde(default = "SearchConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SearchConfig {
    fn default_endpoint() -> String {
        DEFAULT_DUCKDUCKGO_ENDPOINT.to_string()
    }

    fn default_region() -> String {
        SearchOptions::default().region
    }

    const fn default_safesearch() -> SafeSearch {
        SafeSearch::Off
    }

    const fn default_timelimit() -> TimeLimit {
        TimeLimit::Year
    }

    const fn default_max_results() -> usize {
        1
    }

    const fn default_timeout_secs() -> u64 {
        20
    }

    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            region: self.region.clone(),
            safesearch: self.safesearch,
            timelimit: self.timelimit,
            max_results: self.max_results,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            region: Self::default_region(),
            safesearch: Self::default_safesearch(),
            timelimit: Self::default_timelimit(),
            max_results: Self::default_max_results(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default)]
    pub persist_runs: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            persist_runs: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceConfig {
    pub dir: Option<PathBuf>,
}
