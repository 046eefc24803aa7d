//! Configuration for the synapse service.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SYNAPSE_BIND, SYNAPSE_DECOMPOSITION_TIMEOUT_SECS, GEMINI_API_KEY)
//! 2. Config file (.synapse/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .synapse/config.yaml
//! - Falls back to ~/.synapse/config.yaml

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::core::RunLimits;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const ENV_BIND: &str = "SYNAPSE_BIND";
pub const ENV_DECOMPOSITION_TIMEOUT: &str = "SYNAPSE_DECOMPOSITION_TIMEOUT_SECS";
pub const ENV_GEMINI_KEY: &str = "GEMINI_API_KEY";

const CONFIG_DIR: &str = ".synapse";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,
    #[serde(default)]
    pub publisher: Option<PublisherConfig>,
    #[serde(default)]
    pub decomposition: Option<DecompositionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub min_prompt_chars: Option<usize>,
    pub max_prompt_bytes: Option<usize>,
    pub run_timeout_seconds: Option<u64>,
    pub log_tail: Option<usize>,
    pub default_log_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    pub org: Option<String>,
    pub placeholder_repo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecompositionConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub api_key: Option<String>,
}

/// Fully resolved configuration
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// HTTP listen address
    pub bind: String,
    pub limits: RunLimits,
    /// Entries included in each pipeline result
    pub log_tail: usize,
    /// `GET /logs` limit when none is given
    pub default_log_limit: usize,
    pub publisher: PublisherSettings,
    pub decomposition: DecompositionSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublisherSettings {
    pub org: String,
    pub placeholder_repo: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecompositionSettings {
    pub endpoint: String,
    pub model: String,
    pub timeout_seconds: u64,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl DecompositionSettings {
    /// External decomposition runs only when a key is configured
    pub fn enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            bind: "127.0.0.1:8000".to_string(),
            limits: RunLimits::default(),
            log_tail: 30,
            default_log_limit: 50,
            publisher: PublisherSettings {
                org: "synapse-x-org".to_string(),
                placeholder_repo: "synapse-project".to_string(),
            },
            decomposition: DecompositionSettings {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                model: DEFAULT_MODEL.to_string(),
                timeout_seconds: 10,
                api_key: None,
            },
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    let home_config = dirs::home_dir()?.join(CONFIG_DIR).join(CONFIG_FILE);
    home_config.exists().then_some(home_config)
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Merge file values and environment overrides over the defaults
pub fn resolve<F>(file: ConfigFile, config_file: Option<PathBuf>, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ResolvedConfig {
        config_file,
        ..Default::default()
    };

    if let Some(server) = file.server {
        if let Some(bind) = server.bind {
            config.bind = bind;
        }
    }

    if let Some(pipeline) = file.pipeline {
        let limits = &mut config.limits;
        limits.min_prompt_chars = pipeline.min_prompt_chars.unwrap_or(limits.min_prompt_chars);
        limits.max_prompt_bytes = pipeline.max_prompt_bytes.unwrap_or(limits.max_prompt_bytes);
        limits.run_timeout_seconds = pipeline
            .run_timeout_seconds
            .unwrap_or(limits.run_timeout_seconds);
        config.log_tail = pipeline.log_tail.unwrap_or(config.log_tail);
        config.default_log_limit = pipeline
            .default_log_limit
            .unwrap_or(config.default_log_limit);
    }

    if let Some(publisher) = file.publisher {
        if let Some(org) = publisher.org {
            config.publisher.org = org;
        }
        if let Some(placeholder) = publisher.placeholder_repo {
            config.publisher.placeholder_repo = placeholder;
        }
    }

    if let Some(decomposition) = file.decomposition {
        let settings = &mut config.decomposition;
        if let Some(endpoint) = decomposition.endpoint {
            settings.endpoint = endpoint;
        }
        if let Some(model) = decomposition.model {
            settings.model = model;
        }
        settings.timeout_seconds = decomposition
            .timeout_seconds
            .unwrap_or(settings.timeout_seconds);
        settings.api_key = decomposition.api_key;
    }

    // Environment overrides
    if let Some(bind) = env(ENV_BIND) {
        config.bind = bind;
    }
    if let Some(secs) = env(ENV_DECOMPOSITION_TIMEOUT) {
        config.decomposition.timeout_seconds = secs
            .trim()
            .parse()
            .with_context(|| {
                format!("{} must be a whole number of seconds", ENV_DECOMPOSITION_TIMEOUT)
            })?;
    }
    if let Some(key) = env(ENV_GEMINI_KEY) {
        config.decomposition.api_key = Some(key);
    }

    Ok(config)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config_file = find_config_file(&cwd);

    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(file, config_file, |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
