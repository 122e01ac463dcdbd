use crate::catchup::paths::CatchupPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_FETCH_LIMIT: u32 = 150;
pub const DEFAULT_TIMEOUT_SECS: u64 = 45;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub provider: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider: "gemini".to_string(),
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub limit: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_FETCH_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatchupConfig {
    pub generation: GenerationConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialCatchupConfig {
    generation: Option<GenerationConfig>,
    fetch: Option<FetchConfig>,
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_or_u32(var: &str, fallback: u32) -> u32 {
    env_non_empty(var)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(fallback)
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    env_non_empty(var)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(fallback)
}

fn apply_env_overrides(mut config: CatchupConfig) -> CatchupConfig {
    if let Some(model) = env_non_empty("CATCHUP_MODEL") {
        config.generation.model = model;
    }
    if let Some(provider) = env_non_empty("CATCHUP_PROVIDER") {
        config.generation.provider = provider;
    }
    if let Some(base_url) = env_non_empty("CATCHUP_BASE_URL") {
        config.generation.base_url = Some(base_url);
    }
    config.generation.timeout_secs =
        env_or_u64("CATCHUP_TIMEOUT_SECS", config.generation.timeout_secs);
    config.fetch.limit = env_or_u32("CATCHUP_FETCH_LIMIT", config.fetch.limit);
    config
}

/// Load the optional TOML config file, merge partial sections over the
/// defaults, then apply env overrides on top.
pub fn load_config(paths: &CatchupPaths) -> Result<CatchupConfig> {
    let mut config = CatchupConfig::default();

    if paths.config_file.is_file() {
        let raw = fs::read_to_string(&paths.config_file)
            .with_context(|| format!("failed to read {}", paths.config_file.display()))?;
        let partial: PartialCatchupConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", paths.config_file.display()))?;
        if let Some(generation) = partial.generation {
            config.generation = generation;
        }
        if let Some(fetch) = partial.fetch {
            config.fetch = fetch;
        }
    }

    Ok(apply_env_overrides(config))
}
