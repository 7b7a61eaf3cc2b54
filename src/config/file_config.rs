use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub environment: Option<String>,
    pub redis_url: Option<String>,

    // Feature configs
    pub classify: Option<ClassifyConfig>,
    pub oauth: Option<OauthConfig>,
    pub catalog: Option<CatalogConfig>,
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ClassifyConfig {
    pub base_url: Option<String>,
    /// Falls back to the CLASSIFY_API_KEY environment variable.
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct OauthConfig {
    pub search: Option<ScopeConfig>,
    pub metadata: Option<ScopeConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ScopeConfig {
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    /// Falls back to the OCLC_SEARCH_SECRET / OCLC_METADATA_SECRET
    /// environment variables.
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    pub bib_base_url: Option<String>,
    pub search_base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub entry_ttl_secs: Option<u64>,
    pub daily_query_ceiling: Option<i64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
