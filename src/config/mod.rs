mod file_config;

pub use file_config::{
    CacheConfig, CatalogConfig, ClassifyConfig, FileConfig, OauthConfig, ScopeConfig,
};

use anyhow::{bail, Result};
use std::time::Duration;

use crate::cache::{DEFAULT_DAILY_QUERY_CEILING, DEFAULT_ENTRY_TTL};

const DEFAULT_CLASSIFY_BASE_URL: &str = "http://classify.oclc.org/classify2/Classify";
const DEFAULT_TOKEN_URL: &str = "https://oauth.oclc.org/token";
const DEFAULT_BIB_BASE_URL: &str = "https://metadata.api.oclc.org/worldcat/manage/bibs";
const DEFAULT_SEARCH_BASE_URL: &str =
    "https://americas.discovery.api.oclc.org/worldcat/search/brief-bibs";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub environment: Option<String>,
    pub redis_url: Option<String>,
    pub classify_base_url: Option<String>,
    pub classify_api_key: Option<String>,
    pub search_client_id: Option<String>,
    pub metadata_client_id: Option<String>,
    pub entry_ttl_secs: Option<u64>,
    pub daily_query_ceiling: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Deployment label prefixed onto every cache key.
    pub environment: String,
    pub redis_url: Option<String>,
    pub classify: ClassifySettings,
    pub oauth: OauthSettings,
    pub catalog: CatalogSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ClassifySettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OauthSettings {
    pub search: ScopeSettings,
    pub metadata: ScopeSettings,
}

#[derive(Debug, Clone)]
pub struct ScopeSettings {
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl ScopeSettings {
    /// Credentials for the token endpoint; errors when either half is
    /// missing.
    pub fn credentials(&self) -> Result<(String, String)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Ok((id.clone(), secret.clone())),
            _ => bail!("client_id and client_secret must both be configured"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub bib_base_url: String,
    pub search_base_url: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub entry_ttl: Duration,
    pub daily_query_ceiling: i64,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present; secrets fall back to
    /// environment variables.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let environment = file
            .environment
            .or_else(|| cli.environment.clone())
            .unwrap_or_else(|| "production".to_string());
        if environment.is_empty() {
            bail!("environment label must not be empty");
        }

        let redis_url = file.redis_url.or_else(|| cli.redis_url.clone());

        let classify_file = file.classify.unwrap_or_default();
        let classify = ClassifySettings {
            base_url: classify_file
                .base_url
                .or_else(|| cli.classify_base_url.clone())
                .unwrap_or_else(|| DEFAULT_CLASSIFY_BASE_URL.to_string()),
            api_key: classify_file
                .api_key
                .or_else(|| cli.classify_api_key.clone())
                .or_else(|| std::env::var("CLASSIFY_API_KEY").ok()),
        };

        let oauth_file = file.oauth.unwrap_or_default();
        let oauth = OauthSettings {
            search: resolve_scope(
                oauth_file.search,
                cli.search_client_id.clone(),
                "OCLC_SEARCH_SECRET",
            ),
            metadata: resolve_scope(
                oauth_file.metadata,
                cli.metadata_client_id.clone(),
                "OCLC_METADATA_SECRET",
            ),
        };

        let catalog_file = file.catalog.unwrap_or_default();
        let catalog = CatalogSettings {
            bib_base_url: catalog_file
                .bib_base_url
                .unwrap_or_else(|| DEFAULT_BIB_BASE_URL.to_string()),
            search_base_url: catalog_file
                .search_base_url
                .unwrap_or_else(|| DEFAULT_SEARCH_BASE_URL.to_string()),
        };

        let cache_file = file.cache.unwrap_or_default();
        let cache = CacheSettings {
            entry_ttl: cache_file
                .entry_ttl_secs
                .or(cli.entry_ttl_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ENTRY_TTL),
            daily_query_ceiling: cache_file
                .daily_query_ceiling
                .or(cli.daily_query_ceiling)
                .unwrap_or(DEFAULT_DAILY_QUERY_CEILING),
        };

        Ok(Self {
            environment,
            redis_url,
            classify,
            oauth,
            catalog,
            cache,
        })
    }
}

fn resolve_scope(
    file: Option<ScopeConfig>,
    cli_client_id: Option<String>,
    secret_env_var: &str,
) -> ScopeSettings {
    let file = file.unwrap_or_default();
    ScopeSettings {
        token_url: file
            .token_url
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
        client_id: file.client_id.or(cli_client_id),
        client_secret: file
            .client_secret
            .or_else(|| std::env::var(secret_env_var).ok()),
    }
}
