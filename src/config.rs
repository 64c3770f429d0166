use crate::chapters::GapFillPolicy;
use crate::http_client::HttpClientConfig;
use crate::models::ProviderKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub chapters: GapFillPolicy,
    /// Per-provider overrides keyed by provider id (`mangapill`, `asurascans`, ...)
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Timeout for every single HTTP request in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum number of retry attempts for failed requests
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Initial retry delay in milliseconds
    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay_ms: u64,

    /// Maximum retry delay in milliseconds
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,

    /// Enable cookie support
    #[serde(default = "default_true")]
    pub enable_cookies: bool,

    /// Enable gzip/brotli compression
    #[serde(default = "default_true")]
    pub enable_compression: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    /// Used by providers without a threshold of their own
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: Option<String>,
    pub match_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub api_url: String,
}

fn default_true() -> bool { true }
fn default_max_retries() -> usize { 4 }
fn default_initial_retry_delay() -> u64 { 500 }
fn default_max_retry_delay() -> u64 { 8000 }
fn default_timeout() -> u64 { 30 }
fn default_threshold() -> f64 { crate::matcher::DEFAULT_THRESHOLD }
fn default_catalog_url() -> String { crate::metadata::anilist::API_URL.to_string() }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 4,
            initial_retry_delay_ms: 500,
            max_retry_delay_ms: 8000,
            enable_cookies: true,
            enable_compression: true,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_threshold: crate::matcher::DEFAULT_THRESHOLD,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_url: default_catalog_url(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory, falling back to
    /// defaults when it is missing or invalid
    pub fn load() -> Self {
        let path = Path::new("config.toml");
        if path.exists() {
            match Self::load_from(path) {
                Ok(cfg) => return cfg,
                Err(e) => log::warn!("Ignoring config.toml: {}", e),
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<Config>(content)?)
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.get(kind.id())
    }

    pub fn is_enabled(&self, kind: ProviderKind) -> bool {
        self.provider(kind).map(|p| p.enabled).unwrap_or(true)
    }

    /// Configured threshold for `kind`, else `provider_default`
    pub fn threshold_for(&self, kind: ProviderKind, provider_default: Option<f64>) -> f64 {
        self.provider(kind)
            .and_then(|p| p.match_threshold)
            .or(provider_default)
            .unwrap_or(self.matching.default_threshold)
    }

    pub fn base_url_for(&self, kind: ProviderKind, provider_default: &str) -> String {
        self.provider(kind)
            .and_then(|p| p.base_url.clone())
            .unwrap_or_else(|| provider_default.to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

impl HttpConfig {
    /// Translate into the client configuration
    pub fn client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            initial_retry_delay_ms: self.initial_retry_delay_ms,
            max_retry_delay_ms: self.max_retry_delay_ms,
            enable_cookies: self.enable_cookies,
            enable_gzip: self.enable_compression,
            default_headers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.http.timeout_secs, 30);
        assert_eq!(cfg.matching.default_threshold, 0.4);
        assert!(cfg.chapters.enabled);
        assert!(cfg.is_enabled(ProviderKind::MangaPill));
    }

    #[test]
    fn test_provider_overrides() {
        let cfg = Config::from_toml_str(
            r#"
            [http]
            timeout_secs = 10

            [providers.firescans]
            base_url = "https://firescans.example/"
            match_threshold = 0.6

            [providers.mangadex]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.http.timeout_secs, 10);
        assert_eq!(cfg.http.max_retries, 4);
        assert_eq!(cfg.threshold_for(ProviderKind::FireScans, Some(0.3)), 0.6);
        assert_eq!(cfg.threshold_for(ProviderKind::AsuraScans, Some(0.4)), 0.4);
        assert_eq!(cfg.threshold_for(ProviderKind::AsuraScans, None), 0.4);
        assert_eq!(
            cfg.base_url_for(ProviderKind::FireScans, "https://firescans.xyz"),
            "https://firescans.example"
        );
        assert!(!cfg.is_enabled(ProviderKind::MangaDex));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::from_toml_str("http = 5").is_err());
    }
}
