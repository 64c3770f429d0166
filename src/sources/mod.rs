//! Target-site adapters.
//!
//! Every site exposes the same three operations through [`MangaProvider`].
//! Adapters are built once from [`Config`] and shared behind `Arc`, each
//! with its own HTTP client.

pub mod asurascans;
pub mod firescans;
pub mod flamecomics;
pub mod mangadex;
pub mod mangapill;
pub mod rizzcomic;
pub mod wp_manga;

use crate::config::Config;
use crate::error::FetchError;
use crate::helpers::parse_provider;
use crate::logging::RequestLog;
use crate::models::{MangaDetails, PageRecord, ProviderKind, SearchResults};
use std::collections::HashMap;
use std::sync::Arc;

/// Uniform contract over one target site.
#[async_trait::async_trait]
pub trait MangaProvider: Send + Sync {
    /// Registry key, e.g. `mangapill`.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    /// Minimum similarity a search hit needs before it is trusted.
    fn match_threshold(&self) -> f64;

    async fn search(
        &self,
        title: &str,
        page: Option<u32>,
        log: &RequestLog,
    ) -> Result<SearchResults, FetchError>;

    /// `id` is a listing id as returned by `search`.
    async fn get_manga_info(&self, id: &str, log: &RequestLog) -> Result<MangaDetails, FetchError>;

    /// `chapter_ref` is a chapter id as returned by `get_manga_info`, or a
    /// full chapter URL.
    async fn fetch_chapter_pages(
        &self,
        chapter_ref: &str,
        log: &RequestLog,
    ) -> Result<Vec<PageRecord>, FetchError>;
}

/// Enabled adapters keyed by provider id.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn MangaProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider `config` leaves enabled.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let mut registry = Self::new();
        for kind in ProviderKind::ALL {
            if !config.is_enabled(kind) {
                log::info!("Provider {} disabled by configuration", kind.id());
                continue;
            }
            let provider: Arc<dyn MangaProvider> = match kind {
                ProviderKind::AsuraScans => Arc::new(asurascans::AsuraScans::from_config(config)?),
                ProviderKind::FlameComics => Arc::new(flamecomics::FlameComics::from_config(config)?),
                ProviderKind::FireScans => Arc::new(firescans::from_config(config)?),
                ProviderKind::RizzComic => Arc::new(rizzcomic::RizzComic::from_config(config)?),
                ProviderKind::MangaPill => Arc::new(mangapill::MangaPill::from_config(config)?),
                ProviderKind::MangaDex => Arc::new(mangadex::MangaDex::from_config(config)?),
            };
            registry.register(provider);
        }
        log::debug!("Registered {} providers", registry.providers.len());
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn MangaProvider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Look up by id or by any alias [`parse_provider`] understands.
    pub fn get(&self, name: &str) -> Option<Arc<dyn MangaProvider>> {
        let key = name.trim().to_lowercase();
        if let Some(p) = self.providers.get(&key) {
            return Some(Arc::clone(p));
        }
        parse_provider(&key).and_then(|kind| self.providers.get(kind.id()).cloned())
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(|k| k.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Turn a listing or chapter reference into a URL on `base_url`.
///
/// Absolute URLs pass through, leading slashes are ignored and anything
/// else is appended under `prefix` (e.g. `series`).
pub(crate) fn resolve_reference(
    base_url: &str,
    prefix: &str,
    reference: &str,
) -> Result<String, FetchError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(FetchError::InvalidReference(reference.to_string()));
    }
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Ok(reference.to_string());
    }
    let path = reference.trim_start_matches('/');
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() || path.starts_with(&format!("{}/", prefix)) {
        Ok(format!("{}/{}", base_url, path))
    } else {
        Ok(format!("{}/{}/{}", base_url, prefix, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_reference_forms() {
        let base = "https://site.test";
        assert_eq!(
            resolve_reference(base, "series", "solo/chapter/3").unwrap(),
            "https://site.test/series/solo/chapter/3"
        );
        assert_eq!(
            resolve_reference(base, "series", "/series/solo/chapter/3").unwrap(),
            "https://site.test/series/solo/chapter/3"
        );
        assert_eq!(
            resolve_reference(base, "series", "https://cdn.test/x").unwrap(),
            "https://cdn.test/x"
        );
        assert_eq!(resolve_reference(base, "", "a/b").unwrap(), "https://site.test/a/b");
        assert!(matches!(
            resolve_reference(base, "series", "  "),
            Err(FetchError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_registry_from_config_respects_enabled() {
        let cfg = Config::from_toml_str(
            r#"
            [providers.mangadex]
            enabled = false
            "#,
        )
        .unwrap();
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        assert_eq!(registry.len(), 5);
        assert!(registry.get("mangadex").is_none());
        assert!(registry.get("asura").is_some());
        assert_eq!(registry.get("MangaPill").unwrap().id(), "mangapill");
    }
}
