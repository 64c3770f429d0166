//! Resolves a catalog entry onto a target site.
//!
//! One listing request walks
//! `resolve identity -> search primary -> search alternates -> select match
//! -> fetch details -> normalize`, strictly in that order. Nothing is cached
//! between requests and nothing is shared except the immutable registry.

use crate::chapters;
use crate::error::{CatalogError, MappingError};
use crate::logging::RequestLog;
use crate::matcher::{search_with_alternates, select_best};
use crate::metadata::CatalogProvider;
use crate::models::{MappingResult, PagesResponse, TargetSite};
use crate::sources::{MangaProvider, ProviderRegistry};
use std::sync::Arc;

pub struct Aggregator {
    catalog: Arc<dyn CatalogProvider>,
    registry: ProviderRegistry,
}

impl Aggregator {
    pub fn new(catalog: Arc<dyn CatalogProvider>, registry: ProviderRegistry) -> Self {
        Self { catalog, registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    fn provider(&self, provider_id: &str) -> Result<Arc<dyn MangaProvider>, MappingError> {
        self.registry
            .get(provider_id)
            .ok_or_else(|| MappingError::UnknownProvider(provider_id.to_string()))
    }

    /// Map catalog entry `catalog_id` onto `provider_id`'s listing and
    /// return that listing's chapters.
    pub async fn map_listing(
        &self,
        catalog_id: i64,
        provider_id: &str,
    ) -> Result<MappingResult, MappingError> {
        let provider = self.provider(provider_id)?;
        let log = RequestLog::for_provider(provider.id());
        let result = self.map_with(&*provider, catalog_id, &log).await;
        match &result {
            Err(e) if e.is_not_found() => log.warn(format!("mapping {} failed: {}", catalog_id, e)),
            Err(e) => log.error(format!("mapping {} failed: {}", catalog_id, e)),
            Ok(_) => {}
        }
        result
    }

    async fn map_with(
        &self,
        provider: &dyn MangaProvider,
        catalog_id: i64,
        log: &RequestLog,
    ) -> Result<MappingResult, MappingError> {
        let media = self.catalog.get_info(catalog_id).await.map_err(|e| match e {
            CatalogError::Upstream(source) => MappingError::Catalog { catalog_id, source },
            not_found => MappingError::IdentityNotFound {
                catalog_id,
                message: not_found.to_string(),
            },
        })?;
        let primary = media.titles.primary.clone();
        log.info(format!("catalog {} resolved to \"{}\"", catalog_id, primary));

        let outcome = search_with_alternates(provider, &primary, &media.alternate_names, log)
            .await
            .map_err(|e| MappingError::downstream(provider.id(), e))?
            .ok_or_else(|| MappingError::NoListingFound {
                provider: provider.id().to_string(),
                title: primary.clone(),
            })?;

        let matched = select_best(
            &outcome.results.results,
            &primary,
            &media.alternate_names,
            provider.match_threshold(),
        )
        .map_err(|_| MappingError::NoCandidates {
            provider: provider.id().to_string(),
        })?;
        if matched.fallback {
            log.warn(format!(
                "no candidate reached {:.2} for \"{}\", taking first result \"{}\" ({:.2})",
                provider.match_threshold(),
                outcome.query,
                matched.candidate.title,
                matched.score
            ));
        } else {
            log.info(format!(
                "matched \"{}\" ({}) with score {:.2}",
                matched.candidate.title, matched.candidate.id, matched.score
            ));
        }

        let details = provider
            .get_manga_info(&matched.candidate.id, log)
            .await
            .map_err(|e| MappingError::downstream(provider.id(), e))?;
        log.debug(format!("{} chapters for {}", details.chapters.len(), details.id));

        let title = if details.title.trim().is_empty() {
            matched.candidate.title.clone()
        } else {
            details.title
        };
        Ok(MappingResult {
            origin_id: media.id,
            origin_title: primary,
            provider: provider.id().to_string(),
            target_site: TargetSite {
                id: matched.candidate.id.clone(),
                title,
                chapters: chapters::finalize(details.chapters),
            },
            matched: Some(matched),
        })
    }

    /// Fetch the pages of one chapter. An empty page list is a valid result.
    pub async fn fetch_pages(
        &self,
        provider_id: &str,
        chapter_ref: &str,
    ) -> Result<PagesResponse, MappingError> {
        fetch_pages(&self.registry, provider_id, chapter_ref).await
    }
}

/// Page requests never touch the catalog, so they only need the registry.
pub async fn fetch_pages(
    registry: &ProviderRegistry,
    provider_id: &str,
    chapter_ref: &str,
) -> Result<PagesResponse, MappingError> {
    let provider = registry
        .get(provider_id)
        .ok_or_else(|| MappingError::UnknownProvider(provider_id.to_string()))?;
    let log = RequestLog::for_provider(provider.id());
    let pages = provider
        .fetch_chapter_pages(chapter_ref, &log)
        .await
        .map_err(|e| MappingError::downstream(provider.id(), e))?;
    if pages.is_empty() {
        log.warn(format!("no pages found for {}", chapter_ref));
    } else {
        log.info(format!("{} pages for {}", pages.len(), chapter_ref));
    }
    Ok(PagesResponse { pages })
}
