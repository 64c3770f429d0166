//! Offline stand-ins for the catalog and for a target site.

#![allow(dead_code)]

use rust_manga_mapper::error::{CatalogError, FetchError};
use rust_manga_mapper::logging::RequestLog;
use rust_manga_mapper::models::{
    CatalogMedia, CatalogTitles, ChapterRecord, ListingCandidate, MangaDetails, PageRecord,
    SearchResults,
};
use rust_manga_mapper::{CatalogProvider, MangaProvider};
use std::collections::HashMap;
use std::sync::Mutex;

pub struct FakeCatalog {
    pub media: HashMap<i64, CatalogMedia>,
    pub upstream_failure: bool,
}

impl FakeCatalog {
    pub fn with(media: CatalogMedia) -> Self {
        let mut map = HashMap::new();
        map.insert(media.id, media);
        Self {
            media: map,
            upstream_failure: false,
        }
    }

    pub fn broken() -> Self {
        Self {
            media: HashMap::new(),
            upstream_failure: true,
        }
    }
}

#[async_trait::async_trait]
impl CatalogProvider for FakeCatalog {
    async fn get_info(&self, id: i64) -> Result<CatalogMedia, CatalogError> {
        if self.upstream_failure {
            return Err(CatalogError::Upstream(FetchError::Status {
                url: "https://catalog.test/graphql".to_string(),
                status: 503,
            }));
        }
        self.media.get(&id).cloned().ok_or(CatalogError::NotFound(id))
    }
}

pub fn media(id: i64, primary: &str, alternates: &[&str]) -> CatalogMedia {
    CatalogMedia {
        id,
        titles: CatalogTitles {
            primary: primary.to_string(),
            english: Some(primary.to_string()),
            ..Default::default()
        },
        alternate_names: alternates.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

pub fn chapter(n: &str, slug: &str) -> ChapterRecord {
    let url = format!("https://site.test/series/{}/chapter-{}", slug, n);
    ChapterRecord {
        id: format!("{}/chapter-{}", slug, n),
        title: format!("Chapter {}", n),
        number: n.to_string(),
        url,
        date: "2024-03-01".to_string(),
        generated: None,
    }
}

/// Scripted site: answers searches from a table and records every query.
pub struct FakeSite {
    pub id: String,
    pub threshold: f64,
    pub results: HashMap<String, Vec<ListingCandidate>>,
    pub failing_queries: Vec<String>,
    pub details: HashMap<String, MangaDetails>,
    pub pages: Vec<PageRecord>,
    pub queries: Mutex<Vec<String>>,
    pub info_requests: Mutex<Vec<String>>,
}

impl FakeSite {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            threshold: 0.5,
            results: HashMap::new(),
            failing_queries: Vec::new(),
            details: HashMap::new(),
            pages: Vec::new(),
            queries: Mutex::new(Vec::new()),
            info_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn answer(mut self, query: &str, candidates: Vec<ListingCandidate>) -> Self {
        self.results.insert(query.to_string(), candidates);
        self
    }

    pub fn fail_on(mut self, query: &str) -> Self {
        self.failing_queries.push(query.to_string());
        self
    }

    pub fn listing(mut self, details: MangaDetails) -> Self {
        self.details.insert(details.id.clone(), details);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn info_requests(&self) -> Vec<String> {
        self.info_requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MangaProvider for FakeSite {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Fake Site"
    }

    fn base_url(&self) -> &str {
        "https://site.test"
    }

    fn match_threshold(&self) -> f64 {
        self.threshold
    }

    async fn search(
        &self,
        title: &str,
        _page: Option<u32>,
        _log: &RequestLog,
    ) -> Result<SearchResults, FetchError> {
        self.queries.lock().unwrap().push(title.to_string());
        if self.failing_queries.iter().any(|q| q == title) {
            return Err(FetchError::Status {
                url: format!("https://site.test/search?q={}", title),
                status: 500,
            });
        }
        Ok(SearchResults {
            results: self.results.get(title).cloned().unwrap_or_default(),
            pagination: None,
        })
    }

    async fn get_manga_info(&self, id: &str, _log: &RequestLog) -> Result<MangaDetails, FetchError> {
        self.info_requests.lock().unwrap().push(id.to_string());
        self.details.get(id).cloned().ok_or(FetchError::Status {
            url: format!("https://site.test/series/{}", id),
            status: 404,
        })
    }

    async fn fetch_chapter_pages(
        &self,
        chapter_ref: &str,
        _log: &RequestLog,
    ) -> Result<Vec<PageRecord>, FetchError> {
        if chapter_ref.is_empty() {
            return Err(FetchError::InvalidReference(chapter_ref.to_string()));
        }
        Ok(self.pages.clone())
    }
}
