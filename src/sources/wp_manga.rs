//! Shared adapter for sites running the WordPress Madara ("WP-Manga") theme.

use super::{resolve_reference, MangaProvider};
use crate::config::Config;
use crate::error::FetchError;
use crate::extraction::{ExtractionPipeline, PipelineOptions};
use crate::helpers::{
    absolute_url, clean_manga_title, clean_text, extract_chapter_number, normalize_release_date,
    path_after_base,
};
use crate::http_client::{EnhancedHttpClient, HttpClientConfig};
use crate::logging::RequestLog;
use crate::models::{
    ChapterRecord, ListingCandidate, MangaDetails, PageRecord, Pagination, ProviderKind,
    SearchResults,
};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// Selector for the reader images on a chapter page
pub const READER_IMAGES: &str = "div.reading-content img";

static SEARCH_ITEM: Lazy<Selector> =
    Lazy::new(|| sel("div.c-tabs-item__content, div.page-item-detail, div.page-listing-item"));
static ITEM_LINK: Lazy<Selector> = Lazy::new(|| sel("div.post-title h3 a, h3 a, h4 a"));
static IMG: Lazy<Selector> = Lazy::new(|| sel("img"));
static SUMMARY_ROW: Lazy<Selector> = Lazy::new(|| sel("div.post-content_item"));
static SUMMARY_HEADING: Lazy<Selector> = Lazy::new(|| sel("div.summary-heading"));
static SUMMARY_CONTENT: Lazy<Selector> = Lazy::new(|| sel("div.summary-content"));
static NEXT_PAGE: Lazy<Selector> =
    Lazy::new(|| sel("a.nextpostslink, a.next, div.nav-previous a"));
static DETAIL_TITLE: Lazy<Selector> = Lazy::new(|| sel("div.post-title h1, div.post-title h3"));
static DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| sel("div.summary__content, div.description-summary"));
static COVER: Lazy<Selector> = Lazy::new(|| sel("div.summary_image img"));
static GENRES: Lazy<Selector> = Lazy::new(|| sel("div.genres-content a"));
static AUTHORS: Lazy<Selector> = Lazy::new(|| sel("div.author-content a"));
static CHAPTER_ITEM: Lazy<Selector> = Lazy::new(|| sel("li.wp-manga-chapter"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a"));
static RELEASE_DATE: Lazy<Selector> = Lazy::new(|| sel("span.chapter-release-date"));
static CHAPTERS_HOLDER: Lazy<Selector> = Lazy::new(|| sel("div#manga-chapters-holder"));
static SCRIPT: Lazy<Selector> = Lazy::new(|| sel("script"));
static MANGA_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"manga_id["']?\s*[:=]\s*["']?(\d+)"#).expect("manga id regex"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("wp-manga selector")
}

/// Static description of one Madara site.
#[derive(Debug, Clone, Copy)]
pub struct WpMangaSite {
    pub kind: ProviderKind,
    pub name: &'static str,
    pub default_base_url: &'static str,
    pub default_threshold: f64,
}

pub struct WpManga {
    kind: ProviderKind,
    name: &'static str,
    base_url: String,
    threshold: f64,
    http: EnhancedHttpClient,
    pipeline: ExtractionPipeline,
}

impl WpManga {
    pub fn new(
        site: WpMangaSite,
        base_url: &str,
        threshold: f64,
        http_config: HttpClientConfig,
    ) -> Result<Self, reqwest::Error> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = EnhancedHttpClient::with_config(http_config.with_header("Referer", &base_url))?;
        Ok(Self {
            kind: site.kind,
            name: site.name,
            base_url,
            threshold,
            http,
            pipeline: ExtractionPipeline::standard(PipelineOptions {
                cdn_pattern: None,
                image_selector: Some(READER_IMAGES.to_string()),
            }),
        })
    }

    pub fn from_config(site: WpMangaSite, config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            site,
            &config.base_url_for(site.kind, site.default_base_url),
            config.threshold_for(site.kind, Some(site.default_threshold)),
            config.http.client_config(),
        )
    }

    fn search_url(&self, encoded_query: &str, page: u32) -> String {
        if page <= 1 {
            format!("{}/?s={}&post_type=wp-manga", self.base_url, encoded_query)
        } else {
            format!(
                "{}/page/{}/?s={}&post_type=wp-manga",
                self.base_url, page, encoded_query
            )
        }
    }

    fn manga_base(&self) -> String {
        format!("{}/manga", self.base_url)
    }

    fn ajax_headers(&self, referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
        headers
    }

    /// Newer Madara builds serve the list from `<manga>/ajax/chapters/`,
    /// older ones only through `admin-ajax.php`.
    ///
    /// An endpoint that answers with an empty list counts as an answer. The
    /// last failure is returned only when no endpoint answered at all.
    async fn fetch_ajax_chapters(
        &self,
        manga_url: &str,
        post_id: Option<String>,
        log: &RequestLog,
    ) -> Result<Vec<ChapterRecord>, FetchError> {
        let ajax_url = format!("{}/ajax/chapters/", manga_url.trim_end_matches('/'));
        let empty: &[(&str, &str)] = &[];
        let ajax_error = match self
            .http
            .post_form(&ajax_url, empty, self.ajax_headers(manga_url))
            .await
        {
            Ok(fragment) => {
                let chapters = parse_chapter_list(&fragment, &self.base_url);
                if !chapters.is_empty() {
                    return Ok(chapters);
                }
                None
            }
            Err(e) => {
                log.debug(format!("{}: ajax chapter list failed: {}", self.name, e));
                Some(e)
            }
        };

        let Some(post_id) = post_id else {
            log.warn(format!("{}: no manga id on {}, giving up on chapter list", self.name, manga_url));
            return match ajax_error {
                Some(e) => Err(e),
                None => Ok(Vec::new()),
            };
        };
        let admin_ajax = format!("{}/wp-admin/admin-ajax.php", self.base_url);
        let form: &[(&str, &str)] = &[("action", "manga_get_chapters"), ("manga", post_id.as_str())];
        match self
            .http
            .post_form(&admin_ajax, form, self.ajax_headers(manga_url))
            .await
        {
            Ok(fragment) => Ok(parse_chapter_list(&fragment, &self.base_url)),
            Err(e) if ajax_error.is_none() => {
                log.warn(format!("{}: admin-ajax chapter list failed: {}", self.name, e));
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl MangaProvider for WpManga {
    fn id(&self) -> &str {
        self.kind.id()
    }

    fn name(&self) -> &str {
        self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn match_threshold(&self) -> f64 {
        self.threshold
    }

    /// WordPress is picky about how the query is encoded, so a miss with the
    /// percent-encoded form is retried with `+` between words.
    async fn search(
        &self,
        title: &str,
        page: Option<u32>,
        log: &RequestLog,
    ) -> Result<SearchResults, FetchError> {
        let page = page.unwrap_or(1).max(1);
        let title = title.trim();
        let encodings = [
            urlencoding::encode(title).into_owned(),
            title
                .split_whitespace()
                .map(|w| urlencoding::encode(w).into_owned())
                .collect::<Vec<_>>()
                .join("+"),
        ];

        let mut last = SearchResults::default();
        let mut tried = HashSet::new();
        for encoded in encodings {
            if !tried.insert(encoded.clone()) {
                continue;
            }
            let url = self.search_url(&encoded, page);
            log.debug(format!("{}: searching {}", self.name, url));
            let html = self.http.get_text(&url).await?;
            last = parse_search(&html, &self.base_url, &self.manga_base(), page);
            if !last.is_empty() {
                break;
            }
        }
        Ok(last)
    }

    async fn get_manga_info(&self, id: &str, log: &RequestLog) -> Result<MangaDetails, FetchError> {
        let url = resolve_reference(&self.base_url, "manga", id)?;
        let slug = path_after_base(&url, &self.manga_base())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FetchError::InvalidReference(id.to_string()))?;
        let html = self.http.get_text(&format!("{}/", url.trim_end_matches('/'))).await?;

        let (mut details, post_id) = parse_details(&html, &self.base_url, &slug);
        if details.chapters.is_empty() {
            log.debug(format!("{}: chapter list not inline, trying ajax", self.name));
            details.chapters = self.fetch_ajax_chapters(&url, post_id, log).await?;
        }
        details.chapters = crate::chapters::finalize(std::mem::take(&mut details.chapters));
        log.debug(format!("{}: Found {} chapters for {}", self.name, details.chapters.len(), slug));
        Ok(details)
    }

    async fn fetch_chapter_pages(
        &self,
        chapter_ref: &str,
        log: &RequestLog,
    ) -> Result<Vec<PageRecord>, FetchError> {
        let url = resolve_reference(&self.base_url, "manga", chapter_ref)?;
        let url = format!("{}/", url.trim_end_matches('/'));
        let html = self.http.get_text(&url).await?;
        let extraction = self.pipeline.extract(&url, &html);
        log.debug(format!(
            "{}: {} pages via {:?}",
            self.name,
            extraction.pages.len(),
            extraction.strategy
        ));
        Ok(extraction.pages)
    }
}

/// Parse a Madara search page. Listing ids are the manga slug.
pub fn parse_search(html: &str, base_url: &str, manga_base: &str, page: u32) -> SearchResults {
    let document = Html::parse_document(html);
    let mut results = Vec::new();
    let mut seen = HashSet::new();

    for item in document.select(&SEARCH_ITEM) {
        let Some(link) = item.select(&ITEM_LINK).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let href = absolute_url(base_url, href);
        let Some(slug) = path_after_base(&href, manga_base).filter(|s| !s.is_empty()) else {
            continue;
        };
        let Some(title) = clean_manga_title(&link.text().collect::<String>()) else {
            continue;
        };
        if !seen.insert(slug.clone()) {
            continue;
        }

        let mut candidate = ListingCandidate::new(slug, title);
        candidate.alternate_titles = summary_value(item, "alternative")
            .map(|v| split_alternatives(&v))
            .unwrap_or_default();
        candidate.genres = summary_value(item, "genres").map(|v| split_alternatives(&v));
        candidate.image = item
            .select(&IMG)
            .next()
            .and_then(image_source)
            .map(|src| absolute_url(base_url, &src));
        results.push(candidate);
    }

    SearchResults {
        results,
        pagination: Some(Pagination {
            current_page: page,
            has_next_page: document.select(&NEXT_PAGE).next().is_some(),
        }),
    }
}

/// Parse a `/manga/<slug>/` page. Also returns the WordPress post id used
/// by the ajax fallbacks, when the page exposes one.
pub fn parse_details(html: &str, base_url: &str, slug: &str) -> (MangaDetails, Option<String>) {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let title = document
        .select(&DETAIL_TITLE)
        .next()
        .and_then(|e| clean_manga_title(&e.text().collect::<String>()))
        .unwrap_or_else(|| slug.to_string());

    let texts = |selector: &Selector| -> Vec<String> {
        document
            .select(selector)
            .map(|e| clean_text(&e.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .collect()
    };

    let details = MangaDetails {
        id: slug.to_string(),
        title,
        alternate_titles: summary_value(root, "alternative")
            .map(|v| split_alternatives(&v))
            .unwrap_or_default(),
        description: texts(&DESCRIPTION).into_iter().next(),
        image: document
            .select(&COVER)
            .next()
            .and_then(image_source)
            .map(|src| absolute_url(base_url, &src)),
        genres: texts(&GENRES),
        authors: texts(&AUTHORS),
        status: summary_value(root, "status"),
        chapters: parse_chapter_list(html, base_url),
    };
    (details, find_post_id(&document))
}

/// Chapter rows from either a full page or an ajax fragment.
pub fn parse_chapter_list(html: &str, base_url: &str) -> Vec<ChapterRecord> {
    let document = Html::parse_document(html);
    let manga_base = format!("{}/manga", base_url.trim_end_matches('/'));

    document
        .select(&CHAPTER_ITEM)
        .filter_map(|item| {
            let link = item.select(&ANCHOR).next()?;
            let href = link
                .value()
                .attr("href")
                .or_else(|| link.value().attr("data-href"))?;
            let url = absolute_url(base_url, href);
            let title = clean_text(&link.text().collect::<String>());
            let number = extract_chapter_number(&title).or_else(|| extract_chapter_number(&url))?;
            let date = item
                .select(&RELEASE_DATE)
                .next()
                .map(|d| normalize_release_date(&d.text().collect::<String>()))
                .unwrap_or_else(|| "Unknown".to_string());
            Some(ChapterRecord {
                id: path_after_base(&url, &manga_base).unwrap_or_else(|| url.clone()),
                title: if title.is_empty() {
                    format!("Chapter {}", number)
                } else {
                    title
                },
                number,
                url,
                date,
                generated: None,
            })
        })
        .collect()
}

fn find_post_id(document: &Html) -> Option<String> {
    if let Some(id) = document
        .select(&CHAPTERS_HOLDER)
        .next()
        .and_then(|d| d.value().attr("data-id"))
    {
        return Some(id.to_string());
    }
    document.select(&SCRIPT).find_map(|s| {
        let text = s.text().collect::<String>();
        MANGA_ID_RE.captures(&text).map(|c| c[1].to_string())
    })
}

/// Value of the summary row whose heading starts with `heading`
fn summary_value(scope: ElementRef<'_>, heading: &str) -> Option<String> {
    scope.select(&SUMMARY_ROW).find_map(|row| {
        let label = row
            .select(&SUMMARY_HEADING)
            .next()
            .map(|h| clean_text(&h.text().collect::<String>()).to_lowercase())?;
        if !label.starts_with(heading) {
            return None;
        }
        row.select(&SUMMARY_CONTENT)
            .next()
            .map(|c| clean_text(&c.text().collect::<String>()))
            .filter(|v| !v.is_empty())
    })
}

fn split_alternatives(value: &str) -> Vec<String> {
    value
        .split([',', ';', '/', '|'])
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("updating"))
        .map(str::to_string)
        .collect()
}

fn image_source(img: ElementRef<'_>) -> Option<String> {
    ["data-src", "data-lazy-src", "src"]
        .iter()
        .filter_map(|a| img.value().attr(a))
        .map(str::trim)
        .find(|v| !v.is_empty() && !v.starts_with("data:"))
        .map(str::to_string)
}
