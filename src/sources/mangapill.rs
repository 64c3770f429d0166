use super::{resolve_reference, MangaProvider};
use crate::config::Config;
use crate::error::FetchError;
use crate::extraction::{ExtractionPipeline, PipelineOptions};
use crate::helpers::{absolute_url, clean_text, extract_chapter_number, path_after_base};
use crate::http_client::{EnhancedHttpClient, HttpClientConfig};
use crate::logging::RequestLog;
use crate::models::{
    ChapterRecord, ListingCandidate, MangaDetails, PageRecord, Pagination, ProviderKind,
    SearchResults,
};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

pub const DEFAULT_BASE_URL: &str = "https://mangapill.com";
pub const DEFAULT_THRESHOLD: f64 = 0.5;

static CDN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://cdn\.readdetectiveconan\.com/file/mangapill/i/[^"'\s\\<>]+?\.(?:jpe?g|png|webp)"#)
        .expect("mangapill cdn regex")
});

static MANGA_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href^='/manga/']"));
static CARD_TITLE: Lazy<Selector> = Lazy::new(|| sel("div.font-black, div.font-bold"));
static CARD_ALT: Lazy<Selector> = Lazy::new(|| sel("div.text-xs.text-secondary"));
static IMG: Lazy<Selector> = Lazy::new(|| sel("img"));
static NEXT_PAGE: Lazy<Selector> = Lazy::new(|| sel("a.btn[href*='page=']"));
static H1: Lazy<Selector> = Lazy::new(|| sel("h1"));
static DETAIL_ALT: Lazy<Selector> = Lazy::new(|| sel("h1 + div.text-sm.text-secondary"));
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| sel("p.text-sm.text--secondary, p.text-sm"));
static INFO_BLOCK: Lazy<Selector> = Lazy::new(|| sel("div.grid > div"));
static LABEL: Lazy<Selector> = Lazy::new(|| sel("label"));
static GENRES: Lazy<Selector> = Lazy::new(|| sel("a[href*='genre=']"));
static CHAPTER_LINK: Lazy<Selector> = Lazy::new(|| sel("#chapters a[href^='/chapters/']"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("mangapill selector")
}

pub struct MangaPill {
    base_url: String,
    threshold: f64,
    http: EnhancedHttpClient,
    pipeline: ExtractionPipeline,
}

impl MangaPill {
    pub fn new(
        base_url: &str,
        threshold: f64,
        http_config: HttpClientConfig,
    ) -> Result<Self, reqwest::Error> {
        let base_url = base_url.trim_end_matches('/').to_string();
        // Pages and images are refused without a same-site referer
        let http = EnhancedHttpClient::with_config(
            http_config.with_header("Referer", &format!("{}/", base_url)),
        )?;
        Ok(Self {
            base_url,
            threshold,
            http,
            pipeline: pipeline(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let kind = ProviderKind::MangaPill;
        Self::new(
            &config.base_url_for(kind, DEFAULT_BASE_URL),
            config.threshold_for(kind, Some(DEFAULT_THRESHOLD)),
            config.http.client_config(),
        )
    }
}

fn pipeline() -> ExtractionPipeline {
    ExtractionPipeline::standard(PipelineOptions {
        cdn_pattern: Some(CDN_RE.clone()),
        image_selector: Some("img.js-page".to_string()),
    })
}

#[async_trait::async_trait]
impl MangaProvider for MangaPill {
    fn id(&self) -> &str {
        ProviderKind::MangaPill.id()
    }

    fn name(&self) -> &str {
        "MangaPill"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn match_threshold(&self) -> f64 {
        self.threshold
    }

    async fn search(
        &self,
        title: &str,
        page: Option<u32>,
        log: &RequestLog,
    ) -> Result<SearchResults, FetchError> {
        let page = page.unwrap_or(1).max(1);
        let url = format!(
            "{}/search?q={}&page={}",
            self.base_url,
            urlencoding::encode(title.trim()),
            page
        );
        log.debug(format!("MangaPill: searching {}", url));
        let html = self.http.get_text(&url).await?;
        Ok(parse_search(&html, &self.base_url, page))
    }

    /// `id` is `<numeric id>/<slug>`.
    async fn get_manga_info(&self, id: &str, log: &RequestLog) -> Result<MangaDetails, FetchError> {
        let url = resolve_reference(&self.base_url, "manga", id)?;
        let listing_id = path_after_base(&url, &format!("{}/manga", self.base_url))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FetchError::InvalidReference(id.to_string()))?;
        let html = self.http.get_text(&url).await?;
        let details = parse_details(&html, &self.base_url, &listing_id);
        log.debug(format!("MangaPill: {} chapters for {}", details.chapters.len(), listing_id));
        Ok(details)
    }

    /// `chapter_ref` is `<id>-<n>/<slug>` or a full chapter URL.
    async fn fetch_chapter_pages(
        &self,
        chapter_ref: &str,
        log: &RequestLog,
    ) -> Result<Vec<PageRecord>, FetchError> {
        let url = resolve_reference(&self.base_url, "chapters", chapter_ref)?;
        let html = self.http.get_text(&url).await?;
        let extraction = self.pipeline.extract(&url, &html);
        log.debug(format!(
            "MangaPill: {} pages via {:?}",
            extraction.pages.len(),
            extraction.strategy
        ));
        Ok(extraction.pages)
    }
}

fn text_of(e: ElementRef<'_>) -> String {
    clean_text(&e.text().collect::<String>())
}

pub fn parse_search(html: &str, base_url: &str, page: u32) -> SearchResults {
    let document = Html::parse_document(html);
    let manga_base = format!("{}/manga", base_url);
    let mut results = Vec::new();
    let mut seen = HashSet::new();

    for link in document.select(&MANGA_LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(id) = path_after_base(&absolute_url(base_url, href), &manga_base)
            .filter(|p| p.contains('/'))
        else {
            continue;
        };
        // Cover and caption are two separate anchors to the same listing
        let Some(card) = link.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let Some(title) = card
            .select(&CARD_TITLE)
            .next()
            .map(text_of)
            .filter(|t| !t.is_empty())
        else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        let mut candidate = ListingCandidate::new(id, title);
        candidate.alternate_titles = card
            .select(&CARD_ALT)
            .map(text_of)
            .filter(|t| !t.is_empty())
            .collect();
        candidate.image = card
            .select(&IMG)
            .next()
            .and_then(|img| img.value().attr("data-src").or_else(|| img.value().attr("src")))
            .map(str::to_string);
        results.push(candidate);
    }

    let next_marker = format!("page={}", page + 1);
    let has_next_page = document
        .select(&NEXT_PAGE)
        .filter_map(|a| a.value().attr("href"))
        .any(|h| h.contains(&next_marker));

    SearchResults {
        results,
        pagination: Some(Pagination {
            current_page: page,
            has_next_page,
        }),
    }
}

pub fn parse_details(html: &str, base_url: &str, listing_id: &str) -> MangaDetails {
    let document = Html::parse_document(html);
    let chapters_base = format!("{}/chapters", base_url);

    let info = |label: &str| -> Option<String> {
        document.select(&INFO_BLOCK).find_map(|block| {
            let l = block.select(&LABEL).next().map(text_of)?;
            if !l.eq_ignore_ascii_case(label) {
                return None;
            }
            let value = text_of(block);
            Some(value[l.len()..].trim().to_string()).filter(|v| !v.is_empty())
        })
    };

    let chapter_list: Vec<ChapterRecord> = document
        .select(&CHAPTER_LINK)
        .filter_map(|a| {
            let url = absolute_url(base_url, a.value().attr("href")?);
            let title = text_of(a);
            let number = extract_chapter_number(&title)?;
            Some(ChapterRecord {
                id: path_after_base(&url, &chapters_base)?,
                title,
                number,
                url,
                date: "Unknown".to_string(),
                generated: None,
            })
        })
        .collect();

    MangaDetails {
        id: listing_id.to_string(),
        title: document
            .select(&H1)
            .next()
            .map(text_of)
            .unwrap_or_else(|| listing_id.to_string()),
        alternate_titles: document
            .select(&DETAIL_ALT)
            .next()
            .map(text_of)
            .map(|t| t.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default(),
        description: document.select(&DESCRIPTION).next().map(text_of),
        image: document
            .select(&IMG)
            .find_map(|img| img.value().attr("data-src"))
            .map(str::to_string),
        genres: document.select(&GENRES).map(text_of).collect(),
        authors: Vec::new(),
        status: info("Status"),
        chapters: crate::chapters::finalize(chapter_list),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://mangapill.com";

    #[test]
    fn test_parse_search() {
        let html = r#"
            <div class="grid">
              <div>
                <a href="/manga/2/one-piece"><figure><img data-src="https://cdn.readdetectiveconan.com/file/mangapill/i/2.jpeg"></figure></a>
                <div class="flex flex-col">
                  <a href="/manga/2/one-piece" class="mb-2"><div class="mt-3 font-black leading-tight">One Piece</div>
                  <div class="text-xs text-secondary">ONE PIECE</div></a>
                </div>
              </div>
            </div>
            <a class="btn" href="/search?q=one+piece&page=2">Next</a>"#;
        let results = parse_search(html, BASE, 1);
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].id, "2/one-piece");
        assert_eq!(results.results[0].title, "One Piece");
        assert_eq!(results.results[0].alternate_titles, vec!["ONE PIECE"]);
        assert!(results.pagination.unwrap().has_next_page);
    }

    #[test]
    fn test_parse_details() {
        let html = r#"
            <div class="flex">
              <img data-src="https://cdn.readdetectiveconan.com/file/mangapill/i/2.jpeg">
              <div>
                <h1>One Piece</h1>
                <div class="text-sm text-secondary">ONE PIECE; Wan Pīsu</div>
                <p class="text-sm text--secondary">Gol D. Roger was known as the Pirate King.</p>
                <div class="grid">
                  <div><label>Type</label><div>manga</div></div>
                  <div><label>Status</label><div>publishing</div></div>
                </div>
                <a href="/search?genre=Action">Action</a>
              </div>
            </div>
            <div id="chapters">
              <a href="/chapters/2-11100000/one-piece-chapter-1100">Chapter 1100</a>
              <a href="/chapters/2-10995000/one-piece-chapter-1099.5">Chapter 1099.5</a>
            </div>"#;
        let details = parse_details(html, BASE, "2/one-piece");
        assert_eq!(details.title, "One Piece");
        assert_eq!(details.alternate_titles, vec!["ONE PIECE", "Wan Pīsu"]);
        assert_eq!(details.status.as_deref(), Some("publishing"));
        assert_eq!(details.genres, vec!["Action"]);
        assert_eq!(details.chapters.len(), 2);
        assert_eq!(details.chapters[0].id, "2-11100000/one-piece-chapter-1100");
        assert_eq!(details.chapters[1].number, "1099.5");
    }

    #[test]
    fn test_pages_from_cdn() {
        let html = r#"<chapter-page><img class="js-page" data-src="https://cdn.readdetectiveconan.com/file/mangapill/i/1.jpeg"></chapter-page>
            <chapter-page><img class="js-page" data-src="https://cdn.readdetectiveconan.com/file/mangapill/i/2.jpeg"></chapter-page>"#;
        let extraction = pipeline().extract("https://mangapill.com/chapters/2-1/x", html);
        assert_eq!(extraction.strategy, Some("cdn_pattern"));
        assert_eq!(extraction.pages.len(), 2);
    }
}
