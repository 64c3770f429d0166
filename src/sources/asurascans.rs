use super::{resolve_reference, MangaProvider};
use crate::chapters::{self, GapFillPolicy};
use crate::config::Config;
use crate::error::FetchError;
use crate::extraction::{ExtractionPipeline, PipelineOptions};
use crate::helpers::{
    absolute_url, clean_manga_title, clean_text, normalize_release_date, path_after_base,
    trim_number,
};
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

pub const DEFAULT_BASE_URL: &str = "https://asuracomic.net";
pub const DEFAULT_THRESHOLD: f64 = 0.4;

static CHAPTER_HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"chapter/(\d+(?:\.\d+)?)").expect("asura chapter regex"));
static CDN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://gg\.asuracomic\.net/storage/media/[^"'\s\\<>]+?\.(?:jpe?g|png|webp|avif)"#)
        .expect("asura cdn regex")
});

static SERIES_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*='series/']"));
static CARD_TITLE: Lazy<Selector> = Lazy::new(|| sel("span.font-bold, span.block"));
static IMG: Lazy<Selector> = Lazy::new(|| sel("img"));
static PAGE_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*='page=']"));
static DETAIL_TITLE: Lazy<Selector> = Lazy::new(|| sel("span.text-xl.font-bold, h1"));
static OG_TITLE: Lazy<Selector> = Lazy::new(|| sel("meta[property='og:title']"));
static OG_IMAGE: Lazy<Selector> = Lazy::new(|| sel("meta[property='og:image']"));
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| sel("meta[name='description']"));
static GENRE: Lazy<Selector> = Lazy::new(|| sel("button.text-white, a[href*='genres=']"));
static CHAPTER_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*='chapter/']"));
static H3: Lazy<Selector> = Lazy::new(|| sel("h3"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("asura selector")
}

/// Asura Scans - Next.js site with HTML-rendered data
pub struct AsuraScans {
    base_url: String,
    threshold: f64,
    gap_policy: GapFillPolicy,
    http: EnhancedHttpClient,
    pipeline: ExtractionPipeline,
}

impl AsuraScans {
    pub fn new(
        base_url: &str,
        threshold: f64,
        gap_policy: GapFillPolicy,
        http_config: HttpClientConfig,
    ) -> Result<Self, reqwest::Error> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = EnhancedHttpClient::with_config(http_config.with_header("Referer", &base_url))?;
        Ok(Self {
            base_url,
            threshold,
            gap_policy,
            http,
            pipeline: ExtractionPipeline::standard(pipeline_options()),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let kind = ProviderKind::AsuraScans;
        Self::new(
            &config.base_url_for(kind, DEFAULT_BASE_URL),
            config.threshold_for(kind, Some(DEFAULT_THRESHOLD)),
            config.chapters.clone(),
            config.http.client_config(),
        )
    }
}

fn pipeline_options() -> PipelineOptions {
    PipelineOptions {
        cdn_pattern: Some(CDN_RE.clone()),
        image_selector: None,
    }
}

#[async_trait::async_trait]
impl MangaProvider for AsuraScans {
    fn id(&self) -> &str {
        ProviderKind::AsuraScans.id()
    }

    fn name(&self) -> &str {
        "Asura Scans"
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
            "{}/series?page={}&name={}",
            self.base_url,
            page,
            urlencoding::encode(title.trim())
        );
        log.debug(format!("AsuraScans: searching {}", url));
        let html = self.http.get_text(&url).await?;
        let results = parse_search(&html, &self.base_url, page);
        log.debug(format!("AsuraScans: {} results on page {}", results.results.len(), page));
        Ok(results)
    }

    async fn get_manga_info(&self, id: &str, log: &RequestLog) -> Result<MangaDetails, FetchError> {
        let url = resolve_reference(&self.base_url, "series", id)?;
        let slug = path_after_base(&url, &format!("{}/series", self.base_url))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FetchError::InvalidReference(id.to_string()))?;
        let html = self.http.get_text(&url).await?;
        let mut details = parse_details(&html, &self.base_url, &slug);
        log.debug(format!("AsuraScans: {} chapters listed for {}", details.chapters.len(), slug));

        // The rendered list is regularly cut short
        let series_base = format!("{}/series", self.base_url);
        details.chapters = chapters::fill_gaps(
            std::mem::take(&mut details.chapters),
            None,
            &self.gap_policy,
            |u| path_after_base(u, &series_base).unwrap_or_else(|| u.to_string()),
        );
        Ok(details)
    }

    async fn fetch_chapter_pages(
        &self,
        chapter_ref: &str,
        log: &RequestLog,
    ) -> Result<Vec<PageRecord>, FetchError> {
        let url = resolve_reference(&self.base_url, "series", chapter_ref)?;
        let html = self.http.get_text(&url).await?;
        let extraction = self.pipeline.extract(&url, &html);
        log.debug(format!(
            "AsuraScans: {} pages via {:?}",
            extraction.pages.len(),
            extraction.strategy
        ));
        Ok(extraction.pages)
    }
}

/// Parse a `/series?name=` result page.
pub fn parse_search(html: &str, base_url: &str, page: u32) -> SearchResults {
    let document = Html::parse_document(html);

    let mut results = Vec::new();
    let mut seen = HashSet::new();

    for element in document.select(&SERIES_LINK) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.contains("/chapter/") {
            continue;
        }
        let Some(slug) = href
            .split("series/")
            .nth(1)
            .map(|s| s.trim_matches('/').to_string())
            .filter(|s| !s.is_empty() && !s.contains('/') && !s.contains('?'))
        else {
            continue;
        };
        if !seen.insert(slug.clone()) {
            continue;
        }

        let raw_title = element
            .select(&CARD_TITLE)
            .next()
            .map(|t| t.text().collect::<String>())
            .unwrap_or_else(|| element.text().collect::<String>());
        let Some(title) = clean_manga_title(&raw_title) else {
            continue;
        };

        let mut candidate = ListingCandidate::new(slug, title);
        candidate.image = element
            .select(&IMG)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| absolute_url(base_url, src));
        results.push(candidate);
    }

    let next_marker = format!("page={}", page + 1);
    let has_next_page = document
        .select(&PAGE_LINK)
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

/// Parse a `/series/<slug>` page. Chapter ids are `<slug>/chapter/<n>`.
pub fn parse_details(html: &str, base_url: &str, slug: &str) -> MangaDetails {
    let document = Html::parse_document(html);

    let title = document
        .select(&DETAIL_TITLE)
        .next()
        .map(|e| clean_text(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(&document, &OG_TITLE))
        .unwrap_or_else(|| slug.to_string());

    let genres: Vec<String> = document
        .select(&GENRE)
        .map(|e| clean_text(&e.text().collect::<String>()))
        .filter(|g| !g.is_empty())
        .collect();

    let mut chapter_list = Vec::new();
    for element in document.select(&CHAPTER_LINK) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(number) = CHAPTER_HREF_RE
            .captures(href)
            .and_then(|c| c.get(1))
            .map(|m| trim_number(m.as_str()))
        else {
            continue;
        };
        chapter_list.push(chapter_from_link(element, base_url, slug, &number));
    }

    MangaDetails {
        id: slug.to_string(),
        title,
        alternate_titles: Vec::new(),
        description: meta_content(&document, &DESCRIPTION),
        image: meta_content(&document, &OG_IMAGE),
        genres,
        authors: Vec::new(),
        status: None,
        chapters: chapters::finalize(chapter_list),
    }
}

fn chapter_from_link(
    element: ElementRef<'_>,
    base_url: &str,
    slug: &str,
    number: &str,
) -> ChapterRecord {
    let headings: Vec<String> = element
        .select(&H3)
        .map(|h| clean_text(&h.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect();
    let title = headings
        .first()
        .cloned()
        .unwrap_or_else(|| format!("Chapter {}", number));
    let date = if headings.len() > 1 {
        normalize_release_date(&headings[headings.len() - 1])
    } else {
        "Unknown".to_string()
    };
    let id = format!("{}/chapter/{}", slug, number);
    ChapterRecord {
        url: format!("{}/series/{}", base_url, id),
        id,
        title,
        number: number.to_string(),
        date,
        generated: None,
    }
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_HTML: &str = r#"
        <div class="grid">
          <a href="series/solo-leveling-7f873ca6">
            <img src="https://gg.asuracomic.net/storage/media/1/cover.webp">
            <span class="block font-bold">Solo Leveling</span>
            <span>Chapter 200</span>
          </a>
          <a href="series/omniscient-reader-aa11">
            <span class="block font-bold">Omniscient Reader</span>
          </a>
          <a href="series/solo-leveling-7f873ca6/chapter/200">Chapter 200</a>
        </div>
        <a href="/series?page=2&name=solo">Next</a>
    "#;

    const DETAILS_HTML: &str = r#"
        <html><head>
          <meta property="og:image" content="https://gg.asuracomic.net/storage/media/1/cover.webp">
          <meta name="description" content="A weak hunter rises.">
        </head><body>
          <span class="text-xl font-bold">Solo Leveling</span>
          <button class="text-white">Action</button>
          <a href="solo-leveling-7f873ca6/chapter/3"><h3>Chapter 3</h3><h3>January 5th 2024</h3></a>
          <a href="solo-leveling-7f873ca6/chapter/2"><h3>Chapter 2</h3><h3>January 1st 2024</h3></a>
          <a href="solo-leveling-7f873ca6/chapter/1"><h3>Chapter 1</h3></a>
          <a href="solo-leveling-7f873ca6/chapter/3"><h3>Chapter 3</h3></a>
        </body></html>
    "#;

    #[test]
    fn test_parse_search() {
        let results = parse_search(SEARCH_HTML, DEFAULT_BASE_URL, 1);
        assert_eq!(results.results.len(), 2);
        assert_eq!(results.results[0].id, "solo-leveling-7f873ca6");
        assert_eq!(results.results[0].title, "Solo Leveling");
        assert!(results.results[0].image.is_some());
        assert!(results.pagination.unwrap().has_next_page);
    }

    #[test]
    fn test_parse_details_chapters() {
        let details = parse_details(DETAILS_HTML, DEFAULT_BASE_URL, "solo-leveling-7f873ca6");
        assert_eq!(details.title, "Solo Leveling");
        assert_eq!(details.genres, vec!["Action"]);
        assert_eq!(details.chapters.len(), 3);
        assert_eq!(details.chapters[0].id, "solo-leveling-7f873ca6/chapter/3");
        assert_eq!(
            details.chapters[0].url,
            "https://asuracomic.net/series/solo-leveling-7f873ca6/chapter/3"
        );
        assert_eq!(details.chapters[0].date, "2024-01-05");
        assert_eq!(details.chapters[2].date, "Unknown");
    }

    #[test]
    fn test_cdn_strategy_picks_storage_images() {
        let pipeline = ExtractionPipeline::standard(pipeline_options());
        let html = r#"<script>self.__next_f.push([1,"https://gg.asuracomic.net/storage/media/9/01.webp https://gg.asuracomic.net/storage/media/9/02.webp"])</script>"#;
        let extraction = pipeline.extract("https://asuracomic.net/series/x/chapter/1", html);
        assert_eq!(extraction.strategy, Some("cdn_pattern"));
        assert_eq!(extraction.pages.len(), 2);
    }
}
