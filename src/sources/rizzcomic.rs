use super::{resolve_reference, MangaProvider};
use crate::chapters::{self, GapFillPolicy};
use crate::config::Config;
use crate::error::FetchError;
use crate::extraction::{ExtractionPipeline, PipelineOptions};
use crate::helpers::{
    absolute_url, clean_manga_title, clean_text, extract_chapter_number, normalize_release_date,
    path_after_base, trim_number,
};
use crate::http_client::{EnhancedHttpClient, HttpClientConfig};
use crate::logging::RequestLog;
use crate::models::{
    ChapterRecord, ListingCandidate, MangaDetails, PageRecord, Pagination, ProviderKind,
    SearchResults,
};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

pub const DEFAULT_BASE_URL: &str = "https://rizzcomic.com";
pub const DEFAULT_THRESHOLD: f64 = 0.4;

static RESULT_CARD: Lazy<Selector> = Lazy::new(|| sel("div.listupd div.bs div.bsx, div.bsx"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a"));
static CARD_TITLE: Lazy<Selector> = Lazy::new(|| sel("div.tt"));
static IMG: Lazy<Selector> = Lazy::new(|| sel("img"));
static NEXT_PAGE: Lazy<Selector> = Lazy::new(|| sel("div.pagination a.next, div.hpage a.r"));
static TITLE: Lazy<Selector> = Lazy::new(|| sel("h1.entry-title"));
static ALTERNATIVE: Lazy<Selector> = Lazy::new(|| sel("div.seriestualt, span.alternative"));
static DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| sel("div.entry-content[itemprop='description'], div.entry-content"));
static COVER: Lazy<Selector> = Lazy::new(|| sel("div.thumb img"));
static GENRES: Lazy<Selector> = Lazy::new(|| sel("div.mgen a, span.mgen a"));
static INFO_ROW: Lazy<Selector> = Lazy::new(|| sel("div.imptdt, div.tsinfo div"));
static CHAPTER_ROW: Lazy<Selector> = Lazy::new(|| sel("#chapterlist li[data-num]"));
static CHAPTER_NUM: Lazy<Selector> = Lazy::new(|| sel("span.chapternum"));
static CHAPTER_DATE: Lazy<Selector> = Lazy::new(|| sel("span.chapterdate"));
static LATEST: Lazy<Selector> = Lazy::new(|| sel(".epcurlast"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("mangastream selector")
}

/// Rizz Comic - MangaStream theme, reader images injected by `ts_reader`
pub struct RizzComic {
    base_url: String,
    threshold: f64,
    gap_policy: GapFillPolicy,
    http: EnhancedHttpClient,
    pipeline: ExtractionPipeline,
}

impl RizzComic {
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
            pipeline: pipeline(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let kind = ProviderKind::RizzComic;
        Self::new(
            &config.base_url_for(kind, DEFAULT_BASE_URL),
            config.threshold_for(kind, Some(DEFAULT_THRESHOLD)),
            config.chapters.clone(),
            config.http.client_config(),
        )
    }
}

/// `#readerarea` is empty until `ts_reader.run` fills it, so a bare `img`
/// selector would only pick up sidebar covers.
fn pipeline() -> ExtractionPipeline {
    ExtractionPipeline::standard(PipelineOptions {
        cdn_pattern: None,
        image_selector: Some("div#readerarea img".to_string()),
    })
}

#[async_trait::async_trait]
impl MangaProvider for RizzComic {
    fn id(&self) -> &str {
        ProviderKind::RizzComic.id()
    }

    fn name(&self) -> &str {
        "Rizz Comic"
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
        let query = urlencoding::encode(title.trim());
        let url = if page > 1 {
            format!("{}/page/{}/?s={}", self.base_url, page, query)
        } else {
            format!("{}/?s={}", self.base_url, query)
        };
        log.debug(format!("RizzComic: searching {}", url));
        let html = self.http.get_text(&url).await?;
        Ok(parse_search(&html, &self.base_url, page))
    }

    async fn get_manga_info(&self, id: &str, log: &RequestLog) -> Result<MangaDetails, FetchError> {
        let url = resolve_reference(&self.base_url, "", id)?;
        let html = self.http.get_text(&url).await?;
        let listing_id = path_after_base(&url, &self.base_url).unwrap_or_else(|| id.to_string());
        let (mut details, latest) = parse_details(&html, &self.base_url, &listing_id);
        log.debug(format!(
            "RizzComic: {} chapters listed, latest advertised {:?}",
            details.chapters.len(),
            latest
        ));

        let base = self.base_url.clone();
        details.chapters = chapters::fill_gaps(
            std::mem::take(&mut details.chapters),
            latest,
            &self.gap_policy,
            |u| path_after_base(u, &base).unwrap_or_else(|| u.to_string()),
        );
        Ok(details)
    }

    async fn fetch_chapter_pages(
        &self,
        chapter_ref: &str,
        log: &RequestLog,
    ) -> Result<Vec<PageRecord>, FetchError> {
        let url = resolve_reference(&self.base_url, "", chapter_ref)?;
        let html = self.http.get_text(&url).await?;
        let extraction = self.pipeline.extract(&url, &html);
        log.debug(format!(
            "RizzComic: {} pages via {:?}",
            extraction.pages.len(),
            extraction.strategy
        ));
        Ok(extraction.pages)
    }
}

/// Parse a `/?s=` result page. Listing ids are paths below the base URL.
pub fn parse_search(html: &str, base_url: &str, page: u32) -> SearchResults {
    let document = Html::parse_document(html);
    let mut results = Vec::new();
    let mut seen = HashSet::new();

    for card in document.select(&RESULT_CARD) {
        let Some(link) = card.select(&ANCHOR).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(id) = path_after_base(&absolute_url(base_url, href), base_url)
            .filter(|p| !p.is_empty())
        else {
            continue;
        };
        // Get title from title attribute or the card caption
        let raw_title = link
            .value()
            .attr("title")
            .map(str::to_string)
            .or_else(|| card.select(&CARD_TITLE).next().map(|t| t.text().collect()))
            .unwrap_or_default();
        let Some(title) = clean_manga_title(&raw_title) else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        let mut candidate = ListingCandidate::new(id, title);
        candidate.image = card
            .select(&IMG)
            .next()
            .and_then(|e| e.value().attr("src").or_else(|| e.value().attr("data-src")))
            .map(|s| absolute_url(base_url, s));
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

/// Parse a series page. The second value is the chapter number advertised
/// by the "latest chapter" button, which may exceed what the list shows.
pub fn parse_details(html: &str, base_url: &str, id: &str) -> (MangaDetails, Option<f64>) {
    let document = Html::parse_document(html);
    let text_of = |e: ElementRef<'_>| clean_text(&e.text().collect::<String>());

    let title = document
        .select(&TITLE)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| id.to_string());

    let alternate_titles = document
        .select(&ALTERNATIVE)
        .next()
        .map(text_of)
        .map(|v| {
            v.split([',', ';', '|'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let status = document.select(&INFO_ROW).find_map(|row| {
        let text = text_of(row);
        text.strip_prefix("Status")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    });

    let chapter_list: Vec<ChapterRecord> = document
        .select(&CHAPTER_ROW)
        .filter_map(|row| chapter_from_row(row, base_url))
        .collect();

    let latest = document
        .select(&LATEST)
        .next()
        .and_then(|e| extract_chapter_number(&text_of(e)))
        .and_then(|n| n.parse::<f64>().ok());

    let details = MangaDetails {
        id: id.to_string(),
        title,
        alternate_titles,
        description: document
            .select(&DESCRIPTION)
            .next()
            .map(text_of)
            .filter(|d| !d.is_empty()),
        image: document
            .select(&COVER)
            .next()
            .and_then(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
            .map(|s| absolute_url(base_url, s)),
        genres: document.select(&GENRES).map(text_of).collect(),
        authors: Vec::new(),
        status,
        chapters: chapters::finalize(chapter_list),
    };
    (details, latest)
}

fn chapter_from_row(row: ElementRef<'_>, base_url: &str) -> Option<ChapterRecord> {
    let link = row.select(&ANCHOR).next()?;
    let url = absolute_url(base_url, link.value().attr("href")?);
    let number = row
        .value()
        .attr("data-num")
        .map(|n| trim_number(n.trim()))
        .filter(|n| n.parse::<f64>().is_ok())
        .or_else(|| extract_chapter_number(&url))?;
    let title = row
        .select(&CHAPTER_NUM)
        .next()
        .map(|e| clean_text(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("Chapter {}", number));
    let date = row
        .select(&CHAPTER_DATE)
        .next()
        .map(|e| normalize_release_date(&e.text().collect::<String>()))
        .unwrap_or_else(|| "Unknown".to_string());
    Some(ChapterRecord {
        id: path_after_base(&url, base_url).unwrap_or_else(|| url.clone()),
        title,
        number,
        url,
        date,
        generated: None,
    })
}
