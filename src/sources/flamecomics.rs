use super::{resolve_reference, MangaProvider};
use crate::config::Config;
use crate::error::FetchError;
use crate::extraction::{ExtractionPipeline, ExtractionStrategy, PageDocument, PipelineOptions};
use crate::helpers::{date_from_timestamp, trim_number};
use crate::http_client::{EnhancedHttpClient, HttpClientConfig};
use crate::logging::RequestLog;
use crate::models::{
    ChapterRecord, ListingCandidate, MangaDetails, PageRecord, Pagination, ProviderKind,
    SearchResults,
};
use crate::similarity::similarity;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://flamecomics.xyz";
pub const DEFAULT_THRESHOLD: f64 = 0.4;
const CDN_BASE: &str = "https://cdn.flamecomics.xyz/uploads/images/series";
const PAGE_SIZE: usize = 20;
/// Browse entries scoring at least this against the query are kept.
const BROWSE_MIN_SIMILARITY: f64 = 0.3;

static NEXT_DATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<script id="__NEXT_DATA__" type="application/json"[^>]*>(.+?)</script>"#)
        .expect("next data regex")
});
static CDN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://cdn\.flamecomics\.xyz/uploads/images/series/[^"'\s\\<>]+?\.(?:jpe?g|png|webp|avif)"#)
        .expect("flame cdn regex")
});

#[derive(Deserialize, Debug)]
struct NextData {
    props: NextProps,
}

#[derive(Deserialize, Debug)]
struct NextProps {
    #[serde(rename = "pageProps")]
    page_props: PageProps,
}

#[derive(Deserialize, Debug, Default)]
struct PageProps {
    #[serde(default)]
    series: Option<Value>,

    #[serde(default)]
    chapters: Option<Vec<ChapterData>>,

    #[serde(default)]
    chapter: Option<ChapterData>,
}

#[derive(Deserialize, Debug, Clone)]
struct SeriesData {
    series_id: Value,
    title: String,

    #[serde(default, rename = "altTitles")]
    alt_titles: Option<Value>,

    #[serde(default)]
    description: Option<String>,

    #[serde(default)]
    cover: Option<String>,

    #[serde(default)]
    author: Option<Value>,

    #[serde(default)]
    tags: Option<Value>,

    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
struct ChapterData {
    #[serde(default)]
    series_id: Option<Value>,
    #[serde(default)]
    chapter: Option<Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    release_date: Option<i64>,
    #[serde(default)]
    images: Option<Value>,
}

/// Flame Comics - Free scanlation site (Next.js/React app)
pub struct FlameComics {
    base_url: String,
    threshold: f64,
    http: EnhancedHttpClient,
    pipeline: ExtractionPipeline,
}

impl FlameComics {
    pub fn new(
        base_url: &str,
        threshold: f64,
        http_config: HttpClientConfig,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            threshold,
            http: EnhancedHttpClient::with_config(http_config)?,
            pipeline: pipeline(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let kind = ProviderKind::FlameComics;
        Self::new(
            &config.base_url_for(kind, DEFAULT_BASE_URL),
            config.threshold_for(kind, Some(DEFAULT_THRESHOLD)),
            config.http.client_config(),
        )
    }
}

/// The reader payload is authoritative; the standard chain only runs when it
/// is missing.
fn pipeline() -> ExtractionPipeline {
    ExtractionPipeline::standard(PipelineOptions {
        cdn_pattern: Some(CDN_RE.clone()),
        image_selector: None,
    })
    .prepend(ExtractionStrategy::new("next_data", next_data_image_urls))
}

#[async_trait::async_trait]
impl MangaProvider for FlameComics {
    fn id(&self) -> &str {
        ProviderKind::FlameComics.id()
    }

    fn name(&self) -> &str {
        "Flame Comics"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn match_threshold(&self) -> f64 {
        self.threshold
    }

    /// The site has no search endpoint; the whole `/browse` index is
    /// filtered and paged here.
    async fn search(
        &self,
        title: &str,
        page: Option<u32>,
        log: &RequestLog,
    ) -> Result<SearchResults, FetchError> {
        let url = format!("{}/browse", self.base_url);
        let html = self.http.get_text(&url).await?;
        let data = extract_next_data(&html).ok_or_else(|| {
            FetchError::parse(&url, "Could not find __NEXT_DATA__ in HTML")
        })?;
        let series = browse_series(&data);
        log.debug(format!("FlameComics: browse index holds {} series", series.len()));
        Ok(filter_browse(series, title, page.unwrap_or(1)))
    }

    async fn get_manga_info(&self, id: &str, log: &RequestLog) -> Result<MangaDetails, FetchError> {
        let url = resolve_reference(&self.base_url, "series", id)?;
        let html = self.http.get_text(&url).await?;
        let data = extract_next_data(&html).ok_or_else(|| {
            FetchError::parse(&url, "Could not find __NEXT_DATA__ in HTML")
        })?;
        let details = parse_details(&data, &self.base_url)
            .ok_or_else(|| FetchError::parse(&url, "series payload missing"))?;
        log.debug(format!("FlameComics: Found {} chapters in pageProps", details.chapters.len()));
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
            "FlameComics: {} pages via {:?}",
            extraction.pages.len(),
            extraction.strategy
        ));
        Ok(extraction.pages)
    }
}

/// Extract __NEXT_DATA__ JSON from Next.js HTML
fn extract_next_data(html: &str) -> Option<PageProps> {
    let json = NEXT_DATA_RE.captures(html)?.get(1)?.as_str();
    match serde_json::from_str::<NextData>(json) {
        Ok(data) => Some(data.props.page_props),
        Err(e) => {
            log::debug!("FlameComics: __NEXT_DATA__ did not decode: {}", e);
            None
        }
    }
}

fn browse_series(props: &PageProps) -> Vec<SeriesData> {
    props
        .series
        .as_ref()
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|s| serde_json::from_value::<SeriesData>(s.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn filter_browse(series: Vec<SeriesData>, query: &str, page: u32) -> SearchResults {
    let needle = query.trim().to_lowercase();
    let matching: Vec<ListingCandidate> = series
        .into_iter()
        .filter(|s| {
            let names = std::iter::once(s.title.clone()).chain(alt_titles(s));
            names.into_iter().any(|name| {
                let lower = name.to_lowercase();
                lower.contains(&needle) || similarity(&lower, &needle) >= BROWSE_MIN_SIMILARITY
            })
        })
        .map(|s| candidate_from(&s))
        .collect();

    let page = page.max(1);
    let start = (page as usize - 1) * PAGE_SIZE;
    let has_next_page = matching.len() > start + PAGE_SIZE;
    SearchResults {
        results: matching.into_iter().skip(start).take(PAGE_SIZE).collect(),
        pagination: Some(Pagination {
            current_page: page,
            has_next_page,
        }),
    }
}

fn candidate_from(series: &SeriesData) -> ListingCandidate {
    let id = value_to_string(&series.series_id);
    let mut candidate = ListingCandidate::new(id.clone(), series.title.trim());
    candidate.alternate_titles = alt_titles(series);
    candidate.image = series.cover.as_deref().map(|c| cover_url(&id, c));
    candidate.genres = series.tags.as_ref().map(string_list);
    candidate.authors = series.author.as_ref().map(string_list);
    candidate
}

fn parse_details(props: &PageProps, base_url: &str) -> Option<MangaDetails> {
    let series: SeriesData = serde_json::from_value(props.series.clone()?).ok()?;
    let series_id = value_to_string(&series.series_id);

    let chapter_list: Vec<ChapterRecord> = props
        .chapters
        .iter()
        .flatten()
        .filter_map(|ch| {
            let token = ch.token.as_deref()?;
            let number = ch.chapter.as_ref().map(value_to_string).map(|n| trim_number(&n))?;
            let id = format!("{}/{}", series_id, token);
            Some(ChapterRecord {
                url: format!("{}/series/{}", base_url, id),
                id,
                title: ch
                    .title
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| format!("Chapter {}", number)),
                number,
                date: ch
                    .release_date
                    .and_then(date_from_timestamp)
                    .unwrap_or_else(|| "Unknown".to_string()),
                generated: None,
            })
        })
        .collect();

    Some(MangaDetails {
        id: series_id.clone(),
        title: series.title.trim().to_string(),
        alternate_titles: alt_titles(&series),
        description: series.description.clone(),
        image: series.cover.as_deref().map(|c| cover_url(&series_id, c)),
        genres: series.tags.as_ref().map(string_list).unwrap_or_default(),
        authors: series.author.as_ref().map(string_list).unwrap_or_default(),
        status: series.status.clone(),
        chapters: crate::chapters::finalize(chapter_list),
    })
}

/// `next_data` strategy: `pageProps.chapter.images` is a map of page index
/// to file name living under the chapter's CDN folder.
pub fn next_data_image_urls(doc: &PageDocument) -> Vec<String> {
    let Some(props) = extract_next_data(doc.raw()) else {
        return Vec::new();
    };
    let Some(chapter) = props.chapter else {
        return Vec::new();
    };
    let (Some(series_id), Some(token)) = (chapter.series_id.as_ref(), chapter.token.as_deref())
    else {
        return Vec::new();
    };
    let folder = format!("{}/{}/{}", CDN_BASE, value_to_string(series_id), token);

    let mut entries: Vec<(u32, String)> = match chapter.images {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| Some((k.parse().ok()?, image_name(v)?)))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((i as u32, image_name(v)?)))
            .collect(),
        _ => Vec::new(),
    };
    entries.sort_by_key(|(k, _)| *k);
    entries
        .into_iter()
        .map(|(_, name)| format!("{}/{}", folder, name))
        .collect()
}

fn image_name(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(m) => m.get("name").and_then(|n| n.as_str()).map(str::to_string),
        _ => None,
    }
}

fn cover_url(series_id: &str, cover: &str) -> String {
    if cover.starts_with("http") {
        cover.to_string()
    } else {
        format!("{}/{}/{}", CDN_BASE, series_id, cover)
    }
}

/// `altTitles` arrives either as an array or as a JSON-encoded string.
fn alt_titles(series: &SeriesData) -> Vec<String> {
    match &series.alt_titles {
        Some(Value::String(s)) => serde_json::from_str::<Vec<String>>(s)
            .unwrap_or_else(|_| vec![s.clone()]),
        Some(v) => string_list(v),
        None => Vec::new(),
    }
    .into_iter()
    .map(|t| t.trim().to_string())
    .filter(|t| !t.is_empty())
    .collect()
}

fn string_list(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|i| i.as_str().map(|s| s.trim().to_string()))
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
