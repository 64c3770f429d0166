//! Chapter page discovery.
//!
//! A fetched chapter document is run through an ordered list of strategies.
//! The first strategy that yields at least one URL decides the output; later
//! strategies never run and results from different strategies are never
//! blended. Earlier strategies read structured data and are precise, later
//! ones scan more loosely and catch more noise.
//!
//! The standard chain is:
//!
//! 1. `inline_json` - `"url":"...jpg"` tokens anywhere in the body
//! 2. `cdn_pattern` - a site-specific regex over known image hosts
//! 3. `dom_attributes` - `data-src`/`src` of image elements
//! 4. `script_array` - array literals assigned to well-known script variables
//! 5. `raw_scan` - any image-looking URL in the body

use crate::models::PageRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;

static INLINE_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""url"\s*:\s*"([^"]+?\.(?:jpe?g|png|webp|gif|avif)(?:\?[^"]*)?)""#)
        .expect("inline json regex")
});

static SCRIPT_ARRAY_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?:var|let|const)\s+(?:images|imageList|imgs|pages|chapterImages|chapImages|chapter_images|slides)\s*=\s*(\[[\s\S]*?\])\s*;",
        r"(?:window\.)?(?:images|chapterImages|chapImages|pageImages)\s*=\s*(\[[\s\S]*?\])\s*;",
        r#""images"\s*:\s*(\[[\s\S]*?\])"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("script array regex"))
    .collect()
});

static RAW_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s"'<>()\\]+?\.(?:jpe?g|png|webp|gif|avif)\b(?:\?[^\s"'<>()\\]*)?"#)
        .expect("raw image regex")
});

static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([\]}])").expect("trailing comma regex"));

static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("img selector"));

/// Attributes checked on image elements, lazy-loading ones first.
const IMAGE_ATTRIBUTES: &[&str] = &["data-src", "data-lazy-src", "data-original", "data-url", "src"];

/// Field names that may carry the URL when a script array holds objects.
const URL_FIELDS: &[&str] = &["url", "src", "image", "img", "file", "link"];

/// A fetched chapter document, parsed once and shared by all strategies.
pub struct PageDocument {
    url: String,
    raw: String,
    unescaped: String,
    html: Html,
}

impl PageDocument {
    pub fn new(url: &str, raw: &str) -> Self {
        Self {
            url: url.to_string(),
            raw: raw.to_string(),
            unescaped: unescape_json_text(raw),
            html: Html::parse_document(raw),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The body exactly as fetched.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The body with JSON string escapes (`\/`, `\"`, `/`) undone, so
    /// URLs embedded in serialized payloads read like plain URLs.
    pub fn unescaped(&self) -> &str {
        &self.unescaped
    }

    pub fn html(&self) -> &Html {
        &self.html
    }
}

type StrategyFn = Box<dyn Fn(&PageDocument) -> Vec<String> + Send + Sync>;

/// One self-contained way of recovering image URLs from a document.
pub struct ExtractionStrategy {
    name: &'static str,
    run: StrategyFn,
}

impl ExtractionStrategy {
    pub fn new<F>(name: &'static str, run: F) -> Self
    where
        F: Fn(&PageDocument) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            name,
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn candidates(&self, doc: &PageDocument) -> Vec<String> {
        (self.run)(doc)
    }
}

impl std::fmt::Debug for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionStrategy").field("name", &self.name).finish()
    }
}

/// Site knowledge plugged into the standard chain.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Regex matching full image URLs on the site's asset hosts.
    pub cdn_pattern: Option<Regex>,
    /// CSS selector for reader images; defaults to every `img`.
    pub image_selector: Option<String>,
}

/// Output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub pages: Vec<PageRecord>,
    /// Name of the strategy that produced `pages`, `None` when nothing matched.
    pub strategy: Option<&'static str>,
}

#[derive(Debug, Default)]
pub struct ExtractionPipeline {
    strategies: Vec<ExtractionStrategy>,
}

impl ExtractionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five-step chain described in the module docs.
    pub fn standard(options: PipelineOptions) -> Self {
        let selector = options
            .image_selector
            .as_deref()
            .and_then(|s| match Selector::parse(s) {
                Ok(sel) => Some(sel),
                Err(e) => {
                    log::warn!("Invalid image selector {:?}, using img: {:?}", s, e);
                    None
                }
            })
            .unwrap_or_else(|| IMG_SELECTOR.clone());

        let mut pipeline = Self::new()
            .push(ExtractionStrategy::new("inline_json", inline_json_urls));
        if let Some(re) = options.cdn_pattern {
            pipeline = pipeline.push(ExtractionStrategy::new("cdn_pattern", move |doc| {
                cdn_urls(doc, &re)
            }));
        }
        pipeline
            .push(ExtractionStrategy::new("dom_attributes", move |doc| {
                dom_image_urls(doc, &selector)
            }))
            .push(ExtractionStrategy::new("script_array", script_array_urls))
            .push(ExtractionStrategy::new("raw_scan", raw_image_urls))
    }

    /// Append a strategy at the lowest priority.
    pub fn push(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Insert a strategy ahead of all others.
    pub fn prepend(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategies.insert(0, strategy);
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name).collect()
    }

    /// Parse `raw` and run the chain.
    pub fn extract(&self, page_url: &str, raw: &str) -> Extraction {
        let doc = PageDocument::new(page_url, raw);
        self.extract_document(&doc)
    }

    pub fn extract_document(&self, doc: &PageDocument) -> Extraction {
        for strategy in &self.strategies {
            let pages = build_pages(strategy.candidates(doc), doc.url());
            if !pages.is_empty() {
                log::debug!(
                    "Strategy {} produced {} pages for {}",
                    strategy.name,
                    pages.len(),
                    doc.url()
                );
                return Extraction {
                    pages,
                    strategy: Some(strategy.name),
                };
            }
        }
        log::debug!("No extraction strategy matched {}", doc.url());
        Extraction {
            pages: Vec::new(),
            strategy: None,
        }
    }
}

/// Turn raw candidates into de-duplicated, 1-based, contiguous page records.
/// Multi-URL values are split into their members, see [`split_url_list`].
pub fn build_pages(candidates: Vec<String>, page_url: &str) -> Vec<PageRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut pages: Vec<PageRecord> = Vec::new();

    for candidate in candidates {
        for piece in split_url_list(&unescape_json_text(&candidate)) {
            let Some(url) = normalize_candidate(&piece, page_url) else {
                continue;
            };
            if seen.insert(url.clone()) {
                pages.push(PageRecord {
                    url,
                    index: pages.len() as u32 + 1,
                });
            }
        }
    }

    pages.sort_by_key(|p| p.index);
    pages
}

/// Split a comma-separated URL list. A comma only separates members when the
/// text after it starts a new URL (`http://`, `https://`, `//` or `/`);
/// otherwise it belongs to the URL (`w_800,q_80`, `?w=1,2`).
pub fn split_url_list(value: &str) -> Vec<String> {
    let mut members: Vec<String> = Vec::new();
    for piece in value.split(',') {
        let head = piece.trim_start();
        let starts_url = head.starts_with("http://")
            || head.starts_with("https://")
            || head.starts_with('/');
        match members.last_mut() {
            Some(last) if !starts_url => {
                last.push(',');
                last.push_str(piece);
            }
            _ => members.push(piece.to_string()),
        }
    }
    members
}

fn normalize_candidate(piece: &str, page_url: &str) -> Option<String> {
    let cleaned = unescape_json_text(piece);
    // srcset-style "url 2x" keeps only the url
    let token = cleaned
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .next()?;
    if token.is_empty()
        || token.starts_with("data:")
        || token.starts_with("javascript:")
        || token.starts_with('#')
    {
        return None;
    }
    if !(token.contains('/') || token.contains('.')) {
        return None;
    }
    Some(crate::helpers::absolute_url(page_url, token))
}

fn unescape_json_text(s: &str) -> String {
    s.replace("\\u002F", "/")
        .replace("\\u002f", "/")
        .replace("\\/", "/")
        .replace("\\\"", "\"")
}

/// Images whose URL marks them as site chrome rather than page content.
pub fn is_denylisted(url: &str) -> bool {
    let lower = url.to_lowercase();
    ["avatar", "icon", "logo", "banner"]
        .iter()
        .any(|d| lower.contains(d))
        || (lower.contains("thumb") && lower.contains("small"))
}

/// Strategy 1.
pub fn inline_json_urls(doc: &PageDocument) -> Vec<String> {
    INLINE_JSON_RE
        .captures_iter(doc.unescaped())
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Strategy 2.
pub fn cdn_urls(doc: &PageDocument, pattern: &Regex) -> Vec<String> {
    pattern
        .find_iter(doc.unescaped())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Strategy 3.
pub fn dom_image_urls(doc: &PageDocument, selector: &Selector) -> Vec<String> {
    doc.html()
        .select(selector)
        .filter_map(|el| {
            IMAGE_ATTRIBUTES
                .iter()
                .filter_map(|a| el.value().attr(a))
                .map(str::trim)
                .find(|v| !v.is_empty() && !v.starts_with("data:"))
                .map(str::to_string)
        })
        .filter(|u| !is_denylisted(u))
        .collect()
}

/// Strategy 4.
pub fn script_array_urls(doc: &PageDocument) -> Vec<String> {
    for re in SCRIPT_ARRAY_RES.iter() {
        let mut urls = Vec::new();
        for cap in re.captures_iter(doc.raw()) {
            if let Some(literal) = cap.get(1) {
                urls.extend(parse_array_literal(literal.as_str()));
            }
        }
        if !urls.is_empty() {
            return urls;
        }
    }
    Vec::new()
}

/// Parse a JS array literal as JSON, retrying once with single quotes and
/// trailing commas normalized.
pub fn parse_array_literal(literal: &str) -> Vec<String> {
    let parsed = serde_json::from_str::<Value>(literal).or_else(|_| {
        let normalized = TRAILING_COMMA_RE
            .replace_all(&literal.replace('\'', "\""), "$1")
            .to_string();
        serde_json::from_str::<Value>(&normalized)
    });

    let Ok(Value::Array(items)) = parsed else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => URL_FIELDS
                .iter()
                .find_map(|f| map.get(*f).and_then(|v| v.as_str()))
                .map(str::to_string),
            _ => None,
        })
        .filter(|s| !s.trim().is_empty())
        .collect()
}

/// Strategy 5.
pub fn raw_image_urls(doc: &PageDocument) -> Vec<String> {
    RAW_IMAGE_RE
        .find_iter(doc.unescaped())
        .map(|m| m.as_str().to_string())
        .filter(|u| !is_denylisted(u))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://example.com/read/1";

    fn doc(body: &str) -> PageDocument {
        PageDocument::new(PAGE, body)
    }

    #[test]
    fn test_inline_json_handles_escaped_payloads() {
        let body = r#"<script>self.__next_f.push([1,"{\"pages\":[{\"order\":1,\"url\":\"https:\/\/cdn.example.com\/a\/01.webp\"}]}"])</script>"#;
        assert_eq!(inline_json_urls(&doc(body)), vec!["https://cdn.example.com/a/01.webp"]);
    }

    #[test]
    fn test_dom_prefers_data_src() {
        let body = r#"<div class="reader">
            <img src="/placeholder.gif" data-src="https://cdn.example.com/p1.jpg">
            <img src="https://cdn.example.com/p2.jpg">
            <img src="https://example.com/logo.png">
        </div>"#;
        let urls = dom_image_urls(&doc(body), &IMG_SELECTOR);
        assert_eq!(urls, vec!["https://cdn.example.com/p1.jpg", "https://cdn.example.com/p2.jpg"]);
    }

    #[test]
    fn test_split_url_list() {
        assert_eq!(
            split_url_list("https://a.test/1.jpg, https://a.test/2.jpg,//b.test/3.jpg,/4.jpg"),
            vec!["https://a.test/1.jpg", " https://a.test/2.jpg", "//b.test/3.jpg", "/4.jpg"]
        );
        assert_eq!(
            split_url_list("https://res.cdn.test/image/upload/w_800,q_80/ch1/01.jpg"),
            vec!["https://res.cdn.test/image/upload/w_800,q_80/ch1/01.jpg"]
        );
        assert_eq!(split_url_list("p.jpg?w=1,2"), vec!["p.jpg?w=1,2"]);
    }

    #[test]
    fn test_script_array_objects_and_single_quotes() {
        let body = r#"<script>var chapterImages = [{'src': 'https://cdn.example.com/1.png'}, {'src': 'https://cdn.example.com/2.png'},];</script>"#;
        assert_eq!(
            script_array_urls(&doc(body)),
            vec!["https://cdn.example.com/1.png", "https://cdn.example.com/2.png"]
        );
    }

    #[test]
    fn test_script_array_ts_reader() {
        let body = r#"<script>ts_reader.run({"post_id":1,"sources":[{"source":"Server 1","images":["https:\/\/cdn.example.com\/01.jpg","https:\/\/cdn.example.com\/02.jpg"]}]});</script>"#;
        assert_eq!(
            script_array_urls(&doc(body)),
            vec!["https://cdn.example.com/01.jpg", "https://cdn.example.com/02.jpg"]
        );
    }

    #[test]
    fn test_raw_scan_skips_denylist() {
        let body = "x https://cdn.example.com/user/avatar.png y https://cdn.example.com/pages/5.jpeg z \
                    https://cdn.example.com/thumb_small.jpg";
        assert_eq!(raw_image_urls(&doc(body)), vec!["https://cdn.example.com/pages/5.jpeg"]);
    }

    #[test]
    fn test_build_pages_splits_and_dedupes() {
        let candidates = vec![
            "https://c.example.com/1.jpg".to_string(),
            "https://c.example.com/1.jpg, https://c.example.com/2.jpg".to_string(),
            "/relative/3.jpg".to_string(),
            "data:image/gif;base64,AAAA".to_string(),
        ];
        let pages = build_pages(candidates, PAGE);
        let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://c.example.com/1.jpg",
                "https://c.example.com/2.jpg",
                "https://example.com/relative/3.jpg"
            ]
        );
        assert_eq!(pages.iter().map(|p| p.index).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_standard_order() {
        let pipeline = ExtractionPipeline::standard(PipelineOptions {
            cdn_pattern: Some(Regex::new(r"https://cdn\.example\.com/\S+?\.jpg").unwrap()),
            image_selector: None,
        });
        assert_eq!(
            pipeline.strategy_names(),
            vec!["inline_json", "cdn_pattern", "dom_attributes", "script_array", "raw_scan"]
        );
        let without_cdn = ExtractionPipeline::standard(PipelineOptions::default());
        assert_eq!(without_cdn.strategy_names().len(), 4);
    }
}
