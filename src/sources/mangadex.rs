use super::MangaProvider;
use crate::config::Config;
use crate::error::FetchError;
use crate::helpers::trim_number;
use crate::http_client::{EnhancedHttpClient, HttpClientConfig};
use crate::logging::RequestLog;
use crate::models::{
    ChapterRecord, ListingCandidate, MangaDetails, PageRecord, Pagination, ProviderKind,
    SearchResults,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://api.mangadex.org";
pub const DEFAULT_THRESHOLD: f64 = 0.5;
const SITE_URL: &str = "https://mangadex.org";
const COVER_URL: &str = "https://uploads.mangadex.org/covers";
const SEARCH_LIMIT: u32 = 20;
const FEED_LIMIT: u32 = 500;
/// Upper bound on feed pages fetched for one title
const MAX_FEED_PAGES: u32 = 10;

/// Language code to text. Sorted by code so iteration order never depends on
/// the response.
type Localized = BTreeMap<String, String>;

#[derive(Deserialize)]
struct Collection<T> {
    data: Vec<T>,
    #[serde(default)]
    total: u32,
    #[serde(default)]
    offset: u32,
}

#[derive(Deserialize)]
struct Entity<T> {
    data: T,
}

#[derive(Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    rel_type: String,
    attributes: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: Localized,
    #[serde(default)]
    alt_titles: Vec<Localized>,
    #[serde(default)]
    description: Localized,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    attributes: TagAttributes,
}

#[derive(Deserialize)]
struct TagAttributes {
    name: Localized,
}

#[derive(Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    chapter: Option<String>,
    title: Option<String>,
    publish_at: Option<String>,
    #[serde(default)]
    external_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHome {
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Deserialize)]
struct AtHomeChapter {
    hash: String,
    data: Vec<String>,
}

/// MangaDex JSON API. Does not scrape, so there is no extraction pipeline.
pub struct MangaDex {
    base_url: String,
    threshold: f64,
    http: EnhancedHttpClient,
}

impl MangaDex {
    pub fn new(
        base_url: &str,
        threshold: f64,
        http_config: HttpClientConfig,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            threshold,
            http: EnhancedHttpClient::with_config(http_config)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let kind = ProviderKind::MangaDex;
        Self::new(
            &config.base_url_for(kind, DEFAULT_BASE_URL),
            config.threshold_for(kind, Some(DEFAULT_THRESHOLD)),
            config.http.client_config(),
        )
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let text = self.http.get_text(url).await?;
        decode(url, &text)
    }
}

fn decode<T: DeserializeOwned>(url: &str, text: &str) -> Result<T, FetchError> {
    serde_json::from_str(text).map_err(|e| FetchError::parse(url, e.to_string()))
}

#[async_trait::async_trait]
impl MangaProvider for MangaDex {
    fn id(&self) -> &str {
        ProviderKind::MangaDex.id()
    }

    fn name(&self) -> &str {
        "MangaDex"
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
            "{}/manga?title={}&limit={}&offset={}&includes[]=cover_art&includes[]=author",
            self.base_url,
            urlencoding::encode(title.trim()),
            SEARCH_LIMIT,
            (page - 1) * SEARCH_LIMIT
        );
        log.debug(format!("MangaDex: searching {}", url));
        let list: Collection<MangaData> = self.get(&url).await?;
        let has_next_page = list.offset + (list.data.len() as u32) < list.total;
        Ok(SearchResults {
            results: list.data.into_iter().map(candidate_from).collect(),
            pagination: Some(Pagination {
                current_page: page,
                has_next_page,
            }),
        })
    }

    async fn get_manga_info(&self, id: &str, log: &RequestLog) -> Result<MangaDetails, FetchError> {
        let id = mangadex_id(id)?;
        let url = format!(
            "{}/manga/{}?includes[]=cover_art&includes[]=author",
            self.base_url, id
        );
        let manga: Entity<MangaData> = self.get(&url).await?;

        let mut chapter_data = Vec::new();
        for feed_page in 0..MAX_FEED_PAGES {
            let feed_url = format!(
                "{}/manga/{}/feed?translatedLanguage[]=en&order[chapter]=desc&limit={}&offset={}",
                self.base_url,
                id,
                FEED_LIMIT,
                feed_page * FEED_LIMIT
            );
            let feed: Collection<ChapterData> = self.get(&feed_url).await?;
            let fetched = feed.data.len() as u32;
            chapter_data.extend(feed.data);
            if fetched == 0 || feed.offset + fetched >= feed.total {
                break;
            }
        }
        log.debug(format!("MangaDex: feed returned {} chapters for {}", chapter_data.len(), id));

        let mut details = details_from(manga.data);
        details.chapters = crate::chapters::finalize(
            chapter_data.into_iter().filter_map(chapter_from).collect(),
        );
        Ok(details)
    }

    async fn fetch_chapter_pages(
        &self,
        chapter_ref: &str,
        log: &RequestLog,
    ) -> Result<Vec<PageRecord>, FetchError> {
        let chapter_id = mangadex_id(chapter_ref)?;
        let url = format!("{}/at-home/server/{}", self.base_url, chapter_id);
        let at_home: AtHome = self.get(&url).await?;
        let pages = at_home_pages(at_home);
        log.debug(format!("MangaDex: {} pages for chapter {}", pages.len(), chapter_id));
        Ok(pages)
    }
}

/// Pull the UUID out of a bare id or a site/API URL. Title URLs carry a slug
/// after the id (`/title/<uuid>/<slug>`), so the last UUID-shaped segment wins
/// rather than the last segment.
fn mangadex_id(reference: &str) -> Result<&str, FetchError> {
    reference
        .trim()
        .split(['/', '?', '#'])
        .filter(|s| Uuid::parse_str(s).is_ok())
        .last()
        .ok_or_else(|| FetchError::InvalidReference(reference.to_string()))
}

fn localized(map: &Localized) -> Option<String> {
    map.get("en")
        .or_else(|| map.get("ja-ro"))
        .or_else(|| map.values().next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn alt_titles(attributes: &MangaAttributes, primary: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let all = attributes
        .title
        .values()
        .chain(attributes.alt_titles.iter().flat_map(|m| m.values()));
    for t in all {
        let t = t.trim();
        if !t.is_empty() && t != primary && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

fn cover_url(manga: &MangaData) -> Option<String> {
    manga
        .relationships
        .iter()
        .find(|r| r.rel_type == "cover_art")
        .and_then(|r| r.attributes.as_ref())
        .and_then(|attrs| attrs.get("fileName"))
        .and_then(|f| f.as_str())
        .map(|file| format!("{}/{}/{}", COVER_URL, manga.id, file))
}

fn authors(manga: &MangaData) -> Vec<String> {
    manga
        .relationships
        .iter()
        .filter(|r| r.rel_type == "author" || r.rel_type == "artist")
        .filter_map(|r| r.attributes.as_ref()?.get("name")?.as_str().map(str::to_string))
        .fold(Vec::new(), |mut acc, name| {
            if !acc.contains(&name) {
                acc.push(name);
            }
            acc
        })
}

fn tags(attributes: &MangaAttributes) -> Vec<String> {
    attributes
        .tags
        .iter()
        .filter_map(|t| t.attributes.name.get("en").cloned())
        .collect()
}

fn candidate_from(manga: MangaData) -> ListingCandidate {
    let title = localized(&manga.attributes.title).unwrap_or_default();
    let mut candidate = ListingCandidate::new(manga.id.clone(), title.clone());
    candidate.alternate_titles = alt_titles(&manga.attributes, &title);
    candidate.image = cover_url(&manga);
    candidate.genres = Some(tags(&manga.attributes));
    candidate.authors = Some(authors(&manga));
    candidate
}

fn details_from(manga: MangaData) -> MangaDetails {
    let title = localized(&manga.attributes.title).unwrap_or_default();
    MangaDetails {
        id: manga.id.clone(),
        alternate_titles: alt_titles(&manga.attributes, &title),
        title,
        description: localized(&manga.attributes.description),
        image: cover_url(&manga),
        genres: tags(&manga.attributes),
        authors: authors(&manga),
        status: manga.attributes.status.clone(),
        chapters: Vec::new(),
    }
}

/// Externally hosted chapters have no pages on MangaDex and are dropped.
fn chapter_from(chapter: ChapterData) -> Option<ChapterRecord> {
    if chapter.attributes.external_url.is_some() {
        return None;
    }
    let number = chapter
        .attributes
        .chapter
        .as_deref()
        .map(trim_number)
        .unwrap_or_else(|| "0".to_string());
    let title = chapter
        .attributes
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("Chapter {}", number));
    Some(ChapterRecord {
        url: format!("{}/chapter/{}", SITE_URL, chapter.id),
        id: chapter.id,
        title,
        number,
        date: chapter
            .attributes
            .publish_at
            .as_deref()
            .and_then(|d| d.get(..10))
            .unwrap_or("Unknown")
            .to_string(),
        generated: None,
    })
}

fn at_home_pages(at_home: AtHome) -> Vec<PageRecord> {
    at_home
        .chapter
        .data
        .iter()
        .enumerate()
        .map(|(i, file)| PageRecord {
            url: format!("{}/data/{}/{}", at_home.base_url, at_home.chapter.hash, file),
            index: i as u32 + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_payload() {
        let json = r#"{"result":"ok","data":[{"id":"a1","type":"manga",
            "attributes":{"title":{"en":"Kaguya-sama: Love is War"},
                "altTitles":[{"ja-ro":"Kaguya-sama wa Kokurasetai"},{"en":"Kaguya-sama: Love is War"}],
                "description":{"en":"..."},"status":"completed",
                "tags":[{"attributes":{"name":{"en":"Romance"}}}]},
            "relationships":[{"type":"cover_art","attributes":{"fileName":"c.jpg"}},
                {"type":"author","attributes":{"name":"Aka Akasaka"}},
                {"type":"artist","attributes":{"name":"Aka Akasaka"}}]}],
            "limit":20,"offset":0,"total":1}"#;
        let list: Collection<MangaData> = decode("test", json).unwrap();
        let candidate = candidate_from(list.data.into_iter().next().unwrap());
        assert_eq!(candidate.title, "Kaguya-sama: Love is War");
        assert_eq!(candidate.alternate_titles, vec!["Kaguya-sama wa Kokurasetai"]);
        assert_eq!(candidate.image.as_deref(), Some("https://uploads.mangadex.org/covers/a1/c.jpg"));
        assert_eq!(candidate.authors, Some(vec!["Aka Akasaka".to_string()]));
        assert_eq!(candidate.genres, Some(vec!["Romance".to_string()]));
    }

    #[test]
    fn test_feed_chapters() {
        let json = r#"{"data":[
            {"id":"c2","attributes":{"chapter":"2","title":"","publishAt":"2024-02-01T00:00:00+00:00"}},
            {"id":"c1","attributes":{"chapter":"1","title":"Start","publishAt":"2024-01-01T00:00:00+00:00"}},
            {"id":"cx","attributes":{"chapter":"3","title":null,"publishAt":null,"externalUrl":"https://elsewhere"}}
        ],"total":3,"offset":0}"#;
        let feed: Collection<ChapterData> = decode("test", json).unwrap();
        let chapters: Vec<ChapterRecord> = feed.data.into_iter().filter_map(chapter_from).collect();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "Chapter 2");
        assert_eq!(chapters[0].date, "2024-02-01");
        assert_eq!(chapters[1].url, "https://mangadex.org/chapter/c1");
    }

    #[test]
    fn test_at_home_pages() {
        let json = r#"{"result":"ok","baseUrl":"https://uploads.mangadex.org",
            "chapter":{"hash":"h","data":["1.png","2.png"],"dataSaver":[]}}"#;
        let pages = at_home_pages(decode("test", json).unwrap());
        assert_eq!(pages[1].url, "https://uploads.mangadex.org/data/h/2.png");
        assert_eq!(pages[1].index, 2);
    }

    const TITLE_ID: &str = "a96676e5-8ae2-425e-b549-7f15dd34a6d8";

    #[test]
    fn test_mangadex_id() {
        assert_eq!(mangadex_id(TITLE_ID).unwrap(), TITLE_ID);
        assert_eq!(
            mangadex_id(&format!("https://mangadex.org/chapter/{}/", TITLE_ID)).unwrap(),
            TITLE_ID
        );
        assert_eq!(
            mangadex_id(&format!("https://mangadex.org/title/{}/komi-san-wa-komyushou-desu", TITLE_ID))
                .unwrap(),
            TITLE_ID
        );
        assert!(mangadex_id("https://mangadex.org/title/not-an-id").is_err());
        assert!(mangadex_id("  ").is_err());
    }

    #[test]
    fn test_title_choice_is_stable_without_english() {
        let json = r#"{"id":"a2","attributes":{
            "title":{"ko":"나 혼자만 레벨업","ja":"俺だけレベルアップな件"},
            "altTitles":[{"zh":"我独自升级"},{"fr":"Solo Leveling"}]}}"#;
        for _ in 0..5 {
            let manga: MangaData = decode("test", json).unwrap();
            let candidate = candidate_from(manga);
            // "ja" sorts before "ko"
            assert_eq!(candidate.title, "俺だけレベルアップな件");
            assert_eq!(candidate.alternate_titles, vec!["나 혼자만 레벨업", "我独自升级", "Solo Leveling"]);
        }
    }
}
