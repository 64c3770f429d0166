use serde::{Deserialize, Serialize};

/// Sites this crate can map catalog entries onto.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    MangaDex,
    FireScans,
    RizzComic,
    AsuraScans,
    FlameComics,
    MangaPill,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::MangaDex,
        ProviderKind::FireScans,
        ProviderKind::RizzComic,
        ProviderKind::AsuraScans,
        ProviderKind::FlameComics,
        ProviderKind::MangaPill,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::MangaDex => "mangadex",
            ProviderKind::FireScans => "firescans",
            ProviderKind::RizzComic => "rizzcomic",
            ProviderKind::AsuraScans => "asurascans",
            ProviderKind::FlameComics => "flamecomics",
            ProviderKind::MangaPill => "mangapill",
        }
    }
}

/// Titles of a catalog entry. `primary` is always populated.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CatalogTitles {
    pub primary: String,
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}

/// Canonical metadata for one catalog entry.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMedia {
    pub id: i64,
    pub titles: CatalogTitles,
    /// Non-primary names in lookup order, de-duplicated case-insensitively.
    pub alternate_names: Vec<String>,
    pub genres: Vec<String>,
    pub description: Option<String>,
    /// Chapter count advertised by the catalog, if the work is finished.
    pub chapters: Option<u32>,
}

/// One search hit on a target site.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingCandidate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub alternate_titles: Vec<String>,
    pub image: Option<String>,
    pub genres: Option<Vec<String>>,
    pub authors: Option<Vec<String>>,
}

impl ListingCandidate {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub has_next_page: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub results: Vec<ListingCandidate>,
    pub pagination: Option<Pagination>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ChapterRecord {
    /// Stable identifier accepted back by `fetch_chapter_pages`.
    pub id: String,
    pub title: String,
    /// Numeric, possibly fractional ("12.5").
    pub number: String,
    pub url: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<bool>,
}

impl ChapterRecord {
    pub fn number_value(&self) -> Option<f64> {
        self.number.trim().parse::<f64>().ok()
    }

    pub fn is_generated(&self) -> bool {
        self.generated.unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub url: String,
    /// 1-based display order.
    pub index: u32,
}

/// Everything `get_manga_info` knows about one listing.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MangaDetails {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub alternate_titles: Vec<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub status: Option<String>,
    pub chapters: Vec<ChapterRecord>,
}

/// Which query string produced the winning similarity score.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum MatchedOn {
    Primary,
    Alternate(String),
}

/// Outcome of the match selector. Diagnostics only.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub candidate: ListingCandidate,
    pub score: f64,
    pub matched_on: MatchedOn,
    /// The candidate-side string (title or one of its alternates) that scored.
    pub candidate_title: String,
    /// True when no candidate cleared the threshold and the first was taken.
    pub fallback: bool,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetSite {
    pub id: String,
    pub title: String,
    pub chapters: Vec<ChapterRecord>,
}

/// Caller-facing result of a listing request.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MappingResult {
    pub origin_id: i64,
    pub origin_title: String,
    pub provider: String,
    pub target_site: TargetSite,
    #[serde(skip)]
    pub matched: Option<MatchResult>,
}

/// Caller-facing result of a page request.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct PagesResponse {
    pub pages: Vec<PageRecord>,
}
