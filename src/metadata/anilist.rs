use super::CatalogProvider;
use crate::error::{CatalogError, FetchError};
use crate::http_client::{EnhancedHttpClient, HttpClientConfig};
use crate::models::{CatalogMedia, CatalogTitles};
use serde_json::{json, Value};

pub const API_URL: &str = "https://graphql.anilist.co";

const MEDIA_QUERY: &str = r#"
query ($id: Int) {
    Media(id: $id, type: MANGA) {
        id
        title { romaji english native userPreferred }
        synonyms
        genres
        description(asHtml: false)
        chapters
    }
}
"#;

/// AniList GraphQL client used as the identity catalog
pub struct AniListCatalog {
    api_url: String,
    http: EnhancedHttpClient,
}

impl AniListCatalog {
    pub fn new(api_url: &str, config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api_url: api_url.to_string(),
            http: EnhancedHttpClient::with_config(config)?,
        })
    }
}

#[async_trait::async_trait]
impl CatalogProvider for AniListCatalog {
    async fn get_info(&self, id: i64) -> Result<CatalogMedia, CatalogError> {
        let query = json!({ "query": MEDIA_QUERY, "variables": { "id": id } });
        let (status, body) = self.http.post_json(&self.api_url, &query).await?;

        // AniList answers unknown ids with 404 and an errors array
        if status == 404 {
            return Err(CatalogError::NotFound(id));
        }
        if !(200..300).contains(&status) {
            return Err(CatalogError::Upstream(FetchError::Status {
                url: self.api_url.clone(),
                status,
            }));
        }

        match body.pointer("/data/Media") {
            Some(media) if !media.is_null() => parse_media(id, media).ok_or_else(|| {
                CatalogError::Upstream(FetchError::parse(&self.api_url, "Media without a usable title"))
            }),
            _ => Err(CatalogError::NotFound(id)),
        }
    }
}

/// Build a [`CatalogMedia`] from an AniList `Media` object.
///
/// The primary title is the English title when present, then romaji, then
/// native. Alternates keep AniList's order (romaji, english, native,
/// synonyms) minus the primary and minus case-insensitive duplicates.
pub fn parse_media(id: i64, media: &Value) -> Option<CatalogMedia> {
    let title_field = |key: &str| {
        media
            .pointer(&format!("/title/{}", key))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let romaji = title_field("romaji");
    let english = title_field("english");
    let native = title_field("native");

    let primary = english
        .clone()
        .or_else(|| romaji.clone())
        .or_else(|| native.clone())?;

    let synonyms = media
        .get("synonyms")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str().map(|s| s.trim().to_string()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut alternate_names: Vec<String> = Vec::new();
    let candidates = [romaji.clone(), english.clone(), native.clone()]
        .into_iter()
        .flatten()
        .chain(synonyms);
    for name in candidates {
        if name.is_empty() || name.to_lowercase() == primary.to_lowercase() {
            continue;
        }
        if alternate_names.iter().any(|a| a.to_lowercase() == name.to_lowercase()) {
            continue;
        }
        alternate_names.push(name);
    }

    let genres = media
        .get("genres")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|g| g.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Some(CatalogMedia {
        id: media.get("id").and_then(|v| v.as_i64()).unwrap_or(id),
        titles: CatalogTitles {
            primary,
            romaji,
            english,
            native,
        },
        alternate_names,
        genres,
        description: media
            .get("description")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        chapters: media
            .get("chapters")
            .and_then(|v| v.as_u64())
            .map(|n| n as u32),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_titles_and_alternates() {
        let media = json!({
            "id": 30013,
            "title": {
                "romaji": "ONE PIECE",
                "english": "One Piece",
                "native": "ONE PIECE"
            },
            "synonyms": ["Wan Pīsu", "One Piece", "원피스"],
            "genres": ["Action", "Adventure"],
            "description": "Gol D. Roger...",
            "chapters": null
        });
        let parsed = parse_media(30013, &media).unwrap();
        assert_eq!(parsed.titles.primary, "One Piece");
        assert_eq!(parsed.alternate_names, vec!["Wan Pīsu", "원피스"]);
        assert_eq!(parsed.genres.len(), 2);
        assert_eq!(parsed.chapters, None);
    }

    #[test]
    fn test_parse_media_falls_back_to_romaji() {
        let media = json!({
            "id": 1,
            "title": { "romaji": "Shingeki no Kyojin", "english": null, "native": "進撃の巨人" },
            "synonyms": [],
            "genres": [],
            "chapters": 141
        });
        let parsed = parse_media(1, &media).unwrap();
        assert_eq!(parsed.titles.primary, "Shingeki no Kyojin");
        assert_eq!(parsed.alternate_names, vec!["進撃の巨人"]);
        assert_eq!(parsed.chapters, Some(141));
    }

    #[test]
    fn test_parse_media_without_titles() {
        let media = json!({ "id": 1, "title": {} });
        assert!(parse_media(1, &media).is_none());
    }
}
