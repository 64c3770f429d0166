//! Helper functions shared by the provider adapters
//!
//! This module provides utility functions used throughout the crate:
//! - Provider name parsing
//! - Title normalization and cleanup
//! - Chapter number extraction
//! - URL resolution against a page URL
//! - Release date normalization
//!
//! # Examples
//!
//! ```
//! use rust_manga_mapper::helpers::{clean_text, extract_number};
//!
//! assert_eq!(clean_text("  One   Piece \n"), "One Piece");
//! assert_eq!(extract_number("Chapter 12.5 - The End").as_deref(), Some("12.5"));
//! ```

use crate::models::ProviderKind;
use chrono::{Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("number regex"));
static CHAPTER_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:chapter|ch\.?|episode|ep\.?)[\s\-_/]*(\d+(?:\.\d+)?)").expect("chapter regex")
});
static ORDINAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)(?:st|nd|rd|th)").expect("ordinal regex"));
static RELATIVE_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+|an?|one)\s+(sec|min|hour|day|week|month|year)[a-z]*\s+ago")
        .expect("relative date regex")
});

/// Parse a provider name or alias into a [`ProviderKind`]
pub fn parse_provider(s: &str) -> Option<ProviderKind> {
    match s.trim().to_lowercase().as_str() {
        "mangadex" | "md" => Some(ProviderKind::MangaDex),
        "firescans" | "fire-scans" => Some(ProviderKind::FireScans),
        "rizzcomic" | "rizz" | "rizzfables" => Some(ProviderKind::RizzComic),
        "asurascans" | "asura" | "asuracomic" => Some(ProviderKind::AsuraScans),
        "flamecomics" | "flame" | "flamescans" => Some(ProviderKind::FlameComics),
        "mangapill" => Some(ProviderKind::MangaPill),
        _ => None,
    }
}

/// Collapse runs of whitespace and trim
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the first number from a string
pub fn extract_number(s: &str) -> Option<String> {
    NUMBER_RE
        .captures(s)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract a chapter number, preferring one that follows a "Chapter"/"Ch." label
pub fn extract_chapter_number(s: &str) -> Option<String> {
    CHAPTER_NUMBER_RE
        .captures(s)
        .and_then(|c| c.get(1))
        .map(|m| trim_number(m.as_str()))
        .or_else(|| extract_number(s).map(|n| trim_number(&n)))
}

/// "287.00" -> "287", "12.50" -> "12.5"
pub fn trim_number(n: &str) -> String {
    if n.contains('.') {
        let t = n.trim_end_matches('0').trim_end_matches('.');
        if t.is_empty() {
            "0".to_string()
        } else {
            t.to_string()
        }
    } else {
        n.to_string()
    }
}

/// Resolve `href` against `base`, accepting absolute, protocol-relative and
/// relative forms
pub fn absolute_url(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Path of `url` relative to `base_url` with surrounding slashes removed.
/// Returns `None` when the URL lives on another host.
pub fn path_after_base(url: &str, base_url: &str) -> Option<String> {
    let base = base_url.trim_end_matches('/');
    let rest = url.strip_prefix(base)?;
    Some(rest.trim_matches('/').to_string())
}

/// Remove badges, ratings and chapter labels that listing cards glue onto titles
pub fn clean_manga_title(title: &str) -> Option<String> {
    static RATING_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\s*\d+\.?\d*\s*$").expect("rating regex"));
    static CHAPTER_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\s*Chapter\s+\d+\.?\d*.*$").expect("chapter suffix regex"));

    let mut cleaned = clean_text(title);
    for prefix in ["MANHWA", "MANHUA", "MANGA"] {
        if cleaned.starts_with(prefix) {
            cleaned = cleaned[prefix.len()..].trim().to_string();
        }
    }
    cleaned = CHAPTER_RE.replace(&cleaned, "").to_string();
    cleaned = RATING_RE.replace(&cleaned, "").to_string();
    cleaned = clean_text(&cleaned);

    if cleaned.len() < 2 || cleaned.chars().all(|c| !c.is_alphanumeric()) {
        return None;
    }
    Some(cleaned)
}

/// Normalize a scraped release date into `YYYY-MM-DD` when it is relative
/// ("3 days ago") or in one of the common long forms. Anything else is
/// returned trimmed but otherwise untouched.
pub fn normalize_release_date(raw: &str) -> String {
    let s = clean_text(raw);
    if s.is_empty() {
        return "Unknown".to_string();
    }

    if let Some(cap) = RELATIVE_DATE_RE.captures(&s) {
        let amount: i64 = match cap[1].to_lowercase().as_str() {
            "a" | "an" | "one" => 1,
            n => n.parse().unwrap_or(0),
        };
        let delta = match cap[2].to_lowercase().as_str() {
            "sec" => Duration::seconds(amount),
            "min" => Duration::minutes(amount),
            "hour" => Duration::hours(amount),
            "day" => Duration::days(amount),
            "week" => Duration::weeks(amount),
            "month" => Duration::days(amount * 30),
            _ => Duration::days(amount * 365),
        };
        return (Utc::now() - delta).format("%Y-%m-%d").to_string();
    }

    // "January 5, 2024" / "January 5th 2024" / "05/01/2024"
    let stripped = ORDINAL_RE.replace_all(&s, "$1").to_string();
    for fmt in ["%B %d, %Y", "%B %d %Y", "%b %d, %Y", "%d/%m/%Y", "%Y-%m-%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(&stripped, fmt) {
            return d.format("%Y-%m-%d").to_string();
        }
    }
    s
}

/// Format a unix timestamp (seconds) as `YYYY-MM-DD`
pub fn date_from_timestamp(secs: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(secs, 0).map(|d| d.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_aliases() {
        assert_eq!(parse_provider("MangaPill"), Some(ProviderKind::MangaPill));
        assert_eq!(parse_provider("asura"), Some(ProviderKind::AsuraScans));
        assert_eq!(parse_provider("fire-scans"), Some(ProviderKind::FireScans));
        assert_eq!(parse_provider("unknown"), None);
    }

    #[test]
    fn test_extract_chapter_number() {
        assert_eq!(extract_chapter_number("Vol. 3 Chapter 21.5").as_deref(), Some("21.5"));
        assert_eq!(extract_chapter_number("chapter-104").as_deref(), Some("104"));
        assert_eq!(extract_chapter_number("287.00").as_deref(), Some("287"));
        assert_eq!(extract_chapter_number("Prologue"), None);
    }

    #[test]
    fn test_absolute_url() {
        let base = "https://mangapill.com/manga/2/one-piece";
        assert_eq!(
            absolute_url(base, "/chapters/2-10001000/one-piece-chapter-1"),
            "https://mangapill.com/chapters/2-10001000/one-piece-chapter-1"
        );
        assert_eq!(absolute_url(base, "//cdn.example.com/a.jpg"), "https://cdn.example.com/a.jpg");
        assert_eq!(absolute_url(base, "https://x.org/a.png"), "https://x.org/a.png");
    }

    #[test]
    fn test_path_after_base() {
        assert_eq!(
            path_after_base("https://firescans.xyz/manga/abc/chapter-1/", "https://firescans.xyz").as_deref(),
            Some("manga/abc/chapter-1")
        );
        assert_eq!(path_after_base("https://other.org/x", "https://firescans.xyz"), None);
    }

    #[test]
    fn test_clean_manga_title() {
        assert_eq!(clean_manga_title("MANHWA Solo Leveling 9.8").as_deref(), Some("Solo Leveling"));
        assert_eq!(
            clean_manga_title("Omniscient Reader Chapter 200").as_deref(),
            Some("Omniscient Reader")
        );
        assert_eq!(clean_manga_title("--"), None);
    }

    #[test]
    fn test_normalize_release_date() {
        assert_eq!(normalize_release_date("January 5, 2024"), "2024-01-05");
        assert_eq!(normalize_release_date("March 3rd 2023"), "2023-03-03");
        assert_eq!(normalize_release_date(""), "Unknown");
        let relative = normalize_release_date("2 days ago");
        assert_eq!(relative.len(), 10);
        assert_eq!(normalize_release_date("sometime"), "sometime");
    }

    #[test]
    fn test_date_from_timestamp() {
        assert_eq!(date_from_timestamp(1_704_067_200).as_deref(), Some("2024-01-01"));
    }
}
