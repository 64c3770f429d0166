//! Chapter list assembly: ordering, de-duplication and gap synthesis.

use crate::models::ChapterRecord;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashSet;

/// When and how missing chapters are synthesized.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GapFillPolicy {
    #[serde(default = "default_true", alias = "fill_gaps")]
    pub enabled: bool,
    /// Synthesis runs only when `extracted < observed_max * min_coverage`.
    #[serde(default = "default_min_coverage")]
    pub min_coverage: f64,
    /// Upper bound on placeholders for one listing. When more numbers are
    /// missing than this, the advertised maximum is treated as bogus and
    /// nothing is synthesized.
    #[serde(default = "default_max_generated")]
    pub max_generated: u32,
}

fn default_true() -> bool {
    true
}
fn default_min_coverage() -> f64 {
    1.0
}
fn default_max_generated() -> u32 {
    500
}

impl Default for GapFillPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_coverage: 1.0,
            max_generated: default_max_generated(),
        }
    }
}

impl GapFillPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Sort by numeric chapter number, highest first. Records without a
/// parseable number keep their relative order at the end.
pub fn sort_descending(chapters: &mut [ChapterRecord]) {
    chapters.sort_by(|a, b| match (a.number_value(), b.number_value()) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Drop later records whose id was already seen.
pub fn dedupe_by_id(chapters: Vec<ChapterRecord>) -> Vec<ChapterRecord> {
    let mut seen = HashSet::new();
    chapters
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect()
}

/// De-duplicate and sort a freshly scraped list.
pub fn finalize(chapters: Vec<ChapterRecord>) -> Vec<ChapterRecord> {
    let mut out = dedupe_by_id(chapters);
    sort_descending(&mut out);
    out
}

/// Synthesize integer chapters missing from `1..=max`, where `max` is the
/// larger of `observed_max` and the highest extracted number.
///
/// Placeholders get `generated = Some(true)`, `date = "Unknown"` and a URL
/// built from the closest extracted chapter whose URL spells out its own
/// number. Numbers with no usable neighbour are left out. The URL is a
/// guess; nothing here checks that it resolves.
pub fn fill_gaps<F>(
    chapters: Vec<ChapterRecord>,
    observed_max: Option<f64>,
    policy: &GapFillPolicy,
    id_from_url: F,
) -> Vec<ChapterRecord>
where
    F: Fn(&str) -> String,
{
    if !policy.enabled {
        return finalize(chapters);
    }

    let extracted_max = chapters
        .iter()
        .filter_map(|c| c.number_value())
        .filter(|n| n.is_finite())
        .fold(0.0_f64, f64::max);
    let observed = observed_max.filter(|m| m.is_finite()).unwrap_or(0.0);
    let max = observed.max(extracted_max).floor();
    if max < 1.0 {
        return finalize(chapters);
    }

    if chapters.len() as f64 >= max * policy.min_coverage {
        return finalize(chapters);
    }

    let present: HashSet<u32> = chapters
        .iter()
        .filter_map(|c| c.number_value())
        .filter(|n| n.fract() == 0.0 && *n >= 1.0 && *n <= max)
        .map(|n| n as u32)
        .collect();

    let missing = max - present.len() as f64;
    if missing > f64::from(policy.max_generated) {
        log::warn!(
            "Not synthesizing {} chapters up to {}, limit is {}",
            missing,
            max,
            policy.max_generated
        );
        return finalize(chapters);
    }
    // Bounded by present.len() + max_generated from here on
    let max = max as u32;

    // Integer-numbered chapters whose URL contains their number.
    let templates: Vec<(u32, &ChapterRecord, usize)> = chapters
        .iter()
        .filter_map(|c| {
            let n = c.number_value()?;
            if n.fract() != 0.0 || n < 0.0 {
                return None;
            }
            let n = n as u32;
            let pos = find_number_token(&c.url, n)?;
            Some((n, c, pos))
        })
        .collect();

    let mut generated = Vec::new();
    for n in 1..=max {
        if present.contains(&n) {
            continue;
        }
        let Some((tn, template, pos)) = templates
            .iter()
            .min_by_key(|(tn, _, _)| tn.abs_diff(n))
        else {
            continue;
        };
        let token_len = tn.to_string().len();
        let url = format!(
            "{}{}{}",
            &template.url[..*pos],
            n,
            &template.url[pos + token_len..]
        );
        generated.push(ChapterRecord {
            id: id_from_url(&url),
            title: format!("Chapter {}", n),
            number: n.to_string(),
            url,
            date: "Unknown".to_string(),
            generated: Some(true),
        });
    }

    if !generated.is_empty() {
        log::debug!("Synthesized {} missing chapters up to {}", generated.len(), max);
    }

    let mut all = chapters;
    all.extend(generated);
    finalize(all)
}

/// Byte offset of the last standalone occurrence of `n` in `url`.
fn find_number_token(url: &str, n: u32) -> Option<usize> {
    let needle = n.to_string();
    let bytes = url.as_bytes();
    url.match_indices(&needle)
        .map(|(i, _)| i)
        .filter(|&i| {
            let before_ok = i == 0 || !bytes[i - 1].is_ascii_digit();
            let end = i + needle.len();
            let after_ok = end == bytes.len() || !bytes[end].is_ascii_digit();
            before_ok && after_ok
        })
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(n: &str, url: &str) -> ChapterRecord {
        ChapterRecord {
            id: url.to_string(),
            title: format!("Chapter {}", n),
            number: n.to_string(),
            url: url.to_string(),
            date: "2024-01-01".to_string(),
            generated: None,
        }
    }

    #[test]
    fn test_sort_descending_handles_fractions_and_junk() {
        let mut list = vec![
            chapter("1", "a"),
            chapter("10.5", "b"),
            chapter("oneshot", "c"),
            chapter("10", "d"),
        ];
        sort_descending(&mut list);
        let order: Vec<&str> = list.iter().map(|c| c.number.as_str()).collect();
        assert_eq!(order, vec!["10.5", "10", "1", "oneshot"]);
    }

    #[test]
    fn test_find_number_token_ignores_partial_digits() {
        let url = "https://site.test/series/solo-2012/chapter-12";
        let pos = find_number_token(url, 12).unwrap();
        assert_eq!(&url[pos..], "12");
        assert_eq!(find_number_token("https://site.test/chapter-120", 12), None);
    }

    #[test]
    fn test_disabled_policy_only_sorts() {
        let list = vec![chapter("1", "u/chapter-1"), chapter("5", "u/chapter-5")];
        let out = fill_gaps(list, Some(5.0), &GapFillPolicy::disabled(), |u| u.to_string());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].number, "5");
    }

    #[test]
    fn test_absurd_maximum_is_ignored() {
        let list = vec![
            chapter("1", "https://site.test/read/chapter-1"),
            chapter("3000000", "https://site.test/read/chapter-3000000"),
        ];
        let out = fill_gaps(list, None, &GapFillPolicy::default(), |u| u.to_string());
        assert_eq!(out.len(), 2);

        let list = vec![chapter("1", "https://site.test/read/chapter-1")];
        let out = fill_gaps(list, Some(f64::INFINITY), &GapFillPolicy::default(), |u| u.to_string());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_limit_is_inclusive() {
        let policy = GapFillPolicy {
            max_generated: 3,
            ..GapFillPolicy::default()
        };
        let list = vec![chapter("1", "https://site.test/read/chapter-1")];
        assert_eq!(fill_gaps(list.clone(), Some(4.0), &policy, |u| u.to_string()).len(), 4);
        assert_eq!(fill_gaps(list, Some(5.0), &policy, |u| u.to_string()).len(), 1);
    }

    #[test]
    fn test_skips_numbers_without_template() {
        let list = vec![chapter("1", "https://site.test/read/abc"), chapter("3", "https://site.test/read/def")];
        let out = fill_gaps(list, None, &GapFillPolicy::default(), |u| u.to_string());
        assert_eq!(out.len(), 2);
    }
}
