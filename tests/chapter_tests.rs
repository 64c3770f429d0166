use rust_manga_mapper::chapters::{fill_gaps, finalize, GapFillPolicy};
use rust_manga_mapper::models::ChapterRecord;

fn chapter(n: &str) -> ChapterRecord {
    let url = format!("https://site.test/series/example/chapter-{}", n);
    ChapterRecord {
        id: format!("example/chapter-{}", n),
        title: format!("Chapter {}", n),
        number: n.to_string(),
        url,
        date: "2024-05-01".to_string(),
        generated: None,
    }
}

fn id_from_url(url: &str) -> String {
    url.trim_start_matches("https://site.test/series/").to_string()
}

#[test]
fn test_missing_chapters_are_synthesized() {
    let list = vec![chapter("1"), chapter("2"), chapter("5")];
    let filled = fill_gaps(list, Some(5.0), &GapFillPolicy::default(), id_from_url);

    let numbers: Vec<&str> = filled.iter().map(|c| c.number.as_str()).collect();
    assert_eq!(numbers, vec!["5", "4", "3", "2", "1"]);

    let generated: Vec<&ChapterRecord> = filled.iter().filter(|c| c.is_generated()).collect();
    assert_eq!(generated.len(), 2);
    for c in generated {
        assert_eq!(c.date, "Unknown");
        assert_eq!(c.url, format!("https://site.test/series/example/chapter-{}", c.number));
        assert_eq!(c.id, format!("example/chapter-{}", c.number));
    }
}

#[test]
fn test_complete_list_is_untouched() {
    let list: Vec<ChapterRecord> = ["1", "2", "3", "4", "5"].iter().map(|n| chapter(n)).collect();
    let filled = fill_gaps(list, Some(5.0), &GapFillPolicy::default(), id_from_url);
    assert_eq!(filled.len(), 5);
    assert!(filled.iter().all(|c| !c.is_generated()));
}

#[test]
fn test_observed_latest_extends_the_range() {
    let list = vec![chapter("1"), chapter("2")];
    let filled = fill_gaps(list, Some(4.0), &GapFillPolicy::default(), id_from_url);
    assert_eq!(filled.first().map(|c| c.number.as_str()), Some("4"));
    assert_eq!(filled.len(), 4);
}

#[test]
fn test_disabled_policy_only_normalizes() {
    let list = vec![chapter("1"), chapter("5"), chapter("5")];
    let filled = fill_gaps(list, Some(5.0), &GapFillPolicy::disabled(), id_from_url);
    let numbers: Vec<&str> = filled.iter().map(|c| c.number.as_str()).collect();
    assert_eq!(numbers, vec!["5", "1"]);
}

#[test]
fn test_coverage_threshold() {
    let policy = GapFillPolicy {
        min_coverage: 0.5,
        ..GapFillPolicy::default()
    };
    // 3 of 5 present clears a 50% bar
    let list = vec![chapter("1"), chapter("2"), chapter("5")];
    let filled = fill_gaps(list, None, &policy, id_from_url);
    assert_eq!(filled.len(), 3);
}

#[test]
fn test_fractional_chapters_survive() {
    let list = vec![chapter("1"), chapter("2.5"), chapter("2"), chapter("3")];
    let filled = finalize(list);
    let numbers: Vec<&str> = filled.iter().map(|c| c.number.as_str()).collect();
    assert_eq!(numbers, vec!["3", "2.5", "2", "1"]);
}

#[test]
fn test_huge_chapter_number_does_not_explode() {
    let list = vec![chapter("1"), chapter("3000000")];
    let filled = fill_gaps(list, None, &GapFillPolicy::default(), id_from_url);
    assert_eq!(filled.len(), 2);
    assert!(filled.iter().all(|c| !c.is_generated()));
}

#[test]
fn test_generation_limit_from_config() {
    let config = rust_manga_mapper::Config::from_toml_str("[chapters]\nmax_generated = 2\n").unwrap();
    assert_eq!(config.chapters.max_generated, 2);

    // Three missing (2, 3, 4) is over the limit
    let filled = fill_gaps(vec![chapter("1"), chapter("5")], None, &config.chapters, id_from_url);
    assert_eq!(filled.len(), 2);

    // Two missing (2, 3) fits
    let filled = fill_gaps(vec![chapter("1"), chapter("4")], None, &config.chapters, id_from_url);
    assert_eq!(filled.len(), 4);
}
