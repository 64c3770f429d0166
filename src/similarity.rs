//! Normalized edit-distance similarity used to line up catalog titles with
//! site listings.

/// Levenshtein distance with unit costs, computed over chars with a single
/// reused row of `b.len() + 1` cells.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        // row[0] holds the previous row's value for column 0
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = if ca == cb { 0 } else { 1 };
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[b.len()]
}

/// `(maxLen - editDistance) / maxLen` over lowercased inputs.
///
/// Two empty strings are identical (1.0); one empty string against a
/// non-empty one scores 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    let distance = edit_distance(&a, &b);
    (max_len - distance) as f64 / max_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance_basics() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(edit_distance("same", "same"), 0);
        assert_eq!(edit_distance("flaw", "lawn"), 2);
    }

    #[test]
    fn test_edit_distance_multibyte() {
        assert_eq!(edit_distance("呪術廻戦", "呪術回戦"), 1);
    }

    #[test]
    fn test_similarity_degenerate_cases() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("One Piece", ""), 0.0);
        assert_eq!(similarity("", "One Piece"), 0.0);
    }

    #[test]
    fn test_similarity_is_case_insensitive() {
        assert_eq!(similarity("SOLO LEVELING", "solo leveling"), 1.0);
    }

    #[test]
    fn test_similarity_close_titles() {
        let score = similarity("Example Manga", "Example Mango");
        assert!((score - 12.0 / 13.0).abs() < 1e-9);
        assert!(score > 0.9 && score < 1.0);
    }
}
