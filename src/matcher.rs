//! Picks the listing on a target site that best matches a catalog entry.
//!
//! Every candidate is scored against the primary title and every alternate,
//! using both its own title and each of its declared alternate titles, and
//! keeps the best of those comparisons.

use crate::error::{FetchError, MatchError};
use crate::logging::RequestLog;
use crate::models::{ListingCandidate, MatchResult, MatchedOn, SearchResults};
use crate::similarity::similarity;
use crate::sources::MangaProvider;

pub const DEFAULT_THRESHOLD: f64 = 0.4;

/// Best score of one candidate and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub score: f64,
    pub matched_on: MatchedOn,
    pub candidate_title: String,
}

/// Score a single candidate against the query set.
pub fn score_candidate(
    candidate: &ListingCandidate,
    primary_title: &str,
    alternates: &[String],
) -> CandidateScore {
    let candidate_titles = std::iter::once(candidate.title.as_str())
        .chain(candidate.alternate_titles.iter().map(String::as_str));

    let mut best = CandidateScore {
        score: f64::MIN,
        matched_on: MatchedOn::Primary,
        candidate_title: candidate.title.clone(),
    };

    for candidate_title in candidate_titles {
        let queries = std::iter::once((primary_title, None))
            .chain(alternates.iter().map(|a| (a.as_str(), Some(a))));
        for (query, alternate) in queries {
            let score = similarity(query, candidate_title);
            if score > best.score {
                best = CandidateScore {
                    score,
                    matched_on: match alternate {
                        Some(a) => MatchedOn::Alternate(a.clone()),
                        None => MatchedOn::Primary,
                    },
                    candidate_title: candidate_title.to_string(),
                };
            }
        }
    }

    best
}

/// Select the best candidate. Pure and order-stable: ties keep the earliest
/// candidate, and when nothing reaches `threshold` the first candidate is
/// returned with `fallback` set.
pub fn select_best(
    candidates: &[ListingCandidate],
    primary_title: &str,
    alternates: &[String],
    threshold: f64,
) -> Result<MatchResult, MatchError> {
    let first = candidates.first().ok_or(MatchError::NoCandidates)?;

    let mut best: Option<(usize, CandidateScore)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let scored = score_candidate(candidate, primary_title, alternates);
        let better = match &best {
            Some((_, current)) => scored.score > current.score,
            None => true,
        };
        if better {
            best = Some((i, scored));
        }
    }

    let (index, scored) = match best {
        Some(b) => b,
        None => return Err(MatchError::NoCandidates),
    };

    if scored.score < threshold {
        let first_score = score_candidate(first, primary_title, alternates);
        return Ok(MatchResult {
            candidate: first.clone(),
            score: first_score.score,
            matched_on: first_score.matched_on,
            candidate_title: first_score.candidate_title,
            fallback: true,
        });
    }

    Ok(MatchResult {
        candidate: candidates[index].clone(),
        score: scored.score,
        matched_on: scored.matched_on,
        candidate_title: scored.candidate_title,
        fallback: false,
    })
}

/// Result of the search retry chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub results: SearchResults,
    /// The title that produced the results.
    pub query: String,
}

/// Search the primary title, then each alternate in order, stopping at the
/// first query that returns anything.
///
/// A failing primary search is returned as-is. Failures on an alternate are
/// logged and the loop moves on. `Ok(None)` means every query came back
/// empty (or failed).
pub async fn search_with_alternates(
    provider: &dyn MangaProvider,
    primary_title: &str,
    alternates: &[String],
    log: &RequestLog,
) -> Result<Option<SearchOutcome>, FetchError> {
    log.debug(format!("searching primary title \"{}\"", primary_title));
    let results = provider.search(primary_title, None, log).await?;
    if !results.is_empty() {
        return Ok(Some(SearchOutcome {
            results,
            query: primary_title.to_string(),
        }));
    }

    for alternate in alternates {
        if alternate.trim().is_empty() || alternate == primary_title {
            continue;
        }
        log.debug(format!("retrying with alternate title \"{}\"", alternate));
        match provider.search(alternate, None, log).await {
            Ok(results) if !results.is_empty() => {
                log.info(format!(
                    "alternate \"{}\" returned {} results",
                    alternate,
                    results.results.len()
                ));
                return Ok(Some(SearchOutcome {
                    results,
                    query: alternate.clone(),
                }));
            }
            Ok(_) => {}
            Err(e) => log.warn(format!("search for alternate \"{}\" failed: {}", alternate, e)),
        }
    }

    Ok(None)
}
