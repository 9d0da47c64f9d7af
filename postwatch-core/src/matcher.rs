//! Criteria matching: decides whether a canonical post satisfies a
//! saved search.
//!
//! Matching is case-insensitive substring containment, not token or
//! word-boundary matching: the keyword `"ai"` matches inside `"said"`.
//! That imprecision has been the documented behavior of every revision
//! of this matcher and is kept deliberately; do not tighten it here.

use std::collections::BTreeSet;

use tracing::debug;

use crate::{CanonicalPost, Match, SearchCriteria};

/// Keywords every job search carries in addition to its explicit set.
pub const JOB_IMPLICIT_KEYWORDS: [&str; 3] = ["hiring", "looking for", "job opportunity"];

/// Result of testing one post against one criteria set. `keywords`
/// holds exactly the keywords that hit (empty for user searches), for
/// diagnostics and notification text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchOutcome {
    pub matched: bool,
    pub keywords: BTreeSet<String>,
}

/// Pure and deterministic: identical inputs always yield identical
/// results. An empty criteria set never matches (total-false, not an
/// error).
pub fn matches(post: &CanonicalPost, criteria: &SearchCriteria) -> MatchOutcome {
    match criteria {
        SearchCriteria::User { usernames } => {
            // Substring, not equality: "doe" matches author "John Doe".
            let author = post.author.to_lowercase();
            let matched = usernames.iter().any(|username| author.contains(username.as_str()));
            MatchOutcome {
                matched,
                keywords: BTreeSet::new(),
            }
        }
        SearchCriteria::Topic { keywords } => keyword_scan(post, keywords, &[]),
        SearchCriteria::Job { keywords } => keyword_scan(post, keywords, &JOB_IMPLICIT_KEYWORDS),
    }
}

fn keyword_scan(
    post: &CanonicalPost,
    explicit: &BTreeSet<String>,
    implicit: &[&str],
) -> MatchOutcome {
    let content = post.content.to_lowercase();
    let mut hits = BTreeSet::new();
    for keyword in explicit
        .iter()
        .map(String::as_str)
        .chain(implicit.iter().copied())
    {
        if content.contains(keyword) {
            hits.insert(keyword.to_string());
        }
    }
    MatchOutcome {
        matched: !hits.is_empty(),
        keywords: hits,
    }
}

/// Applies [`matches`] to each post, producing [`Match`] records.
/// Time-free: `matched_at` stays unset until the store stamps it at
/// save time, so filtering identical inputs is reproducible.
pub fn filter<I>(posts: I, criteria: &SearchCriteria) -> Vec<Match>
where
    I: IntoIterator<Item = CanonicalPost>,
{
    posts
        .into_iter()
        .filter_map(|post| {
            let outcome = matches(&post, criteria);
            if outcome.matched {
                debug!(post_id = %post.id, keywords = ?outcome.keywords, "post matched criteria");
                Some(Match::from(post))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, author: &str, content: &str) -> CanonicalPost {
        CanonicalPost {
            id: id.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            timestamp: String::new(),
        }
    }

    #[test]
    fn user_criteria_matches_author_substring() {
        let criteria = SearchCriteria::user(["doe"]);
        let outcome = matches(&post("1", "John Doe", ""), &criteria);
        assert!(outcome.matched);
        assert!(outcome.keywords.is_empty());
    }

    #[test]
    fn user_criteria_is_case_and_trim_insensitive() {
        let criteria = SearchCriteria::user(["  JANE "]);
        assert!(matches(&post("1", "jane doe", ""), &criteria).matched);
    }

    #[test]
    fn topic_criteria_reports_matched_keywords() {
        let criteria = SearchCriteria::topic(["launch", "funding"]);
        let outcome = matches(
            &post("1", "Jane Doe", "Excited to announce our launch"),
            &criteria,
        );
        assert!(outcome.matched);
        assert_eq!(
            outcome.keywords,
            BTreeSet::from(["launch".to_string()])
        );
    }

    #[test]
    fn job_criteria_includes_implicit_keywords() {
        // Empty explicit set still matches through the implicit one.
        let criteria = SearchCriteria::job(Vec::<&str>::new());
        let outcome = matches(&post("1", "", "We are hiring for this role"), &criteria);
        assert!(outcome.matched);
        assert_eq!(outcome.keywords, BTreeSet::from(["hiring".to_string()]));
    }

    #[test]
    fn empty_criteria_set_never_matches() {
        let criteria = SearchCriteria::topic(Vec::<&str>::new());
        assert!(!matches(&post("1", "anyone", "anything"), &criteria).matched);

        let criteria = SearchCriteria::user(Vec::<&str>::new());
        assert!(!matches(&post("1", "anyone", "anything"), &criteria).matched);
    }

    #[test]
    fn substring_matching_crosses_word_boundaries() {
        // Known, accepted imprecision: "ai" hits inside "said".
        let criteria = SearchCriteria::topic(["ai"]);
        assert!(matches(&post("1", "", "she said hello"), &criteria).matched);
    }

    #[test]
    fn matching_is_deterministic() {
        let criteria = SearchCriteria::job(["rust"]);
        let p = post("1", "", "hiring rust engineers");
        assert_eq!(matches(&p, &criteria), matches(&p, &criteria));
    }

    #[test]
    fn duplicate_keywords_report_once() {
        let criteria = SearchCriteria::topic(["rust", " RUST "]);
        let outcome = matches(&post("1", "", "rust rust rust"), &criteria);
        assert_eq!(outcome.keywords.len(), 1);
    }

    #[test]
    fn filter_produces_unstamped_matches() {
        let posts = vec![
            post("1", "Jane Doe", "Excited to announce our launch"),
            post("2", "John", "nothing relevant"),
        ];
        let criteria = SearchCriteria::topic(["launch"]);
        let matches = filter(posts, &criteria);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "1");
        assert!(matches[0].matched_at.is_none());
    }

    #[test]
    fn empty_author_and_content_never_match() {
        let blank = post("1", "", "");
        assert!(!matches(&blank, &SearchCriteria::user(["doe"])).matched);
        assert!(!matches(&blank, &SearchCriteria::topic(["launch"])).matched);
    }
}
