use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// The normalized, engine-internal post representation.
///
/// `author` and `content` are plain strings defaulting to empty, never
/// null, so matching stays total over every historical dump shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPost {
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
    /// ISO-8601 where the source provides it, otherwise opaque.
    #[serde(default)]
    pub timestamp: String,
}

/// A record asserting that a specific post satisfied a specific saved
/// search. Uniquely identified by `(search_id, id)` inside a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: String,
    /// Set once at save time; later dedup passes never overwrite it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_at: Option<DateTime<Utc>>,
}

impl From<CanonicalPost> for Match {
    fn from(post: CanonicalPost) -> Self {
        Self {
            id: post.id,
            author: post.author,
            content: post.content,
            timestamp: post.timestamp,
            matched_at: None,
        }
    }
}

/// Full post detail as kept by the relational backend: everything the
/// canonical shape carries plus the fields a [`Match`]'s denormalized
/// copy drops. Joined back onto matches for the detail views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDetail {
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub comments: i64,
}

impl From<PostDetail> for CanonicalPost {
    fn from(detail: PostDetail) -> Self {
        Self {
            id: detail.id,
            author: detail.author,
            content: detail.content,
            timestamp: detail.timestamp,
        }
    }
}

/// Save semantics for a match set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Merge into the existing set, deduplicated by post id.
    Append,
    /// Discard all prior matches for the search, then store the given set.
    Replace,
}

/// What a saved search matches on. Closed union; anything else coming
/// in from a registry is rejected with [`CoreError::UnsupportedCriteriaKind`]
/// at the boundary, so downstream matching never branches on raw strings.
///
/// Values are lowercased and trimmed at construction; an empty set never
/// matches any post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchCriteria {
    User { usernames: BTreeSet<String> },
    Topic { keywords: BTreeSet<String> },
    Job { keywords: BTreeSet<String> },
}

impl SearchCriteria {
    pub fn user<I, S>(usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::User {
            usernames: fold_terms(usernames),
        }
    }

    pub fn topic<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Topic {
            keywords: fold_terms(keywords),
        }
    }

    pub fn job<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Job {
            keywords: fold_terms(keywords),
        }
    }

    /// Boundary constructor for registries that persist the criteria as
    /// a kind string plus a term list.
    pub fn from_kind<I, S>(kind: &str, terms: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match kind.trim().to_lowercase().as_str() {
            "user" => Ok(Self::user(terms)),
            "topic" => Ok(Self::topic(terms)),
            "job" => Ok(Self::job(terms)),
            other => Err(CoreError::UnsupportedCriteriaKind {
                kind: other.to_string(),
            }),
        }
    }

    /// Variant of [`Self::from_kind`] for stores that keep usernames and
    /// keywords as two comma-joined columns.
    pub fn from_parts(kind: &str, usernames: &str, keywords: &str) -> Result<Self, CoreError> {
        let folded = kind.trim().to_lowercase();
        let terms = if folded == "user" { usernames } else { keywords };
        Self::from_kind(&folded, terms.split(','))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Topic { .. } => "topic",
            Self::Job { .. } => "job",
        }
    }

    /// The user-supplied term set (usernames or keywords).
    pub fn terms(&self) -> &BTreeSet<String> {
        match self {
            Self::User { usernames } => usernames,
            Self::Topic { keywords } | Self::Job { keywords } => keywords,
        }
    }
}

fn fold_terms<I, S>(terms: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .map(|term| term.as_ref().trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}

/// A persisted criteria definition a user wants matched against
/// incoming posts. Owned by the registry, consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: String,
    pub name: String,
    pub criteria: SearchCriteria,
    #[serde(default)]
    pub notify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_values_are_folded_and_trimmed() {
        let criteria = SearchCriteria::topic(["  Rust ", "ASYNC", "rust"]);
        let terms: Vec<&str> = criteria.terms().iter().map(String::as_str).collect();
        assert_eq!(terms, vec!["async", "rust"]);
    }

    #[test]
    fn empty_terms_are_dropped() {
        let criteria = SearchCriteria::user(["", "  ", "doe"]);
        assert_eq!(criteria.terms().len(), 1);
    }

    #[test]
    fn from_parts_accepts_known_kinds() {
        let criteria = SearchCriteria::from_parts("user", "jane, john", "").unwrap();
        assert_eq!(criteria.kind(), "user");
        assert!(criteria.terms().contains("jane"));
        assert!(criteria.terms().contains("john"));
    }

    #[test]
    fn from_parts_rejects_unknown_kind() {
        let err = SearchCriteria::from_parts("company", "", "").unwrap_err();
        match err {
            CoreError::UnsupportedCriteriaKind { kind } => assert_eq!(kind, "company"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn match_serializes_with_wire_field_names() {
        let m = Match {
            id: "1".to_string(),
            author: "Jane Doe".to_string(),
            content: "hello".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            matched_at: None,
        };
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["id"], "1");
        assert_eq!(value["author"], "Jane Doe");
        assert!(value.get("matched_at").is_none());
    }
}
