//! Field-name normalization across heterogeneous raw post schemas.
//!
//! The feed has historically arrived in two shapes: a plain
//! `author`/`content` dump and a scraped `user_id`/`post_text`/`date_posted`
//! dump. Normalizing once here keeps the matcher free of per-schema
//! branching.

use serde_json::{Map, Value};

use crate::{CanonicalPost, PostDetail};

/// Alias precedence per field, first non-empty wins.
const ID_ALIASES: [&str; 1] = ["id"];
const AUTHOR_ALIASES: [&str; 3] = ["author", "user_id", "title"];
const CONTENT_ALIASES: [&str; 2] = ["content", "post_text"];
const TIMESTAMP_ALIASES: [&str; 2] = ["timestamp", "date_posted"];
const URL_ALIASES: [&str; 2] = ["url", "post_url"];
const LIKES_ALIASES: [&str; 2] = ["likes", "num_likes"];
const COMMENTS_ALIASES: [&str; 2] = ["comments", "num_comments"];

/// Maps a raw post record into the canonical shape. Pure and total:
/// missing or non-scalar fields normalize to the empty string, never an
/// error. Callers that require a non-empty `id` (all stores do) skip
/// records where it is absent.
pub fn normalize(raw: &Map<String, Value>) -> CanonicalPost {
    CanonicalPost {
        id: field(raw, &ID_ALIASES),
        author: field(raw, &AUTHOR_ALIASES),
        content: field(raw, &CONTENT_ALIASES),
        timestamp: field(raw, &TIMESTAMP_ALIASES),
    }
}

/// Like [`normalize`], but keeps the detail fields the relational
/// backend stores alongside the canonical shape.
pub fn normalize_detail(raw: &Map<String, Value>) -> PostDetail {
    let post = normalize(raw);
    PostDetail {
        id: post.id,
        author: post.author,
        content: post.content,
        timestamp: post.timestamp,
        url: field(raw, &URL_ALIASES),
        likes: numeric_field(raw, &LIKES_ALIASES),
        comments: numeric_field(raw, &COMMENTS_ALIASES),
    }
}

fn field(raw: &Map<String, Value>, aliases: &[&str]) -> String {
    for key in aliases {
        if let Some(value) = raw.get(*key) {
            let text = scalar_text(value);
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

// Scraped dumps carry numeric ids; everything else scalar is a string.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    }
}

fn numeric_field(raw: &Map<String, Value>, aliases: &[&str]) -> i64 {
    for key in aliases {
        match raw.get(*key) {
            Some(Value::Number(number)) => {
                if let Some(count) = number.as_i64() {
                    return count;
                }
            }
            Some(Value::String(text)) => {
                if let Ok(count) = text.trim().parse() {
                    return count;
                }
            }
            _ => {}
        }
    }
    0
}
