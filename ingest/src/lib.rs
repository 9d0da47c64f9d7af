//! Post ingestion: turns raw dump files into canonical posts.
//!
//! Two source formats are supported. Small dumps are one JSON document,
//! either a top-level array or an object with a `posts` array. Very
//! large dumps use a lenient line-oriented format: one JSON object per
//! line, tolerating a leading `[`, a trailing `]`, and trailing commas,
//! read lazily in a single pass.
//!
//! Ingestion isolates failures per record: a line that does not parse,
//! or a record without an id, is skipped with a warning and counted.
//! One bad record never aborts the batch.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use postwatch_core::{normalize, normalize_detail, CanonicalPost, IngestError, PostDetail};

/// Loads a whole dump document into memory.
pub fn load_document(path: &Path) -> Result<Vec<CanonicalPost>, IngestError> {
    let mut posts = Vec::new();
    let mut skipped = 0usize;
    for record in document_records(path)? {
        match record.as_object() {
            Some(raw) => {
                let post = normalize(raw);
                if post.id.is_empty() {
                    skipped += 1;
                    warn!("skipping post record with no id");
                } else {
                    posts.push(post);
                }
            }
            None => {
                skipped += 1;
                warn!("skipping non-object post record");
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, loaded = posts.len(), "document load finished with skips");
    }
    Ok(posts)
}

/// Whole-document variant that keeps the full post detail (url,
/// engagement counts) the relational backend stores next to matches.
pub fn load_document_detail(path: &Path) -> Result<Vec<PostDetail>, IngestError> {
    let mut posts = Vec::new();
    let mut skipped = 0usize;
    for record in document_records(path)? {
        match record.as_object() {
            Some(raw) => {
                let detail = normalize_detail(raw);
                if detail.id.is_empty() {
                    skipped += 1;
                    warn!("skipping post record with no id");
                } else {
                    posts.push(detail);
                }
            }
            None => {
                skipped += 1;
                warn!("skipping non-object post record");
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, loaded = posts.len(), "document load finished with skips");
    }
    Ok(posts)
}

fn document_records(path: &Path) -> Result<Vec<Value>, IngestError> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let text = text.trim_start_matches('\u{feff}');
    let value: Value = serde_json::from_str(text)?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("posts") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(IngestError::MissingPostArray),
        },
        _ => Err(IngestError::MissingPostArray),
    }
}

/// Lazy reader for the line-oriented dump format. Finite, single-pass;
/// re-open the source to restart.
pub struct PostStream {
    lines: Lines<BufReader<File>>,
    skipped: usize,
    line_no: usize,
}

impl PostStream {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(|source| IngestError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            skipped: 0,
            line_no: 0,
        })
    }

    /// Number of records skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Yields batches of at most `batch_size` posts.
    pub fn batches(self, batch_size: usize) -> Batches<Self> {
        batches(self, batch_size)
    }
}

impl Iterator for PostStream {
    type Item = CanonicalPost;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(error) => {
                    // IO failure mid-stream ends the pass.
                    warn!(line = self.line_no + 1, %error, "read error, ending stream");
                    return None;
                }
            };
            self.line_no += 1;

            let cleaned = clean_line(&line);
            if cleaned.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(cleaned) {
                Ok(Value::Object(raw)) => {
                    let post = normalize(&raw);
                    if post.id.is_empty() {
                        self.skipped += 1;
                        warn!(line = self.line_no, "skipping record with no id");
                        continue;
                    }
                    return Some(post);
                }
                Ok(_) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, "skipping non-object record");
                }
                Err(error) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, %error, "skipping unparseable record");
                }
            }
        }
    }
}

// Tolerates the pseudo-JSON-array framing used by large dumps.
fn clean_line(line: &str) -> &str {
    let mut cleaned = line.trim().trim_start_matches('\u{feff}').trim();
    if let Some(rest) = cleaned.strip_prefix('[') {
        cleaned = rest.trim();
    }
    if let Some(rest) = cleaned.strip_suffix(']') {
        cleaned = rest.trim();
    }
    if let Some(rest) = cleaned.strip_suffix(',') {
        cleaned = rest.trim();
    }
    cleaned
}

/// Groups an iterator of posts into fixed-size batches.
pub struct Batches<I> {
    inner: I,
    batch_size: usize,
}

pub fn batches<I>(posts: I, batch_size: usize) -> Batches<I::IntoIter>
where
    I: IntoIterator<Item = CanonicalPost>,
{
    Batches {
        inner: posts.into_iter(),
        batch_size: batch_size.max(1),
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = CanonicalPost>,
{
    type Item = Vec<CanonicalPost>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.inner.next() {
                Some(post) => batch.push(post),
                None => break,
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write fixture");
        file
    }

    #[test]
    fn loads_top_level_array_document() {
        let file = fixture(r#"[{"id": "1", "author": "jane", "content": "launch day"}]"#);
        let posts = load_document(file.path()).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "1");
        assert_eq!(posts[0].author, "jane");
    }

    #[test]
    fn loads_posts_object_document() {
        let file = fixture(r#"{"posts": [{"id": 5, "user_id": "jdoe", "post_text": "hi"}]}"#);
        let posts = load_document(file.path()).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "5");
        assert_eq!(posts[0].content, "hi");
    }

    #[test]
    fn tolerates_byte_order_mark() {
        let file = fixture("\u{feff}[{\"id\": \"1\", \"content\": \"x\"}]");
        let posts = load_document(file.path()).unwrap();
        assert_eq!(posts.len(), 1);
    }

    #[test]
    fn document_without_post_array_fails() {
        let file = fixture(r#"{"not_posts": true}"#);
        assert!(matches!(
            load_document(file.path()),
            Err(IngestError::MissingPostArray)
        ));
    }

    #[test]
    fn records_without_id_are_skipped_not_fatal() {
        let file = fixture(r#"[{"author": "no id"}, {"id": "2", "content": "kept"}]"#);
        let posts = load_document(file.path()).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "2");
    }

    #[test]
    fn detail_load_keeps_url_and_counts() {
        let file = fixture(
            r#"[{"id": 5, "user_id": "jdoe", "post_text": "hi", "post_url": "https://example.com/p/5", "num_likes": 3, "num_comments": 1}]"#,
        );
        let details = load_document_detail(file.path()).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].url, "https://example.com/p/5");
        assert_eq!(details[0].likes, 3);
        assert_eq!(details[0].comments, 1);
    }

    #[test]
    fn stream_tolerates_array_framing_and_trailing_commas() {
        let file = fixture(concat!(
            "[\n",
            "{\"id\": \"1\", \"content\": \"first\"},\n",
            "{\"id\": \"2\", \"content\": \"second\"},\n",
            "{\"id\": \"3\", \"content\": \"third\"}\n",
            "]\n",
        ));
        let stream = PostStream::open(file.path()).unwrap();
        let posts: Vec<_> = stream.collect();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[2].content, "third");
    }

    #[test]
    fn stream_skips_bad_lines_and_counts_them() {
        let file = fixture(concat!(
            "{\"id\": \"1\", \"content\": \"good\"},\n",
            "{not json at all\n",
            "{\"content\": \"missing id\"},\n",
            "{\"id\": \"2\", \"content\": \"also good\"}\n",
        ));
        let mut stream = PostStream::open(file.path()).unwrap();
        let posts: Vec<_> = stream.by_ref().collect();
        assert_eq!(posts.len(), 2);
        assert_eq!(stream.skipped(), 2);
    }

    #[test]
    fn stream_resolves_field_aliases() {
        let file = fixture("{\"id\": 9, \"user_id\": \"jdoe\", \"post_text\": \"hiring now\", \"date_posted\": \"2024-01-01\"}\n");
        let posts: Vec<_> = PostStream::open(file.path()).unwrap().collect();
        assert_eq!(posts[0].author, "jdoe");
        assert_eq!(posts[0].content, "hiring now");
        assert_eq!(posts[0].timestamp, "2024-01-01");
    }

    #[test]
    fn batches_group_posts_by_size() {
        let file = fixture(concat!(
            "{\"id\": \"1\", \"content\": \"a\"}\n",
            "{\"id\": \"2\", \"content\": \"b\"}\n",
            "{\"id\": \"3\", \"content\": \"c\"}\n",
        ));
        let stream = PostStream::open(file.path()).unwrap();
        let batches: Vec<_> = stream.batches(2).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn empty_file_yields_no_batches() {
        let file = fixture("");
        let stream = PostStream::open(file.path()).unwrap();
        assert_eq!(stream.batches(10).count(), 0);
    }
}
