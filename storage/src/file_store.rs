//! Flat-file match store: one JSON document per search id.
//!
//! Writes go through a temp file followed by a rename, so readers only
//! ever observe a complete document. Read-modify-write is not safe
//! under concurrent writers to the same search id; the deployment
//! assumes at most one writer per search at a time, and callers needing
//! more must serialize access externally.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use postwatch_core::{Match, SaveMode, StorageError};

use crate::{stamp_matched_at, MatchStore, PageSize};

pub struct FileMatchStore {
    dir: PathBuf,
}

impl FileMatchStore {
    /// `dir` holds one `<search_id>.json` document per search; created
    /// on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn document_path(&self, search_id: &str) -> PathBuf {
        self.dir.join(format!("{search_id}.json"))
    }

    fn read_document(&self, search_id: &str) -> Result<Vec<Match>, StorageError> {
        let path = self.document_path(search_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|error| StorageError::CorruptDocument {
            search_id: search_id.to_string(),
            details: error.to_string(),
        })
    }

    fn write_document(&self, search_id: &str, matches: &[Match]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.document_path(search_id);
        let tmp = self.dir.join(format!(".{search_id}.json.tmp"));
        let text = serde_json::to_string_pretty(matches)?;
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[async_trait]
impl MatchStore for FileMatchStore {
    async fn save_matches(
        &self,
        search_id: &str,
        mut matches: Vec<Match>,
        mode: SaveMode,
    ) -> Result<usize, StorageError> {
        match mode {
            SaveMode::Replace => {
                stamp_matched_at(&mut matches);
                let count = matches.len();
                self.write_document(search_id, &matches)?;
                debug!(search_id, count, "replaced match document");
                Ok(count)
            }
            SaveMode::Append => {
                let mut existing = self.read_document(search_id)?;
                let mut seen: HashSet<String> =
                    existing.iter().map(|m| m.id.clone()).collect();
                let mut fresh: Vec<Match> = matches
                    .drain(..)
                    .filter(|m| seen.insert(m.id.clone()))
                    .collect();
                stamp_matched_at(&mut fresh);
                let added = fresh.len();
                existing.extend(fresh);
                self.write_document(search_id, &existing)?;
                debug!(search_id, added, total = existing.len(), "appended to match document");
                Ok(added)
            }
        }
    }

    async fn get_matches(&self, search_id: &str) -> Result<Vec<Match>, StorageError> {
        // Insertion order, exactly as appended.
        self.read_document(search_id)
    }

    async fn get_matches_paginated(
        &self,
        search_id: &str,
        page: u32,
        per_page: PageSize,
    ) -> Result<(Vec<Match>, u64), StorageError> {
        let all = self.read_document(search_id)?;
        let total = all.len() as u64;
        let offset = page.saturating_sub(1) as usize * per_page.get();
        let page_of_matches = all
            .into_iter()
            .skip(offset)
            .take(per_page.get())
            .collect();
        Ok((page_of_matches, total))
    }

    async fn delete_matches(&self, search_id: &str) -> Result<usize, StorageError> {
        let path = self.document_path(search_id);
        if !path.exists() {
            return Ok(0);
        }
        // Best-effort count; a corrupt document still gets deleted.
        let count = match self.read_document(search_id) {
            Ok(matches) => matches.len(),
            Err(error) => {
                warn!(search_id, %error, "deleting unreadable match document");
                0
            }
        };
        fs::remove_file(&path)?;
        debug!(search_id, count, "deleted match document");
        Ok(count)
    }
}
