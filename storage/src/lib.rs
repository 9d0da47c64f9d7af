//! Match persistence and the saved-search registry.
//!
//! Two interchangeable match-store backends sit behind one contract: a
//! flat-file store (one JSON document per search) and a SQLite store
//! (one row per match). Callers pick a backend at construction time;
//! everything downstream talks to the traits.

pub mod db_store;
pub mod file_store;
pub mod registry;


pub use db_store::DatabaseMatchStore;
pub use file_store::FileMatchStore;
pub use registry::{DbSearchRegistry, FileSearchRegistry};

use async_trait::async_trait;
use chrono::Utc;

use postwatch_core::{CoreError, Match, SaveMode, SavedSearch, SearchCriteria, StorageError};

/// Page size for match listings. The UI only ever offers ten or twenty;
/// anything else clamps to ten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    #[default]
    Ten,
    Twenty,
}

impl PageSize {
    pub fn clamp(per_page: u32) -> Self {
        match per_page {
            20 => Self::Twenty,
            _ => Self::Ten,
        }
    }

    pub fn get(self) -> usize {
        match self {
            Self::Ten => 10,
            Self::Twenty => 20,
        }
    }
}

/// Persists and retrieves the matches belonging to one saved search.
///
/// Each call is a short-lived atomic unit of work: it either fully
/// commits or leaves the prior state intact. No retries are attempted;
/// backend failures surface verbatim as [`StorageError`].
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Stores matches for a search. Replace discards all prior matches
    /// first and reports the input length; Append merges, silently
    /// dropping post ids already present, and reports only the number
    /// actually added. `matched_at` is stamped here when absent and
    /// never overwritten afterwards.
    async fn save_matches(
        &self,
        search_id: &str,
        matches: Vec<Match>,
        mode: SaveMode,
    ) -> Result<usize, StorageError>;

    /// All matches for a search, in store-defined order.
    async fn get_matches(&self, search_id: &str) -> Result<Vec<Match>, StorageError>;

    /// One page of matches plus the total count. An out-of-range page
    /// yields an empty page and the true total, never an error.
    async fn get_matches_paginated(
        &self,
        search_id: &str,
        page: u32,
        per_page: PageSize,
    ) -> Result<(Vec<Match>, u64), StorageError>;

    /// Deletes all matches for a search. Idempotent; returns the number
    /// removed (0 when there were none).
    async fn delete_matches(&self, search_id: &str) -> Result<usize, StorageError>;
}

/// Saved-search definitions: criteria plus the notify flag. The engine
/// only reads these; ownership stays with whichever registry backs the
/// deployment. Criteria are validated into the closed union at this
/// boundary, so an unknown kind fails here with
/// [`CoreError::UnsupportedCriteriaKind`] and nowhere else.
#[async_trait]
pub trait SearchRegistry: Send + Sync {
    async fn add_search(
        &self,
        name: &str,
        criteria: SearchCriteria,
        notify: bool,
    ) -> Result<SavedSearch, CoreError>;

    async fn get_search(&self, search_id: &str) -> Result<Option<SavedSearch>, CoreError>;

    async fn get_all_searches(&self) -> Result<Vec<SavedSearch>, CoreError>;

    /// Updates an existing search in place; false if the id is unknown.
    async fn update_search(&self, search: &SavedSearch) -> Result<bool, CoreError>;

    async fn delete_search(&self, search_id: &str) -> Result<bool, CoreError>;
}

// Fills in matched_at for records the matcher left unstamped. One
// timestamp per save call, not per record.
pub(crate) fn stamp_matched_at(matches: &mut [Match]) {
    let now = Utc::now();
    for m in matches.iter_mut() {
        m.matched_at.get_or_insert(now);
    }
}

/// Derives the page count the presentation layer shows.
pub fn total_pages(total_count: u64, per_page: PageSize) -> u64 {
    let per_page = per_page.get() as u64;
    total_count.div_ceil(per_page)
}
