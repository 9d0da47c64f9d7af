//! Saved-search registries: a JSON-file variant and a SQLite variant.
//!
//! Both persist the loose `{type, usernames|keywords, notify}` shape
//! the system has always used, and both re-validate it into the closed
//! [`SearchCriteria`] union on every read. That makes this module the
//! single place an unknown criteria kind can surface.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

use postwatch_core::{CoreError, SavedSearch, SearchCriteria, StorageError};

use crate::SearchRegistry;

// ---------------------------------------------------------------------------
// JSON-file registry
// ---------------------------------------------------------------------------

/// On-disk criteria shape; `keywords` is always plural.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCriteria {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    usernames: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSearch {
    name: String,
    criteria: StoredCriteria,
    #[serde(default)]
    notify: bool,
}

impl StoredSearch {
    fn from_saved(search: &SavedSearch) -> Self {
        let terms: Vec<String> = search.criteria.terms().iter().cloned().collect();
        let (usernames, keywords) = match &search.criteria {
            SearchCriteria::User { .. } => (terms, Vec::new()),
            SearchCriteria::Topic { .. } | SearchCriteria::Job { .. } => (Vec::new(), terms),
        };
        Self {
            name: search.name.clone(),
            criteria: StoredCriteria {
                kind: search.criteria.kind().to_string(),
                usernames,
                keywords,
            },
            notify: search.notify,
        }
    }

    fn into_saved(self, id: &str) -> Result<SavedSearch, CoreError> {
        let terms = if self.criteria.kind.trim().eq_ignore_ascii_case("user") {
            &self.criteria.usernames
        } else {
            &self.criteria.keywords
        };
        let criteria = SearchCriteria::from_kind(&self.criteria.kind, terms)?;
        Ok(SavedSearch {
            id: id.to_string(),
            name: self.name,
            criteria,
            notify: self.notify,
        })
    }
}

/// JSON-file registry: one object keyed by search id. Ids are uuid v4,
/// assigned on add. The file and its directory are created lazily.
pub struct FileSearchRegistry {
    path: PathBuf,
}

impl FileSearchRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_all(&self) -> Result<BTreeMap<String, StoredSearch>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    // Temp file + rename, same as the match documents: a crash mid-write
    // must never truncate the registry.
    fn store_all(&self, searches: &BTreeMap<String, StoredSearch>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(searches)?;
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl SearchRegistry for FileSearchRegistry {
    async fn add_search(
        &self,
        name: &str,
        criteria: SearchCriteria,
        notify: bool,
    ) -> Result<SavedSearch, CoreError> {
        let search = SavedSearch {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            criteria,
            notify,
        };
        let mut searches = self.load_all().map_err(CoreError::Storage)?;
        searches.insert(search.id.clone(), StoredSearch::from_saved(&search));
        self.store_all(&searches).map_err(CoreError::Storage)?;
        debug!(search_id = %search.id, name, "added search");
        Ok(search)
    }

    async fn get_search(&self, search_id: &str) -> Result<Option<SavedSearch>, CoreError> {
        let mut searches = self.load_all().map_err(CoreError::Storage)?;
        match searches.remove(search_id) {
            Some(stored) => Ok(Some(stored.into_saved(search_id)?)),
            None => Ok(None),
        }
    }

    async fn get_all_searches(&self) -> Result<Vec<SavedSearch>, CoreError> {
        let searches = self.load_all().map_err(CoreError::Storage)?;
        searches
            .into_iter()
            .map(|(id, stored)| stored.into_saved(&id))
            .collect()
    }

    async fn update_search(&self, search: &SavedSearch) -> Result<bool, CoreError> {
        let mut searches = self.load_all().map_err(CoreError::Storage)?;
        if !searches.contains_key(&search.id) {
            return Ok(false);
        }
        searches.insert(search.id.clone(), StoredSearch::from_saved(search));
        self.store_all(&searches).map_err(CoreError::Storage)?;
        Ok(true)
    }

    async fn delete_search(&self, search_id: &str) -> Result<bool, CoreError> {
        let mut searches = self.load_all().map_err(CoreError::Storage)?;
        let removed = searches.remove(search_id).is_some();
        if removed {
            self.store_all(&searches).map_err(CoreError::Storage)?;
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// SQLite registry
// ---------------------------------------------------------------------------

const CREATE_SEARCHES_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS searches (
    id        TEXT PRIMARY KEY,
    name      TEXT NOT NULL,
    kind      TEXT NOT NULL,
    usernames TEXT NOT NULL DEFAULT '',
    keywords  TEXT NOT NULL DEFAULT '',
    notify    INTEGER NOT NULL DEFAULT 0
)";

const INSERT_SEARCH: &str = "\
INSERT INTO searches (id, name, kind, usernames, keywords, notify)
VALUES (?, ?, ?, ?, ?, ?)";

const UPDATE_SEARCH: &str = "\
UPDATE searches SET name = ?, kind = ?, usernames = ?, keywords = ?, notify = ?
WHERE id = ?";

const SELECT_SEARCH: &str = "\
SELECT id, name, kind, usernames, keywords, notify FROM searches WHERE id = ?";

const SELECT_ALL_SEARCHES: &str = "\
SELECT id, name, kind, usernames, keywords, notify FROM searches ORDER BY name ASC";

const DELETE_SEARCH: &str = "DELETE FROM searches WHERE id = ?";

#[derive(sqlx::FromRow)]
struct SearchRow {
    id: String,
    name: String,
    kind: String,
    usernames: String,
    keywords: String,
    notify: bool,
}

impl SearchRow {
    fn into_saved(self) -> Result<SavedSearch, CoreError> {
        let criteria = SearchCriteria::from_parts(&self.kind, &self.usernames, &self.keywords)?;
        Ok(SavedSearch {
            id: self.id,
            name: self.name,
            criteria,
            notify: self.notify,
        })
    }
}

// Column values for one search: (kind, usernames, keywords).
fn criteria_columns(criteria: &SearchCriteria) -> (&'static str, String, String) {
    let joined = criteria
        .terms()
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    match criteria {
        SearchCriteria::User { .. } => (criteria.kind(), joined, String::new()),
        SearchCriteria::Topic { .. } | SearchCriteria::Job { .. } => {
            (criteria.kind(), String::new(), joined)
        }
    }
}

/// SQLite-backed registry sharing the match store's database.
#[derive(Clone)]
pub struct DbSearchRegistry {
    pool: SqlitePool,
}

impl DbSearchRegistry {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|error| StorageError::ConnectionFailed {
                reason: error.to_string(),
            })?;
        let registry = Self::new(pool);
        registry.run_migrations().await?;
        info!(database_url, "connected search registry");
        Ok(registry)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_SEARCHES_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::MigrationFailed {
                migration: "create searches table".to_string(),
            })?;
        Ok(())
    }
}

#[async_trait]
impl SearchRegistry for DbSearchRegistry {
    async fn add_search(
        &self,
        name: &str,
        criteria: SearchCriteria,
        notify: bool,
    ) -> Result<SavedSearch, CoreError> {
        let search = SavedSearch {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            criteria,
            notify,
        };
        let (kind, usernames, keywords) = criteria_columns(&search.criteria);
        sqlx::query(INSERT_SEARCH)
            .bind(&search.id)
            .bind(&search.name)
            .bind(kind)
            .bind(usernames)
            .bind(keywords)
            .bind(search.notify)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sql)?;
        debug!(search_id = %search.id, name, "added search");
        Ok(search)
    }

    async fn get_search(&self, search_id: &str) -> Result<Option<SavedSearch>, CoreError> {
        let row: Option<SearchRow> = sqlx::query_as(SELECT_SEARCH)
            .bind(search_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sql)?;
        row.map(SearchRow::into_saved).transpose()
    }

    async fn get_all_searches(&self) -> Result<Vec<SavedSearch>, CoreError> {
        let rows: Vec<SearchRow> = sqlx::query_as(SELECT_ALL_SEARCHES)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sql)?;
        rows.into_iter().map(SearchRow::into_saved).collect()
    }

    async fn update_search(&self, search: &SavedSearch) -> Result<bool, CoreError> {
        let (kind, usernames, keywords) = criteria_columns(&search.criteria);
        let result = sqlx::query(UPDATE_SEARCH)
            .bind(&search.name)
            .bind(kind)
            .bind(usernames)
            .bind(keywords)
            .bind(search.notify)
            .bind(&search.id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sql)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_search(&self, search_id: &str) -> Result<bool, CoreError> {
        let result = sqlx::query(DELETE_SEARCH)
            .bind(search_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sql)?;
        Ok(result.rows_affected() > 0)
    }
}
