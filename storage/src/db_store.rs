//! SQLite match store: one row per match, keyed `(search_id, post_id)`.
//!
//! Every save runs inside one transaction, so a crash mid-Replace never
//! leaves a half-applied state. Retrieval is ordered `matched_at DESC`
//! with the post id as a stable tie-break, which keeps OFFSET
//! pagination consistent across calls.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use postwatch_core::{Match, PostDetail, SaveMode, StorageError};

use crate::{MatchStore, PageSize};

const CREATE_MATCHES_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS matches (
    search_id  TEXT NOT NULL,
    post_id    TEXT NOT NULL,
    author     TEXT NOT NULL DEFAULT '',
    content    TEXT NOT NULL DEFAULT '',
    timestamp  TEXT NOT NULL DEFAULT '',
    matched_at TEXT NOT NULL,
    PRIMARY KEY (search_id, post_id)
)";

const CREATE_POSTS_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS posts (
    id        TEXT PRIMARY KEY,
    author    TEXT NOT NULL DEFAULT '',
    content   TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL DEFAULT '',
    url       TEXT NOT NULL DEFAULT '',
    likes     INTEGER NOT NULL DEFAULT 0,
    comments  INTEGER NOT NULL DEFAULT 0
)";

const INSERT_MATCH: &str = "\
INSERT INTO matches (search_id, post_id, author, content, timestamp, matched_at)
VALUES (?, ?, ?, ?, ?, ?)
ON CONFLICT (search_id, post_id) DO NOTHING";

const SELECT_MATCHES: &str = "\
SELECT post_id, author, content, timestamp, matched_at
FROM matches
WHERE search_id = ?
ORDER BY matched_at DESC, post_id ASC";

const SELECT_MATCHES_PAGE: &str = "\
SELECT post_id, author, content, timestamp, matched_at
FROM matches
WHERE search_id = ?
ORDER BY matched_at DESC, post_id ASC
LIMIT ? OFFSET ?";

const COUNT_MATCHES: &str = "SELECT COUNT(*) FROM matches WHERE search_id = ?";

const DELETE_MATCHES: &str = "DELETE FROM matches WHERE search_id = ?";

const UPSERT_POST: &str = "\
INSERT INTO posts (id, author, content, timestamp, url, likes, comments)
VALUES (?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (id) DO UPDATE SET
    author    = excluded.author,
    content   = excluded.content,
    timestamp = excluded.timestamp,
    url       = excluded.url,
    likes     = excluded.likes,
    comments  = excluded.comments";

const SELECT_POSTS_PAGE: &str = "\
SELECT id, author, content, timestamp, url, likes, comments
FROM posts
ORDER BY timestamp DESC, id ASC
LIMIT ? OFFSET ?";

const COUNT_POSTS: &str = "SELECT COUNT(*) FROM posts";

const SELECT_MATCHES_WITH_POSTS_PAGE: &str = "\
SELECT m.post_id, m.author, m.content, m.timestamp, m.matched_at,
       p.id AS detail_id, p.author AS detail_author, p.content AS detail_content,
       p.timestamp AS detail_timestamp, p.url AS detail_url,
       p.likes AS detail_likes, p.comments AS detail_comments
FROM matches m
LEFT JOIN posts p ON p.id = m.post_id
WHERE m.search_id = ?
ORDER BY m.matched_at DESC, m.post_id ASC
LIMIT ? OFFSET ?";

#[derive(sqlx::FromRow)]
struct MatchRow {
    post_id: String,
    author: String,
    content: String,
    timestamp: String,
    matched_at: DateTime<Utc>,
}

impl From<MatchRow> for Match {
    fn from(row: MatchRow) -> Self {
        Self {
            id: row.post_id,
            author: row.author,
            content: row.content,
            timestamp: row.timestamp,
            matched_at: Some(row.matched_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: String,
    author: String,
    content: String,
    timestamp: String,
    url: String,
    likes: i64,
    comments: i64,
}

impl From<PostRow> for PostDetail {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            author: row.author,
            content: row.content,
            timestamp: row.timestamp,
            url: row.url,
            likes: row.likes,
            comments: row.comments,
        }
    }
}

// LEFT JOIN row: the detail columns are null for matches whose post is
// no longer in the posts table.
#[derive(sqlx::FromRow)]
struct JoinedRow {
    post_id: String,
    author: String,
    content: String,
    timestamp: String,
    matched_at: DateTime<Utc>,
    detail_id: Option<String>,
    detail_author: Option<String>,
    detail_content: Option<String>,
    detail_timestamp: Option<String>,
    detail_url: Option<String>,
    detail_likes: Option<i64>,
    detail_comments: Option<i64>,
}

impl JoinedRow {
    fn into_pair(self) -> (Match, Option<PostDetail>) {
        let detail = self.detail_id.map(|id| PostDetail {
            id,
            author: self.detail_author.unwrap_or_default(),
            content: self.detail_content.unwrap_or_default(),
            timestamp: self.detail_timestamp.unwrap_or_default(),
            url: self.detail_url.unwrap_or_default(),
            likes: self.detail_likes.unwrap_or_default(),
            comments: self.detail_comments.unwrap_or_default(),
        });
        let m = Match {
            id: self.post_id,
            author: self.author,
            content: self.content,
            timestamp: self.timestamp,
            matched_at: Some(self.matched_at),
        };
        (m, detail)
    }
}

#[derive(Clone)]
pub struct DatabaseMatchStore {
    pool: SqlitePool,
}

impl DatabaseMatchStore {
    /// Connects, creating the database file and schema when missing.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|error| StorageError::ConnectionFailed {
                reason: error.to_string(),
            })?;
        let store = Self::new(pool);
        store.run_migrations().await?;
        info!(database_url, "connected match store");
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for co-locating the search registry in the
    /// same database.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_MATCHES_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::MigrationFailed {
                migration: "create matches table".to_string(),
            })?;
        sqlx::query(CREATE_POSTS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::MigrationFailed {
                migration: "create posts table".to_string(),
            })?;
        Ok(())
    }

    /// Upserts full post detail, one transaction per call. Matches only
    /// carry a denormalized copy of the canonical fields; this is what
    /// the joined detail views read from.
    pub async fn save_posts(&self, posts: &[PostDetail]) -> Result<usize, StorageError> {
        let mut tx = self.pool.begin().await?;
        for post in posts {
            sqlx::query(UPSERT_POST)
                .bind(&post.id)
                .bind(&post.author)
                .bind(&post.content)
                .bind(&post.timestamp)
                .bind(&post.url)
                .bind(post.likes)
                .bind(post.comments)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(count = posts.len(), "saved post detail");
        Ok(posts.len())
    }

    /// All stored posts, newest first, one page at a time.
    pub async fn get_posts(
        &self,
        page: u32,
        per_page: PageSize,
    ) -> Result<(Vec<PostDetail>, u64), StorageError> {
        let limit = per_page.get() as i64;
        let offset = i64::from(page.saturating_sub(1)) * limit;

        let rows: Vec<PostRow> = sqlx::query_as(SELECT_POSTS_PAGE)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(COUNT_POSTS).fetch_one(&self.pool).await?;

        Ok((rows.into_iter().map(PostDetail::from).collect(), total as u64))
    }

    /// One page of matches joined with the stored post detail. Matches
    /// whose post is absent from the posts table pair with `None`;
    /// ordering and totals are identical to
    /// [`MatchStore::get_matches_paginated`].
    pub async fn get_matches_with_posts(
        &self,
        search_id: &str,
        page: u32,
        per_page: PageSize,
    ) -> Result<(Vec<(Match, Option<PostDetail>)>, u64), StorageError> {
        let limit = per_page.get() as i64;
        let offset = i64::from(page.saturating_sub(1)) * limit;

        let rows: Vec<JoinedRow> = sqlx::query_as(SELECT_MATCHES_WITH_POSTS_PAGE)
            .bind(search_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(COUNT_MATCHES)
            .bind(search_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((rows.into_iter().map(JoinedRow::into_pair).collect(), total as u64))
    }
}

#[async_trait]
impl MatchStore for DatabaseMatchStore {
    async fn save_matches(
        &self,
        search_id: &str,
        matches: Vec<Match>,
        mode: SaveMode,
    ) -> Result<usize, StorageError> {
        let mut tx = self.pool.begin().await?;

        if mode == SaveMode::Replace {
            sqlx::query(DELETE_MATCHES)
                .bind(search_id)
                .execute(&mut *tx)
                .await?;
        }

        let now = Utc::now();
        let mut added = 0usize;
        for m in &matches {
            let matched_at = m.matched_at.unwrap_or(now);
            let result = sqlx::query(INSERT_MATCH)
                .bind(search_id)
                .bind(&m.id)
                .bind(&m.author)
                .bind(&m.content)
                .bind(&m.timestamp)
                .bind(matched_at)
                .execute(&mut *tx)
                .await?;
            added += result.rows_affected() as usize;
        }

        tx.commit().await?;

        let count = match mode {
            SaveMode::Replace => matches.len(),
            SaveMode::Append => added,
        };
        debug!(search_id, count, ?mode, "saved matches");
        Ok(count)
    }

    async fn get_matches(&self, search_id: &str) -> Result<Vec<Match>, StorageError> {
        let rows: Vec<MatchRow> = sqlx::query_as(SELECT_MATCHES)
            .bind(search_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Match::from).collect())
    }

    async fn get_matches_paginated(
        &self,
        search_id: &str,
        page: u32,
        per_page: PageSize,
    ) -> Result<(Vec<Match>, u64), StorageError> {
        let limit = per_page.get() as i64;
        let offset = i64::from(page.saturating_sub(1)) * limit;

        let rows: Vec<MatchRow> = sqlx::query_as(SELECT_MATCHES_PAGE)
            .bind(search_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(COUNT_MATCHES)
            .bind(search_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((rows.into_iter().map(Match::from).collect(), total as u64))
    }

    async fn delete_matches(&self, search_id: &str) -> Result<usize, StorageError> {
        let result = sqlx::query(DELETE_MATCHES)
            .bind(search_id)
            .execute(&self.pool)
            .await?;
        let count = result.rows_affected() as usize;
        debug!(search_id, count, "deleted matches");
        Ok(count)
    }
}
