use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use ingest::{batches, load_document_detail, PostStream};
use postwatch_core::{filter, AppConfig, CanonicalPost, SaveMode, SavedSearch, StorageBackend};
use storage::{
    total_pages, DatabaseMatchStore, DbSearchRegistry, FileMatchStore, FileSearchRegistry,
    MatchStore, PageSize, SearchRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("postwatch=info,storage=info,ingest=info")
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let mut config_path = PathBuf::from("postwatch.toml");
    if args.first().map(String::as_str) == Some("--config") {
        args.remove(0);
        if args.is_empty() {
            bail!("--config requires a path");
        }
        config_path = PathBuf::from(args.remove(0));
    }

    let config = if config_path.exists() {
        AppConfig::load(&config_path).context("loading configuration")?
    } else {
        info!("no configuration file, using defaults");
        AppConfig::default()
    };

    let backend = build_backend(&config).await?;
    let (store, registry) = (&backend.store, &backend.registry);

    match args.first().map(String::as_str) {
        Some("process") => {
            let Some(dump) = args.get(1).map(PathBuf::from) else {
                bail!("usage: postwatch process <dump.json>");
            };
            process(&config, &backend, &dump).await
        }
        Some("list") => list_searches(registry.as_ref()).await,
        Some("matches") => {
            let Some(search_id) = args.get(1) else {
                bail!("usage: postwatch matches <search_id> [page]");
            };
            let page: u32 = match args.get(2) {
                Some(raw) => raw.parse().context("page must be a number")?,
                None => 1,
            };
            view_matches(store.as_ref(), search_id, page).await
        }
        _ => bail!("usage: postwatch [--config <path>] <process|list|matches> ..."),
    }
}

struct Backend {
    store: Box<dyn MatchStore>,
    registry: Box<dyn SearchRegistry>,
    /// Present on the database backend, which additionally keeps full
    /// post detail for the joined views.
    database: Option<DatabaseMatchStore>,
}

async fn build_backend(config: &AppConfig) -> Result<Backend> {
    match config.backend {
        StorageBackend::File => Ok(Backend {
            store: Box::new(FileMatchStore::new(&config.matches_dir)),
            registry: Box::new(FileSearchRegistry::new(&config.searches_file)),
            database: None,
        }),
        StorageBackend::Database => {
            let store = DatabaseMatchStore::connect(&config.database_url)
                .await
                .context("connecting match store")?;
            let registry = DbSearchRegistry::new(store.pool().clone());
            registry
                .run_migrations()
                .await
                .context("migrating search registry")?;
            Ok(Backend {
                store: Box::new(store.clone()),
                registry: Box::new(registry),
                database: Some(store),
            })
        }
    }
}

/// Runs every saved search over the dump and persists the results.
/// Whole-document dumps are replaced wholesale; `.jsonl` dumps stream
/// in batches and append, after clearing the prior match sets.
async fn process(config: &AppConfig, backend: &Backend, dump: &Path) -> Result<()> {
    let searches = backend.registry.get_all_searches().await?;
    if searches.is_empty() {
        warn!("no saved searches, nothing to process");
        return Ok(());
    }

    let streamed = dump.extension().and_then(|ext| ext.to_str()) == Some("jsonl");
    if streamed {
        process_streamed(config, backend.store.as_ref(), &searches, dump).await
    } else {
        process_document(backend, &searches, dump).await
    }
}

async fn process_document(backend: &Backend, searches: &[SavedSearch], dump: &Path) -> Result<()> {
    let details = load_document_detail(dump).context("loading post dump")?;
    if let Some(db) = backend.database.as_ref() {
        let stored = db.save_posts(&details).await?;
        info!(stored, "post details saved");
    }

    let posts: Vec<CanonicalPost> = details.into_iter().map(CanonicalPost::from).collect();
    let store = backend.store.as_ref();
    info!(posts = posts.len(), searches = searches.len(), "processing dump");

    for search in searches {
        let found = filter(posts.iter().cloned(), &search.criteria);
        let count = store
            .save_matches(&search.id, found, SaveMode::Replace)
            .await?;
        alert(search, count);
    }
    Ok(())
}

async fn process_streamed(
    config: &AppConfig,
    store: &dyn MatchStore,
    searches: &[SavedSearch],
    dump: &Path,
) -> Result<()> {
    // Append per batch; clearing first keeps the overall run equivalent
    // to one Replace save.
    for search in searches {
        store.delete_matches(&search.id).await?;
    }

    let mut stream = PostStream::open(dump).context("opening post dump")?;
    let mut totals = vec![0usize; searches.len()];
    for batch in batches(stream.by_ref(), config.batch_size) {
        for (search, total) in searches.iter().zip(totals.iter_mut()) {
            let found = filter(batch.iter().cloned(), &search.criteria);
            if !found.is_empty() {
                *total += store
                    .save_matches(&search.id, found, SaveMode::Append)
                    .await?;
            }
        }
    }
    if stream.skipped() > 0 {
        warn!(skipped = stream.skipped(), "some records were skipped");
    }

    for (search, total) in searches.iter().zip(totals) {
        alert(search, total);
    }
    Ok(())
}

fn alert(search: &SavedSearch, count: usize) {
    if count == 0 {
        info!(name = %search.name, "no new matches");
    } else if search.notify {
        // The notify flag promotes the result to an alert line.
        info!(name = %search.name, count, "ALERT: new matches for search");
    } else {
        info!(name = %search.name, count, "matches saved");
    }
}

async fn list_searches(registry: &dyn SearchRegistry) -> Result<()> {
    let searches = registry.get_all_searches().await?;
    for search in searches {
        println!(
            "{}  {}  [{}] {:?}  notify={}",
            search.id,
            search.name,
            search.criteria.kind(),
            search.criteria.terms(),
            search.notify
        );
    }
    Ok(())
}

async fn view_matches(store: &dyn MatchStore, search_id: &str, page: u32) -> Result<()> {
    let per_page = PageSize::Ten;
    let (matches, total) = store
        .get_matches_paginated(search_id, page, per_page)
        .await?;
    println!(
        "page {page}/{} ({total} matches)",
        total_pages(total, per_page).max(1)
    );
    for m in matches {
        println!("{}", serde_json::to_string(&m)?);
    }
    Ok(())
}
