//! SQLite pool construction and the embedded migration runner.

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{fs, path::Path, sync::Arc};

const MIGRATION_SQL: &str = include_str!("../migrations/0001_init.sql");

/// The filesystem path a SQLite URL points at, or `None` for in-memory
/// databases (`:memory:` in any of its spellings).
fn file_path(database_url: &str) -> Option<&str> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if path.is_empty() || path.starts_with(':') {
        None
    } else {
        Some(path)
    }
}

/// Open the pool, creating the database file and its parent directory when
/// the URL points at the filesystem.
pub async fn connect(database_url: &str) -> Result<Arc<SqlitePool>> {
    if let Some(db_path) = file_path(database_url) {
        let db_path = Path::new(db_path);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        // SQLx will not create the file itself without ?mode=rwc.
        if !db_path.exists() {
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(db_path)?;
            tracing::debug!("Created empty database file {:?}", db_path);
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(Arc::new(pool))
}

/// Run the embedded schema statements. Shared by `--migrate` mode and the
/// test harness.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = MIGRATION_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}
