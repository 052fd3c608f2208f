use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::Config;

/// Open (creating if needed) the SQLite database in the store directory.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = config.store.db_path();

    std::fs::create_dir_all(&config.store.dir).with_context(|| {
        format!(
            "Failed to create store directory: {}",
            config.store.dir.display()
        )
    })?;

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(pool)
}
