// file: src/database/mod.rs

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub mod persistence;
pub mod storage;

pub use persistence::{Persistence, StoredState};

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the SQLite file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;

        run_schema(&pool).await.context("Failed to run database schema")?;

        info!("Database initialized at {}", path.display());

        Ok(Database { pool })
    }

    /// A private in-memory database. One connection, since every SQLite
    /// memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        run_schema(&pool).await.context("Failed to run database schema")?;

        Ok(Database { pool })
    }

    // --- Storage Delegates ---

    pub async fn get_entry(&self, key: &str) -> Result<Option<String>> {
        storage::get(&self.pool, key).await
    }

    pub async fn get_entries(&self) -> Result<HashMap<String, String>> {
        storage::get_all(&self.pool).await
    }

    pub async fn set_entries(&self, entries: &[(&str, String)]) -> Result<()> {
        storage::set_many(&self.pool, entries).await
    }

    pub async fn clear(&self) -> Result<()> {
        storage::clear(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn run_schema(pool: &SqlitePool) -> Result<()> {
    let schema = include_str!("schema.sql");

    let mut current_statement = String::new();
    let mut in_trigger = false;

    for line in schema.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }

        if trimmed.to_uppercase().starts_with("CREATE TRIGGER") {
            in_trigger = true;
        }

        current_statement.push_str(line);
        current_statement.push('\n');

        if trimmed.ends_with(';') {
            if in_trigger {
                if trimmed.to_uppercase() == "END;" {
                    in_trigger = false;
                    sqlx::query(&current_statement).execute(pool).await?;
                    current_statement.clear();
                }
            } else {
                sqlx::query(&current_statement).execute(pool).await?;
                current_statement.clear();
            }
        }
    }
    Ok(())
}
