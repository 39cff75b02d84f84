// file: src/database/storage.rs
use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredEntry {
    pub key: String,
    pub value: String,
}

pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let entry = sqlx::query_as::<_, StoredEntry>("SELECT key, value FROM storage WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to read storage key {}", key))?;

    Ok(entry.map(|e| e.value))
}

pub async fn get_all(pool: &SqlitePool) -> Result<HashMap<String, String>> {
    let entries = sqlx::query_as::<_, StoredEntry>("SELECT key, value FROM storage")
        .fetch_all(pool)
        .await
        .context("Failed to read storage")?;

    Ok(entries.into_iter().map(|e| (e.key, e.value)).collect())
}

/// Writes every row in one transaction so readers never observe a
/// half-written snapshot.
pub async fn set_many(pool: &SqlitePool, entries: &[(&str, String)]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to start storage transaction")?;

    for (key, value) in entries {
        sqlx::query(
            "INSERT INTO storage (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(*key)
        .bind(value)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to write storage key {}", key))?;
    }

    tx.commit().await.context("Failed to commit storage transaction")?;
    Ok(())
}

pub async fn clear(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM storage").execute(pool).await?;
    Ok(())
}
