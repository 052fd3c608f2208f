//! SQLite-backed [`VectorStore`].
//!
//! One `chunks` row per record with the vector as a BLOB, plus a
//! `store_meta` table recording the dimensionality and model fixed by the
//! first insert. Similarity search is brute-force cosine over every row.
//!
//! Writes go through a single async mutex so concurrent uploads never
//! interleave their transactions; each insert commits atomically.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use askdocs_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use askdocs_core::models::{Chunk, EmbeddingRecord, ScoredChunk, SourceSummary, StoreStats};
use askdocs_core::store::{check_dims, rank, SourceWrite, VectorStore, WriteOutcome};
use askdocs_core::{RagError, Result};

use crate::config::Config;
use crate::{db, migrate};

const CHUNK_COLUMNS: &str =
    "id, source, upload_id, chunk_index, start_offset, text, hash, uploaded_at";

/// SQLite implementation of [`VectorStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> AnyResult<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn meta(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::storage)
    }
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    Chunk {
        id: row.get("id"),
        source: row.get("source"),
        chunk_index: row.get("chunk_index"),
        start_offset: row.get("start_offset"),
        text: row.get("text"),
        hash: row.get("hash"),
        upload_id: row.get("upload_id"),
        uploaded_at: row.get("uploaded_at"),
    }
}

async fn tx_dims(tx: &mut Transaction<'_, Sqlite>) -> Result<Option<usize>> {
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'dims'")
            .fetch_optional(&mut **tx)
            .await
            .map_err(RagError::storage)?;
    value
        .map(|v| {
            v.parse::<usize>()
                .map_err(|_| RagError::Storage(format!("corrupt dims in store_meta: {v}")))
        })
        .transpose()
}

async fn set_meta(tx: &mut Transaction<'_, Sqlite>, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO store_meta (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(&mut **tx)
    .await
    .map_err(RagError::storage)?;
    Ok(())
}

async fn insert_rows(tx: &mut Transaction<'_, Sqlite>, records: &[EmbeddingRecord]) -> Result<()> {
    for r in records {
        let c = &r.chunk;
        sqlx::query(
            r#"
            INSERT INTO chunks (id, source, upload_id, chunk_index, start_offset,
                                text, hash, uploaded_at, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&c.id)
        .bind(&c.source)
        .bind(&c.upload_id)
        .bind(c.chunk_index)
        .bind(c.start_offset)
        .bind(&c.text)
        .bind(&c.hash)
        .bind(c.uploaded_at)
        .bind(vec_to_blob(&r.vector))
        .execute(&mut **tx)
        .await
        .map_err(RagError::storage)?;
    }
    Ok(())
}

async fn tx_delete_source(tx: &mut Transaction<'_, Sqlite>, filename: &str) -> Result<u64> {
    let removed = sqlx::query("DELETE FROM chunks WHERE source = ?")
        .bind(filename)
        .execute(&mut **tx)
        .await
        .map_err(RagError::storage)?
        .rows_affected();
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&mut **tx)
        .await
        .map_err(RagError::storage)?;
    if remaining == 0 {
        sqlx::query("DELETE FROM store_meta")
            .execute(&mut **tx)
            .await
            .map_err(RagError::storage)?;
    }
    Ok(removed)
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn insert(&self, records: &[EmbeddingRecord], model: &str) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;

        let fixed = tx_dims(&mut tx).await?;
        let dims = check_dims(fixed, records)?;
        if fixed.is_none() {
            if let Some(d) = dims {
                set_meta(&mut tx, "dims", &d.to_string()).await?;
                set_meta(&mut tx, "model", model).await?;
            }
        }

        insert_rows(&mut tx, records).await?;

        tx.commit().await.map_err(RagError::storage)?;
        debug!(records = records.len(), "inserted records");
        Ok(())
    }

    async fn write_source(
        &self,
        filename: &str,
        records: &[EmbeddingRecord],
        model: &str,
        mode: SourceWrite,
    ) -> Result<WriteOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chunks WHERE source = ?)")
                .bind(filename)
                .fetch_one(&mut *tx)
                .await
                .map_err(RagError::storage)?;
        if exists && mode == SourceWrite::SkipExisting {
            return Ok(WriteOutcome::Skipped);
        }
        let dims = check_dims(tx_dims(&mut tx).await?, records)?;

        let replaced = if exists && mode == SourceWrite::Replace {
            tx_delete_source(&mut tx, filename).await?
        } else {
            0
        };
        if !records.is_empty() {
            if tx_dims(&mut tx).await?.is_none() {
                if let Some(d) = dims {
                    set_meta(&mut tx, "dims", &d.to_string()).await?;
                    set_meta(&mut tx, "model", model).await?;
                }
            }
            insert_rows(&mut tx, records).await?;
        }

        tx.commit().await.map_err(RagError::storage)?;
        debug!(source = filename, records = records.len(), replaced, "wrote source");
        Ok(WriteOutcome::Written { replaced })
    }

    async fn query(&self, vector: &[f32], k: usize, score_threshold: f32) -> Result<Vec<ScoredChunk>> {
        match self.dims().await? {
            None => return Ok(Vec::new()),
            Some(d) if d != vector.len() => {
                return Err(RagError::DimensionMismatch {
                    expected: d,
                    actual: vector.len(),
                })
            }
            Some(_) => {}
        }

        let rows = sqlx::query(&format!("SELECT {CHUNK_COLUMNS}, embedding FROM chunks"))
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::storage)?;

        let scored = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(vector, &blob_to_vec(&blob));
                (score >= score_threshold).then(|| ScoredChunk {
                    chunk: row_to_chunk(row),
                    score,
                })
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::storage)?;
        Ok(n as u64)
    }

    async fn clear(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;
        let removed = sqlx::query("DELETE FROM chunks")
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?
            .rows_affected();
        sqlx::query("DELETE FROM store_meta")
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?;
        tx.commit().await.map_err(RagError::storage)?;
        Ok(removed)
    }

    async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS n, MAX(uploaded_at) AS last FROM chunks GROUP BY source ORDER BY source",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::storage)?;

        Ok(rows
            .iter()
            .map(|row| {
                let last: Option<i64> = row.get("last");
                SourceSummary {
                    filename: row.get("source"),
                    chunk_count: row.get("n"),
                    last_uploaded_at: last.filter(|t| *t > 0),
                }
            })
            .collect())
    }

    async fn search_text(&self, term: &str, limit: usize) -> Result<Vec<Chunk>> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE instr(lower(text), lower(?)) > 0 ORDER BY rowid LIMIT ?"
        ))
        .bind(term)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::storage)?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query("SELECT COUNT(*) AS chunks, COUNT(DISTINCT source) AS docs FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::storage)?;
        Ok(StoreStats {
            document_count: row.get("docs"),
            chunk_count: row.get("chunks"),
            dims: self.dims().await?,
            model: self.meta("model").await?,
        })
    }

    async fn has_source(&self, filename: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chunks WHERE source = ?)")
            .bind(filename)
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::storage)?;
        Ok(exists)
    }

    async fn delete_source(&self, filename: &str) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;
        let removed = tx_delete_source(&mut tx, filename).await?;
        tx.commit().await.map_err(RagError::storage)?;
        Ok(removed)
    }

    async fn dims(&self) -> Result<Option<usize>> {
        self.meta("dims")
            .await?
            .map(|v| {
                v.parse::<usize>()
                    .map_err(|_| RagError::Storage(format!("corrupt dims in store_meta: {v}")))
            })
            .transpose()
    }
}
