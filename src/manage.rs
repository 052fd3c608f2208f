//! Store management: listing, searching, statistics and clearing.
//!
//! Each operation has a data-returning function used by the HTTP server
//! and a `run_*` wrapper that prints a human-readable report for the CLI.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use serde::Serialize;

use askdocs_core::answer::retrieve;
use askdocs_core::models::{Chunk, ScoredChunk, SourceSummary, StoreStats};

use crate::context::AppContext;

/// Length of the text preview shown for search hits, in characters.
pub const PREVIEW_CHARS: usize = 100;

/// One management search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub filename: String,
    /// Cosine similarity; absent for substring matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    pub chunk_index: i64,
    pub start_offset: i64,
    pub preview: String,
}

impl SearchHit {
    fn from_chunk(chunk: &Chunk, score: Option<f32>) -> Self {
        Self {
            filename: chunk.source.clone(),
            score,
            chunk_index: chunk.chunk_index,
            start_offset: chunk.start_offset,
            preview: preview(&chunk.text, PREVIEW_CHARS),
        }
    }
}

impl From<&ScoredChunk> for SearchHit {
    fn from(sc: &ScoredChunk) -> Self {
        Self::from_chunk(&sc.chunk, Some(sc.score))
    }
}

/// First `max` characters of `text` on one line, with `...` when cut.
pub fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let flat = flat.trim();
    if flat.chars().count() <= max {
        flat.to_string()
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}

/// All stored sources with their chunk counts.
pub async fn list(ctx: &AppContext) -> askdocs_core::Result<Vec<SourceSummary>> {
    ctx.store.list_sources().await
}

/// Management search.
///
/// Semantic mode ranks every chunk by similarity to `term` with no
/// threshold; text mode is a case-insensitive substring match.
pub async fn search(
    ctx: &AppContext,
    term: &str,
    limit: Option<usize>,
    text_mode: bool,
) -> askdocs_core::Result<Vec<SearchHit>> {
    let limit = limit.unwrap_or(ctx.config.retrieval.search_limit).max(1);
    if text_mode {
        let chunks = ctx.store.search_text(term, limit).await?;
        return Ok(chunks.iter().map(|c| SearchHit::from_chunk(c, None)).collect());
    }
    let hits = retrieve(
        ctx.store.as_ref(),
        ctx.embedder.as_ref(),
        term,
        limit,
        -1.0,
        ctx.config.embedding.timeout(),
    )
    .await?;
    Ok(hits.iter().map(SearchHit::from).collect())
}

/// Counts plus the on-disk size of the database.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub store: StoreStats,
    pub db_path: String,
    pub db_bytes: u64,
}

pub async fn stats(ctx: &AppContext) -> askdocs_core::Result<StatsReport> {
    let store = ctx.store.stats().await?;
    let path = ctx.config.store.db_path();
    let db_bytes = ["", "-wal", "-shm"]
        .iter()
        .filter_map(|suffix| {
            let mut p = path.clone().into_os_string();
            p.push(suffix);
            std::fs::metadata(p).ok()
        })
        .map(|m| m.len())
        .sum();
    Ok(StatsReport {
        store,
        db_path: path.display().to_string(),
        db_bytes,
    })
}

/// Remove every record. Returns the number of chunks removed.
pub async fn clear(ctx: &AppContext) -> askdocs_core::Result<u64> {
    let removed = ctx.store.clear().await?;
    tracing::info!(removed, "cleared store");
    Ok(removed)
}

// ============ CLI wrappers ============

pub async fn run_list(ctx: &AppContext) -> Result<()> {
    let sources = list(ctx).await?;
    if sources.is_empty() {
        println!("No documents ingested.");
        return Ok(());
    }
    println!("{:<40} {:>8}   {}", "SOURCE", "CHUNKS", "UPLOADED");
    println!("{}", "-".repeat(72));
    for s in &sources {
        let uploaded = s
            .last_uploaded_at
            .map(format_ts_relative)
            .unwrap_or_else(|| "unknown".to_string());
        println!("{:<40} {:>8}   {}", s.filename, s.chunk_count, uploaded);
    }
    println!();
    println!("{} document(s)", sources.len());
    Ok(())
}

pub async fn run_search(
    ctx: &AppContext,
    term: &str,
    limit: Option<usize>,
    text_mode: bool,
) -> Result<()> {
    let hits = search(ctx, term, limit, text_mode).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        match hit.score {
            Some(score) => println!(
                "{}. [{:.2}] {} (chunk {}, offset {})",
                i + 1,
                score,
                hit.filename,
                hit.chunk_index,
                hit.start_offset
            ),
            None => println!(
                "{}. {} (chunk {}, offset {})",
                i + 1,
                hit.filename,
                hit.chunk_index,
                hit.start_offset
            ),
        }
        println!("    > {}", hit.preview);
    }
    Ok(())
}

pub async fn run_stats(ctx: &AppContext) -> Result<()> {
    let report = stats(ctx).await?;
    println!("askdocs store stats");
    println!("===================");
    println!();
    println!("  Database:    {}", report.db_path);
    println!("  Size:        {}", format_bytes(report.db_bytes));
    println!();
    println!("  Documents:   {}", report.store.document_count);
    println!("  Chunks:      {}", report.store.chunk_count);
    match (report.store.dims, report.store.model.as_deref()) {
        (Some(dims), Some(model)) => println!("  Embeddings:  {} ({} dims)", model, dims),
        (Some(dims), None) => println!("  Embeddings:  {} dims", dims),
        _ => println!("  Embeddings:  none"),
    }
    println!();
    Ok(())
}

/// `askdocs clear`. Without `yes`, asks on stdin first.
pub async fn run_clear(ctx: &AppContext, yes: bool) -> Result<()> {
    if !yes {
        let count = ctx.store.count().await?;
        if count == 0 {
            println!("Store is already empty.");
            return Ok(());
        }
        print!("Remove all {} chunks from the store? [y/N] ", count);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        if !matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }
    let removed = clear(ctx).await?;
    println!("Cleared {} chunk(s).", removed);
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }
    match delta {
        0..=59 => "just now".to_string(),
        60..=3599 => plural(delta / 60, "min"),
        3600..=86_399 => plural(delta / 3600, "hour"),
        d if d < 86_400 * 30 => plural(d / 86_400, "day"),
        _ => format_ts_iso(ts),
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
