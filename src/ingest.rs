//! Ingestion pipeline orchestration.
//!
//! Coordinates the write path for each uploaded file:
//! size check → duplicate policy → extraction → chunking → embedding →
//! storage. A batch keeps going when one file fails; the per-file outcome
//! lands in a [`BatchReport`].
//!
//! Extraction is CPU-bound and may shell out to LibreOffice, so it runs on
//! the blocking pool. Nothing is written to the store until every chunk of
//! a file has been embedded.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use askdocs_core::chunk::chunk_text;
use askdocs_core::embedding::embed_texts;
use askdocs_core::models::{EmbeddingRecord, UploadedDocument};
use askdocs_core::store::WriteOutcome;
use askdocs_core::RagError;

use crate::config::DuplicatePolicy;
use crate::context::AppContext;
use crate::extract::{load_document, LoaderOptions, SUPPORTED_EXTENSIONS};

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Ingested,
    Skipped,
    Failed,
}

/// Outcome of ingesting one file.
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub status: FileStatus,
    pub chunks: usize,
    /// Chunks of an earlier upload removed under the `replace` policy.
    #[serde(skip_serializing_if = "is_zero")]
    pub replaced: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub cause: Option<RagError>,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl FileReport {
    fn skipped(filename: String) -> Self {
        Self {
            filename,
            status: FileStatus::Skipped,
            chunks: 0,
            replaced: 0,
            error: None,
            cause: None,
        }
    }

    fn failed(filename: String, err: RagError) -> Self {
        Self {
            filename,
            status: FileStatus::Failed,
            chunks: 0,
            replaced: 0,
            error: Some(err.to_string()),
            cause: Some(err),
        }
    }
}

/// Per-file outcomes of a batch upload.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub results: Vec<FileReport>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == FileStatus::Failed)
            .count()
    }

    pub fn total_chunks(&self) -> usize {
        self.results.iter().map(|r| r.chunks).sum()
    }

    /// True when there was at least one file and none of them succeeded.
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.failed() == self.results.len()
    }
}

/// Ingest a single uploaded document into the store.
///
/// A 0-byte or whitespace-only file yields an `Ingested` report with zero
/// chunks, not an error.
pub async fn ingest_document(
    ctx: &AppContext,
    doc: UploadedDocument,
) -> askdocs_core::Result<FileReport> {
    let config = &ctx.config;
    let filename = doc.filename.clone();
    let size = doc.size();

    let limit = config.upload.limit();
    if size > limit {
        return Err(RagError::FileTooLarge {
            filename,
            size,
            limit,
        });
    }
    if size > config.upload.warn_bytes {
        warn!(
            filename = %filename,
            size,
            recommended = config.upload.warn_bytes,
            "upload is larger than the recommended size"
        );
    }

    let policy = config.upload.on_duplicate;
    if policy == DuplicatePolicy::Skip && ctx.store.has_source(&filename).await? {
        info!(filename = %filename, "already ingested, skipping");
        return Ok(FileReport::skipped(filename));
    }

    let options = LoaderOptions::from(&config.extraction);
    let extracted = {
        let bytes = doc.bytes.clone();
        let name = filename.clone();
        tokio::task::spawn_blocking(move || load_document(&bytes, &name, None, &options))
            .await
            .map_err(|e| RagError::Extraction {
                filename: filename.clone(),
                message: format!("extraction task failed: {e}"),
            })??
    };

    let chunks: Vec<_> = chunk_text(
        &filename,
        &extracted.text,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    )
    .into_iter()
    .map(|c| c.with_upload(&doc))
    .collect();

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embed_texts(
        ctx.embedder.as_ref(),
        &texts,
        config.embedding.batch_size,
        config.embedding.timeout(),
    )
    .await?;

    let records: Vec<EmbeddingRecord> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddingRecord { chunk, vector })
        .collect();
    let outcome = ctx
        .store
        .write_source(&filename, &records, ctx.embedder.model_name(), policy.into())
        .await?;
    let replaced = match outcome {
        WriteOutcome::Written { replaced } => replaced,
        WriteOutcome::Skipped => {
            info!(filename = %filename, "ingested concurrently, skipping");
            return Ok(FileReport::skipped(filename));
        }
    };

    info!(
        filename = %filename,
        format = extracted.format.name(),
        chunks = records.len(),
        replaced,
        "ingested document"
    );

    Ok(FileReport {
        filename,
        status: FileStatus::Ingested,
        chunks: records.len(),
        replaced,
        error: None,
        cause: None,
    })
}

/// Ingest several documents, collecting per-file failures instead of
/// stopping at the first one.
pub async fn ingest_batch(ctx: &AppContext, docs: Vec<UploadedDocument>) -> BatchReport {
    let mut report = BatchReport::default();
    for doc in docs {
        let filename = doc.filename.clone();
        let outcome = match ingest_document(ctx, doc).await {
            Ok(r) => r,
            Err(e) => {
                warn!(filename = %filename, stage = %e.stage(), error = %e, "ingest failed");
                FileReport::failed(filename, e)
            }
        };
        report.results.push(outcome);
    }
    report
}

/// A file found on disk, with the name it will be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundFile {
    pub path: PathBuf,
    pub name: String,
}

/// Expand CLI paths into files to ingest.
///
/// Files named explicitly are always taken, stored under their file name.
/// Directories are walked recursively; entries are kept when their path
/// relative to the directory matches one of `include` (default: every
/// supported extension) and are stored under that relative path.
pub fn collect_files(paths: &[PathBuf], include: &[String]) -> Result<Vec<FoundFile>> {
    let patterns: Vec<String> = if include.is_empty() {
        SUPPORTED_EXTENSIONS
            .iter()
            .map(|ext| format!("**/*.{ext}"))
            .collect()
    } else {
        include.to_vec()
    };
    let include_set = build_globset(&patterns)?;
    let exclude_set = build_globset(&["**/.git/**".to_string(), "**/.*".to_string()])?;

    let mut found = Vec::new();
    for root in paths {
        if root.is_file() {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| root.display().to_string());
            found.push(FoundFile {
                path: root.clone(),
                name,
            });
            continue;
        }
        if !root.is_dir() {
            bail!("No such file or directory: {}", root.display());
        }

        let mut in_dir = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }
            in_dir.push(FoundFile {
                path: path.to_path_buf(),
                name: rel_str,
            });
        }
        in_dir.sort_by(|a, b| a.name.cmp(&b.name));
        found.extend(in_dir);
    }
    Ok(found)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid include glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

/// Read a file from disk, refusing files over `limit` before loading them.
fn read_upload(file: &FoundFile, limit: u64) -> askdocs_core::Result<UploadedDocument> {
    let unreadable =
        |e: std::io::Error| RagError::InvalidInput(format!("Failed to read {}: {e}", file.path.display()));
    let size = std::fs::metadata(&file.path).map_err(unreadable)?.len();
    if size > limit {
        return Err(RagError::FileTooLarge {
            filename: file.name.clone(),
            size,
            limit,
        });
    }
    let bytes = std::fs::read(&file.path).map_err(unreadable)?;
    Ok(UploadedDocument::new(file.name.clone(), bytes))
}

/// `askdocs ingest`: ingest files and directories from disk, printing a
/// per-file report.
pub async fn run_ingest(ctx: &AppContext, paths: &[PathBuf], include: &[String]) -> Result<()> {
    let files = collect_files(paths, include)?;
    if files.is_empty() {
        println!("No matching files found.");
        return Ok(());
    }

    let mut report = BatchReport::default();
    for file in &files {
        match read_upload(file, ctx.config.upload.limit()) {
            Ok(doc) => {
                let mut single = ingest_batch(ctx, vec![doc]).await;
                report.results.append(&mut single.results);
            }
            Err(e) => {
                warn!(filename = %file.name, error = %e, "ingest failed");
                report.results.push(FileReport::failed(file.name.clone(), e));
            }
        }
        if let Some(last) = report.results.last() {
            print_file_report(last);
        }
    }

    println!();
    println!(
        "ingest: {} file(s), {} chunk(s) written, {} failed",
        report.results.len(),
        report.total_chunks(),
        report.failed()
    );

    if report.all_failed() {
        bail!("every file failed to ingest");
    }
    Ok(())
}

fn print_file_report(r: &FileReport) {
    match r.status {
        FileStatus::Ingested if r.replaced > 0 => println!(
            "  ok       {} ({} chunks, replaced {})",
            r.filename, r.chunks, r.replaced
        ),
        FileStatus::Ingested => println!("  ok       {} ({} chunks)", r.filename, r.chunks),
        FileStatus::Skipped => println!("  skipped  {} (already ingested)", r.filename),
        FileStatus::Failed => println!(
            "  failed   {}: {}",
            r.filename,
            r.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
