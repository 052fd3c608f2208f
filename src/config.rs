//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working configuration for the OpenAI providers. API keys
//! are never read from the file; providers take them from the environment.
//!
//! ```toml
//! [store]
//! dir = "./data"
//!
//! [chunking]
//! chunk_size = 300
//! chunk_overlap = 100
//!
//! [retrieval]
//! top_k = 3
//! score_threshold = 0.7
//!
//! [embedding]
//! provider = "openai"        # openai | ollama | hashing | disabled
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"        # openai | ollama | disabled
//! model = "gpt-4o-mini"
//!
//! [upload]
//! on_duplicate = "replace"   # replace | skip | append
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use askdocs_core::answer::RetrievalSettings;
use askdocs_core::store::SourceWrite;

/// Uploads above this size are always refused, whatever the config says.
pub const HARD_UPLOAD_LIMIT: u64 = 200 * 1024 * 1024;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub upload: UploadConfig,
    pub extraction: ExtractionConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl StoreConfig {
    /// Path of the SQLite database inside the store directory.
    pub fn db_path(&self) -> PathBuf {
        self.dir.join("askdocs.sqlite")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    askdocs_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    askdocs_core::chunk::DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Result count for management search.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            max_context_chars: default_max_context_chars(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_score_threshold() -> f32 {
    0.7
}
fn default_max_context_chars() -> usize {
    6000
}
fn default_search_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Override the provider endpoint (`https://api.openai.com`,
    /// `http://localhost:11434`, ...).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            base_url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    askdocs_core::embedding::DEFAULT_BATCH_SIZE
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// Model name, falling back to the provider's usual default.
    pub fn model_or_default(&self) -> String {
        if let Some(m) = &self.model {
            return m.clone();
        }
        match self.provider.as_str() {
            "ollama" => "nomic-embed-text".to_string(),
            "hashing" => "hashing-v1".to_string(),
            _ => "text-embedding-3-small".to_string(),
        }
    }

    /// Dimensionality, falling back to the default model's size.
    pub fn dims_or_default(&self) -> usize {
        if let Some(d) = self.dims {
            return d;
        }
        match self.provider.as_str() {
            "ollama" => 768,
            "hashing" => 256,
            _ => 1536,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: None,
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_generation_timeout_secs() -> u64 {
    60
}

impl GenerationConfig {
    pub fn model_or_default(&self) -> String {
        if let Some(m) = &self.model {
            return m.clone();
        }
        match self.provider.as_str() {
            "ollama" => "llama3.1".to_string(),
            _ => "gpt-4o-mini".to_string(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// What to do when a file with the same name is already stored.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Swap the old chunks for the new ones in a single write.
    #[default]
    Replace,
    /// Keep the old chunks and ignore the upload.
    Skip,
    /// Store the new chunks next to the old ones.
    Append,
}

impl From<DuplicatePolicy> for SourceWrite {
    fn from(policy: DuplicatePolicy) -> Self {
        match policy {
            DuplicatePolicy::Replace => SourceWrite::Replace,
            DuplicatePolicy::Skip => SourceWrite::SkipExisting,
            DuplicatePolicy::Append => SourceWrite::Append,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_warn_bytes")]
    pub warn_bytes: u64,
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            warn_bytes: default_warn_bytes(),
            on_duplicate: DuplicatePolicy::default(),
        }
    }
}

fn default_max_bytes() -> u64 {
    HARD_UPLOAD_LIMIT
}
fn default_warn_bytes() -> u64 {
    50 * 1024 * 1024
}

impl UploadConfig {
    /// Effective cap: the configured value, never above the hard limit.
    pub fn limit(&self) -> u64 {
        self.max_bytes.min(HARD_UPLOAD_LIMIT)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// LibreOffice binary used to convert `.doc`, `.ppt` and `.xls`.
    #[serde(default = "default_soffice")]
    pub soffice: String,
    #[serde(default = "default_convert_timeout_secs")]
    pub convert_timeout_secs: u64,
    /// Parent directory for conversion scratch space (system temp if unset).
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            soffice: default_soffice(),
            convert_timeout_secs: default_convert_timeout_secs(),
            scratch_dir: None,
        }
    }
}

fn default_soffice() -> String {
    "soffice".to_string()
}
fn default_convert_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Settings for the question-answering path.
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            top_k: self.retrieval.top_k,
            score_threshold: self.retrieval.score_threshold,
            max_context_chars: self.retrieval.max_context_chars,
            embed_timeout: self.embedding.timeout(),
            generate_timeout: self.generation.timeout(),
        }
    }
}

/// Load and validate the configuration at `path`.
///
/// A missing file yields the defaults; an unreadable or invalid one is an
/// error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.score_threshold) {
        anyhow::bail!("retrieval.score_threshold must be in [-1.0, 1.0]");
    }
    if config.retrieval.max_context_chars == 0 {
        anyhow::bail!("retrieval.max_context_chars must be > 0");
    }
    if config.retrieval.search_limit < 1 {
        anyhow::bail!("retrieval.search_limit must be >= 1");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "hashing" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or hashing.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.max_retries == 0 || config.generation.max_retries == 0 {
        anyhow::bail!("max_retries must be >= 1 (it counts the first attempt)");
    }

    // Generation
    match config.generation.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    // Upload
    if config.upload.max_bytes > HARD_UPLOAD_LIMIT {
        anyhow::bail!(
            "upload.max_bytes may not exceed the hard limit of {} bytes",
            HARD_UPLOAD_LIMIT
        );
    }
    if config.upload.max_bytes == 0 {
        anyhow::bail!("upload.max_bytes must be > 0");
    }

    Ok(())
}
