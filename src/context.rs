//! Process-wide handles shared by every command.
//!
//! An [`AppContext`] is built once at startup from the [`Config`] and then
//! passed by reference to CLI commands, or cloned into the HTTP server
//! state. Nothing in askdocs reaches for a global store or client.

use std::sync::Arc;

use anyhow::Result;

use askdocs_core::answer::Generator;
use askdocs_core::embedding::Embedder;
use askdocs_core::store::VectorStore;

use crate::config::Config;
use crate::providers::{create_embedder, create_generator};
use crate::sqlite_store::SqliteStore;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
}

impl AppContext {
    /// Open the SQLite store and construct the configured providers.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = SqliteStore::open(config).await?;
        Ok(Self {
            config: Arc::new(config.clone()),
            store: Arc::new(store),
            embedder: create_embedder(&config.embedding)?,
            generator: create_generator(&config.generation)?,
        })
    }

    /// Assemble a context from explicit parts.
    pub fn new(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            embedder,
            generator,
        }
    }
}
