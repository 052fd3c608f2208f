//! # askdocs
//!
//! Ask questions about your own documents and get answers with citations.
//!
//! askdocs ingests uploaded files of many formats, splits them into
//! overlapping chunks, embeds the chunks, stores them in a local SQLite
//! vector store and answers natural-language questions by retrieving the
//! most relevant chunks and handing them to a generative model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────┐   ┌──────────┐
//! │  Upload  │──▶│   Extract   │──▶│  Chunk + │──▶│  SQLite  │
//! │ CLI/HTTP │   │ pdf/ooxml/… │   │  Embed   │   │ vectors  │
//! └──────────┘   └─────────────┘   └──────────┘   └────┬─────┘
//!                                                      │
//!                ┌──────────┐   ┌─────────────┐        │
//!   question ───▶│  Embed   │──▶│  Retrieve + │◀───────┘
//!                └──────────┘   │  Generate   │──▶ answer + sources
//!                               └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! askdocs init
//! askdocs ingest ./docs
//! askdocs ask "How do I rotate the API keys?"
//! askdocs serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | tracing subscriber setup |
//! | [`extract`] | Per-format text extraction |
//! | [`providers`] | Embedding and generation providers |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`ingest`] | Upload → chunks → vectors pipeline |
//! | [`ask`] | Question answering |
//! | [`manage`] | List, search, stats, clear |
//! | [`server`] | JSON HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//!
//! Runtime-agnostic pieces (chunker, store trait, answer assembly, error
//! taxonomy) live in the `askdocs-core` crate.

pub mod ask;
pub mod config;
pub mod context;
pub mod db;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod manage;
pub mod migrate;
pub mod providers;
pub mod server;
pub mod sqlite_store;

pub use context::AppContext;
