//! # askdocs core
//!
//! Runtime-agnostic logic for askdocs: data models, the overlapping text
//! chunker, the error taxonomy, embedding and generation provider traits,
//! the vector store abstraction with an in-memory backend, and retrieval
//! plus answer assembly.
//!
//! This crate contains no tokio, sqlx, HTTP clients or filesystem I/O.
//! Concrete providers, the SQLite store and document extraction live in the
//! `askdocs` application crate.

pub mod answer;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod store;

pub use error::{ProviderError, ProviderErrorKind, RagError, Result, Stage};
