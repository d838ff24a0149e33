//! # ragbot core
//!
//! Retrieval core for ragbot: passage chunking, the in-memory vector
//! index, the per-session document registry, the retrieval orchestrator
//! and the session manager, plus the capability traits the core calls
//! out through (embedder, generator, text extractor).
//!
//! This crate does no I/O of its own and pulls no async runtime. Concrete
//! providers (HTTP embedders, LLM generators, the PDF extractor) live in
//! the `ragbot` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod session;

pub use error::{ErrorKind, RagError, Result};
