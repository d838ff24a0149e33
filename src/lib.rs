//! # ragbot
//!
//! Question answering over uploaded PDF documents.
//!
//! Clients upload PDFs into a private session; the text is extracted,
//! split into overlapping passages, embedded and kept in an in-memory
//! vector index. Questions retrieve the closest passages and an answer
//! generator turns them into a reply that cites its source documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────────────────┐
//! │   HTTP   │──▶│  RagService  │──▶│  SessionManager (core)     │
//! │  (axum)  │   │  upload/ask  │   │  registry + orchestrator   │
//! └──────────┘   └──────────────┘   │  per session               │
//!      ▲                            └─────────────┬─────────────┘
//!      │                                          │
//! ┌──────────┐                     ┌──────────────┴──────────────┐
//! │   CLI    │                     │ Embedder · Generator · PDF  │
//! │ (ragbot) │                     │ (openai, ollama, hash, ...) │
//! └──────────┘                     └─────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Answer generators |
//! | [`http`] | JSON requests with retry and backoff |
//! | [`extract`] | PDF text extraction |
//! | [`service`] | Session-scoped operations behind the HTTP API |
//! | [`server`] | HTTP server |
//!
//! Chunking, the vector index, the registry and sessions live in
//! [`ragbot_core`].

pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod http;
pub mod logging;
pub mod server;
pub mod service;

pub use ragbot_core;
