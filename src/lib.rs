//! # SourceSense
//!
//! Ask questions about web articles from the command line.
//!
//! SourceSense fetches the articles you point it at, extracts their
//! paragraph text, chunks and embeds it, and persists a similarity index
//! in a single SQLite file. Questions are answered by retrieving the most
//! similar chunks and handing them to an LLM, with the cited source URLs
//! returned alongside the answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Fetch   │──▶│ Chunk + Embed │──▶│  SQLite   │
//! │ (HTML→p) │   │              │   │  index    │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │
//!                       question ─▶ retrieve top-k ─▶ LLM ─▶ answer + sources
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sourcesense process https://example.com/article-1 https://example.com/article-2
//! sourcesense ask "What do these articles say about X?"
//! sourcesense session              # interactive loop
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fetch`] | Page fetching and paragraph extraction |
//! | [`chunk`] | Recursive text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Answer generation abstraction |
//! | [`index`] | Persisted vector index |
//! | [`pipeline`] | Process and ask flows |
//! | [`session`] | Interactive URL list and command loop |
//! | [`error`] | Error taxonomy |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod generation;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod session;
