//! The two end-to-end flows: processing URLs into an index, and answering
//! a question against it.
//!
//! Both entry points take their backends as trait objects so the session
//! loop, the CLI, and the tests all drive the exact same code paths. Input
//! guards run before any backend is touched: a blank URL list or a blank
//! question returns a non-error outcome without a single fetch, embed, or
//! generation call.

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::{embed_query, Embedder};
use crate::error::{AnswerError, BuildError, FetchError, LoadError};
use crate::fetch::PageFetcher;
use crate::generation::AnswerGenerator;
use crate::index::{build_index, open_index, BuildSummary};
use crate::models::{ChunkRecord, Document, QueryResult};

/// Result of a processing run. Only [`ProcessOutcome::Indexed`] means an
/// index now exists for the given batch.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Every supplied URL was blank; nothing was fetched.
    NoUrls,
    /// All URLs failed to fetch or yielded no readable text. Any previous
    /// index is left untouched.
    NothingFetched { failures: Vec<FetchError> },
    /// A fresh index was built from the fetched pages.
    Indexed {
        summary: BuildSummary,
        /// URLs that were skipped along the way.
        failures: Vec<FetchError>,
    },
}

/// Fetch every non-blank URL, chunk the readable text, and rebuild the
/// index from the result.
///
/// Individual URL failures are collected and reported, never fatal; the
/// build aborts only when the embedding backend or the index storage
/// fails.
pub async fn process_urls(
    config: &Config,
    fetcher: &dyn PageFetcher,
    embedder: &dyn Embedder,
    urls: &[String],
) -> Result<ProcessOutcome, BuildError> {
    let cleaned: Vec<&str> = urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .collect();

    if cleaned.is_empty() {
        return Ok(ProcessOutcome::NoUrls);
    }

    let mut documents: Vec<Document> = Vec::new();
    let mut failures: Vec<FetchError> = Vec::new();

    for url in cleaned {
        tracing::info!(url, "fetching");
        match fetcher.fetch(url).await {
            Ok(text) => documents.push(Document {
                text,
                source: url.to_string(),
            }),
            Err(e) => {
                tracing::warn!(url, error = %e, "skipping URL");
                failures.push(e);
            }
        }
    }

    let mut records: Vec<ChunkRecord> = Vec::new();
    for document in &documents {
        records.extend(chunk_document(document, config.chunking.max_chars));
    }

    if records.is_empty() {
        return Ok(ProcessOutcome::NothingFetched { failures });
    }

    let summary = build_index(config, embedder, &records).await?;
    Ok(ProcessOutcome::Indexed { summary, failures })
}

/// Result of asking a question.
#[derive(Debug)]
pub enum AskOutcome {
    /// The question was empty or whitespace; nothing was queried.
    BlankQuestion,
    /// No usable index exists yet; process URLs first.
    NoIndex(LoadError),
    Answered(QueryResult),
}

/// Answer a question against the persisted index.
///
/// The cited sources are the backend's claimed sources, deduplicated and
/// restricted to URLs that actually appeared in the retrieved context, so
/// a citation can never point outside the processed set.
pub async fn ask(
    config: &Config,
    embedder: &dyn Embedder,
    generator: &dyn AnswerGenerator,
    question: &str,
) -> Result<AskOutcome, AnswerError> {
    let question = question.trim();
    if question.is_empty() {
        return Ok(AskOutcome::BlankQuestion);
    }

    let handle = match open_index(config, embedder.model_name(), embedder.dims()).await {
        Ok(handle) => handle,
        Err(e) => return Ok(AskOutcome::NoIndex(e)),
    };

    let query_vec = embed_query(embedder, question).await?;
    let context = handle.search(&query_vec, config.retrieval.top_k).await?;
    handle.close().await;

    tracing::debug!(hits = context.len(), "retrieved context");

    let generated = generator.generate(question, &context).await?;

    let mut sources: Vec<String> = Vec::new();
    for url in generated.sources {
        let in_context = context.iter().any(|c| c.source == url);
        if in_context && !sources.contains(&url) {
            sources.push(url);
        }
    }

    Ok(AskOutcome::Answered(QueryResult {
        answer: generated.answer,
        sources,
    }))
}
