//! Error taxonomy for the fetch → chunk → index → answer pipeline.
//!
//! Each stage has its own error type so callers can tell a per-URL skip
//! (`FetchError`) apart from an aborted build (`BuildError`), a missing
//! index (`LoadError`), and a failed answer (`AnswerError`). Nothing here
//! is expected to escape as a panic; the CLI and session loop render every
//! variant as user-facing status text.

use std::path::PathBuf;

use thiserror::Error;

/// A single URL could not be turned into readable text.
///
/// Always non-fatal: the processing pipeline logs the failure, skips the
/// URL, and continues with the rest of the batch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The page parsed fine but contained no paragraph text.
    #[error("no readable content at {url}")]
    NoReadableContent { url: String },
}

impl FetchError {
    /// The URL this failure belongs to.
    pub fn url(&self) -> &str {
        match self {
            FetchError::InvalidUrl { url, .. }
            | FetchError::Request { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::NoReadableContent { url } => url,
        }
    }
}

/// The embedding backend rejected or failed a request.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider is disabled; set [embedding] provider in config")]
    Disabled,

    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Building the index aborted; no index was replaced.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Caller error per the contract: the pipeline never invokes the
    /// builder with an empty batch.
    #[error("cannot build an index from zero chunks")]
    EmptyInput,

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("index storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("index file error: {0}")]
    Io(#[from] std::io::Error),
}

/// The persisted index could not be opened for querying.
///
/// Callers treat every variant as "no index available yet", not as a
/// fatal condition.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no index found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("index at {} is unreadable or has an unexpected schema: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    /// The index was built with a different embedding configuration than
    /// the one currently configured; retrieval against it would be
    /// meaningless.
    #[error("index was built with {found_model} ({found_dims} dims) but config expects {expected_model} ({expected_dims} dims)")]
    Incompatible {
        expected_model: String,
        expected_dims: usize,
        found_model: String,
        found_dims: usize,
    },
}

/// Answering a question failed; no partial answer is shown.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("generation provider is disabled; set [generation] provider in config")]
    Disabled,

    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("failed to embed question: {0}")]
    QuestionEmbedding(#[from] EmbedError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] sqlx::Error),

    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),

    #[error("generation failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}
