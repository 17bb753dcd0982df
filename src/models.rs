//! Core data types that flow through the pipeline.

use uuid::Uuid;

/// Text extracted from one successfully fetched page.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    /// URL the text came from; carried through to every chunk.
    pub source: String,
}

/// One bounded-size piece of a document, ready for embedding.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    /// Position of the chunk within its document, starting at 0.
    pub seq: i64,
    pub text: String,
    pub source: String,
}

impl ChunkRecord {
    pub fn new(seq: i64, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            seq,
            text: text.into(),
            source: source.into(),
        }
    }
}

/// A chunk pulled back out of the index for a query, with its similarity
/// score against the question embedding.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// The result of one question: the synthesized answer plus the sources
/// the generation backend reported using, deduplicated in first-seen
/// order. Ephemeral; nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<String>,
}
