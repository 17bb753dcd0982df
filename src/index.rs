//! The persisted vector index.
//!
//! One SQLite file holds everything: a single-row meta table recording the
//! embedding configuration that built the index, and a chunks table with
//! text, source URL, and embedding BLOB per row.
//!
//! A build always produces a complete replacement: chunks are embedded
//! first, the new database is written to a sibling `.tmp` path, and only
//! after every insert succeeds is it renamed over the final path. A build
//! that fails partway leaves any previous index untouched.
//!
//! Loading verifies that the stored model and dimensionality match the
//! currently configured embedder; a mismatch is a [`LoadError`], not a
//! silently wrong retrieval.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::error::{BuildError, EmbedError, LoadError};
use crate::models::{ChunkRecord, RetrievedChunk};

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub chunks: usize,
    /// Distinct source URLs, in first-seen order.
    pub sources: Vec<String>,
    pub path: PathBuf,
}

/// The embedding configuration and shape recorded inside an index file.
#[derive(Debug, Clone)]
pub struct IndexMeta {
    pub model: String,
    pub dims: usize,
    pub chunk_count: i64,
    pub created_at: i64,
}

/// Embed all chunks and write a fresh index, atomically replacing any
/// previous one.
///
/// The input must be non-empty; the pipeline guards guarantee this and an
/// empty batch is rejected as [`BuildError::EmptyInput`].
pub async fn build_index(
    config: &Config,
    embedder: &dyn Embedder,
    records: &[ChunkRecord],
) -> Result<BuildSummary, BuildError> {
    if records.is_empty() {
        return Err(BuildError::EmptyInput);
    }

    // Embed everything up front so a backend failure aborts before any
    // filesystem write.
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(records.len());
    for batch in records.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
        tracing::debug!(batch = texts.len(), "embedding chunk batch");
        let batch_vectors = embedder.embed(&texts).await?;
        vectors.extend(batch_vectors);
    }

    // One vector per chunk, or the rows below would silently misalign.
    if vectors.len() != records.len() {
        return Err(BuildError::Embed(EmbedError::MalformedResponse(format!(
            "expected {} vectors for {} chunks, got {}",
            records.len(),
            records.len(),
            vectors.len()
        ))));
    }

    let final_path = &config.index.path;
    if let Some(parent) = final_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path(final_path);
    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path)?;
    }

    let pool = open_pool(&tmp_path, true).await?;

    sqlx::query(
        r#"
        CREATE TABLE index_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE chunks (
            id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL,
            text TEXT NOT NULL,
            source TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO index_meta (id, model, dims, chunk_count, created_at) VALUES (1, ?, ?, ?, ?)")
        .bind(embedder.model_name())
        .bind(embedder.dims() as i64)
        .bind(records.len() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

    for (record, vector) in records.iter().zip(vectors.iter()) {
        sqlx::query("INSERT INTO chunks (id, seq, text, source, embedding) VALUES (?, ?, ?, ?, ?)")
            .bind(&record.id)
            .bind(record.seq)
            .bind(&record.text)
            .bind(&record.source)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    pool.close().await;

    // The swap: the old index stays in place until this point.
    std::fs::rename(&tmp_path, final_path)?;

    let mut sources: Vec<String> = Vec::new();
    for record in records {
        if !sources.contains(&record.source) {
            sources.push(record.source.clone());
        }
    }

    tracing::info!(
        chunks = records.len(),
        sources = sources.len(),
        path = %final_path.display(),
        "index built"
    );

    Ok(BuildSummary {
        chunks: records.len(),
        sources,
        path: final_path.clone(),
    })
}

/// A read-only view over a successfully opened index.
#[derive(Debug)]
pub struct IndexHandle {
    pool: SqlitePool,
    meta: IndexMeta,
}

/// Open the persisted index and verify it matches the given embedding
/// configuration.
pub async fn open_index(
    config: &Config,
    expected_model: &str,
    expected_dims: usize,
) -> Result<IndexHandle, LoadError> {
    let path = &config.index.path;
    if !path.exists() {
        return Err(LoadError::NotFound { path: path.clone() });
    }

    let pool = open_pool(path, false)
        .await
        .map_err(|source| LoadError::Corrupt {
            path: path.clone(),
            source,
        })?;

    let row = sqlx::query("SELECT model, dims, chunk_count, created_at FROM index_meta WHERE id = 1")
        .fetch_one(&pool)
        .await
        .map_err(|source| LoadError::Corrupt {
            path: path.clone(),
            source,
        })?;

    let meta = IndexMeta {
        model: row.get("model"),
        dims: row.get::<i64, _>("dims") as usize,
        chunk_count: row.get("chunk_count"),
        created_at: row.get("created_at"),
    };

    if meta.model != expected_model || meta.dims != expected_dims {
        pool.close().await;
        return Err(LoadError::Incompatible {
            expected_model: expected_model.to_string(),
            expected_dims,
            found_model: meta.model,
            found_dims: meta.dims,
        });
    }

    Ok(IndexHandle { pool, meta })
}

/// Read only the meta row, without the compatibility check. Used by the
/// status command.
pub async fn read_meta(config: &Config) -> Result<IndexMeta, LoadError> {
    let path = &config.index.path;
    if !path.exists() {
        return Err(LoadError::NotFound { path: path.clone() });
    }

    let pool = open_pool(path, false)
        .await
        .map_err(|source| LoadError::Corrupt {
            path: path.clone(),
            source,
        })?;

    let row = sqlx::query("SELECT model, dims, chunk_count, created_at FROM index_meta WHERE id = 1")
        .fetch_one(&pool)
        .await
        .map_err(|source| LoadError::Corrupt {
            path: path.clone(),
            source,
        });

    pool.close().await;
    let row = row?;

    Ok(IndexMeta {
        model: row.get("model"),
        dims: row.get::<i64, _>("dims") as usize,
        chunk_count: row.get("chunk_count"),
        created_at: row.get("created_at"),
    })
}

/// Distinct source URLs in the index, in insertion order. Serves the
/// status command alongside [`read_meta`], so no compatibility check.
pub async fn read_sources(config: &Config) -> Result<Vec<String>, LoadError> {
    let path = &config.index.path;
    if !path.exists() {
        return Err(LoadError::NotFound { path: path.clone() });
    }

    let pool = open_pool(path, false)
        .await
        .map_err(|source| LoadError::Corrupt {
            path: path.clone(),
            source,
        })?;

    let rows = sqlx::query("SELECT source FROM chunks GROUP BY source ORDER BY MIN(rowid)")
        .fetch_all(&pool)
        .await
        .map_err(|source| LoadError::Corrupt {
            path: path.clone(),
            source,
        });

    pool.close().await;
    let rows = rows?;

    Ok(rows.iter().map(|row| row.get("source")).collect())
}

/// Delete the index file (and any stale temp file). Returns whether an
/// index existed.
pub fn clear_index(config: &Config) -> std::io::Result<bool> {
    let path = &config.index.path;
    let tmp = temp_path(path);
    if tmp.exists() {
        std::fs::remove_file(&tmp)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
        return Ok(true);
    }
    Ok(false)
}

impl IndexHandle {
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Top-k most similar chunks by cosine similarity against the query
    /// vector, highest first.
    pub async fn search(
        &self,
        query_vec: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, sqlx::Error> {
        let rows = sqlx::query("SELECT text, source, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                RetrievedChunk {
                    text: row.get("text"),
                    source: row.get("source"),
                    score: cosine_similarity(query_vec, &vector),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);

        Ok(scored)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn temp_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn open_pool(path: &Path, create: bool) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(create)
        // Rollback journal keeps the build to a single file so the
        // rename swap captures everything.
        .journal_mode(SqliteJournalMode::Delete);

    SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbedError;
    use async_trait::async_trait;

    /// Maps each text to a fixed-direction vector based on its first byte
    /// so similarity ordering is predictable.
    struct ByteEmbedder;

    #[async_trait]
    impl Embedder for ByteEmbedder {
        fn model_name(&self) -> &str {
            "byte-test"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let b = t.bytes().next().unwrap_or(0) as f32;
                    vec![b, 1.0]
                })
                .collect())
        }
    }

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.index.path = dir.join("index.sqlite");
        config.embedding.model = Some("byte-test".to_string());
        config.embedding.dims = Some(2);
        config
    }

    #[tokio::test]
    async fn build_open_search_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let records = vec![
            ChunkRecord::new(0, "alpha text", "https://a.example"),
            ChunkRecord::new(1, "beta text", "https://b.example"),
        ];

        let summary = build_index(&config, &ByteEmbedder, &records).await.unwrap();
        assert_eq!(summary.chunks, 2);
        assert_eq!(
            summary.sources,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(config.index.path.exists());
        assert!(!temp_path(&config.index.path).exists());

        let handle = open_index(&config, "byte-test", 2).await.unwrap();
        assert_eq!(handle.meta().chunk_count, 2);

        let query = vec!['a' as u8 as f32, 1.0];
        let hits = handle.search(&query, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "https://a.example");
        handle.close().await;
    }

    #[tokio::test]
    async fn rebuild_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let first = vec![ChunkRecord::new(0, "old content", "https://old.example")];
        build_index(&config, &ByteEmbedder, &first).await.unwrap();

        let second = vec![ChunkRecord::new(0, "new content", "https://new.example")];
        build_index(&config, &ByteEmbedder, &second).await.unwrap();

        let handle = open_index(&config, "byte-test", 2).await.unwrap();
        assert_eq!(handle.meta().chunk_count, 1);
        handle.close().await;

        let sources = read_sources(&config).await.unwrap();
        assert_eq!(sources, vec!["https://new.example".to_string()]);
    }

    /// Refuses every batch; build must abort before touching the
    /// filesystem.
    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "byte-test"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Err(EmbedError::Api {
                status: 500,
                body: "backend down".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let first = vec![ChunkRecord::new(0, "old content", "https://old.example")];
        build_index(&config, &ByteEmbedder, &first).await.unwrap();

        let second = vec![ChunkRecord::new(0, "new content", "https://new.example")];
        let err = build_index(&config, &FailingEmbedder, &second)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Embed(_)));

        let handle = open_index(&config, "byte-test", 2).await.unwrap();
        assert_eq!(handle.meta().chunk_count, 1);
        handle.close().await;

        let sources = read_sources(&config).await.unwrap();
        assert_eq!(sources, vec!["https://old.example".to_string()]);
        assert!(!temp_path(&config.index.path).exists());
    }

    /// Returns one vector fewer than requested.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "byte-test"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn mismatched_vector_count_aborts_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let records = vec![
            ChunkRecord::new(0, "first", "https://a.example"),
            ChunkRecord::new(1, "second", "https://a.example"),
        ];
        let err = build_index(&config, &ShortEmbedder, &records)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::Embed(EmbedError::MalformedResponse(_))
        ));
        assert!(!config.index.path.exists());
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let err = build_index(&config, &ByteEmbedder, &[]).await.unwrap_err();
        assert!(matches!(err, BuildError::EmptyInput));
        assert!(!config.index.path.exists());
    }

    #[tokio::test]
    async fn missing_index_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let err = open_index(&config, "byte-test", 2).await.unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));
    }

    #[tokio::test]
    async fn incompatible_embedding_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let records = vec![ChunkRecord::new(0, "text", "https://a.example")];
        build_index(&config, &ByteEmbedder, &records).await.unwrap();

        let err = open_index(&config, "other-model", 2).await.unwrap_err();
        assert!(matches!(err, LoadError::Incompatible { .. }));

        let err = open_index(&config, "byte-test", 512).await.unwrap_err();
        assert!(matches!(err, LoadError::Incompatible { .. }));
    }

    #[tokio::test]
    async fn clear_removes_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        assert!(!clear_index(&config).unwrap());

        let records = vec![ChunkRecord::new(0, "text", "https://a.example")];
        build_index(&config, &ByteEmbedder, &records).await.unwrap();

        assert!(clear_index(&config).unwrap());
        assert!(!config.index.path.exists());
    }
}
