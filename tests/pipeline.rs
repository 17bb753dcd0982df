//! End-to-end pipeline tests with fake backends.
//!
//! The fakes count their calls so the tests can assert the input guards
//! short-circuit before any backend is touched.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use sourcesense::config::Config;
use sourcesense::embedding::Embedder;
use sourcesense::error::{AnswerError, EmbedError, FetchError};
use sourcesense::fetch::PageFetcher;
use sourcesense::generation::{AnswerGenerator, GeneratedAnswer};
use sourcesense::models::RetrievedChunk;
use sourcesense::pipeline::{ask, process_urls, AskOutcome, ProcessOutcome};

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.index.path = dir.join("index.sqlite");
    config.chunking.max_chars = 1000;
    config.embedding.model = Some("fake-embed".to_string());
    config.embedding.dims = Some(3);
    config
}

/// Serves canned page text per URL; anything else fails as unreachable.
struct FakeFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(u, t)| (u.to_string(), t.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url) {
            Some(text) => Ok(text.clone()),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Deterministic 3-dim vectors; records every batch it receives.
struct FakeEmbedder {
    batches: Mutex<Vec<Vec<String>>>,
}

impl FakeEmbedder {
    fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    fn texts_seen(&self) -> Vec<String> {
        self.batches.lock().unwrap().concat()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embed"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.batches.lock().unwrap().push(texts.to_vec());
        Ok(texts
            .iter()
            .map(|t| {
                let b = t.bytes().next().unwrap_or(0) as f32;
                vec![b, t.len() as f32, 1.0]
            })
            .collect())
    }
}

/// Returns a canned answer with a fixed list of claimed sources.
struct FakeGenerator {
    answer: String,
    sources: Vec<String>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    fn new(answer: &str, sources: &[&str]) -> Self {
        Self {
            answer: answer.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerGenerator for FakeGenerator {
    async fn generate(
        &self,
        _question: &str,
        _context: &[RetrievedChunk],
    ) -> Result<GeneratedAnswer, AnswerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedAnswer {
            answer: self.answer.clone(),
            sources: self.sources.clone(),
        })
    }
}

#[tokio::test]
async fn blank_urls_touch_no_backends() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = FakeFetcher::new(&[]);
    let embedder = FakeEmbedder::new();

    let urls = vec![String::new(), "   ".to_string()];
    let outcome = process_urls(&config, &fetcher, &embedder, &urls)
        .await
        .unwrap();

    assert!(matches!(outcome, ProcessOutcome::NoUrls));
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(embedder.calls(), 0);
    assert!(!config.index.path.exists());
}

#[tokio::test]
async fn all_failed_fetches_build_no_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let fetcher = FakeFetcher::new(&[]);
    let embedder = FakeEmbedder::new();

    let urls = vec![
        "https://down.example/a".to_string(),
        "https://down.example/b".to_string(),
    ];
    let outcome = process_urls(&config, &fetcher, &embedder, &urls)
        .await
        .unwrap();

    match outcome {
        ProcessOutcome::NothingFetched { failures } => assert_eq!(failures.len(), 2),
        other => panic!("expected NothingFetched, got {other:?}"),
    }
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(embedder.calls(), 0);
    assert!(!config.index.path.exists());
}

#[tokio::test]
async fn single_short_page_becomes_one_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let url = "https://ok.example/article";
    let fetcher = FakeFetcher::new(&[(url, "Alpha. Beta. Gamma.")]);
    let embedder = FakeEmbedder::new();

    let outcome = process_urls(&config, &fetcher, &embedder, &[url.to_string()])
        .await
        .unwrap();

    match outcome {
        ProcessOutcome::Indexed { summary, failures } => {
            assert_eq!(summary.chunks, 1);
            assert_eq!(summary.sources, vec![url.to_string()]);
            assert!(failures.is_empty());
        }
        other => panic!("expected Indexed, got {other:?}"),
    }
    assert_eq!(embedder.texts_seen(), vec!["Alpha. Beta. Gamma.".to_string()]);
    assert!(config.index.path.exists());
}

#[tokio::test]
async fn partial_failures_are_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let good = "https://ok.example/article";
    let bad = "https://down.example/missing";
    let fetcher = FakeFetcher::new(&[(good, "Some readable text.")]);
    let embedder = FakeEmbedder::new();

    let urls = vec![good.to_string(), bad.to_string()];
    let outcome = process_urls(&config, &fetcher, &embedder, &urls)
        .await
        .unwrap();

    match outcome {
        ProcessOutcome::Indexed { summary, failures } => {
            assert_eq!(summary.sources, vec![good.to_string()]);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].url(), bad);
        }
        other => panic!("expected Indexed, got {other:?}"),
    }
}

#[tokio::test]
async fn blank_question_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let embedder = FakeEmbedder::new();
    let generator = FakeGenerator::new("unused", &[]);

    let outcome = ask(&config, &embedder, &generator, "   ").await.unwrap();

    assert!(matches!(outcome, AskOutcome::BlankQuestion));
    assert_eq!(embedder.calls(), 0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn asking_without_an_index_is_guarded() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let embedder = FakeEmbedder::new();
    let generator = FakeGenerator::new("unused", &[]);

    let outcome = ask(&config, &embedder, &generator, "What is alpha?")
        .await
        .unwrap();

    assert!(matches!(outcome, AskOutcome::NoIndex(_)));
    assert_eq!(embedder.calls(), 0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn answer_sources_are_restricted_to_indexed_urls() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let url_a = "https://a.example/one";
    let url_b = "https://b.example/two";
    let fetcher = FakeFetcher::new(&[
        (url_a, "Alpha content about widgets."),
        (url_b, "Beta content about gadgets."),
    ]);
    let embedder = FakeEmbedder::new();

    let urls = vec![url_a.to_string(), url_b.to_string()];
    process_urls(&config, &fetcher, &embedder, &urls)
        .await
        .unwrap();

    // The generator claims a source that was never processed, plus a
    // duplicate of a real one.
    let generator = FakeGenerator::new(
        "Widgets are described in the first article.",
        &[url_a, "https://elsewhere.example/forged", url_a, url_b],
    );

    let outcome = ask(&config, &embedder, &generator, "What about widgets?")
        .await
        .unwrap();

    match outcome {
        AskOutcome::Answered(result) => {
            assert_eq!(result.answer, "Widgets are described in the first article.");
            assert_eq!(result.sources, vec![url_a.to_string(), url_b.to_string()]);
        }
        other => panic!("expected Answered, got {other:?}"),
    }
    assert_eq!(generator.calls(), 1);
}
