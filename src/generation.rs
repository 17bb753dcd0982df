//! Answer generation backend abstraction and implementations.
//!
//! An [`AnswerGenerator`] receives the question and the retrieved chunks
//! (each carrying its source URL) and returns a synthesized answer plus
//! the sources it reports having used. The contract with the model is
//! plain text: answer first, then a `SOURCES:` line listing the URLs it
//! drew on. [`parse_generated`] splits the two apart and deduplicates the
//! citations.
//!
//! Two backends are provided, in the same request/retry idiom as the
//! embedding providers: [`OpenAiGenerator`] (chat completions) and
//! [`OllamaGenerator`] (`/api/chat`).

use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::AnswerError;
use crate::models::RetrievedChunk;

/// What the generation backend produced, before any source filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub answer: String,
    /// Source URLs the backend reported using, deduplicated in
    /// first-seen order. May be empty.
    pub sources: Vec<String>,
}

/// Capability for turning a question plus retrieved context into an
/// answer. Injected into the ask pipeline so tests can substitute a fake.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        context: &[RetrievedChunk],
    ) -> Result<GeneratedAnswer, AnswerError>;
}

/// Instantiate the generator named by the configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn AnswerGenerator>, AnswerError> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        "disabled" => Err(AnswerError::Disabled),
        other => Err(AnswerError::MalformedResponse(format!(
            "unknown generation provider: {other}"
        ))),
    }
}

const SYSTEM_PROMPT: &str = "You answer questions using only the provided source excerpts. \
If the excerpts do not contain the answer, say that you do not know. \
After the answer, finish with a final line that starts with \"SOURCES:\" \
followed by the URLs of the excerpts you actually used, one per line. \
If you used none, write \"SOURCES:\" with nothing after it.";

/// Render the question and retrieved chunks into the user message.
pub fn build_user_prompt(question: &str, context: &[RetrievedChunk]) -> String {
    let mut prompt = format!("Question: {question}\n\nExcerpts:\n");
    for (i, chunk) in context.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[{}] Source: {}\n{}\n",
            i + 1,
            chunk.source,
            chunk.text
        ));
    }
    prompt
}

/// Split a model response into answer text and cited sources.
///
/// The answer is everything before the last `SOURCES:` marker; the
/// sources are the non-empty lines after it, deduplicated in first-seen
/// order. A response with no answer text at all is malformed; a missing
/// `SOURCES:` section is a valid answer with no citations.
pub fn parse_generated(content: &str) -> Result<GeneratedAnswer, AnswerError> {
    const MARKER: &str = "SOURCES:";

    let (answer_part, sources_part) = match content.rfind(MARKER) {
        Some(pos) => (&content[..pos], &content[pos + MARKER.len()..]),
        None => (content, ""),
    };

    let answer = answer_part.trim().to_string();
    if answer.is_empty() {
        return Err(AnswerError::MalformedResponse(
            "response contains no answer text".to_string(),
        ));
    }

    let mut sources: Vec<String> = Vec::new();
    for piece in sources_part.split(['\n', ',']) {
        let url = piece.trim().trim_start_matches('-').trim();
        if url.is_empty() {
            continue;
        }
        if !sources.iter().any(|s| s == url) {
            sources.push(url.to_string());
        }
    }

    Ok(GeneratedAnswer { answer, sources })
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

fn required_model(config: &GenerationConfig) -> Result<String, AnswerError> {
    config
        .model
        .clone()
        .ok_or_else(|| AnswerError::MalformedResponse("generation.model not set".to_string()))
}

// ============ OpenAI ============

/// Generator backed by the OpenAI chat completions API. Requires
/// `OPENAI_API_KEY`.
pub struct OpenAiGenerator {
    model: String,
    temperature: f64,
    max_tokens: u32,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, AnswerError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| AnswerError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: required_model(config)?,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }

    async fn complete(&self, user_prompt: &str) -> Result<String, AnswerError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt },
            ],
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return extract_openai_content(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(attempt, %status, "generation request failed, retrying");
                        last_err = Some(format!("{status}: {body_text}"));
                        continue;
                    }

                    return Err(AnswerError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "generation request error, retrying");
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(AnswerError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: last_err.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

fn extract_openai_content(json: &serde_json::Value) -> Result<String, AnswerError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            AnswerError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        question: &str,
        context: &[RetrievedChunk],
    ) -> Result<GeneratedAnswer, AnswerError> {
        let content = self.complete(&build_user_prompt(question, context)).await?;
        parse_generated(&content)
    }
}

// ============ Ollama ============

/// Generator backed by a local Ollama instance
/// (default `http://localhost:11434`).
pub struct OllamaGenerator {
    model: String,
    temperature: f64,
    max_tokens: u32,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, AnswerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: required_model(config)?,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client,
            max_retries: config.max_retries,
        })
    }

    async fn complete(&self, user_prompt: &str) -> Result<String, AnswerError> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt },
            ],
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/chat", self.url))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return extract_ollama_content(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(attempt, %status, "generation request failed, retrying");
                        last_err = Some(format!("{status}: {body_text}"));
                        continue;
                    }

                    return Err(AnswerError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        url = %self.url,
                        "generation request error (is Ollama running?), retrying"
                    );
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(AnswerError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: last_err.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

fn extract_ollama_content(json: &serde_json::Value) -> Result<String, AnswerError> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| AnswerError::MalformedResponse("missing message.content".to_string()))
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn generate(
        &self,
        question: &str,
        context: &[RetrievedChunk],
    ) -> Result<GeneratedAnswer, AnswerError> {
        let content = self.complete(&build_user_prompt(question, context)).await?;
        parse_generated(&content)
    }
}
