use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of most-similar chunks forwarded to the generator.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai`, `ollama`, or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Texts per embedding API call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: Some("text-embedding-3-small".to_string()),
            dims: Some(1536),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `openai`, `ollama`, or `disabled`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: Some("gpt-4o-mini".to_string()),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
            max_retries: default_max_retries(),
            url: None,
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_generation_timeout() -> u64 {
    60
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Load and validate a config file.
///
/// `required` distinguishes an explicitly passed path (missing file is an
/// error) from the default path (missing file means built-in defaults).
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found: {}", path.display());
        }
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.fetch.timeout_secs == 0 {
        anyhow::bail!("fetch.timeout_secs must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.generation.is_enabled() && config.generation.model.is_none() {
        anyhow::bail!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        );
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.retrieval.top_k, 4);
    }

    #[test]
    fn missing_default_path_falls_back_to_defaults() {
        let config = load_config(Path::new("/nonexistent/sourcesense.toml"), false).unwrap();
        assert_eq!(config.index.path, PathBuf::from("./data/index.sqlite"));
    }

    #[test]
    fn missing_required_path_errors() {
        assert!(load_config(Path::new("/nonexistent/sourcesense.toml"), true).is_err());
    }

    #[test]
    fn rejects_zero_max_chars() {
        let config: Config = toml::from_str("[chunking]\nmax_chars = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_unknown_provider() {
        let config: Config =
            toml::from_str("[embedding]\nprovider = \"mystery\"\nmodel = \"m\"\ndims = 8\n")
                .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn enabled_embedding_requires_dims() {
        // When the [embedding] table is present, omitted fields do not
        // inherit the section defaults.
        let config: Config =
            toml::from_str("[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\n")
                .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn parses_full_config() {
        let toml_src = r#"
[index]
path = "/tmp/idx.sqlite"

[fetch]
timeout_secs = 5
user_agent = "Mozilla/5.0"

[chunking]
max_chars = 800

[retrieval]
top_k = 6

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 768
url = "http://localhost:11434"

[generation]
provider = "ollama"
model = "llama3.1"
temperature = 0.2
"#;
        let config: Config = toml::from_str(toml_src).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.chunking.max_chars, 800);
        assert_eq!(config.retrieval.top_k, 6);
        assert_eq!(config.embedding.dims, Some(768));
        assert_eq!(config.generation.model.as_deref(), Some("llama3.1"));
    }
}
