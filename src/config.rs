use crate::heuristics::PatternOptions;
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_path: PathBuf,
    pub extraction: PatternOptions,
    pub llm: LlmSection,
    pub server: ServerSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("storage/pdfs"),
            output_path: PathBuf::from("storage/output/extracted_data.csv"),
            extraction: PatternOptions::default(),
            llm: LlmSection::default(),
            server: ServerSection::default(),
        }
    }
}

/// Which extractor handles documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LlmBackend {
    /// Deterministic label/block matching, no service calls.
    #[default]
    Pattern,
    /// Hosted OpenAI-compatible completion API; needs an API key.
    Remote,
    /// Local Ollama server speaking the same API.
    Ollama,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub backend: LlmBackend,
    pub timeout_secs: u64,
    /// Invoice text beyond this many characters is not sent.
    pub max_chars: usize,
    pub remote: RemoteSection,
    pub ollama: OllamaSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            timeout_secs: 60,
            max_chars: 12_000,
            remote: RemoteSection::default(),
            ollama: OllamaSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaSection {
    pub base_url: String,
    pub model: String,
}

impl Default for OllamaSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "qwen2.5:7b".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Per uploaded PDF.
    pub max_file_bytes: usize,
    pub max_request_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_file_bytes: 10 * 1024 * 1024,
            max_request_bytes: 100 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load a TOML config file. A missing file means all defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// API key for the remote backend, read from the configured variable.
    pub fn llm_credentials(&self) -> Option<String> {
        std::env::var(&self.llm.remote.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}
