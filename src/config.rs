use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::index::DEFAULT_COLLECTION;

/// Default embedding model, matching the original corpus.
const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
/// Default number of results per query
const DEFAULT_LIMIT: usize = 5;
/// Default cosine-distance threshold for filtering results
const DEFAULT_THRESHOLD: f32 = 0.5;
/// Default Gmail label to ingest from
const DEFAULT_LABEL: &str = "INBOX";
/// Default number of messages fetched per ingest run
const DEFAULT_INGEST_LIMIT: usize = 10;

const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";

/// Configuration for the generation model endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }
}

/// Configuration for the Gmail connector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GmailConfig {
    /// Path to the token file the OAuth flow produced.
    #[serde(default = "default_token_path")]
    pub token_path: String,

    #[serde(default = "default_label")]
    pub default_label: String,

    #[serde(default = "default_ingest_limit")]
    pub default_limit: usize,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
            default_label: DEFAULT_LABEL.to_string(),
            default_limit: DEFAULT_INGEST_LIMIT,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Named collection queries and ingests run against.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Embedding model name (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Default maximum results per query
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Default cosine-distance threshold [0.0, 2.0]; results at or above
    /// it are filtered out
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub gmail: GmailConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            embedding_model: default_embedding_model(),
            default_limit: DEFAULT_LIMIT,
            default_threshold: DEFAULT_THRESHOLD,
            ollama: OllamaConfig::default(),
            gmail: GmailConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_token_path() -> String {
    "token.json".to_string()
}

fn default_label() -> String {
    DEFAULT_LABEL.to_string()
}

fn default_ingest_limit() -> usize {
    DEFAULT_INGEST_LIMIT
}

fn default_ollama_endpoint() -> String {
    DEFAULT_OLLAMA_ENDPOINT.to_string()
}

fn default_ollama_model() -> String {
    DEFAULT_OLLAMA_MODEL.to_string()
}

impl Config {
    /// Resolve the data directory: `MAILRAG_DATA_DIR` if set, otherwise
    /// `~/.mailrag`.
    pub fn default_base_path() -> anyhow::Result<PathBuf> {
        if let Ok(dir) = std::env::var("MAILRAG_DATA_DIR") {
            return Ok(PathBuf::from(dir));
        }

        let home = homedir::my_home()
            .context("failed to resolve home directory")?
            .context("no home directory for current user")?;
        Ok(home.join(".mailrag"))
    }

    /// Load the config from `<base_path>/config.yaml`, creating it with
    /// defaults on first run.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create data directory {base_path:?}"))?;

        let config_path = base_path.join("config.yaml");

        if !config_path.exists() {
            let default = serde_yml::to_string(&Self::default())?;
            std::fs::write(&config_path, default)?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {config_path:?}"))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("config {config_path:?} is malformed"))?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = self.base_path.join("config.yaml");
        std::fs::write(&config_path, serde_yml::to_string(self)?)?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.collection.is_empty() {
            bail!("collection name must not be empty");
        }

        // cosine distance ranges over [0.0, 2.0]
        if !(0.0..=2.0).contains(&self.default_threshold) {
            bail!(
                "default_threshold must be between 0.0 and 2.0, got {}",
                self.default_threshold
            );
        }

        if self.default_limit == 0 {
            bail!("default_limit must be greater than 0");
        }

        if self.gmail.default_limit == 0 {
            bail!("gmail.default_limit must be greater than 0");
        }

        Ok(())
    }
}
