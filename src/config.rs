use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::storage::{BackendLocal, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

/// Vocabulary cap for the TF-IDF vectorizer
const DEFAULT_MAX_FEATURES: usize = 50_000;
/// Results at or below this cosine similarity are dropped
const DEFAULT_LEXICAL_THRESHOLD: f32 = 0.10;
const DEFAULT_LEXICAL_TOP_N: usize = 10;

const DEFAULT_SEMANTIC_MODEL: &str = "paraphrase-multilingual-mpnet-base-v2";
const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
const DEFAULT_COLLECTION: &str = "demo_collection";
const DEFAULT_SEMANTIC_TOP_K: usize = 25;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_COMMENTARY_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_COMMENTARY_MODEL: &str = "deepseek-r1-distill-llama-70b";
const DEFAULT_COMMENTARY_TEMPERATURE: f32 = 1.3;
const DEFAULT_COMMENTARY_MAX_TOKENS: u32 = 700;
const DEFAULT_COMMENTARY_TOP_K: usize = 2;

/// Environment variable holding the chat-completion API key
pub const COMMENTARY_API_KEY_ENV: &str = "CINESEEK_LLM_API_KEY";

/// Settings for the TF-IDF ranker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LexicalConfig {
    #[serde(default = "default_max_features")]
    pub max_features: usize,

    /// Hard relevance floor, exclusive
    #[serde(default = "default_lexical_threshold")]
    pub threshold: f32,

    #[serde(default = "default_lexical_top_n")]
    pub top_n: usize,

    /// Run queries through the same normalizer as titles and descriptions.
    /// Off by default: queries are only lowercased.
    #[serde(default)]
    pub normalize_query: bool,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            threshold: DEFAULT_LEXICAL_THRESHOLD,
            top_n: DEFAULT_LEXICAL_TOP_N,
            normalize_query: false,
        }
    }
}

/// Settings for embedding search against the vector index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SemanticConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Embedding model name (e.g., "paraphrase-multilingual-mpnet-base-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_semantic_top_k")]
    pub top_k: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: DEFAULT_SEMANTIC_MODEL.to_string(),
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            top_k: DEFAULT_SEMANTIC_TOP_K,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Settings for generated film commentary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommentaryConfig {
    #[serde(default)]
    pub enabled: bool,

    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_commentary_url")]
    pub api_url: String,

    #[serde(default = "default_commentary_model")]
    pub model: String,

    #[serde(default = "default_commentary_temperature")]
    pub temperature: f32,

    #[serde(default = "default_commentary_max_tokens")]
    pub max_tokens: u32,

    /// Number of films annotated per query
    #[serde(default = "default_commentary_top_k")]
    pub top_k: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for CommentaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: DEFAULT_COMMENTARY_URL.to_string(),
            model: DEFAULT_COMMENTARY_MODEL.to_string(),
            temperature: DEFAULT_COMMENTARY_TEMPERATURE,
            max_tokens: DEFAULT_COMMENTARY_MAX_TOKENS,
            top_k: DEFAULT_COMMENTARY_TOP_K,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Retry and circuit breaker settings shared by every remote backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive failed calls before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_image_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_image_timeout_secs(),
        }
    }
}

fn default_max_features() -> usize {
    DEFAULT_MAX_FEATURES
}

fn default_lexical_threshold() -> f32 {
    DEFAULT_LEXICAL_THRESHOLD
}

fn default_lexical_top_n() -> usize {
    DEFAULT_LEXICAL_TOP_N
}

fn default_semantic_model() -> String {
    DEFAULT_SEMANTIC_MODEL.to_string()
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_semantic_top_k() -> usize {
    DEFAULT_SEMANTIC_TOP_K
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_commentary_url() -> String {
    DEFAULT_COMMENTARY_URL.to_string()
}

fn default_commentary_model() -> String {
    DEFAULT_COMMENTARY_MODEL.to_string()
}

fn default_commentary_temperature() -> f32 {
    DEFAULT_COMMENTARY_TEMPERATURE
}

fn default_commentary_max_tokens() -> u32 {
    DEFAULT_COMMENTARY_MAX_TOKENS
}

fn default_commentary_top_k() -> usize {
    DEFAULT_COMMENTARY_TOP_K
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_image_timeout_secs() -> u64 {
    5
}

fn default_catalog_path() -> String {
    "films_data.csv".to_string()
}

fn default_vocabulary_path() -> String {
    "dict_filtr.json".to_string()
}

fn default_cache_dir() -> String {
    "tfidf_cache".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Movie catalog CSV, relative to the base path unless absolute
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Known filter values (genres, directors, actors, years, ratings)
    #[serde(default = "default_vocabulary_path")]
    pub vocabulary_path: String,

    /// Directory for the persisted TF-IDF artifacts
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default)]
    pub lexical: LexicalConfig,
    #[serde(default)]
    pub semantic: SemanticConfig,
    #[serde(default)]
    pub commentary: CommentaryConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub images: ImagesConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            vocabulary_path: default_vocabulary_path(),
            cache_dir: default_cache_dir(),
            lexical: LexicalConfig::default(),
            semantic: SemanticConfig::default(),
            commentary: CommentaryConfig::default(),
            resilience: ResilienceConfig::default(),
            images: ImagesConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

/// Base directory for config, catalog and caches.
///
/// `CINESEEK_BASE_PATH` wins; otherwise `~/.local/share/cineseek`.
pub fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("CINESEEK_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .context("Could not determine home directory")?
        .context("Home directory path is empty")?;
    Ok(home.join(".local").join("share").join("cineseek"))
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let lex = &self.lexical;
        if lex.max_features == 0 {
            bail!("lexical.max_features must be greater than 0");
        }
        if !(0.0..1.0).contains(&lex.threshold) {
            bail!(
                "lexical.threshold must be in [0.0, 1.0), got {}",
                lex.threshold
            );
        }
        if lex.top_n == 0 {
            bail!("lexical.top_n must be greater than 0");
        }

        if self.semantic.top_k == 0 {
            bail!("semantic.top_k must be greater than 0");
        }
        if self.semantic.request_timeout_secs == 0 {
            bail!("semantic.request_timeout_secs must be greater than 0");
        }

        let com = &self.commentary;
        if !(0.0..=2.0).contains(&com.temperature) {
            bail!(
                "commentary.temperature must be in [0.0, 2.0], got {}",
                com.temperature
            );
        }
        if com.max_tokens == 0 {
            bail!("commentary.max_tokens must be greater than 0");
        }

        let res = &self.resilience;
        if res.max_attempts == 0 {
            bail!("resilience.max_attempts must be greater than 0");
        }
        if res.failure_threshold == 0 {
            bail!("resilience.failure_threshold must be greater than 0");
        }
        if res.initial_backoff_ms > res.max_backoff_ms {
            bail!("resilience.initial_backoff_ms must not exceed resilience.max_backoff_ms");
        }

        if self.images.timeout_secs == 0 {
            bail!("images.timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Loads `config.yaml` from `base_path`, writing defaults on first run.
    pub fn load_with(base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base_path = base_path.as_ref();
        let store = BackendLocal::new(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;

        if !store.exists(CONFIG_FILE) {
            log::info!("Writing default config to {}", base_path.display());
            let default = serde_yml::to_string(&Self::default())?;
            store.write(CONFIG_FILE, default.as_bytes())?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE)?)
            .context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case new fields were added since the file was written
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = BackendLocal::new(&self.base_path)?;
        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    /// Config rooted at `base_path` without touching the filesystem.
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn catalog_file(&self) -> PathBuf {
        self.resolve(&self.catalog_path)
    }

    pub fn vocabulary_file(&self) -> PathBuf {
        self.resolve(&self.vocabulary_path)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.resolve(&self.cache_dir)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}
