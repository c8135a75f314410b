//! KGX Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Entity linker (Wikifier) configuration
    pub linker: LinkerConfig,

    /// Relation classifier configuration
    pub classifier: ClassifierConfig,

    /// Coreference service configuration
    pub coref: CorefConfig,

    /// Extraction defaults
    pub pipeline: PipelineConfig,

    /// Semantic classes kept by the sentence processor
    pub entities: EntityClassConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            config.server.port = parse_var("API_PORT", port)?;
        }

        // Entity linker
        if let Ok(url) = std::env::var("WIKIFIER_URL") {
            config.linker.url = url;
        }
        if let Ok(key) = std::env::var("WIKIFIER_USER_KEY") {
            config.linker.user_key = key;
        }
        if let Ok(lang) = std::env::var("WIKIFIER_LANG") {
            config.linker.lang = lang;
        }
        if let Ok(secs) = std::env::var("WIKIFIER_TIMEOUT_SECS") {
            config.linker.timeout_secs = parse_var("WIKIFIER_TIMEOUT_SECS", secs)?;
        }

        // Relation classifier
        if let Ok(kind) = std::env::var("CLASSIFIER_KIND") {
            config.classifier.kind = kind.parse()?;
        }
        if let Ok(url) = std::env::var("CLASSIFIER_URL") {
            config.classifier.url = url;
        }

        // Coreference
        if let Ok(kind) = std::env::var("COREF_KIND") {
            config.coref.kind = kind.parse()?;
        }
        if let Ok(url) = std::env::var("COREF_URL") {
            config.coref.url = url;
        }

        // Pipeline
        if let Ok(endpoint) = std::env::var("RELATION_ENDPOINT") {
            config.pipeline.relation_endpoint = endpoint.parse()?;
        }
        if let Ok(policy) = std::env::var("ON_SENTENCE_ERROR") {
            config.pipeline.on_sentence_error = policy.parse()?;
        }

        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        config.pipeline.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = Self::default();

        // Only override if env values differ from defaults
        if env_config.server.host != defaults.server.host {
            self.server.host = env_config.server.host;
        }
        if env_config.server.port != defaults.server.port {
            self.server.port = env_config.server.port;
        }
        if env_config.linker.url != defaults.linker.url {
            self.linker.url = env_config.linker.url;
        }
        if env_config.linker.lang != defaults.linker.lang {
            self.linker.lang = env_config.linker.lang;
        }
        if env_config.classifier.url != defaults.classifier.url {
            self.classifier.url = env_config.classifier.url;
        }
        if env_config.coref.url != defaults.coref.url {
            self.coref.url = env_config.coref.url;
        }
        if env_config.linker.timeout_secs != defaults.linker.timeout_secs {
            self.linker.timeout_secs = env_config.linker.timeout_secs;
        }
        if env_config.classifier.kind != defaults.classifier.kind {
            self.classifier.kind = env_config.classifier.kind;
        }
        if env_config.coref.kind != defaults.coref.kind {
            self.coref.kind = env_config.coref.kind;
        }
        if env_config.pipeline.relation_endpoint != defaults.pipeline.relation_endpoint {
            self.pipeline.relation_endpoint = env_config.pipeline.relation_endpoint;
        }
        if env_config.pipeline.on_sentence_error != defaults.pipeline.on_sentence_error {
            self.pipeline.on_sentence_error = env_config.pipeline.on_sentence_error;
        }
        if !env_config.server.cors_origins.is_empty() {
            self.server.cors_origins = env_config.server.cors_origins;
        }
        if env_config.logging.level != defaults.logging.level {
            self.logging.level = env_config.logging.level;
        }

        // Always use env for the service key
        if !env_config.linker.user_key.is_empty() {
            self.linker.user_key = env_config.linker.user_key;
        }

        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_enabled: true,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Wikifier entity linker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Base URL of the Wikifier service
    pub url: String,

    /// Wikifier user key
    pub user_key: String,

    /// Document language
    pub lang: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Ignore the most frequent words when linking
    pub n_top_df_values_to_ignore: u32,

    /// Ignore words from the built-in stop list
    pub n_words_to_ignore_from_list: u32,

    /// Minimum link frequency of a mention
    pub min_link_frequency: u32,

    /// Mentions with higher entropy are not linked
    pub max_mention_entropy: f32,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            url: "http://www.wikifier.org".to_string(),
            user_key: String::new(),
            lang: "en".to_string(),
            timeout_secs: 60,
            n_top_df_values_to_ignore: 100,
            n_words_to_ignore_from_list: 100,
            min_link_frequency: 2,
            max_mention_entropy: 3.0,
        }
    }
}

/// Relation classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Which classifier to use
    pub kind: ClassifierKind,

    /// Inference server URL (for `http`)
    pub url: String,

    /// Model served by the inference server
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::Http,
            url: "http://localhost:8000".to_string(),
            model: "wiki80_cnn_softmax".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Supported relation classifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// OpenNRE-compatible inference server
    Http,
    /// Built-in keyword rules
    Rules,
}

impl std::str::FromStr for ClassifierKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "rules" => Ok(Self::Rules),
            _ => Err(ConfigError::InvalidValue {
                key: "CLASSIFIER_KIND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Coreference service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorefConfig {
    /// Which clusterer to use
    pub kind: CorefKind,

    /// Coreference server URL (for `http`)
    pub url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CorefConfig {
    fn default() -> Self {
        Self {
            kind: CorefKind::Http,
            url: "http://localhost:8001".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Supported coreference clusterers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorefKind {
    /// Remote coreference server
    Http,
    /// Tokenize only, never produce clusters
    None,
}

impl std::str::FromStr for CorefKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "none" => Ok(Self::None),
            _ => Err(ConfigError::InvalidValue {
                key: "COREF_KIND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Extraction defaults and policies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum linker confidence for an entity
    pub entity_threshold: f32,

    /// Relations must score strictly above this
    pub relation_threshold: f32,

    /// Rewrite coreferent mentions before linking
    pub coref: bool,

    /// How relation endpoints identify entities
    pub relation_endpoint: RelationEndpoint,

    /// What to do when a sentence fails
    pub on_sentence_error: SentenceErrorPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            entity_threshold: 0.9,
            relation_threshold: 0.2,
            coref: true,
            relation_endpoint: RelationEndpoint::Id,
            on_sentence_error: SentenceErrorPolicy::Abort,
        }
    }
}

impl PipelineConfig {
    /// Check that both thresholds lie within [0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("entity_threshold", self.entity_threshold),
            ("relation_threshold", self.relation_threshold),
        ] {
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Identity used for relation source/target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationEndpoint {
    /// Knowledge-base identifier
    Id,
    /// Canonical title
    Title,
}

impl std::str::FromStr for RelationEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "title" => Ok(Self::Title),
            _ => Err(ConfigError::InvalidValue {
                key: "RELATION_ENDPOINT".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Behaviour when linking or classifying a sentence fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentenceErrorPolicy {
    /// Fail the whole request
    Abort,
    /// Log and continue with the next sentence
    Skip,
}

impl std::str::FromStr for SentenceErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            _ => Err(ConfigError::InvalidValue {
                key: "ON_SENTENCE_ERROR".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Semantic class groups used to filter and label linked entities.
///
/// Class names are compared case-insensitively against the linker's
/// class labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityClassConfig {
    pub person: Vec<String>,
    pub organization: Vec<String>,
    pub location: Vec<String>,
    /// Kept, but left without a label
    pub other: Vec<String>,
}

impl Default for EntityClassConfig {
    fn default() -> Self {
        fn strings(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            person: strings(&["human", "person", "fictional human", "fictional character"]),
            organization: strings(&[
                "organization",
                "business",
                "company",
                "enterprise",
                "public company",
                "nonprofit organization",
                "university",
                "political party",
                "government agency",
            ]),
            location: strings(&[
                "location",
                "geographic location",
                "country",
                "sovereign state",
                "city",
                "big city",
                "human settlement",
                "capital",
                "state",
                "region",
            ]),
            other: strings(&["event", "product"]),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<ConfigError> for crate::KgxError {
    fn from(err: ConfigError) -> Self {
        crate::KgxError::ConfigError(err.to_string())
    }
}
