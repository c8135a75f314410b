//! KGX Core - Data model, collaborator traits, and shared types
//!
//! This crate defines the core abstractions used throughout KGX:
//! - Token and coreference models consumed by the rewriter
//! - Entity and relation records produced by the extraction pipeline
//! - Common error types
//! - Traits for the external collaborators (linker, classifier, coref, splitter)
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ClassifierConfig, ClassifierKind, ConfigError, CorefConfig, CorefKind,
    EntityClassConfig, LinkerConfig, PipelineConfig, RelationEndpoint, SentenceErrorPolicy,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for KGX operations
#[derive(Error, Debug)]
pub enum KgxError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Entity linker error: {0}")]
    LinkerError(String),

    #[error("Relation classifier error: {0}")]
    ClassifierError(String),

    #[error("Coreference error: {0}")]
    CorefError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, KgxError>;

// ============================================================================
// Tokens and Coreference
// ============================================================================

/// A token of a coreference-annotated document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Position in the owning token sequence
    pub index: usize,
    /// Surface text
    pub text: String,
    /// Whitespace following the token (may be empty)
    pub whitespace: String,
}

impl Token {
    pub fn new(index: usize, text: impl Into<String>, whitespace: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            whitespace: whitespace.into(),
        }
    }

    /// Text followed by its trailing whitespace
    pub fn text_with_ws(&self) -> String {
        format!("{}{}", self.text, self.whitespace)
    }
}

/// Token interval `[start, end)` of a mention within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MentionSpan {
    pub start: usize,
    pub end: usize,
}

impl MentionSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &MentionSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Mentions referring to the same entity, one of them representative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreferenceCluster {
    main: MentionSpan,
    mentions: Vec<MentionSpan>,
}

impl CoreferenceCluster {
    /// Create a cluster; the representative must be one of the mentions
    pub fn new(main: MentionSpan, mentions: Vec<MentionSpan>) -> Result<Self> {
        if !mentions.contains(&main) {
            return Err(KgxError::CorefError(format!(
                "representative mention {}..{} is not a member of its cluster",
                main.start, main.end
            )));
        }
        Ok(Self { main, mentions })
    }

    /// Representative ("canonical") mention
    pub fn main(&self) -> MentionSpan {
        self.main
    }

    /// All mentions, the representative included
    pub fn mentions(&self) -> &[MentionSpan] {
        &self.mentions
    }
}

/// Tokenized document with its coreference clusters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorefDocument {
    pub tokens: Vec<Token>,
    pub clusters: Vec<CoreferenceCluster>,
}

impl CorefDocument {
    pub fn new(tokens: Vec<Token>, clusters: Vec<CoreferenceCluster>) -> Self {
        Self { tokens, clusters }
    }

    /// Original text, reconstructed from the tokens
    pub fn text(&self) -> String {
        self.tokens.iter().map(Token::text_with_ws).collect()
    }
}

// ============================================================================
// Entities and Relations
// ============================================================================

/// Character interval `[start, end)` within a sentence.
///
/// Offsets count `char`s, not bytes. Inclusive ranges reported by external
/// services are converted once, where they enter the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Build from an inclusive `[start, last]` range; the end saturates
    pub fn from_inclusive(start: usize, last: usize) -> Self {
        Self {
            start,
            end: last.saturating_add(1),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Semantic label assigned to a linked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityLabel {
    Person,
    Organization,
    Location,
}

impl EntityLabel {
    /// Labels in assignment priority order
    pub const PRIORITY: [EntityLabel; 3] = [Self::Person, Self::Organization, Self::Location];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "Person",
            Self::Organization => "Organization",
            Self::Location => "Location",
        }
    }
}

impl std::fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityLabel {
    type Err = KgxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "person" => Ok(Self::Person),
            "organization" | "organisation" => Ok(Self::Organization),
            "location" => Ok(Self::Location),
            _ => Err(KgxError::ValidationError(format!("unknown entity label: {s}"))),
        }
    }
}

/// Annotation returned by an entity linker, before filtering
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedAnnotation {
    /// Canonical title (e.g. Wikipedia page title)
    pub title: String,
    /// Knowledge-base identifier, if the linker resolved one
    pub id: Option<String>,
    /// Semantic class labels
    pub classes: Vec<String>,
    /// Where the entity occurs in the linked text
    pub spans: Vec<Span>,
}

/// Entity found in a single sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMention {
    pub title: String,
    pub id: String,
    pub label: Option<EntityLabel>,
    pub spans: Vec<Span>,
}

impl EntityMention {
    /// The deduplication record of this mention
    pub fn record(&self) -> EntityRecord {
        EntityRecord {
            title: self.title.clone(),
            id: self.id.clone(),
            label: self.label,
        }
    }
}

/// Entity as it appears in an extraction result
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRecord {
    pub title: String,
    pub id: String,
    pub label: Option<EntityLabel>,
}

/// Directed, typed relation between two entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: String,
}

impl Relation {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_type: relation_type.into(),
        }
    }
}

/// Label and confidence returned by a relation classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub score: f32,
}

/// Deduplicated entities and relations of one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: BTreeSet<EntityRecord>,
    pub relations: BTreeSet<Relation>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

/// Parameters of a single extraction run
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub text: String,
    pub entity_threshold: f32,
    pub relation_threshold: f32,
    /// Rewrite coreferent mentions before linking
    pub coref: bool,
}

impl ExtractionRequest {
    /// Request with the thresholds and coref flag taken from `config`
    pub fn new(text: impl Into<String>, config: &PipelineConfig) -> Self {
        Self {
            text: text.into(),
            entity_threshold: config.entity_threshold,
            relation_threshold: config.relation_threshold,
            coref: config.coref,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(KgxError::ValidationError("Missing text parameter".to_string()));
        }
        validate_threshold("entities_threshold", self.entity_threshold)?;
        validate_threshold("relation_threshold", self.relation_threshold)?;
        Ok(())
    }
}

/// Check that a confidence threshold is a number within [0, 1]
pub fn validate_threshold(name: &str, value: f32) -> Result<f32> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(KgxError::ValidationError(format!(
            "{name} must be between 0 and 1, got {value}"
        )))
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Entity linking service
#[async_trait::async_trait]
pub trait EntityLinker: Send + Sync {
    /// Annotate `text`, keeping links whose confidence exceeds `threshold`
    async fn annotate(&self, text: &str, threshold: f32) -> Result<Vec<LinkedAnnotation>>;

    /// Get linker name for logging
    fn name(&self) -> &str;
}

/// Relation classification model
#[async_trait::async_trait]
pub trait RelationClassifier: Send + Sync {
    /// Classify the relation from `head` to `tail` within `text`
    async fn classify(&self, text: &str, head: Span, tail: Span) -> Result<Classification>;

    /// Get classifier name for logging
    fn name(&self) -> &str;
}

/// Coreference resolution model
#[async_trait::async_trait]
pub trait CorefClusterer: Send + Sync {
    /// Tokenize `text` and cluster its coreferent mentions
    async fn resolve(&self, text: &str) -> Result<CorefDocument>;

    /// Get clusterer name for logging
    fn name(&self) -> &str;
}

/// Sentence boundary detection
pub trait SentenceSplitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

// ============================================================================
// Tests
// ============================================================================
