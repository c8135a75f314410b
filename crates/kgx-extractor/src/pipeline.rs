//! Extraction pipeline
//!
//! Sequences coreference rewriting, sentence segmentation, entity linking
//! and pair classification, and aggregates the per-sentence output into a
//! deduplicated [`ExtractionResult`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::coref::{rewrite_with_report, HttpCorefClient, NoopCoref, RewriteReport};
use crate::entity::{strip_punctuation, ClassFilter, SentenceProcessor};
use crate::linker::WikifierClient;
use crate::relation::{OpenNreClient, PairExtractor, RuleBasedClassifier};
use crate::sentence::RuleBasedSplitter;
use kgx_core::{
    AppConfig, ClassifierKind, CorefClusterer, CorefKind, EntityClassConfig, EntityLinker,
    EntityMention, EntityRecord, ExtractionRequest, ExtractionResult, PipelineConfig, Relation,
    RelationClassifier, Result, SentenceErrorPolicy, SentenceSplitter,
};

// ============================================================================
// Collaborators
// ============================================================================

/// External systems the pipeline depends on
#[derive(Clone)]
pub struct Collaborators {
    pub coref: Arc<dyn CorefClusterer>,
    pub splitter: Arc<dyn SentenceSplitter>,
    pub linker: Arc<dyn EntityLinker>,
    pub classifier: Arc<dyn RelationClassifier>,
}

impl Collaborators {
    /// Create the configured clients
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let coref: Arc<dyn CorefClusterer> = match config.coref.kind {
            CorefKind::Http => Arc::new(HttpCorefClient::from_config(&config.coref)?),
            CorefKind::None => Arc::new(NoopCoref),
        };

        let classifier: Arc<dyn RelationClassifier> = match config.classifier.kind {
            ClassifierKind::Http => Arc::new(OpenNreClient::from_config(&config.classifier)?),
            ClassifierKind::Rules => Arc::new(RuleBasedClassifier::new()),
        };

        Ok(Self {
            coref,
            splitter: Arc::new(RuleBasedSplitter::new()),
            linker: Arc::new(WikifierClient::from_config(&config.linker)?),
            classifier,
        })
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Per-request counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    /// Sentences sent to the linker
    pub sentences: usize,
    /// Sentences dropped after a failure (skip policy only)
    pub skipped_sentences: usize,
    /// Coreferent mentions rewritten
    pub rewrites: usize,
    /// Entities kept before deduplication
    pub linked_entities: usize,
    pub classifier_calls: usize,
    /// Relations kept before deduplication
    pub relations: usize,
}

/// Collects entities and relations with set semantics over full records
#[derive(Debug, Default)]
pub struct ExtractionAccumulator {
    entities: BTreeSet<EntityRecord>,
    relations: BTreeSet<Relation>,
}

impl ExtractionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entities(&mut self, mentions: &[EntityMention]) {
        self.entities.extend(mentions.iter().map(EntityMention::record));
    }

    pub fn add_relations(&mut self, relations: impl IntoIterator<Item = Relation>) {
        self.relations.extend(relations);
    }

    pub fn finish(self) -> ExtractionResult {
        ExtractionResult {
            entities: self.entities,
            relations: self.relations,
        }
    }
}

/// Entities and relations of one sentence
#[derive(Debug, Clone, Default)]
pub struct SentenceExtraction {
    pub entities: Vec<EntityMention>,
    pub relations: Vec<Relation>,
    pub classifier_calls: usize,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Coreference-aware knowledge graph extraction
pub struct ExtractionPipeline {
    coref: Arc<dyn CorefClusterer>,
    splitter: Arc<dyn SentenceSplitter>,
    processor: SentenceProcessor,
    pairs: PairExtractor,
    on_sentence_error: SentenceErrorPolicy,
}

impl ExtractionPipeline {
    pub fn new(
        collaborators: Collaborators,
        pipeline: &PipelineConfig,
        classes: &EntityClassConfig,
    ) -> Self {
        Self {
            coref: collaborators.coref,
            splitter: collaborators.splitter,
            processor: SentenceProcessor::new(
                collaborators.linker,
                ClassFilter::from_config(classes),
            ),
            pairs: PairExtractor::new(collaborators.classifier, pipeline.relation_endpoint),
            on_sentence_error: pipeline.on_sentence_error,
        }
    }

    /// Build the pipeline and its clients from config
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let collaborators = Collaborators::from_config(config)?;
        tracing::info!(
            coref = collaborators.coref.name(),
            linker = collaborators.linker.name(),
            classifier = collaborators.classifier.name(),
            "Extraction pipeline configured"
        );
        Ok(Self::new(collaborators, &config.pipeline, &config.entities))
    }

    /// Replace coreferent mentions in `text` by their representative
    pub async fn resolve_coreferences(&self, text: &str) -> Result<(String, RewriteReport)> {
        let doc = self.coref.resolve(text).await?;
        Ok(rewrite_with_report(&doc.tokens, &doc.clusters))
    }

    pub fn split_sentences(&self, text: &str) -> Vec<String> {
        self.splitter.split(text)
    }

    /// Link and pair the entities of one punctuation-free sentence
    pub async fn process_sentence(
        &self,
        sentence: &str,
        request: &ExtractionRequest,
    ) -> Result<SentenceExtraction> {
        let entities = self
            .processor
            .extract_entities(sentence, request.entity_threshold)
            .await?;
        let classifier_calls = self.pairs.planned_calls(&entities);
        let relations = self
            .pairs
            .extract_relations(sentence, &entities, request.relation_threshold)
            .await?;

        Ok(SentenceExtraction {
            entities,
            relations,
            classifier_calls,
        })
    }

    /// Extract the deduplicated entities and relations of a document
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult> {
        self.extract_with_stats(request).await.map(|(result, _)| result)
    }

    /// Like [`extract`](Self::extract), also returning request counters
    pub async fn extract_with_stats(
        &self,
        request: &ExtractionRequest,
    ) -> Result<(ExtractionResult, ExtractionStats)> {
        request.validate()?;
        let span = tracing::info_span!("extract", request_id = %Uuid::new_v4());
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &ExtractionRequest) -> Result<(ExtractionResult, ExtractionStats)> {
        let started = Instant::now();
        let mut stats = ExtractionStats::default();

        let text = if request.coref {
            let (text, report) = self.resolve_coreferences(&request.text).await?;
            if report.conflicts > 0 {
                tracing::warn!(conflicts = report.conflicts, "Coreference rewrites overlapped");
            }
            stats.rewrites = report.rewritten.len();
            tracing::debug!(text = %text, rewrites = stats.rewrites, "Coreferences resolved");
            text
        } else {
            request.text.clone()
        };

        let mut accumulator = ExtractionAccumulator::new();
        for raw in self.split_sentences(&text) {
            let sentence = strip_punctuation(&raw);
            if sentence.trim().is_empty() {
                continue;
            }
            stats.sentences += 1;

            match self.process_sentence(&sentence, request).await {
                Ok(extraction) => {
                    stats.linked_entities += extraction.entities.len();
                    stats.classifier_calls += extraction.classifier_calls;
                    stats.relations += extraction.relations.len();
                    accumulator.add_entities(&extraction.entities);
                    accumulator.add_relations(extraction.relations);
                }
                Err(err) => match self.on_sentence_error {
                    SentenceErrorPolicy::Abort => return Err(err),
                    SentenceErrorPolicy::Skip => {
                        tracing::warn!(error = %err, sentence = %sentence, "Skipping sentence");
                        stats.skipped_sentences += 1;
                    }
                },
            }
        }

        let result = accumulator.finish();
        tracing::info!(
            sentences = stats.sentences,
            skipped = stats.skipped_sentences,
            classifier_calls = stats.classifier_calls,
            entities = result.entities.len(),
            relations = result.relations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extraction complete"
        );

        Ok((result, stats))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DictionaryLinker, PairTableClassifier, PhraseCoref};
    use kgx_core::{EntityLabel, KgxError, Span};

    fn build(
        linker: Arc<DictionaryLinker>,
        classifier: Arc<PairTableClassifier>,
        coref: PhraseCoref,
        policy: SentenceErrorPolicy,
    ) -> ExtractionPipeline {
        let pipeline = PipelineConfig {
            on_sentence_error: policy,
            ..Default::default()
        };
        ExtractionPipeline::new(
            Collaborators {
                coref: Arc::new(coref),
                splitter: Arc::new(RuleBasedSplitter::new()),
                linker,
                classifier,
            },
            &pipeline,
            &EntityClassConfig::default(),
        )
    }

    fn people_linker() -> DictionaryLinker {
        DictionaryLinker::new()
            .with_entity("Alice", "Alice", "Q1", &["human"])
            .with_entity("Bob", "Bob", "Q2", &["human"])
            .with_entity("Acme", "Acme Corporation", "Q3", &["business"])
    }

    fn request(text: &str, coref: bool) -> ExtractionRequest {
        ExtractionRequest {
            text: text.to_string(),
            entity_threshold: 0.9,
            relation_threshold: 0.2,
            coref,
        }
    }

    fn record(title: &str, id: &str, label: EntityLabel) -> EntityRecord {
        EntityRecord {
            title: title.to_string(),
            id: id.to_string(),
            label: Some(label),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_with_coreference() {
        let linker = Arc::new(people_linker());
        let classifier =
            Arc::new(PairTableClassifier::new().with_pair("Alice", "Acme", "founder of", 0.9));
        let pipeline = build(
            linker.clone(),
            classifier.clone(),
            PhraseCoref::new().with_cluster(&["Alice", "She"]),
            SentenceErrorPolicy::Abort,
        );

        let (result, stats) = pipeline
            .extract_with_stats(&request("Alice founded Acme. She is the CEO.", true))
            .await
            .unwrap();

        assert_eq!(linker.seen(), vec!["Alice founded Acme", "Alice is the CEO"]);
        assert!(result
            .entities
            .contains(&record("Alice", "Q1", EntityLabel::Person)));
        assert!(result
            .entities
            .contains(&record("Acme Corporation", "Q3", EntityLabel::Organization)));
        assert_eq!(result.entities.len(), 2);
        assert!(result
            .relations
            .contains(&Relation::new("Q1", "Q3", "founder of")));
        assert_eq!(result.relations.len(), 1);

        assert_eq!(stats.sentences, 2);
        assert_eq!(stats.rewrites, 1);
        assert_eq!(stats.classifier_calls, 2);
        assert_eq!(classifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_coreference_disabled() {
        let linker = Arc::new(people_linker());
        let pipeline = build(
            linker.clone(),
            Arc::new(PairTableClassifier::new()),
            PhraseCoref::new().with_cluster(&["Alice", "She"]),
            SentenceErrorPolicy::Abort,
        );

        pipeline
            .extract(&request("Alice founded Acme. She is the CEO.", false))
            .await
            .unwrap();

        assert_eq!(linker.seen(), vec!["Alice founded Acme", "She is the CEO"]);
    }

    #[tokio::test]
    async fn test_duplicates_collapse_across_sentences() {
        let linker = Arc::new(people_linker());
        let classifier =
            Arc::new(PairTableClassifier::new().with_pair("Alice", "Bob", "spouse", 0.8));
        let pipeline = build(
            linker,
            classifier,
            PhraseCoref::new(),
            SentenceErrorPolicy::Abort,
        );

        let (result, stats) = pipeline
            .extract_with_stats(&request("Alice met Bob. Later, Alice met Bob again.", true))
            .await
            .unwrap();

        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.relations.len(), 1);
        assert_eq!(stats.linked_entities, 4);
        assert_eq!(stats.relations, 2);
    }

    #[tokio::test]
    async fn test_opposite_directions_are_distinct() {
        let linker = Arc::new(people_linker());
        let classifier = Arc::new(
            PairTableClassifier::new()
                .with_pair("Alice", "Bob", "father", 0.7)
                .with_pair("Bob", "Alice", "child", 0.7),
        );
        let pipeline = build(
            linker,
            classifier,
            PhraseCoref::new(),
            SentenceErrorPolicy::Abort,
        );

        let result = pipeline
            .extract(&request("Alice raised Bob.", false))
            .await
            .unwrap();

        let relations: Vec<_> = result.relations.into_iter().collect();
        assert_eq!(
            relations,
            vec![
                Relation::new("Q1", "Q2", "father"),
                Relation::new("Q2", "Q1", "child"),
            ]
        );
    }

    #[tokio::test]
    async fn test_abort_policy_fails_whole_request() {
        let linker = Arc::new(people_linker().failing_on("Bob"));
        let pipeline = build(
            linker,
            Arc::new(PairTableClassifier::new()),
            PhraseCoref::new(),
            SentenceErrorPolicy::Abort,
        );

        let err = pipeline
            .extract(&request("Alice founded Acme. Bob left.", false))
            .await
            .unwrap_err();
        assert!(matches!(err, KgxError::LinkerError(_)));
    }

    #[tokio::test]
    async fn test_skip_policy_keeps_other_sentences() {
        let linker = Arc::new(people_linker().failing_on("Bob"));
        let pipeline = build(
            linker,
            Arc::new(PairTableClassifier::new()),
            PhraseCoref::new(),
            SentenceErrorPolicy::Skip,
        );

        let (result, stats) = pipeline
            .extract_with_stats(&request("Alice founded Acme. Bob left.", false))
            .await
            .unwrap();

        assert_eq!(stats.skipped_sentences, 1);
        assert_eq!(result.entities.len(), 2);
        assert!(!result.entities.iter().any(|e| e.id == "Q2"));
    }

    #[tokio::test]
    async fn test_classifier_failure_aborts_request() {
        let linker = Arc::new(people_linker());
        let classifier = Arc::new(
            PairTableClassifier::new()
                .with_pair("Alice", "Acme", "founder of", 0.9)
                .failing_on("Bob"),
        );
        let pipeline = build(
            linker,
            classifier.clone(),
            PhraseCoref::new(),
            SentenceErrorPolicy::Abort,
        );

        let err = pipeline
            .extract_with_stats(&request("Alice founded Acme. Bob met Alice.", false))
            .await
            .unwrap_err();
        assert!(matches!(err, KgxError::ClassifierError(_)));
        // The first sentence was classified before the failure
        assert_eq!(classifier.calls(), 3);
    }

    #[tokio::test]
    async fn test_classifier_failure_skipped() {
        let linker = Arc::new(people_linker());
        let classifier = Arc::new(
            PairTableClassifier::new()
                .with_pair("Alice", "Acme", "founder of", 0.9)
                .failing_on("Bob"),
        );
        let pipeline = build(
            linker,
            classifier,
            PhraseCoref::new(),
            SentenceErrorPolicy::Skip,
        );

        let (result, stats) = pipeline
            .extract_with_stats(&request("Alice founded Acme. Bob met Alice.", false))
            .await
            .unwrap();
        assert_eq!(stats.skipped_sentences, 1);
        assert_eq!(
            result.relations.into_iter().collect::<Vec<_>>(),
            vec![Relation::new("Q1", "Q3", "founder of")]
        );
        // Entities of the failed sentence are not kept either
        assert!(!result.entities.iter().any(|e| e.id == "Q2"));
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_linking() {
        let linker = Arc::new(people_linker());
        let pipeline = build(
            linker.clone(),
            Arc::new(PairTableClassifier::new()),
            PhraseCoref::new(),
            SentenceErrorPolicy::Abort,
        );

        let err = pipeline.extract(&request("", true)).await.unwrap_err();
        assert!(matches!(err, KgxError::ValidationError(_)));
        assert!(linker.seen().is_empty());
    }

    #[test]
    fn test_accumulator_is_order_independent() {
        let mention = |title: &str, id: &str| EntityMention {
            title: title.to_string(),
            id: id.to_string(),
            label: Some(EntityLabel::Person),
            spans: vec![Span::new(0, 1)],
        };
        let entities = vec![mention("Alice", "Q1"), mention("Bob", "Q2"), mention("Alice", "Q1")];
        let relations = vec![
            Relation::new("Q1", "Q2", "spouse"),
            Relation::new("Q2", "Q1", "spouse"),
            Relation::new("Q1", "Q2", "spouse"),
        ];

        let mut forward = ExtractionAccumulator::new();
        forward.add_entities(&entities);
        forward.add_relations(relations.clone());

        let mut backward = ExtractionAccumulator::new();
        for entity in entities.iter().rev() {
            backward.add_entities(std::slice::from_ref(entity));
        }
        backward.add_relations(relations.into_iter().rev());

        let (forward, backward) = (forward.finish(), backward.finish());
        assert_eq!(forward, backward);
        assert_eq!(forward.entities.len(), 2);
        assert_eq!(forward.relations.len(), 2);
    }
}
