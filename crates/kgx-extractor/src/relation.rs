//! Relation Extraction (RE) module
//!
//! Pairs the entities of a sentence and classifies every ordered pair of
//! mention spans. Classification is delegated to a [`RelationClassifier`]:
//! - HTTP: OpenNRE-compatible inference server
//! - Rule-based: keyword patterns between head and tail

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use kgx_core::{
    Classification, ClassifierConfig, EntityMention, KgxError, Relation, RelationClassifier,
    RelationEndpoint, Result, Span,
};

/// Label returned when no relation is recognized
pub const NO_RELATION: &str = "NA";

// ============================================================================
// Pair extraction
// ============================================================================

/// Classifies every ordered entity pair of a sentence
pub struct PairExtractor {
    classifier: Arc<dyn RelationClassifier>,
    endpoint: RelationEndpoint,
}

impl PairExtractor {
    pub fn new(classifier: Arc<dyn RelationClassifier>, endpoint: RelationEndpoint) -> Self {
        Self {
            classifier,
            endpoint,
        }
    }

    fn endpoint<'a>(&self, entity: &'a EntityMention) -> &'a str {
        match self.endpoint {
            RelationEndpoint::Id => &entity.id,
            RelationEndpoint::Title => &entity.title,
        }
    }

    /// Number of classifier calls [`extract_relations`](Self::extract_relations)
    /// makes for `entities`
    pub fn planned_calls(&self, entities: &[EntityMention]) -> usize {
        let mut calls = 0;
        for (i, source) in entities.iter().enumerate() {
            for (j, target) in entities.iter().enumerate() {
                if i != j && self.endpoint(source) != self.endpoint(target) {
                    calls += source.spans.len() * target.spans.len();
                }
            }
        }
        calls
    }

    /// Relations scoring strictly above `relation_threshold`.
    ///
    /// Every ordered pair of distinct entities is tried, and for each pair
    /// every (head span, tail span) combination.
    pub async fn extract_relations(
        &self,
        sentence: &str,
        entities: &[EntityMention],
        relation_threshold: f32,
    ) -> Result<Vec<Relation>> {
        let mut relations = Vec::new();

        for (i, source) in entities.iter().enumerate() {
            for (j, target) in entities.iter().enumerate() {
                if i == j {
                    continue;
                }

                let (source_key, target_key) = (self.endpoint(source), self.endpoint(target));
                if source_key == target_key {
                    tracing::debug!(entity = source_key, "Skipping pair with identical endpoints");
                    continue;
                }

                for &head in &source.spans {
                    for &tail in &target.spans {
                        let result = self.classifier.classify(sentence, head, tail).await?;
                        tracing::debug!(
                            source = source_key,
                            target = target_key,
                            label = %result.label,
                            score = result.score,
                            "Classified pair"
                        );

                        if result.score > relation_threshold {
                            relations.push(Relation::new(source_key, target_key, result.label));
                        }
                    }
                }
            }
        }

        Ok(relations)
    }
}

/// Slice `text` by a char span, clamped to the text
pub(crate) fn char_slice(text: &str, span: Span) -> &str {
    let byte_at = |char_idx: usize| {
        text.char_indices()
            .nth(char_idx)
            .map_or(text.len(), |(byte, _)| byte)
    };
    let start = byte_at(span.start);
    let end = byte_at(span.end).max(start);
    &text[start..end]
}

// ============================================================================
// Rule-based RE
// ============================================================================

/// Keyword pattern for a relation
#[derive(Debug, Clone)]
pub struct RelationPattern {
    /// Relation label
    pub label: String,
    /// Pattern keywords (between head and tail)
    pub keywords: Vec<String>,
    /// Maximum distance between head and tail (in characters)
    pub max_distance: usize,
    /// Confidence score
    pub confidence: f32,
}

/// Rule-based relation classifier.
///
/// Only pairs whose head precedes the tail are matched; the first pattern
/// with a keyword between them wins.
pub struct RuleBasedClassifier {
    patterns: Vec<RelationPattern>,
}

impl RuleBasedClassifier {
    /// Create a new rule-based classifier with English patterns
    pub fn new() -> Self {
        let mut re = Self::empty();
        re.init_english_patterns();
        re
    }

    /// Create a classifier without patterns
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Initialize English relation patterns; more specific keywords first
    fn init_english_patterns(&mut self) {
        // Founding
        self.add_pattern(
            "founded by",
            vec!["founded by", "cofounded by", "established by", "created by"],
            60,
            0.85,
        );
        self.add_pattern(
            "founder of",
            vec!["founded", "cofounded", "established", "started", "created"],
            60,
            0.8,
        );

        // Ownership
        self.add_pattern(
            "owned by",
            vec!["acquired by", "owned by", "bought by", "purchased by"],
            60,
            0.8,
        );
        self.add_pattern("owner of", vec!["acquired", "owns", "bought", "purchased"], 60, 0.75);

        // Employment
        self.add_pattern(
            "employer",
            vec![
                "works for",
                "works at",
                "worked for",
                "worked at",
                "employed by",
                "joined",
                "ceo of",
                "president of",
                "chairman of",
            ],
            60,
            0.8,
        );

        // Location
        self.add_pattern(
            "headquarters location",
            vec!["headquartered in", "based in", "headquarters in"],
            60,
            0.8,
        );
        self.add_pattern("place of birth", vec!["born in"], 40, 0.8);
        self.add_pattern("residence", vec!["lives in", "lived in", "moved to"], 40, 0.7);
        self.add_pattern("location", vec!["located in", "in"], 20, 0.5);

        // Membership and family
        self.add_pattern("member of", vec!["member of", "belongs to"], 60, 0.75);
        self.add_pattern(
            "spouse",
            vec!["married", "wife of", "husband of", "spouse of"],
            40,
            0.75,
        );
    }

    /// Add a relation pattern
    pub fn add_pattern(
        &mut self,
        label: &str,
        keywords: Vec<&str>,
        max_distance: usize,
        confidence: f32,
    ) {
        self.patterns.push(RelationPattern {
            label: label.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            max_distance,
            confidence,
        });
    }

    /// Check if text contains any keyword as whole words
    fn contains_keywords(&self, text: &str, keywords: &[String]) -> bool {
        let text_lower = format!(" {} ", text.to_lowercase());
        keywords
            .iter()
            .any(|k| text_lower.contains(&format!(" {} ", k.to_lowercase())))
    }

    /// Match patterns against the text between `head` and `tail`
    fn find_pattern_relation(&self, text: &str, head: Span, tail: Span) -> Classification {
        let no_relation = Classification {
            label: NO_RELATION.to_string(),
            score: 0.0,
        };

        if head.end > tail.start {
            return no_relation;
        }

        let distance = tail.start - head.end;
        let context = char_slice(text, Span::new(head.end, tail.start));
        let context = context.split_whitespace().collect::<Vec<_>>().join(" ");

        self.patterns
            .iter()
            .filter(|p| distance <= p.max_distance)
            .find(|p| self.contains_keywords(&context, &p.keywords))
            .map(|p| Classification {
                label: p.label.clone(),
                score: p.confidence,
            })
            .unwrap_or(no_relation)
    }
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationClassifier for RuleBasedClassifier {
    async fn classify(&self, text: &str, head: Span, tail: Span) -> Result<Classification> {
        Ok(self.find_pattern_relation(text, head, tail))
    }

    fn name(&self) -> &str {
        "rules"
    }
}

// ============================================================================
// OpenNRE client
// ============================================================================

/// Client for an OpenNRE-compatible inference server
pub struct OpenNreClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct InferRequest<'a> {
    text: &'a str,
    h: Position,
    t: Position,
    model: &'a str,
}

/// Entity position; `[start, end)` char offsets
#[derive(Debug, Serialize)]
struct Position {
    pos: [usize; 2],
}

impl From<Span> for Position {
    fn from(span: Span) -> Self {
        Self {
            pos: [span.start, span.end],
        }
    }
}

/// Servers answer either `{"relation": .., "score": ..}` or OpenNRE's
/// `infer` tuple `[relation, score]`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferResponse {
    Object { relation: String, score: f32 },
    Tuple(String, f32),
}

impl From<InferResponse> for Classification {
    fn from(response: InferResponse) -> Self {
        match response {
            InferResponse::Object { relation, score } | InferResponse::Tuple(relation, score) => {
                Classification {
                    label: relation,
                    score,
                }
            }
        }
    }
}

impl OpenNreClient {
    /// Create from config
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KgxError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl RelationClassifier for OpenNreClient {
    async fn classify(&self, text: &str, head: Span, tail: Span) -> Result<Classification> {
        let request = InferRequest {
            text,
            h: head.into(),
            t: tail.into(),
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/infer", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| KgxError::ClassifierError(format!("Inference request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KgxError::ClassifierError(format!(
                "Inference server returned {status}: {error_text}"
            )));
        }

        let result: InferResponse = response.json().await.map_err(|e| {
            KgxError::ClassifierError(format!("Failed to parse inference response: {e}"))
        })?;

        let classification = Classification::from(result);
        if !(0.0..=1.0).contains(&classification.score) {
            return Err(KgxError::ClassifierError(format!(
                "Confidence {} outside [0, 1]",
                classification.score
            )));
        }
        Ok(classification)
    }

    fn name(&self) -> &str {
        "opennre"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn entity(title: &str, id: &str, spans: &[(usize, usize)]) -> EntityMention {
        EntityMention {
            title: title.to_string(),
            id: id.to_string(),
            label: None,
            spans: spans.iter().map(|&(s, e)| Span::new(s, e)).collect(),
        }
    }

    /// Scores looked up by (head, tail) span; everything else scores 0
    struct TableClassifier {
        scores: HashMap<(Span, Span), (&'static str, f32)>,
        calls: Mutex<Vec<(Span, Span)>>,
    }

    impl TableClassifier {
        fn new(entries: &[((usize, usize), (usize, usize), &'static str, f32)]) -> Self {
            Self {
                scores: entries
                    .iter()
                    .map(|&(h, t, label, score)| {
                        ((Span::new(h.0, h.1), Span::new(t.0, t.1)), (label, score))
                    })
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RelationClassifier for TableClassifier {
        async fn classify(&self, _text: &str, head: Span, tail: Span) -> Result<Classification> {
            self.calls.lock().unwrap().push((head, tail));
            let (label, score) = self
                .scores
                .get(&(head, tail))
                .copied()
                .unwrap_or((NO_RELATION, 0.0));
            Ok(Classification {
                label: label.to_string(),
                score,
            })
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    #[tokio::test]
    async fn test_all_ordered_span_pairs_are_classified() {
        let classifier = Arc::new(TableClassifier::new(&[]));
        let extractor = PairExtractor::new(classifier.clone(), RelationEndpoint::Id);

        let entities = vec![
            entity("A", "Q1", &[(0, 1), (10, 11)]),
            entity("B", "Q2", &[(4, 5)]),
            entity("C", "Q3", &[(6, 7)]),
        ];

        extractor
            .extract_relations("A x B C x A", &entities, 0.2)
            .await
            .unwrap();

        let calls = classifier.calls.lock().unwrap();
        assert_eq!(calls.len(), extractor.planned_calls(&entities));
        assert_eq!(calls.len(), 2 + 2 + 2 + 1 + 2 + 1);
        assert!(calls.contains(&(Span::new(10, 11), Span::new(6, 7))));
        assert!(calls.contains(&(Span::new(6, 7), Span::new(10, 11))));
        assert!(!calls.iter().any(|(h, t)| h == t));
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let classifier = Arc::new(TableClassifier::new(&[
            ((0, 1), (2, 3), "employer", 0.5),
            ((2, 3), (0, 1), "employee", 0.5 + f32::EPSILON),
        ]));
        let extractor = PairExtractor::new(classifier, RelationEndpoint::Id);
        let entities = vec![entity("A", "Q1", &[(0, 1)]), entity("B", "Q2", &[(2, 3)])];

        let relations = extractor
            .extract_relations("A B", &entities, 0.5)
            .await
            .unwrap();

        assert_eq!(relations, vec![Relation::new("Q2", "Q1", "employee")]);
    }

    #[tokio::test]
    async fn test_directions_are_kept_apart() {
        let classifier = Arc::new(TableClassifier::new(&[
            ((0, 1), (2, 3), "father", 0.9),
            ((2, 3), (0, 1), "child", 0.9),
        ]));
        let extractor = PairExtractor::new(classifier, RelationEndpoint::Title);
        let entities = vec![entity("A", "Q1", &[(0, 1)]), entity("B", "Q2", &[(2, 3)])];

        let relations = extractor
            .extract_relations("A B", &entities, 0.2)
            .await
            .unwrap();

        assert_eq!(
            relations,
            vec![Relation::new("A", "B", "father"), Relation::new("B", "A", "child")]
        );
    }

    #[tokio::test]
    async fn test_identical_endpoints_are_skipped() {
        let classifier = Arc::new(TableClassifier::new(&[]));
        let extractor = PairExtractor::new(classifier.clone(), RelationEndpoint::Title);
        let entities = vec![
            entity("Paris", "Q90", &[(0, 5)]),
            entity("Paris", "Q830149", &[(10, 15)]),
        ];

        let relations = extractor
            .extract_relations("Paris and Paris", &entities, 0.0)
            .await
            .unwrap();
        assert!(relations.is_empty());
        assert!(classifier.calls.lock().unwrap().is_empty());
        assert_eq!(extractor.planned_calls(&entities), 0);
    }

    #[test]
    fn test_char_slice() {
        let text = "Zoë met Ødegaard";
        assert_eq!(char_slice(text, Span::new(0, 3)), "Zoë");
        assert_eq!(char_slice(text, Span::new(8, 16)), "Ødegaard");
        assert_eq!(char_slice(text, Span::new(8, 99)), "Ødegaard");
        assert_eq!(char_slice(text, Span::new(5, 2)), "");
    }

    #[tokio::test]
    async fn test_rule_based_founding() {
        let re = RuleBasedClassifier::new();
        let text = "Alice founded Acme";

        let forward = re
            .classify(text, Span::new(0, 5), Span::new(14, 18))
            .await
            .unwrap();
        assert_eq!(forward.label, "founder of");
        assert!(forward.score > 0.2);

        let backward = re
            .classify(text, Span::new(14, 18), Span::new(0, 5))
            .await
            .unwrap();
        assert_eq!(backward.label, NO_RELATION);
        assert_eq!(backward.score, 0.0);
    }

    #[tokio::test]
    async fn test_rule_based_prefers_specific_keywords() {
        let re = RuleBasedClassifier::new();
        let text = "Acme was founded by Alice";
        let result = re
            .classify(text, Span::new(0, 4), Span::new(20, 25))
            .await
            .unwrap();
        assert_eq!(result.label, "founded by");
    }

    #[tokio::test]
    async fn test_rule_based_max_distance() {
        let mut re = RuleBasedClassifier::empty();
        re.add_pattern("spouse", vec!["married"], 10, 0.9);

        let near = "Ann married Bo";
        let result = re
            .classify(near, Span::new(0, 3), Span::new(12, 14))
            .await
            .unwrap();
        assert_eq!(result.label, "spouse");

        let far = "Ann quietly and happily married Bo";
        let result = re
            .classify(far, Span::new(0, 3), Span::new(32, 34))
            .await
            .unwrap();
        assert_eq!(result.label, NO_RELATION);
    }

    #[test]
    fn test_infer_response_formats() {
        let object: InferResponse =
            serde_json::from_str(r#"{"relation": "founded by", "score": 0.93}"#).unwrap();
        let tuple: InferResponse = serde_json::from_str(r#"["founded by", 0.93]"#).unwrap();

        let expected = Classification {
            label: "founded by".to_string(),
            score: 0.93,
        };
        assert_eq!(Classification::from(object), expected);
        assert_eq!(Classification::from(tuple), expected);
    }

    #[test]
    fn test_infer_request_positions() {
        let request = InferRequest {
            text: "Alice founded Acme",
            h: Span::new(0, 5).into(),
            t: Span::new(14, 18).into(),
            model: "wiki80_cnn_softmax",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["h"]["pos"], serde_json::json!([0, 5]));
        assert_eq!(json["t"]["pos"], serde_json::json!([14, 18]));
    }

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(url: String) -> OpenNreClient {
        OpenNreClient::from_config(&ClassifierConfig {
            url,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_opennre_client() {
        use axum::{routing::post, Json};

        let app = axum::Router::new().route(
            "/infer",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["h"]["pos"], serde_json::json!([0, 5]));
                assert_eq!(body["model"], "wiki80_cnn_softmax");
                Json(serde_json::json!(["founded by", 0.87]))
            }),
        );
        let client = client_for(serve(app).await);

        let result = client
            .classify("Alice founded Acme", Span::new(0, 5), Span::new(14, 18))
            .await
            .unwrap();
        assert_eq!(result.label, "founded by");
        assert_eq!(result.score, 0.87);
    }

    #[tokio::test]
    async fn test_opennre_client_errors() {
        use axum::{http::StatusCode, routing::post, Json};

        let app = axum::Router::new()
            .route(
                "/infer",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
            );
        let client = client_for(serve(app).await);
        let err = client
            .classify("A B", Span::new(0, 1), Span::new(2, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, KgxError::ClassifierError(ref msg) if msg.contains("500")));

        let app = axum::Router::new().route(
            "/infer",
            post(|| async { Json(serde_json::json!({"relation": "spouse", "score": 3.0})) }),
        );
        let client = client_for(serve(app).await);
        let err = client
            .classify("A B", Span::new(0, 1), Span::new(2, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, KgxError::ClassifierError(_)));
    }
}
