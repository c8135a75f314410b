//! Deterministic collaborators for tests
//!
//! Enabled for this crate's unit tests and, through the `test-utils`
//! feature, for integration tests of dependent crates.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::relation::{char_slice, NO_RELATION};
use crate::tokenize::tokenize;
use kgx_core::{
    Classification, CorefClusterer, CorefDocument, CoreferenceCluster, EntityLinker, KgxError,
    LinkedAnnotation, MentionSpan, RelationClassifier, Result, Span,
};

// ============================================================================
// Linker
// ============================================================================

#[derive(Debug, Clone)]
struct DictionaryEntry {
    surface: String,
    title: String,
    id: String,
    classes: Vec<String>,
}

/// Links every whole-word occurrence of known surface forms
#[derive(Debug, Default)]
pub struct DictionaryLinker {
    entries: Vec<DictionaryEntry>,
    fail_on: Option<String>,
    seen: Mutex<Vec<String>>,
}

impl DictionaryLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, surface: &str, title: &str, id: &str, classes: &[&str]) -> Self {
        self.entries.push(DictionaryEntry {
            surface: surface.to_string(),
            title: title.to_string(),
            id: id.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Fail on any text containing `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Texts passed to the linker so far
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Char spans of whole-word occurrences of `surface` in `text`
fn find_word(text: &str, surface: &str) -> Vec<Span> {
    text.match_indices(surface)
        .filter(|(byte, _)| {
            let before = text[..*byte].chars().next_back();
            let after = text[byte + surface.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
        .map(|(byte, _)| {
            let start = text[..byte].chars().count();
            Span::new(start, start + surface.chars().count())
        })
        .collect()
}

#[async_trait]
impl EntityLinker for DictionaryLinker {
    async fn annotate(&self, text: &str, _threshold: f32) -> Result<Vec<LinkedAnnotation>> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(text.to_string());
        }
        if let Some(needle) = &self.fail_on {
            if text.contains(needle.as_str()) {
                return Err(KgxError::LinkerError(format!("stub failure on {needle}")));
            }
        }

        Ok(self
            .entries
            .iter()
            .filter_map(|entry| {
                let spans = find_word(text, &entry.surface);
                (!spans.is_empty()).then(|| LinkedAnnotation {
                    title: entry.title.clone(),
                    id: Some(entry.id.clone()),
                    classes: entry.classes.clone(),
                    spans,
                })
            })
            .collect())
    }

    fn name(&self) -> &str {
        "dictionary"
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Scores (head text, tail text) pairs from a fixed table
#[derive(Debug, Default)]
pub struct PairTableClassifier {
    entries: Vec<(String, String, Classification)>,
    fail_on: Option<String>,
    calls: Mutex<usize>,
}

impl PairTableClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(mut self, head: &str, tail: &str, label: &str, score: f32) -> Self {
        self.entries.push((
            head.to_string(),
            tail.to_string(),
            Classification {
                label: label.to_string(),
                score,
            },
        ));
        self
    }

    /// Fail on any sentence containing `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or_default()
    }
}

#[async_trait]
impl RelationClassifier for PairTableClassifier {
    async fn classify(&self, text: &str, head: Span, tail: Span) -> Result<Classification> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        if let Some(needle) = &self.fail_on {
            if text.contains(needle.as_str()) {
                return Err(KgxError::ClassifierError(format!("stub failure on {needle}")));
            }
        }
        let (head_text, tail_text) = (char_slice(text, head), char_slice(text, tail));

        Ok(self
            .entries
            .iter()
            .find(|(h, t, _)| h == head_text && t == tail_text)
            .map(|(_, _, c)| c.clone())
            .unwrap_or_else(|| Classification {
                label: NO_RELATION.to_string(),
                score: 0.0,
            }))
    }

    fn name(&self) -> &str {
        "pair-table"
    }
}

// ============================================================================
// Coreference
// ============================================================================

/// Builds clusters from phrases; the first phrase of a cluster is its
/// representative, every occurrence of every phrase is a mention
#[derive(Debug, Default)]
pub struct PhraseCoref {
    clusters: Vec<Vec<String>>,
}

impl PhraseCoref {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(mut self, phrases: &[&str]) -> Self {
        self.clusters
            .push(phrases.iter().map(|p| p.to_string()).collect());
        self
    }
}

fn find_phrase(tokens: &[kgx_core::Token], phrase: &str) -> Vec<MentionSpan> {
    let words: Vec<String> = tokenize(phrase)
        .into_iter()
        .map(|t| t.text)
        .filter(|t| !t.is_empty())
        .collect();
    if words.is_empty() || words.len() > tokens.len() {
        return Vec::new();
    }

    (0..=tokens.len() - words.len())
        .filter(|&start| {
            words
                .iter()
                .zip(&tokens[start..])
                .all(|(word, token)| *word == token.text)
        })
        .map(|start| MentionSpan::new(start, start + words.len()))
        .collect()
}

#[async_trait]
impl CorefClusterer for PhraseCoref {
    async fn resolve(&self, text: &str) -> Result<CorefDocument> {
        let tokens = tokenize(text);
        let mut clusters = Vec::new();

        for phrases in &self.clusters {
            let Some(main) = phrases
                .first()
                .and_then(|p| find_phrase(&tokens, p).first().copied())
            else {
                continue;
            };

            let mut mentions: Vec<MentionSpan> = phrases
                .iter()
                .flat_map(|p| find_phrase(&tokens, p))
                .collect();
            mentions.sort();
            mentions.dedup();
            clusters.push(CoreferenceCluster::new(main, mentions)?);
        }

        Ok(CorefDocument::new(tokens, clusters))
    }

    fn name(&self) -> &str {
        "phrase"
    }
}
