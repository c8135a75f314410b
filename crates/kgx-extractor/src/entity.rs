//! Sentence-level entity extraction
//!
//! Sends a punctuation-free sentence to the entity linker, keeps the
//! annotations whose semantic classes are on the allow-list, and assigns
//! each one at most one [`EntityLabel`].

use std::collections::HashSet;
use std::sync::Arc;

use kgx_core::{
    EntityClassConfig, EntityLabel, EntityLinker, EntityMention, LinkedAnnotation, Result,
};

/// Remove ASCII punctuation (`!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~`)
pub fn strip_punctuation(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_punctuation()).collect()
}

// ============================================================================
// Class filter
// ============================================================================

/// Allow-list of semantic classes, grouped by label
#[derive(Debug, Clone)]
pub struct ClassFilter {
    /// Label groups in priority order
    groups: Vec<(EntityLabel, HashSet<String>)>,
    /// Allowed classes that carry no label
    other: HashSet<String>,
}

impl ClassFilter {
    pub fn from_config(config: &EntityClassConfig) -> Self {
        fn lowercase(classes: &[String]) -> HashSet<String> {
            classes.iter().map(|c| c.to_lowercase()).collect()
        }

        let groups = EntityLabel::PRIORITY
            .iter()
            .map(|&label| {
                let classes = match label {
                    EntityLabel::Person => &config.person,
                    EntityLabel::Organization => &config.organization,
                    EntityLabel::Location => &config.location,
                };
                (label, lowercase(classes))
            })
            .collect();

        Self {
            groups,
            other: lowercase(&config.other),
        }
    }

    /// Whether any of `classes` is on the allow-list
    pub fn is_allowed(&self, classes: &[String]) -> bool {
        classes.iter().any(|class| {
            let class = class.to_lowercase();
            self.other.contains(&class) || self.groups.iter().any(|(_, g)| g.contains(&class))
        })
    }

    /// Label of the first group (by priority) matching any of `classes`
    pub fn label(&self, classes: &[String]) -> Option<EntityLabel> {
        let classes: Vec<String> = classes.iter().map(|c| c.to_lowercase()).collect();
        self.groups
            .iter()
            .find(|(_, group)| classes.iter().any(|c| group.contains(c)))
            .map(|(label, _)| *label)
    }

    /// Turn a linker annotation into an entity mention, if it is kept
    pub fn apply(&self, annotation: LinkedAnnotation) -> Option<EntityMention> {
        if !self.is_allowed(&annotation.classes) {
            return None;
        }
        let Some(id) = annotation.id else {
            tracing::debug!(title = %annotation.title, "Dropping annotation without knowledge-base id");
            return None;
        };

        Some(EntityMention {
            label: self.label(&annotation.classes),
            title: annotation.title,
            id,
            spans: annotation.spans,
        })
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        Self::from_config(&EntityClassConfig::default())
    }
}

// ============================================================================
// Sentence processor
// ============================================================================

/// Links the entities of one sentence
pub struct SentenceProcessor {
    linker: Arc<dyn EntityLinker>,
    filter: ClassFilter,
}

impl SentenceProcessor {
    pub fn new(linker: Arc<dyn EntityLinker>, filter: ClassFilter) -> Self {
        Self { linker, filter }
    }

    /// Link `sentence` and keep labelled, allow-listed entities.
    ///
    /// Spans refer to the punctuation-free form of the sentence.
    pub async fn extract_entities(
        &self,
        sentence: &str,
        entity_threshold: f32,
    ) -> Result<Vec<EntityMention>> {
        let stripped = strip_punctuation(sentence);
        if stripped.trim().is_empty() {
            return Ok(Vec::new());
        }

        let annotations = self.linker.annotate(&stripped, entity_threshold).await?;
        let total = annotations.len();
        let entities: Vec<EntityMention> = annotations
            .into_iter()
            .filter_map(|a| self.filter.apply(a))
            .collect();

        tracing::debug!(
            linker = self.linker.name(),
            annotations = total,
            kept = entities.len(),
            "Linked sentence"
        );
        Ok(entities)
    }
}

// ============================================================================
// Tests
// ============================================================================
