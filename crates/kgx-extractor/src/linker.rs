//! Wikifier entity linking client
//!
//! Posts a sentence to the Wikifier `annotate-article` endpoint and converts
//! the returned annotations into [`LinkedAnnotation`]s. Wikifier reports
//! support ranges with an inclusive end (`chTo`); they are converted to
//! end-exclusive [`Span`]s here and nowhere else.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use kgx_core::{EntityLinker, KgxError, LinkedAnnotation, LinkerConfig, Result, Span};

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct WikifierResponse {
    #[serde(default)]
    annotations: Vec<WikifierAnnotation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WikifierAnnotation {
    title: String,
    #[serde(default)]
    wiki_data_item_id: Option<String>,
    #[serde(default)]
    wiki_data_classes: Vec<WikiDataClass>,
    #[serde(default)]
    support: Vec<Support>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WikiDataClass {
    #[serde(default)]
    en_label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Support {
    ch_from: usize,
    ch_to: usize,
}

/// Parse a Wikifier response body
pub fn parse_annotations(body: &str) -> Result<Vec<LinkedAnnotation>> {
    let response: WikifierResponse = serde_json::from_str(body)
        .map_err(|e| KgxError::LinkerError(format!("Failed to parse Wikifier response: {e}")))?;

    Ok(response
        .annotations
        .into_iter()
        .map(|annotation| {
            let mut spans: Vec<Span> = annotation
                .support
                .iter()
                .filter(|s| s.ch_to >= s.ch_from)
                .map(|s| Span::from_inclusive(s.ch_from, s.ch_to))
                .collect();
            spans.sort();
            spans.dedup();

            LinkedAnnotation {
                title: annotation.title,
                id: annotation.wiki_data_item_id.filter(|id| !id.is_empty()),
                classes: annotation
                    .wiki_data_classes
                    .into_iter()
                    .filter_map(|c| c.en_label)
                    .collect(),
                spans,
            }
        })
        .collect())
}

// ============================================================================
// Client
// ============================================================================

/// Wikifier API client
pub struct WikifierClient {
    client: Client,
    base_url: String,
    config: LinkerConfig,
}

impl WikifierClient {
    /// Create from config
    pub fn from_config(config: &LinkerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KgxError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            config: config.clone(),
        })
    }

    /// Form parameters of an annotation request
    fn form(&self, text: &str, threshold: f32) -> Vec<(&'static str, String)> {
        vec![
            ("text", text.to_string()),
            ("lang", self.config.lang.clone()),
            ("userKey", self.config.user_key.clone()),
            ("pageRankSqThreshold", format!("{threshold}")),
            ("applyPageRankSqThreshold", "true".to_string()),
            (
                "nTopDfValuesToIgnore",
                self.config.n_top_df_values_to_ignore.to_string(),
            ),
            (
                "nWordsToIgnoreFromList",
                self.config.n_words_to_ignore_from_list.to_string(),
            ),
            ("wikiDataClasses", "true".to_string()),
            ("wikiDataClassIds", "false".to_string()),
            ("support", "true".to_string()),
            ("ranges", "false".to_string()),
            ("minLinkFrequency", self.config.min_link_frequency.to_string()),
            ("includeCosines", "false".to_string()),
            ("maxMentionEntropy", format!("{}", self.config.max_mention_entropy)),
        ]
    }
}

#[async_trait]
impl EntityLinker for WikifierClient {
    async fn annotate(&self, text: &str, threshold: f32) -> Result<Vec<LinkedAnnotation>> {
        let response = self
            .client
            .post(format!("{}/annotate-article", self.base_url))
            .form(&self.form(text, threshold))
            .send()
            .await
            .map_err(|e| KgxError::LinkerError(format!("Wikifier request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KgxError::LinkerError(format!(
                "Wikifier returned {status}: {error_text}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| KgxError::LinkerError(format!("Failed to read Wikifier response: {e}")))?;

        let annotations = parse_annotations(&body)?;
        tracing::debug!(count = annotations.len(), "Wikifier annotations received");
        Ok(annotations)
    }

    fn name(&self) -> &str {
        "wikifier"
    }
}

// ============================================================================
// Tests
// ============================================================================
