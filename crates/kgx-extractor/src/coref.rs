//! Coreference resolution
//!
//! Rewrites a document so that coreferent mentions are replaced by the text
//! of their cluster's representative mention, and provides the clusterers
//! that produce the clusters:
//! - HTTP: remote coreference server
//! - Noop: tokenization only, no clusters

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::tokenize::tokenize;
use kgx_core::{
    CorefClusterer, CorefConfig, CorefDocument, CoreferenceCluster, KgxError, MentionSpan,
    Result, Token,
};

// ============================================================================
// Rewriter
// ============================================================================

/// Outcome of a rewrite pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// Mentions replaced by their representative, in application order
    pub rewritten: Vec<MentionSpan>,
    /// Mentions left alone (identical text, shared words, or invalid span)
    pub skipped: usize,
    /// Mentions dropped because an earlier rewrite already claimed a token
    pub conflicts: usize,
}

/// Text of a token span without the trailing whitespace of its last token
fn span_text(tokens: &[Token], span: MentionSpan) -> Option<String> {
    if span.is_empty() || span.end > tokens.len() {
        return None;
    }
    let mut text: String = tokens[span.start..span.end - 1]
        .iter()
        .map(Token::text_with_ws)
        .collect();
    text.push_str(&tokens[span.end - 1].text);
    Some(text)
}

/// Rewrite `tokens` and return the per-token output buffer.
///
/// The buffer always has one entry per token; a rewritten mention puts the
/// representative text in its first entry and empties the others. Each token
/// can be claimed by at most one rewrite: clusters are applied in order and a
/// mention touching an already claimed token is counted as a conflict.
pub fn rewrite_tokens(
    tokens: &[Token],
    clusters: &[CoreferenceCluster],
) -> (Vec<String>, RewriteReport) {
    let mut buffer: Vec<String> = tokens.iter().map(Token::text_with_ws).collect();
    let mut claimed = vec![false; tokens.len()];
    let mut report = RewriteReport::default();

    for (cluster_idx, cluster) in clusters.iter().enumerate() {
        let main = cluster.main();
        let Some(main_text) = span_text(tokens, main) else {
            tracing::warn!(
                cluster = cluster_idx,
                start = main.start,
                end = main.end,
                "Representative mention outside the document, skipping cluster"
            );
            report.skipped += cluster.mentions().len().saturating_sub(1);
            continue;
        };
        let main_words: HashSet<&str> = main_text.split(' ').collect();

        for &mention in cluster.mentions() {
            if mention == main {
                continue;
            }

            let Some(text) = span_text(tokens, mention) else {
                tracing::warn!(
                    cluster = cluster_idx,
                    start = mention.start,
                    end = mention.end,
                    "Mention outside the document, skipping"
                );
                report.skipped += 1;
                continue;
            };

            // Shared words usually mean a nested mention ("Smith" in "John Smith")
            if text == main_text || text.split(' ').any(|w| main_words.contains(w)) {
                report.skipped += 1;
                continue;
            }

            if claimed[mention.start..mention.end].iter().any(|&c| c) {
                tracing::warn!(
                    cluster = cluster_idx,
                    mention = %text,
                    representative = %main_text,
                    "Overlapping coreference rewrite, keeping the earlier one"
                );
                report.conflicts += 1;
                continue;
            }

            buffer[mention.start] = format!("{}{}", main_text, tokens[mention.end - 1].whitespace);
            for entry in &mut buffer[mention.start + 1..mention.end] {
                entry.clear();
            }
            claimed[mention.start..mention.end].fill(true);
            report.rewritten.push(mention);
        }
    }

    (buffer, report)
}

/// Rewrite the document and report what was changed
pub fn rewrite_with_report(
    tokens: &[Token],
    clusters: &[CoreferenceCluster],
) -> (String, RewriteReport) {
    let (buffer, report) = rewrite_tokens(tokens, clusters);
    (buffer.concat(), report)
}

/// Replace coreferent mentions with their representative text
pub fn rewrite(tokens: &[Token], clusters: &[CoreferenceCluster]) -> String {
    rewrite_with_report(tokens, clusters).0
}

// ============================================================================
// HTTP clusterer
// ============================================================================

/// Client for a coreference server
pub struct HttpCorefClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CorefRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CorefResponse {
    tokens: Vec<WireToken>,
    #[serde(default)]
    clusters: Vec<WireCluster>,
}

#[derive(Debug, Deserialize)]
struct WireToken {
    text: String,
    #[serde(default)]
    whitespace: String,
}

#[derive(Debug, Deserialize)]
struct WireCluster {
    main: MentionSpan,
    mentions: Vec<MentionSpan>,
}

impl HttpCorefClient {
    /// Create a new client with the given request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KgxError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create from config
    pub fn from_config(config: &CorefConfig) -> Result<Self> {
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_secs))
    }
}

/// Convert a coreference server response into a validated document
fn parse_coref_response(body: &str) -> Result<CorefDocument> {
    let response: CorefResponse = serde_json::from_str(body)
        .map_err(|e| KgxError::CorefError(format!("Failed to parse coreference response: {e}")))?;

    let tokens: Vec<Token> = response
        .tokens
        .into_iter()
        .enumerate()
        .map(|(i, t)| Token::new(i, t.text, t.whitespace))
        .collect();

    let mut clusters = Vec::with_capacity(response.clusters.len());
    for cluster in response.clusters {
        if let Some(bad) = cluster
            .mentions
            .iter()
            .find(|m| m.is_empty() || m.end > tokens.len())
        {
            return Err(KgxError::CorefError(format!(
                "Mention {}..{} does not fit a document of {} tokens",
                bad.start,
                bad.end,
                tokens.len()
            )));
        }
        clusters.push(CoreferenceCluster::new(cluster.main, cluster.mentions)?);
    }

    Ok(CorefDocument::new(tokens, clusters))
}

#[async_trait]
impl CorefClusterer for HttpCorefClient {
    async fn resolve(&self, text: &str) -> Result<CorefDocument> {
        let response = self
            .client
            .post(format!("{}/coref", self.base_url))
            .json(&CorefRequest { text })
            .send()
            .await
            .map_err(|e| KgxError::CorefError(format!("Coreference request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KgxError::CorefError(format!(
                "Coreference server returned {status}: {error_text}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| KgxError::CorefError(format!("Failed to read coreference response: {e}")))?;

        parse_coref_response(&body)
    }

    fn name(&self) -> &str {
        "http-coref"
    }
}

// ============================================================================
// Noop clusterer
// ============================================================================

/// Tokenizes the text and never reports clusters
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCoref;

#[async_trait]
impl CorefClusterer for NoopCoref {
    async fn resolve(&self, text: &str) -> Result<CorefDocument> {
        Ok(CorefDocument::new(tokenize(text), Vec::new()))
    }

    fn name(&self) -> &str {
        "noop"
    }
}

// ============================================================================
// Tests
// ============================================================================
