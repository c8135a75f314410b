//! Extraction handlers

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use kgx_core::{validate_threshold, ExtractionRequest, ExtractionResult, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Query parameters of `GET /`
///
/// Values are taken as raw strings so that malformed numbers and flags
/// produce a plain-text 400 instead of a generic rejection.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ExtractQuery {
    /// Document text
    pub text: Option<String>,

    /// Minimum entity linking confidence
    #[param(default = 0.9)]
    pub entities_threshold: Option<String>,

    /// Minimum relation score (exclusive)
    #[param(default = 0.2)]
    pub relation_threshold: Option<String>,

    /// Resolve coreferences before extraction
    #[param(default = true)]
    pub coref: Option<String>,
}

impl ExtractQuery {
    pub fn into_request(self, defaults: &PipelineConfig) -> Result<ExtractionRequest, AppError> {
        let text = self
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing text parameter".to_string()))?;

        Ok(ExtractionRequest {
            text,
            entity_threshold: parse_threshold(
                "entities_threshold",
                self.entities_threshold.as_deref(),
                defaults.entity_threshold,
            )?,
            relation_threshold: parse_threshold(
                "relation_threshold",
                self.relation_threshold.as_deref(),
                defaults.relation_threshold,
            )?,
            coref: match self.coref.as_deref() {
                Some(raw) => parse_flag("coref", raw)?,
                None => defaults.coref,
            },
        })
    }
}

/// JSON body of `POST /api/v1/extract`
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ExtractBody {
    /// Document text
    #[serde(default)]
    #[schema(example = "Alice founded Acme. She is the CEO.")]
    pub text: String,

    #[schema(example = 0.9)]
    pub entities_threshold: Option<f32>,

    #[schema(example = 0.2)]
    pub relation_threshold: Option<f32>,

    #[schema(example = true)]
    pub coref: Option<bool>,
}

impl ExtractBody {
    pub fn into_request(self, defaults: &PipelineConfig) -> ExtractionRequest {
        ExtractionRequest {
            text: self.text,
            entity_threshold: self.entities_threshold.unwrap_or(defaults.entity_threshold),
            relation_threshold: self
                .relation_threshold
                .unwrap_or(defaults.relation_threshold),
            coref: self.coref.unwrap_or(defaults.coref),
        }
    }
}

/// Linked entity
#[derive(Debug, Serialize, ToSchema)]
pub struct EntityResponse {
    #[schema(example = "Acme Corporation")]
    pub title: String,

    /// Knowledge-base identifier
    #[schema(example = "Q1")]
    pub id: String,

    /// `Person`, `Organization`, `Location` or null
    #[schema(example = "Organization")]
    pub label: Option<String>,
}

/// Directed relation between two entities
#[derive(Debug, Serialize, ToSchema)]
pub struct RelationResponse {
    #[schema(example = "Q2")]
    pub source: String,

    #[schema(example = "Q1")]
    pub target: String,

    #[serde(rename = "type")]
    #[schema(example = "founder of")]
    pub relation_type: String,
}

/// Extraction response body
#[derive(Debug, Serialize, ToSchema)]
pub struct ExtractResponse {
    pub entities: Vec<EntityResponse>,
    pub relations: Vec<RelationResponse>,
}

impl From<ExtractionResult> for ExtractResponse {
    fn from(result: ExtractionResult) -> Self {
        Self {
            entities: result
                .entities
                .into_iter()
                .map(|e| EntityResponse {
                    title: e.title,
                    id: e.id,
                    label: e.label.map(|l| l.as_str().to_string()),
                })
                .collect(),
            relations: result
                .relations
                .into_iter()
                .map(|r| RelationResponse {
                    source: r.source,
                    target: r.target,
                    relation_type: r.relation_type,
                })
                .collect(),
        }
    }
}

fn parse_threshold(name: &str, raw: Option<&str>, default: f32) -> Result<f32, AppError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: f32 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("{name} must be a number, got {raw:?}")))?;
    Ok(validate_threshold(name, value)?)
}

/// Strict boolean parsing; anything unrecognised is rejected
pub fn parse_flag(name: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::BadRequest(format!(
            "{name} must be a boolean, got {raw:?}"
        ))),
    }
}

async fn run(state: &AppState, request: ExtractionRequest) -> Result<Json<ExtractResponse>, AppError> {
    let result = state.pipeline.extract(&request).await?;
    Ok(Json(result.into()))
}

/// Extract entities and relations from query parameters
#[utoipa::path(
    get,
    path = "/",
    tag = "extract",
    params(ExtractQuery),
    responses(
        (status = 200, description = "Extracted entities and relations", body = ExtractResponse),
        (status = 400, description = "Invalid parameters", body = String),
        (status = 500, description = "Extraction failed", body = String)
    )
)]
pub async fn extract_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExtractQuery>,
) -> Result<Json<ExtractResponse>, AppError> {
    state.increment_requests();
    let request = params.into_request(&state.config.pipeline)?;
    run(&state, request).await
}

/// Extract entities and relations from a JSON body
#[utoipa::path(
    post,
    path = "/api/v1/extract",
    tag = "extract",
    request_body = ExtractBody,
    responses(
        (status = 200, description = "Extracted entities and relations", body = ExtractResponse),
        (status = 400, description = "Invalid parameters", body = String),
        (status = 500, description = "Extraction failed", body = String)
    )
)]
pub async fn extract_json(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExtractBody>,
) -> Result<Json<ExtractResponse>, AppError> {
    state.increment_requests();
    let request = body.into_request(&state.config.pipeline);
    run(&state, request).await
}
