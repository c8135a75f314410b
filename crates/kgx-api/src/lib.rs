//! KGX API - HTTP server
//!
//! Serves knowledge graph extraction over HTTP.

pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use handlers::{extract, health};
use kgx_core::config::ServerConfig;
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI document
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::extract::extract_query,
        handlers::extract::extract_json,
        handlers::health::health_check,
    ),
    components(schemas(
        extract::ExtractBody,
        extract::ExtractResponse,
        extract::EntityResponse,
        extract::RelationResponse,
        health::HealthResponse,
    )),
    tags(
        (name = "extract", description = "Entity and relation extraction"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

/// CORS layer; any origin unless origins are configured
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(extract::extract_query))
        .route("/api/v1/extract", post(extract::extract_json))
        .route("/health", get(health::health_check))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    if state.config.server.cors_enabled {
        router = router.layer(cors_layer(&state.config.server));
    }

    router.with_state(state)
}

/// Router backed by deterministic in-process collaborators.
///
/// Knows `Alice` (person), `Bob` (person) and `Acme` (business), scores
/// `Alice -> Acme` as `founder of`, and treats `She` as `Alice`. Any
/// sentence mentioning `Explode` makes the linker fail.
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing() -> Router {
    use kgx_core::config::AppConfig;
    use kgx_extractor::testing::{DictionaryLinker, PairTableClassifier, PhraseCoref};
    use kgx_extractor::{Collaborators, RuleBasedSplitter};

    let collaborators = Collaborators {
        coref: Arc::new(PhraseCoref::new().with_cluster(&["Alice", "She"])),
        splitter: Arc::new(RuleBasedSplitter::new()),
        linker: Arc::new(
            DictionaryLinker::new()
                .with_entity("Alice", "Alice", "Q1", &["human"])
                .with_entity("Bob", "Bob", "Q2", &["human"])
                .with_entity("Acme", "Acme Corporation", "Q3", &["business"])
                .failing_on("Explode"),
        ),
        classifier: Arc::new(
            PairTableClassifier::new().with_pair("Alice", "Acme", "founder of", 0.9),
        ),
    };

    let state = AppState::with_collaborators(AppConfig::default(), collaborators);
    create_router(Arc::new(state))
}
