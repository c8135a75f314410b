//! KGX API Server
//!
//! Configuration comes from the TOML file named by `KGX_CONFIG`, if set,
//! overridden by environment variables.

use kgx_api::{create_router, state::AppState};
use kgx_core::config::AppConfig;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("KGX_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("kgx_api=debug,kgx_extractor={},tower_http=debug", config.logging.level).into()
    });
    if config.logging.json_format {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::from_config(config)?);

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("KGX API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
