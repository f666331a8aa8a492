// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fesat::config::FesatConfig;
use fesat::explain::ExplainClient;
use fesat::server::{create_explain_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Arc::new(FesatConfig::from_env());
    info!("Starting FESAT explanation proxy");
    info!("Model: {}", config.explain_model);
    info!("Backend mode: {:?}", config.backend_mode);

    let explain = ExplainClient::from_config(&config)?;
    let state = Arc::new(AppState {
        config: config.clone(),
        explain,
    });

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_explain_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.explain_timeout + 5,
        )))
        .layer(cors);

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Explanation proxy listening on http://{}/api/explain", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
