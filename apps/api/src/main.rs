mod backends;
mod config;
mod engine;
mod errors;
mod generation;
mod models;
mod render;
mod resilience;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::engine::{EngineSettings, Orchestrator};
use crate::render::RenderPipeline;
use crate::resilience::RetryPolicy;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{S3PermanentStore, TempArtifactStore};

/// Finished runs stay queryable for this long.
const RUN_RETENTION: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Outbound HTTP for generation and render backends; per-call timeouts are
    // applied by the engine.
    let http = reqwest::Client::builder()
        .user_agent(concat!("tailor/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let backends = backends::from_config(&config, &http)
        .await
        .context("Invalid backend configuration")?;
    let registry = Arc::new(backends.registry);

    let pipeline = RenderPipeline::new(
        &registry,
        backends.renderers,
        retry_policy(config.render_max_attempts),
        config.render_timeout,
    )?;

    let store = Arc::new(TempArtifactStore::new(
        Arc::new(S3PermanentStore::new(s3, config.s3_bucket.clone())),
        config.max_artifact_bytes,
    ));

    let engine = Orchestrator::new(
        registry,
        backends.generators,
        pipeline,
        store,
        EngineSettings {
            generation_policy: retry_policy(config.generation_max_attempts),
            generation_timeout: config.generation_timeout,
            run_retention: RUN_RETENTION,
        },
    );

    // Build app state
    let state = AppState {
        engine: Arc::new(engine),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client's domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn retry_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(8),
        max_jitter: Duration::from_millis(250),
    }
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "tailor-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
