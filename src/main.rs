//! Dark Circles Detection API server

use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use darkcircle_api::{
    camera,
    config::Config,
    create_router,
    model::{DetectorSettings, ModelLoader},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "darkcircle_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Dark Circles Detection API starting...");
    tracing::info!("Model directory: {}", config.model_dir.display());

    // Load the model once; failures leave the service running without it
    let loader = ModelLoader::new(DetectorSettings::from(&config));
    let model_dir = config.model_dir.clone();
    let model = tokio::task::spawn_blocking(move || loader.load_from_dir(&model_dir))
        .await
        .context("Model loading task panicked")?;

    if !model.is_loaded() {
        tracing::warn!("Serving without a model, prediction endpoints will answer 503");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;

    let state = AppState::new(model, config, camera::default_source());
    let app = create_router(state);

    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
