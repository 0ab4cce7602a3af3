use smartbin_forecast::backend::http::{DEFAULT_TIMEOUT, HttpBackend};
use smartbin_forecast::prediction::PredictionEngine;
use smartbin_forecast::{api, config, refresh, state};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::Level;

fn init_tracing(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "smartbin-forecast starting"
    );

    let mut engine = PredictionEngine::new(config.prediction_settings(), config.model_paths());
    match engine.initialize().await {
        Ok(()) => tracing::info!(
            source = ?engine.model_source(),
            "Prediction model ready"
        ),
        Err(err) => tracing::warn!(
            error = %err,
            "Prediction model unavailable, predictions will be refused"
        ),
    }
    let engine = Arc::new(engine);
    let store = Arc::new(RwLock::new(state::AppState::new()));

    // Periodic refresh: backend history -> prediction -> store -> backend
    let stop_flag = Arc::new(AtomicBool::new(false));
    let refresh_handle = match config.backend() {
        Some(section) if !config.container_ids().is_empty() => {
            let backend = HttpBackend::new(
                section.endpoint.clone(),
                DEFAULT_TIMEOUT,
                config.backend_token().map(str::to_string),
            );
            tracing::info!(
                endpoint = %section.endpoint,
                containers = ?config.container_ids(),
                interval_secs = config.refresh_interval().as_secs(),
                "Starting prediction refresh thread"
            );
            Some(refresh::spawn_refresh_thread(
                Arc::clone(&engine),
                Arc::clone(&store),
                backend,
                config.container_ids().to_vec(),
                config.history_limit(),
                config.refresh_interval(),
                Arc::clone(&stop_flag),
            ))
        }
        Some(_) => {
            tracing::warn!("Backend configured without container_ids, refresh thread not started");
            None
        }
        None => {
            tracing::info!("No backend configured, serving on-demand predictions only");
            None
        }
    };

    let app = api::router(api::ApiState {
        engine: Arc::clone(&engine),
        store: Arc::clone(&store),
    });
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    stop_flag.store(true, Ordering::Relaxed);
    if let Some(handle) = refresh_handle {
        if handle.join().is_err() {
            tracing::warn!("Refresh thread panicked");
        }
    }

    Ok(())
}
