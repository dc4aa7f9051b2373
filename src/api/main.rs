use anyhow::Context;
use flowchart_api::config::AppConfig;
use flowchart_api::middleware::{create_cors_layer, init_tracing, trace_layer};
use flowchart_api::routes::{AppState, create_app};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tracing::{info, warn};

// Panic hook to catch and log panics
fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC occurred!");
        if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            eprintln!("Panic message: {}", s);
        }
        if let Some(location) = panic_info.location() {
            eprintln!(
                "Panic location: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
    }));
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down gracefully"),
                    _ = sigterm.recv() => info!("SIGTERM received, shutting down gracefully"),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("SIGINT received, shutting down gracefully");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    setup_panic_hook();
    init_tracing();
    info!("Application starting...");

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let app_state = AppState::from_config(&config)
        .await
        .context("Failed to initialise document store")?;
    if !app_state.llm.is_configured() {
        warn!("AI_API_KEY not set; /api/v1/generate-flowchart will fail");
    }

    let app = create_app(app_state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(create_cors_layer(&config.cors_allowed_origins)),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);
    info!("Health check available at http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}
