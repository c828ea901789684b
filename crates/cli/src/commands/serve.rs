use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tessera_console::AppState;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use super::load_config;

/// How often expired console sessions are purged.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Run the `serve` command: start the web console.
pub async fn run(config_path: &str, port: u16) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let public_url = config.public_url().to_string();

    let state = Arc::new(AppState::from_config(config));
    if state.auth.registry().is_enabled() {
        info!("SAML login enabled");
    } else {
        info!("SAML login disabled, local login only");
    }

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sweeper.sessions.purge_expired();
            if removed > 0 {
                debug!(removed, "purged expired sessions");
            }
        }
    });

    // Add security headers
    let app = tessera_console::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    println!("Tessera listening on http://{}", addr);
    println!("SP metadata: {}/saml/metadata", public_url);
    info!("Starting server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
