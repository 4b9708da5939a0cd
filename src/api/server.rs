use std::sync::Arc;

use axum::{Router, routing::delete, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::services;
use super::state::AppState;
use crate::config::Config;
use crate::server::Server;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the full route table over the facade.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(services::health))
        .route("/api/server/info", get(services::server_info))
        .route(
            "/api/packages",
            get(services::list_packages).post(services::register_package),
        )
        .route("/api/scripts", post(services::add_script))
        .route("/api/scripts/{id}", delete(services::remove_script))
        .route("/api/scripts/{id}/{action}", post(services::script_action))
        .route("/api/scripts/{id}/info", get(services::script_info))
        .route("/api/scripts/{id}/files/{*file}", get(services::script_file))
        .route("/api/clients/info", post(services::client_info))
        .route("/api/jobs/next", get(services::next_job))
        .route("/api/jobs/result", post(services::post_result))
        .with_state(state)
        // Transparent gzip handling for package uploads
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    let address = config.server.bind_addr;
    let server = Arc::new(Server::new(config)?);
    server.start();

    let app = router(AppState::new(Arc::clone(&server)));

    let listener = TcpListener::bind(address).await?;
    info!(%address, "jobgrid server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    server.stop();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
