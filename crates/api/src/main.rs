use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carelink_api::config::ServerConfig;
use carelink_api::hub::{self, SessionRegistry};
use carelink_api::router::build_app_router;
use carelink_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carelink_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        namespace = %config.namespace,
        "Loaded server configuration",
    );
    if config.request_timeout_secs <= config.poll_timeout_secs {
        tracing::warn!(
            request_timeout_secs = config.request_timeout_secs,
            poll_timeout_secs = config.poll_timeout_secs,
            "Request timeout does not exceed the long-poll timeout; polling clients will see 408s",
        );
    }

    // --- App state ---
    let state = AppState::new(config.clone());

    // --- Heartbeat ---
    let heartbeat_handle = hub::start_heartbeat(
        Arc::clone(&state.sessions),
        Arc::clone(&state.polls),
        config.heartbeat_interval(),
        config.poll_session_ttl(),
    );

    // --- Router ---
    let app = build_app_router(state.clone(), &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting presence hub");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state.sessions)))
        .await
        .expect("Server error");

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM, then close every session.
///
/// Sessions are closed before the server drains, since upgraded
/// WebSockets and pending long-polls would otherwise hold it open.
async fn shutdown_signal(sessions: Arc<SessionRegistry>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }

    let count = sessions.session_count().await;
    tracing::info!(count, "Closing presence sessions");
    sessions.shutdown_all().await;
}
