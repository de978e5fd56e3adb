use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

use vconnect_server::{
    build_router, AppState, CredentialSource, EnvCredentials, ServerConfig, ServerError, TokenIssuer,
};

const DEFAULT_LOG_FILTER: &str = "vconnect_server=debug,vconnect_core=debug,tower_http=info";

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    init_logging();

    let config = ServerConfig::from_env()?;
    let addr = config.socket_addr()?;

    if EnvCredentials.credentials().is_some() {
        tracing::info!("platform credentials found in environment");
    } else {
        tracing::warn!("LIVEKIT_URL, LIVEKIT_API_KEY or LIVEKIT_API_SECRET not set; token requests will fail");
    }

    let issuer = TokenIssuer::new(Arc::new(EnvCredentials)).with_ttl(config.token_ttl());
    let router = build_router(AppState::new(issuer));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
