//! authgate server binary.
//!
//! Loads configuration, opens the storage backend, registers bootstrap
//! clients, and serves the OAuth endpoints with graceful shutdown.

use anyhow::Result;
use authgate::{
    config::Config,
    errors::OAuthError,
    http::{AppState, build_router},
    storage::{OAuthStorage, create_storage_backend, parse_storage_backend},
};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "authgate=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    let version = authgate::config::version()?;

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{version}");
            std::process::exit(0);
        }
    });

    tracing::info!(?version, "Starting authgate");

    let config = Config::new()?;
    tracing::info!(
        external_base = %config.external_base,
        storage_backend = %config.storage_backend,
        "configuration loaded"
    );

    // Parse storage backend configuration
    let storage_backend =
        parse_storage_backend(&config.storage_backend, config.database_url.as_deref())?;
    let oauth_storage = create_storage_backend(storage_backend).await?;

    let app_context = AppState::new(
        Arc::new(config.clone()),
        oauth_storage.clone(),
        config.auth_decision.decider(),
    );

    register_bootstrap_clients(&app_context, &config).await?;

    let app = build_router(app_context);

    // Setup graceful shutdown
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    {
        let tracker = tracker.clone();
        let inner_token = token.clone();

        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!("failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    tracing::error!("failed to install signal handler: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::spawn(async move {
            tokio::select! {
                () = inner_token.cancelled() => { },
                _ = terminate => {},
                _ = ctrl_c => {},
            }

            tracker.close();
            inner_token.cancel();
        });
    }

    // Sweep expired codes and tokens
    {
        let storage = oauth_storage.clone();
        let period = *config.cleanup_interval.as_ref();
        let inner_token = token.clone();
        tracker.spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    () = inner_token.cancelled() => break,
                    _ = interval.tick() => sweep_expired(storage.as_ref()).await,
                }
            }
            tracing::info!("cleanup task stopped");
        });
    }

    // Start HTTP server
    {
        let http_port = *config.http_port.as_ref();
        let inner_token = token.clone();
        tracker.spawn(async move {
            let bind_address = format!("0.0.0.0:{http_port}");
            tracing::info!("Starting server on {bind_address}");

            let listener = match TcpListener::bind(&bind_address).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!("failed to bind {bind_address}: {}", err);
                    inner_token.cancel();
                    return;
                }
            };

            let shutdown_token = inner_token.clone();
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    tracing::info!("axum graceful shutdown complete");
                })
                .await;
            if let Err(err) = result {
                tracing::error!("axum task failed: {}", err);
            }

            inner_token.cancel();
        });
    }

    tracker.wait().await;

    Ok(())
}

async fn register_bootstrap_clients(state: &AppState, config: &Config) -> Result<()> {
    let registry = state.grant_engine.clients();
    for client in config.bootstrap_clients.as_ref() {
        match registry.lookup(&client.client_id).await {
            Ok(existing) => {
                if existing.redirect_domain != client.redirect_domain {
                    tracing::warn!(
                        client_id = %client.client_id,
                        "bootstrap client already registered with a different redirect domain"
                    );
                }
            }
            Err(OAuthError::UnknownClient(_)) => {
                registry
                    .register(
                        &client.client_id,
                        &client.client_secret,
                        &client.redirect_domain,
                        None,
                    )
                    .await?;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

async fn sweep_expired(storage: &dyn OAuthStorage) {
    match storage.cleanup_expired_codes().await {
        Ok(0) => {}
        Ok(count) => tracing::debug!(count, "removed expired authorization codes"),
        Err(err) => tracing::error!(error = ?err, "authorization code cleanup failed"),
    }
    match storage.cleanup_expired_tokens().await {
        Ok(0) => {}
        Ok(count) => tracing::debug!(count, "removed expired tokens"),
        Err(err) => tracing::error!(error = ?err, "token cleanup failed"),
    }
}
