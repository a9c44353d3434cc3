//! User records service reachable over a typed RPC boundary.
//!
//! The backend (`user-service`) serves `user.UserService` and owns the
//! `users` table. The edge `gateway` forwards public reads to it through
//! [`rpc::client::UserServiceClient`].

#![forbid(unsafe_code)]
#![deny(unused_mut)]

pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod gateway;
pub mod rpc;
pub mod telemetry;
pub mod user;

use std::sync::Arc;

use crate::crypto::PasswordManager;
use crate::database::Database;
use crate::user::{PgUserRepository, UserService};

/// MUST NEVER be used in production.
#[cfg(test)]
pub(crate) async fn make_request(
    app: axum::Router,
    method: axum::http::Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use axum::http::header;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Build the user service from the configuration.
///
/// Connects to PostgreSQL and applies migrations before anything is served.
pub async fn initialize_service(
    config: &config::Configuration,
) -> Result<UserService, Box<dyn std::error::Error>> {
    let Some(postgres) = &config.postgres else {
        tracing::error!("missing `postgres` entry on `config.yaml` file");
        return Err("missing `postgres` configuration".into());
    };

    let db = Database::from_config(postgres).await?;
    // execute migrations scripts on start.
    db.migrate().await?;

    let hasher = PasswordManager::new(config.argon2.clone())?;
    let repo = PgUserRepository::new(db.postgres);

    Ok(UserService::new(Arc::new(repo), Arc::new(hasher)))
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
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
