use std::sync::Arc;

use tokio::net::TcpListener;
use user_service::config::Configuration;
use user_service::rpc::dispatcher::Dispatcher;
use user_service::rpc::server::{RpcState, router};
use user_service::{initialize_service, shutdown_signal, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    // read configuration file.
    let config = Configuration::default().from_env().read()?;

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "prometheus recorder not installed");
            None
        },
    };

    let service = initialize_service(&config).await?;
    let state = RpcState {
        dispatcher: Arc::new(Dispatcher::new(service)),
        metrics,
    };
    let app = router(state, config.rpc.timeout());

    let listener = TcpListener::bind(&config.rpc.address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        service = user_service::rpc::SERVICE_NAME,
        "rpc server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
