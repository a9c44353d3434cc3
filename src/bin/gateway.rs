use tokio::net::TcpListener;
use user_service::config::Configuration;
use user_service::gateway::{GatewayState, router};
use user_service::rpc::client::UserServiceClient;
use user_service::{shutdown_signal, telemetry};

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

    // the remote service is resolved once, here.
    let users = UserServiceClient::new(
        &config.gateway.upstream,
        config.gateway.timeout(),
    )?;
    let app = router(GatewayState { users, metrics }, config.gateway.timeout());

    let listener = TcpListener::bind(&config.gateway.address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        upstream = %config.gateway.upstream,
        "gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
