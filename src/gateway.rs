//! Edge HTTP gateway.
//!
//! Thin pass-through: every handler forwards to `user.UserService` through
//! [`UserServiceClient`] and maps the outcome to a public HTTP answer.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use crate::error::ResponseError;
use crate::rpc::client::{ClientError, UserServiceClient};
use crate::rpc::schema::{FaultKind, GetUserByIdRequest, User};
use crate::telemetry;

/// State sharing between routes.
#[derive(Clone)]
pub struct GatewayState {
    pub users: UserServiceClient,
    pub metrics: Option<PrometheusHandle>,
}

/// Errors answered by the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("user `{id}` not found")]
    NotFound { id: String },
    #[error(transparent)]
    Upstream(#[from] ClientError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            Self::NotFound { id } => ResponseError::default()
                .status(StatusCode::NOT_FOUND)
                .title("User not found.")
                .details(&message)
                .instance(format!("/users/{id}"))
                .into_response(),
            Self::Upstream(err) => {
                let response = ResponseError::default();
                match err.kind() {
                    FaultKind::ValidationError => response
                        .status(StatusCode::BAD_REQUEST)
                        .title("Invalid request.")
                        .details(&message),
                    FaultKind::Unavailable => {
                        tracing::warn!(error = %err, "user service unavailable");
                        response
                            .status(StatusCode::SERVICE_UNAVAILABLE)
                            .title("Service unavailable.")
                    },
                    _ => {
                        tracing::error!(error = %err, "user service call failed");
                        response
                    },
                }
                .into_response()
            },
        }
    }
}

/// Create router.
pub fn router(state: GatewayState, timeout: Duration) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().latency_unit(LatencyUnit::Micros)),
        )
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout));

    Router::new()
        // `GET /users/{id}` goes to `get_user`.
        .route("/users/{id}", get(get_user))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

async fn get_user(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<User>, GatewayError> {
    let response = state
        .users
        .get_user_by_id(GetUserByIdRequest { id: id.clone() })
        .await?;

    response.user.map(Json).ok_or(GatewayError::NotFound { id })
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics(State(state): State<GatewayState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, header};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tokio::net::TcpListener;

    use super::*;
    use crate::make_request;
    use crate::rpc::client::tests::spawn_server;
    use crate::rpc::schema::CreateUserRequest;

    async fn app() -> (Router, UserServiceClient) {
        let endpoint = spawn_server().await;
        let users =
            UserServiceClient::new(&endpoint, Duration::from_secs(5)).unwrap();

        (
            router(
                GatewayState {
                    users: users.clone(),
                    metrics: None,
                },
                Duration::from_secs(5),
            ),
            users,
        )
    }

    async fn into_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_get_user() {
        let (app, users) = app().await;
        let created = users
            .create_user(CreateUserRequest {
                username: "alice".into(),
                email: "a@x.com".into(),
                password: "pw123".into(),
            })
            .await
            .unwrap()
            .user;

        let path = format!("/users/{}", created.id);
        let response =
            make_request(app, Method::GET, &path, String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = into_json(response).await;
        assert_eq!(body["id"], created.id.as_str());
        assert_eq!(body["username"], "alice");
        assert!(body.get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_user() {
        let (app, _) = app().await;

        let response =
            make_request(app, Method::GET, "/users/42", String::default()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/problem+json"
        );

        let body = into_json(response).await;
        assert_eq!(body["status"], 404);
        assert_eq!(body["instance"], "/users/42");
    }

    #[tokio::test]
    async fn test_upstream_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let users = UserServiceClient::new(
            &format!("http://{addr}"),
            Duration::from_secs(1),
        )
        .unwrap();
        let app = router(
            GatewayState {
                users,
                metrics: None,
            },
            Duration::from_secs(5),
        );

        let response =
            make_request(app, Method::GET, "/users/42", String::default()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let (app, _) = app().await;

        let response =
            make_request(app, Method::GET, "/metrics", String::default()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_are_rendered() {
        let recorder =
            metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let endpoint = spawn_server().await;
        let users =
            UserServiceClient::new(&endpoint, Duration::from_secs(5)).unwrap();
        let app = router(
            GatewayState {
                users,
                metrics: Some(handle.clone()),
            },
            Duration::from_secs(5),
        );

        // local recorder: tests run in parallel.
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("gateway_test_total").increment(1);
        });

        let response =
            make_request(app, Method::GET, "/metrics", String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("gateway_test_total 1"));
    }

    #[test]
    fn test_internal_is_opaque() {
        let err = GatewayError::Upstream(ClientError::Fault(
            crate::rpc::schema::Fault::new(FaultKind::InternalError, "internal error"),
        ));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
