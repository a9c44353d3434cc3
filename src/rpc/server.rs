//! HTTP transport of `user.UserService`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use crate::error::{Result, ServerError};
use crate::rpc::SERVICE_NAME;
use crate::rpc::dispatcher::Dispatcher;
use crate::telemetry;

/// State sharing between routes.
#[derive(Clone)]
pub struct RpcState {
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn router(state: RpcState, timeout: Duration) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().latency_unit(LatencyUnit::Micros)),
        )
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout));

    Router::new()
        // `POST /user.UserService/{method}` goes to `call`.
        .route("/{service}/{method}", post(call))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

async fn call(
    State(state): State<RpcState>,
    Path((service, method)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>> {
    if service != SERVICE_NAME {
        return Err(ServerError::Unimplemented {
            method: format!("{service}/{method}"),
        });
    }

    let payload = serde_json::from_slice::<Value>(&body)
        .map_err(ServerError::Malformed)?;

    state.dispatcher.dispatch(&method, payload).await.map(Json)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics(State(state): State<RpcState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::make_request;
    use crate::rpc::schema::{CreateUserResponse, Fault, FaultKind};
    use crate::user::memory::service;

    fn app() -> Router {
        router(
            RpcState {
                dispatcher: Arc::new(Dispatcher::new(service())),
                metrics: None,
            },
            Duration::from_secs(5),
        )
    }

    async fn into_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn create(app: Router, email: &str) -> Response {
        make_request(
            app,
            Method::POST,
            "/user.UserService/CreateUser",
            json!({ "username": "alice", "email": email, "password": "pw123" })
                .to_string(),
        )
        .await
    }

    #[tokio::test]
    async fn test_health() {
        let response =
            make_request(app(), Method::GET, "/health", String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(into_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_call_create_then_get() {
        let app = app();

        let response = create(app.clone(), "a@x.com").await;
        assert_eq!(response.status(), StatusCode::OK);
        let created: CreateUserResponse =
            serde_json::from_value(into_json(response).await).unwrap();

        let response = make_request(
            app,
            Method::POST,
            "/user.UserService/GetUserById",
            json!({ "id": created.user.id }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = into_json(response).await;
        assert_eq!(body["user"]["email"], "a@x.com");
        assert!(body["user"].get("createdAt").is_some());
    }

    #[tokio::test]
    async fn test_call_unknown_user_is_empty() {
        let response = make_request(
            app(),
            Method::POST,
            "/user.UserService/GetUserById",
            json!({ "id": "1" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(into_json(response).await, json!({}));
    }

    #[tokio::test]
    async fn test_call_unknown_method() {
        for path in ["/user.UserService/FindUser", "/user.Other/GetUserById"] {
            let response =
                make_request(app(), Method::POST, path, "{}".into()).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);

            let fault: Fault =
                serde_json::from_value(into_json(response).await).unwrap();
            assert_eq!(fault.kind, FaultKind::Unimplemented);
        }
    }

    #[tokio::test]
    async fn test_call_malformed_body() {
        let response = make_request(
            app(),
            Method::POST,
            "/user.UserService/CreateUser",
            "{not json".into(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let fault: Fault =
            serde_json::from_value(into_json(response).await).unwrap();
        assert_eq!(fault.kind, FaultKind::ValidationError);
    }

    #[tokio::test]
    async fn test_call_invalid_email_lists_field() {
        let response = create(app(), "not-an-email").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let fault: Fault =
            serde_json::from_value(into_json(response).await).unwrap();
        assert_eq!(fault.kind, FaultKind::ValidationError);
        assert_eq!(fault.errors.len(), 1);
        assert_eq!(fault.errors[0].field, "email");
    }

    #[tokio::test]
    async fn test_call_duplicate_email() {
        let app = app();

        let response = create(app.clone(), "a@x.com").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = create(app, "A@X.com").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let fault: Fault =
            serde_json::from_value(into_json(response).await).unwrap();
        assert_eq!(fault.kind, FaultKind::ConstraintViolation);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let response =
            make_request(app(), Method::GET, "/metrics", String::default()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
