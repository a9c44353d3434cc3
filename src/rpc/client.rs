//! Typed client of `user.UserService`.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::rpc::Method;
use crate::rpc::schema::{
    CreateUserRequest, CreateUserResponse, DeleteUserRequest,
    DeleteUserResponse, Fault, FaultKind, GetUserByIdRequest,
    GetUserByIdResponse, UpdateUserRequest, UpdateUserResponse,
};

/// Errors raised by [`UserServiceClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("cannot build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("user service unreachable: {0}")]
    Unavailable(#[source] reqwest::Error),
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error("cannot decode response message: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ClientError {
    /// Category of the failure, as a caller should handle it.
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Unavailable(_) => FaultKind::Unavailable,
            Self::Fault(fault) => fault.kind,
            Self::Endpoint(_) | Self::Build(_) | Self::Decode(_) => {
                FaultKind::InternalError
            },
        }
    }
}

/// Kind assumed when the server answered without a readable fault.
fn fallback_kind(status: StatusCode) -> FaultKind {
    match status {
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => FaultKind::Unavailable,
        StatusCode::NOT_FOUND => FaultKind::Unimplemented,
        _ => FaultKind::InternalError,
    }
}

/// Client of `user.UserService`. Cheap to clone, connections are pooled.
#[derive(Clone, Debug)]
pub struct UserServiceClient {
    http: reqwest::Client,
    get_user_by_id: Url,
    create_user: Url,
    update_user: Url,
    delete_user: Url,
}

impl UserServiceClient {
    /// Create a client for the server listening at `endpoint`.
    ///
    /// `timeout` bounds a whole call, connection included.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base = if endpoint.ends_with('/') {
            Url::parse(endpoint)?
        } else {
            Url::parse(&format!("{endpoint}/"))?
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            http,
            get_user_by_id: base.join(&Method::GetUserById.path())?,
            create_user: base.join(&Method::CreateUser.path())?,
            update_user: base.join(&Method::UpdateUser.path())?,
            delete_user: base.join(&Method::DeleteUser.path())?,
        })
    }

    async fn call<Req, Resp>(
        &self,
        url: &Url,
        request: &Req,
    ) -> Result<Resp, ClientError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let response = self
            .http
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|err| {
                if err.is_builder() {
                    ClientError::Build(err)
                } else {
                    ClientError::Unavailable(err)
                }
            })?;

        // the timeout also covers the body: a stalled read is a transport failure.
        let status = response.status();
        let body = response.bytes().await.map_err(ClientError::Unavailable)?;

        if status.is_success() {
            return serde_json::from_slice::<Resp>(&body).map_err(ClientError::Decode);
        }

        let fault = serde_json::from_slice::<Fault>(&body).unwrap_or_else(|_| {
            Fault::new(fallback_kind(status), format!("server answered {status}"))
        });
        tracing::debug!(%url, %status, kind = %fault.kind, "call failed");

        Err(fault.into())
    }

    pub async fn get_user_by_id(
        &self,
        request: GetUserByIdRequest,
    ) -> Result<GetUserByIdResponse, ClientError> {
        self.call(&self.get_user_by_id, &request).await
    }

    pub async fn create_user(
        &self,
        request: CreateUserRequest,
    ) -> Result<CreateUserResponse, ClientError> {
        self.call(&self.create_user, &request).await
    }

    pub async fn update_user(
        &self,
        request: UpdateUserRequest,
    ) -> Result<UpdateUserResponse, ClientError> {
        self.call(&self.update_user, &request).await
    }

    pub async fn delete_user(
        &self,
        request: DeleteUserRequest,
    ) -> Result<DeleteUserResponse, ClientError> {
        self.call(&self.delete_user, &request).await
    }
}
