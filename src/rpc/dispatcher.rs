//! Method registry of `user.UserService`.
//!
//! Handlers are registered once, by name, when the dispatcher is built. A
//! call then costs one map lookup, decoding of the request message and
//! encoding of the response message.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, ServerError};
use crate::rpc::Method;
use crate::rpc::schema::{
    CreateUserRequest, DeleteUserRequest, FaultKind, GetUserByIdRequest,
    UpdateUserRequest,
};
use crate::user::UserService;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
type Handler = Box<dyn Fn(UserService, Value) -> HandlerFuture + Send + Sync>;

/// Wrap a typed operation into a handler working on raw messages.
fn handler<Req, Resp, F, Fut>(operation: F) -> Handler
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(UserService, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    Box::new(move |service, payload| {
        let call = serde_json::from_value::<Req>(payload)
            .map(|request| operation(service, request));

        Box::pin(async move {
            let response = call.map_err(ServerError::Malformed)?.await?;
            serde_json::to_value(response).map_err(|err| {
                ServerError::internal("cannot encode response message", err)
            })
        })
    })
}

/// Routes a method name to its handler.
pub struct Dispatcher {
    service: UserService,
    handlers: HashMap<&'static str, Handler>,
}

impl Dispatcher {
    /// Build the dispatch table for every [`Method`].
    pub fn new(service: UserService) -> Self {
        let mut handlers = HashMap::with_capacity(Method::ALL.len());

        for method in Method::ALL {
            let entry = match method {
                Method::GetUserById => handler(|service: UserService, request: GetUserByIdRequest| async move {
                    service.get_user_by_id(request).await
                }),
                Method::CreateUser => handler(|service: UserService, request: CreateUserRequest| async move {
                    service.create_user(request).await
                }),
                Method::UpdateUser => handler(|service: UserService, request: UpdateUserRequest| async move {
                    service.update_user(request).await
                }),
                Method::DeleteUser => handler(|service: UserService, request: DeleteUserRequest| async move {
                    service.delete_user(request).await
                }),
            };
            handlers.insert(method.as_str(), entry);
        }

        tracing::debug!(methods = handlers.len(), "dispatch table built");

        Self { service, handlers }
    }

    /// Names of registered methods.
    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// Run `method` against `payload`, returning the encoded response.
    pub async fn dispatch(&self, method: &str, payload: Value) -> Result<Value> {
        let Some(handler) = self.handlers.get(method) else {
            metrics::counter!(
                "rpc_calls_total",
                "method" => "unknown",
                "outcome" => FaultKind::Unimplemented.as_str()
            )
            .increment(1);
            return Err(ServerError::Unimplemented {
                method: method.to_owned(),
            });
        };

        let result = handler(self.service.clone(), payload).await;

        let outcome = match &result {
            Ok(_) => "OK",
            Err(err) => err.kind().as_str(),
        };
        tracing::debug!(%method, %outcome, "call handled");
        metrics::counter!(
            "rpc_calls_total",
            "method" => method.to_owned(),
            "outcome" => outcome
        )
        .increment(1);

        result
    }
}
