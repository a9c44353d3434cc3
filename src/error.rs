//! Error handler for the user service.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::error::ErrorKind;
use thiserror::Error;
use validator::ValidationErrors;

use crate::crypto::CryptoError;
use crate::rpc::schema::{Fault, FaultKind, FieldError};

pub type Result<T> = std::result::Result<T, ServerError>;

/// Message sent in place of internal details.
const OPAQUE_INTERNAL: &str = "internal error";

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("`{constraint}` constraint violated")]
    ConstraintViolation { constraint: String },

    #[error("method `{method}` is not implemented")]
    Unimplemented { method: String },

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Wrap any error into an [`ServerError::Internal`].
    pub fn internal<E>(details: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: details.into(),
            source: Some(Box::new(err)),
        }
    }

    /// Kind carried on the wire for this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Validation(_) | Self::Malformed(_) => {
                FaultKind::ValidationError
            },
            Self::ConstraintViolation { .. } => FaultKind::ConstraintViolation,
            Self::Unimplemented { .. } => FaultKind::Unimplemented,
            Self::Internal { .. } => FaultKind::InternalError,
        }
    }

    /// Convert into the wire [`Fault`].
    ///
    /// Internal errors are logged here and never leak their details.
    pub fn to_fault(&self) -> Fault {
        let kind = self.kind();
        match self {
            Self::Validation(errors) => Fault {
                kind,
                message: self.to_string(),
                errors: parse_validation_errors(errors),
            },
            Self::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "call failed with internal error");
                Fault::new(kind, OPAQUE_INTERNAL)
            },
            _ => Fault::new(kind, self.to_string()),
        }
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            let integrity = matches!(
                db_err.kind(),
                ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation
            );
            if integrity {
                return Self::ConstraintViolation {
                    constraint: db_err
                        .constraint()
                        .unwrap_or("integrity")
                        .to_owned(),
                };
            }
        }

        Self::internal("SQL request failed", err)
    }
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        Self::internal("password hashing failed", err)
    }
}

/// HTTP status used to carry a fault of the given kind.
pub fn status_code(kind: FaultKind) -> StatusCode {
    match kind {
        FaultKind::ValidationError => StatusCode::BAD_REQUEST,
        FaultKind::Unimplemented => StatusCode::NOT_FOUND,
        FaultKind::ConstraintViolation => StatusCode::CONFLICT,
        FaultKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        FaultKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields = errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect::<Vec<_>>();
    // HashMap iteration order is not stable.
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let fault = self.to_fault();
        (status_code(fault.kind), axum::Json(fault)).into_response()
    }
}

/// Structure for detailed error responses on the public HTTP surface.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Set the resource the error relates to.
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
        }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match serde_json::to_string(&self) {
            Ok(body) => (
                status,
                [(header::CONTENT_TYPE, "application/problem+json")],
                body,
            )
                .into_response(),
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
