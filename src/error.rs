use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// Error type returned by every handler. Always rendered as `{ "error": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    /// 400 that also carries a machine-readable code.
    #[error("{message}")]
    Rejected { message: String, code: &'static str },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Server-side failure. The cause is logged under `reference`, only
    /// `message` reaches the client.
    #[error("{message}")]
    Internal {
        message: String,
        code: &'static str,
        reference: Uuid,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<Uuid>,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn rejected(code: &'static str, msg: impl Into<String>) -> Self {
        Self::Rejected {
            message: msg.into(),
            code,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Log `err` with a fresh correlation id and hide it behind a generic message.
    pub fn internal(err: impl std::fmt::Display, code: &'static str, message: &str) -> Self {
        let reference = Uuid::new_v4();
        tracing::error!(%reference, code, error = %err, "{}", message);
        Self::Internal {
            message: format!(
                "{}. Please contact support with this code: {}",
                message, reference
            ),
            code,
            reference,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Rejected { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::Internal {
                code, reference, ..
            } => ErrorBody {
                error: self.to_string(),
                code: Some(*code),
                reference: Some(*reference),
            },
            ApiError::Rejected { code, .. } => ErrorBody {
                error: self.to_string(),
                code: Some(*code),
                reference: None,
            },
            _ => ErrorBody {
                error: self.to_string(),
                code: None,
                reference: None,
            },
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(format!("{:#}", err), "INTERNAL_ERROR", "Internal server error")
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::internal(err, "DATABASE_ERROR", "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
