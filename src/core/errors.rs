use http::StatusCode;
use spin_sdk::http::Response;
use std::fmt;

use crate::core::helpers::{login_redirect_url, redirect, JSON_CONTENT_TYPE};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// No authenticated user; answered with a redirect to the login page.
    Unauthorized { login_url: String, next: String },
    NotFound(String),
    MethodNotAllowed,
    Conflict(String),
    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::Unauthorized { next, .. } => write!(f, "Unauthorized: {}", next),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::MethodNotAllowed => write!(f, "Method Not Allowed"),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

fn error_body(status: StatusCode, msg: &str) -> Response {
    let body = serde_json::json!({"error": msg, "status": status.as_u16()});
    Response::builder()
        .status(status.as_u16())
        .header("Content-Type", JSON_CONTENT_TYPE)
        .body(body.to_string().into_bytes())
        .build()
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, &msg),
            ApiError::Unauthorized { login_url, next } => {
                redirect(&login_redirect_url(&login_url, &next))
            }
            ApiError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, &msg),
            ApiError::MethodNotAllowed => {
                error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
            }
            ApiError::Conflict(msg) => error_body(StatusCode::CONFLICT, &msg),
            ApiError::InternalError(msg) => {
                tracing::error!(error = %msg, "request failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(format!("{:#}", err))
    }
}

impl ApiError {
    /// Names the requested path in a not-found message.
    pub fn at_path(self, path: &str) -> Self {
        match self {
            ApiError::NotFound(msg) => ApiError::NotFound(format!("{}: {}", msg, path)),
            other => other,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
