//! # Web API Response Types
//!
//! Every endpoint except `/health` answers with one envelope:
//!
//! ```json
//! { "success": true, "data": ..., "pagination": { "total": 120, "limit": 50, "offset": 0, "has_more": true } }
//! { "success": false, "error": "...", "code": "NOT_FOUND", "details": { "missing_ids": [...] } }
//! ```
//!
//! Payloads under `data` serialize with camelCase keys. The envelope keys,
//! including `pagination.has_more` and `details.missing_ids`, are fixed by the
//! dashboard client.
//!
//! [`ApiError`] is the only error type handlers return; it renders the
//! failure envelope through Axum's `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::LeadflowError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(total: i64, limit: i64, offset: i64) -> Self {
        Self {
            total,
            limit,
            offset,
            has_more: offset + limit < total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            pagination: None,
        })
    }

    pub fn paginated(data: T, pagination: Pagination) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            pagination: Some(pagination),
        })
    }
}

/// Web API errors with HTTP status code mappings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Invalid request: {message}")]
    BadRequest {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    NotFound {
        message: String,
        details: Option<Value>,
    },

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Service temporarily unavailable")]
    ServiceUnavailable { detail: Option<String> },

    #[error("Internal server error")]
    Internal { detail: Option<String> },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            details: None,
        }
    }

    /// Map a core error; `expose_details` controls whether server-side
    /// failure text reaches the client.
    pub fn from_leadflow(err: LeadflowError, expose_details: bool) -> Self {
        let detail = |err: &LeadflowError| expose_details.then(|| err.to_string());
        match &err {
            LeadflowError::Validation(message) => Self::bad_request(message.clone()),
            LeadflowError::LeadsNotFound {
                lead_source,
                missing_ids,
            } => Self::NotFound {
                message: err.to_string(),
                details: Some(json!({
                    "lead_source": lead_source,
                    "missing_ids": missing_ids,
                })),
            },
            LeadflowError::Database(_) => Self::ServiceUnavailable {
                detail: detail(&err),
            },
            LeadflowError::Configuration(_)
            | LeadflowError::Webhook(_)
            | LeadflowError::Internal(_) => Self::Internal {
                detail: detail(&err),
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::BadRequest { details, .. } | Self::NotFound { details, .. } => details.clone(),
            Self::ServiceUnavailable { detail } | Self::Internal { detail } => {
                detail.as_ref().map(|d| json!({ "detail": d }))
            }
            Self::MethodNotAllowed => None,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest { message, .. } | Self::NotFound { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "error": self.message(),
            "code": self.code(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}
