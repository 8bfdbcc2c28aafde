use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;
use crate::utils::response::error as error_response;
use crate::utils::validation::FieldError;

/// Business rule violations. Rendered verbatim as the error `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "ENTITY_NOT_FOUND")]
    EntityNotFound,
    #[serde(rename = "USER_NOT_FOUND")]
    UserNotFound,
    #[serde(rename = "USER_ALREADY_EXISTS")]
    UserAlreadyExists,
    #[serde(rename = "EVENT_ALREADY_EXISTS")]
    EventAlreadyExists,
    #[serde(rename = "UNAVALIABLE_EVENT")]
    UnavailableEvent,
    #[serde(rename = "TICKET_LIMIT_REACHED")]
    TicketLimitReached,
    #[serde(rename = "USER_BLOCKED")]
    UserBlocked,
    #[serde(rename = "INVALID_CREDENTIALS")]
    InvalidCredentials,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EntityNotFound => "ENTITY_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::UserAlreadyExists => "USER_ALREADY_EXISTS",
            Self::EventAlreadyExists => "EVENT_ALREADY_EXISTS",
            Self::UnavailableEvent => "UNAVALIABLE_EVENT",
            Self::TicketLimitReached => "TICKET_LIMIT_REACHED",
            Self::UserBlocked => "USER_BLOCKED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::EntityNotFound => "Entity not found",
            Self::UserNotFound => "User not found",
            Self::UserAlreadyExists => "User already exists",
            Self::EventAlreadyExists => "An event with the same name is already on sale",
            Self::UnavailableEvent => "Event is not available",
            Self::TicketLimitReached => "Ticket limit reached",
            Self::UserBlocked => "User is not allowed to perform this operation",
            Self::InvalidCredentials => "Invalid email/password",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic detail of an internal failure.
///
/// Attached to the response extensions; only the development-mode middleware
/// in `routes` copies it into the body.
#[derive(Debug, Clone)]
pub struct InternalDetail {
    pub code: &'static str,
    pub message: String,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Business rule violated: {code}")]
    Business {
        code: ErrorCode,
        options: Option<Value>,
    },

    #[error("Validation error")]
    Validation(Vec<FieldError>),

    #[error("Malformed request: {0}")]
    BadRequest(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Store error")]
    Store(#[from] StoreError),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn business(code: ErrorCode) -> Self {
        AppError::Business {
            code,
            options: None,
        }
    }

    pub fn business_with(code: ErrorCode, options: Value) -> Self {
        AppError::Business {
            code,
            options: Some(options),
        }
    }

    /// The business code, if this is a business rule violation.
    pub fn business_code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Business { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Business { .. } => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Business { code, .. } => code.as_str(),
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::AuthError(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Store(_) => "INTERNAL_SERVER_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::Business { code, .. } => {
                warn!(code = %code, "Business rule violated");
            }
            AppError::Validation(fields) => {
                warn!(fields = ?fields, "Validation failed");
            }
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => {
                warn!(error = ?self, message = %msg, "Request rejected");
            }
            AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::Store(e) => {
                error!(error = ?e, "Store error");
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let (public_message, details, internal) = match self {
            AppError::Business { code, options } => (code.message().to_string(), options, None),
            AppError::Validation(fields) => (
                "The provided input is invalid".to_string(),
                Some(json!(fields)),
                None,
            ),
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => (msg, None, None),
            AppError::Store(e) => (
                "A database error occurred".to_string(),
                None,
                Some(format!("{e}: {e:?}")),
            ),
            AppError::InternalServerError(msg) => {
                ("Internal server error".to_string(), None, Some(msg))
            }
        };

        let mut response = error_response(code, public_message.clone(), details, status);
        if let Some(detail) = internal {
            response.extensions_mut().insert(InternalDetail {
                code,
                message: public_message,
                detail,
            });
        }
        response
    }
}
