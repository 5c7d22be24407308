use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::constants::messages;
use crate::services::{
    AppointmentError, ChatError, CredentialError, GatewayError, IntakeError, RateLimitError,
    ResetError, ReviewError, SessionError,
};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    ExternalApiError { service: String, message: String },

    ValidationError(String),

    PayloadTooLarge(String),

    TooManyRequests { retry_after_secs: u64 },

    InternalError(String),

    Unauthorized(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ApiError::ExternalApiError { service, message } => {
                write!(f, "{} error: {}", service, message)
            }
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            ApiError::TooManyRequests { retry_after_secs } => {
                write!(f, "Too many requests, retry after {}s", retry_after_secs)
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            ApiError::ExternalApiError { service, message } => {
                tracing::warn!("{} API error: {}", service, message);
                (
                    StatusCode::BAD_GATEWAY,
                    format!("{} service is unavailable", service),
                )
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            ApiError::TooManyRequests { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!(
                    "Too many attempts. Please try again in {} minute(s).",
                    retry_after_secs.div_ceil(60)
                ),
            ),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        };

        let body = ApiResponse::<()>::error(error_message);
        let mut response = (status, Json(body)).into_response();

        if let ApiError::TooManyRequests { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidCredentials | CredentialError::NotFound => {
                ApiError::Unauthorized(messages::INVALID_CREDENTIALS.to_string())
            }
            CredentialError::Validation(msg) => ApiError::ValidationError(msg),
            CredentialError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Invalid => ApiError::Unauthorized(messages::NOT_AUTHENTICATED.to_string()),
            SessionError::Store(msg) => ApiError::DatabaseError(msg),
        }
    }
}

impl From<ResetError> for ApiError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::TokenNotFound | ResetError::TokenExpired | ResetError::TokenAlreadyUsed => {
                ApiError::ValidationError(messages::INVALID_RESET_LINK.to_string())
            }
            ResetError::Validation(msg) => ApiError::ValidationError(msg),
            ResetError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unauthorized => {
                ApiError::Unauthorized(messages::NOT_AUTHENTICATED.to_string())
            }
            GatewayError::RateLimited { retry_after_secs } => {
                ApiError::TooManyRequests { retry_after_secs }
            }
            GatewayError::NotFound(msg) => ApiError::NotFound(msg),
            GatewayError::Validation(msg) => ApiError::ValidationError(msg),
            GatewayError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<AppointmentError> for ApiError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound(id) => ApiError::not_found("Appointment request", id),
            AppointmentError::Validation(msg) => ApiError::ValidationError(msg),
            AppointmentError::Internal(msg) => ApiError::DatabaseError(msg),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::NotFound(id) => ApiError::not_found("Review", id),
            ReviewError::ImageNotFound(name) => ApiError::not_found("Image", name),
            ReviewError::Validation(msg) => ApiError::ValidationError(msg),
            ReviewError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation(msg) => ApiError::ValidationError(msg),
            ChatError::Api(message) => ApiError::ExternalApiError {
                service: "Chat".to_string(),
                message,
            },
        }
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Validation(msg) => ApiError::ValidationError(msg),
            IntakeError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Service errors raised inside a gateway mutation.
pub fn gateway_error(err: impl Into<ApiError>) -> GatewayError {
    let err: ApiError = err.into();
    match err {
        ApiError::NotFound(msg) => GatewayError::NotFound(msg),
        ApiError::ValidationError(msg) | ApiError::PayloadTooLarge(msg) => {
            GatewayError::Validation(msg)
        }
        ApiError::TooManyRequests { retry_after_secs } => {
            GatewayError::RateLimited { retry_after_secs }
        }
        ApiError::Unauthorized(_) => GatewayError::Unauthorized,
        other => GatewayError::Internal(other.to_string()),
    }
}

impl ApiError {
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        ApiError::NotFound(format!("{} {} not found", resource, id))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::InternalError(msg.into())
    }

    pub fn unauthorized() -> Self {
        ApiError::Unauthorized(messages::NOT_AUTHENTICATED.to_string())
    }
}
