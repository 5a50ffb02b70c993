use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main application error type
#[derive(Debug, Error)]
pub enum TimeChatError {
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Validation error: {field} - {message}")]
    ValidationError { field: String, message: String },

    #[error("Conflict on {resource}: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Rate limit exceeded: {resource}")]
    RateLimitExceeded { resource: String },

    #[error("Tenant unavailable: {tenant} - {reason}")]
    TenantUnavailable { tenant: String, reason: String },

    #[error("Tenant required: {message}")]
    TenantRequired { message: String },

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl TimeChatError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        TimeChatError::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        TimeChatError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        TimeChatError::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn conflict(resource: &str, message: impl Into<String>) -> Self {
        TimeChatError::Conflict {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        TimeChatError::AuthenticationFailed {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TimeChatError::Internal {
            message: message.into(),
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> StatusCode {
        match self {
            TimeChatError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            TimeChatError::AuthenticationFailed { .. } => StatusCode::UNAUTHORIZED,
            TimeChatError::Forbidden { .. } => StatusCode::FORBIDDEN,
            TimeChatError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            TimeChatError::Conflict { .. } => StatusCode::CONFLICT,
            TimeChatError::NotFound { .. } => StatusCode::NOT_FOUND,
            TimeChatError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            TimeChatError::TenantUnavailable { .. } => StatusCode::FORBIDDEN,
            TimeChatError::TenantRequired { .. } => StatusCode::BAD_REQUEST,
            TimeChatError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            TimeChatError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            TimeChatError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for client identification
    pub fn error_code(&self) -> &'static str {
        match self {
            TimeChatError::Database { .. } => "DATABASE_ERROR",
            TimeChatError::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            TimeChatError::Forbidden { .. } => "FORBIDDEN",
            TimeChatError::ValidationError { .. } => "VALIDATION_ERROR",
            TimeChatError::Conflict { .. } => "CONFLICT",
            TimeChatError::NotFound { .. } => "NOT_FOUND",
            TimeChatError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            TimeChatError::TenantUnavailable { .. } => "TENANT_INACTIVE",
            TimeChatError::TenantRequired { .. } => "TENANT_REQUIRED",
            TimeChatError::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            TimeChatError::Internal { .. } => "INTERNAL_ERROR",
            TimeChatError::Configuration { .. } => "CONFIGURATION_ERROR",
        }
    }
}

/// Convert error to HTTP response
impl IntoResponse for TimeChatError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        if status_code.is_server_error() {
            tracing::error!(code = self.error_code(), "{}", self);
        }

        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status_code, body).into_response()
    }
}

/// Application result type
pub type Result<T> = std::result::Result<T, TimeChatError>;

/// True when a MongoDB write failed on a unique index (E11000).
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => err.to_string().contains("E11000"),
    }
}

/// Convert from common error types
impl From<mongodb::error::Error> for TimeChatError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            return TimeChatError::Conflict {
                resource: "record".to_string(),
                message: "A record with the same unique key already exists".to_string(),
            };
        }
        TimeChatError::Database {
            message: err.to_string(),
        }
    }
}

impl From<bson::ser::Error> for TimeChatError {
    fn from(err: bson::ser::Error) -> Self {
        TimeChatError::Internal {
            message: format!("BSON serialization failed: {}", err),
        }
    }
}

impl From<redis::RedisError> for TimeChatError {
    fn from(err: redis::RedisError) -> Self {
        TimeChatError::ExternalService {
            service: "Redis".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TimeChatError {
    fn from(err: serde_json::Error) -> Self {
        TimeChatError::ValidationError {
            field: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for TimeChatError {
    fn from(err: validator::ValidationErrors) -> Self {
        let message = err
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let error_messages: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .unwrap_or(&std::borrow::Cow::Borrowed("invalid"))
                            .to_string()
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        TimeChatError::ValidationError {
            field: "request".to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            TimeChatError::conflict("user", "email taken").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            TimeChatError::forbidden("nope").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            TimeChatError::TenantUnavailable {
                tenant: "acme".into(),
                reason: "inactive".into()
            }
            .error_code(),
            "TENANT_INACTIVE"
        );
        let required = TimeChatError::TenantRequired {
            message: "no tenant in token or header".into(),
        };
        assert_eq!(required.error_code(), "TENANT_REQUIRED");
        assert_eq!(required.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            TimeChatError::RateLimitExceeded {
                resource: "login".into()
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn response_body_carries_code_and_message() {
        let response = TimeChatError::not_found("Client: 42").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["message"], "Resource not found: Client: 42");
    }
}
