use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use thiserror::Error;
use vpay_engine::{ErrorCategory, OrderFlowError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("补单失败. The merchant did not acknowledge the notification. {0}")]
    NotificationFailed(String),
    #[error("{0}")]
    OrderFlowError(#[from] OrderFlowError),
}

impl ServerError {
    /// A short, stable identifier for the error that clients can switch on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequestBody(_) | Self::InvalidRequestPath(_) => "invalid_request",
            Self::NotificationFailed(_) => "notify_failed",
            Self::OrderFlowError(e) => e.code(),
            _ => "internal_error",
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotificationFailed(_) => StatusCode::BAD_GATEWAY,
            Self::OrderFlowError(e) => match e.category() {
                ErrorCategory::Validation => StatusCode::BAD_REQUEST,
                ErrorCategory::NotFound => StatusCode::NOT_FOUND,
                ErrorCategory::Conflict => StatusCode::CONFLICT,
                ErrorCategory::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
                ErrorCategory::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorCategory::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCategory::State => StatusCode::CONFLICT,
                ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Backend details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR && self.code() == "internal_error" {
            error!("💻️ {self}");
            "An internal error occurred. Please try again later.".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "code": self.code(), "error": message }).to_string())
    }
}
