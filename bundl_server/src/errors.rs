use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use bundl_engine::OrderFlowError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("{0}")]
    AuthError(#[from] AuthError),
    #[error("{0}")]
    OrderFlow(#[from] OrderFlowError),
    #[error("Backend error: {0}")]
    BackendError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthError(_) => StatusCode::UNAUTHORIZED,
            Self::OrderFlow(e) => match e {
                OrderFlowError::InsufficientCredits
                | OrderFlowError::OrderNotActive
                | OrderFlowError::OrderFullyPledged
                | OrderFlowError::Validation(_) => StatusCode::BAD_REQUEST,
                OrderFlowError::OrderNotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Error bodies carry a concise reason and never leak internal store detail.
        let reason = match self {
            Self::OrderFlow(e) => match e {
                OrderFlowError::InsufficientCredits
                | OrderFlowError::OrderNotFound
                | OrderFlowError::OrderNotActive
                | OrderFlowError::OrderFullyPledged
                | OrderFlowError::Validation(_) => e.to_string(),
                _ => "Internal server error".to_string(),
            },
            Self::InvalidRequestBody(_) | Self::AuthError(_) => self.to_string(),
            _ => "Internal server error".to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": reason }))
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Poorly formatted token: {0}")]
    PoorlyFormattedToken(String),
    #[error("Token validation failed: {0}")]
    ValidationError(String),
    #[error("Token has expired")]
    ExpiredToken,
    #[error("Could not issue token: {0}")]
    TokenCreation(String),
    #[error("Phone verification failed: {0}")]
    OtpFailure(String),
}
