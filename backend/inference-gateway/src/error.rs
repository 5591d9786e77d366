use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Client input rejected before it reaches the ranking engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("subject_id is required")]
    MissingSubject,

    #[error("result_limit must be a positive integer, got {0}")]
    InvalidLimit(i64),

    #[error("subject_ids must not be empty")]
    EmptyBatch,

    #[error("batch of {size} subjects exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("model path must stay inside the model directory")]
    ModelPathNotAllowed,
}

/// Failures raised while loading a model bundle.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model not found at {0}")]
    NotFound(String),

    #[error("failed to read model at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model bundle: {0}")]
    Invalid(String),
}

impl LoadError {
    /// Category without paths or parser detail, safe to hand to clients.
    pub fn summary(&self) -> &'static str {
        match self {
            LoadError::NotFound(_) => "model bundle not found",
            LoadError::Io { .. } => "model bundle could not be read",
            LoadError::Invalid(_) => "model bundle is invalid",
        }
    }
}

/// Failures raised by the ranking engine.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model is not loaded")]
    ModelUnavailable,

    #[error("item not found: {0}")]
    UnknownItem(String),

    #[error("scoring backend failed: {0}")]
    BackendFailure(String),

    #[error("{stage} timed out after {elapsed:?}")]
    Timeout {
        stage: &'static str,
        elapsed: Duration,
    },
}

/// Externally visible error categories of the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid API key")]
    Unauthorized,

    #[error("Model not loaded. Please check server logs.")]
    ModelUnavailable,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Inference request timed out")]
    Timeout,

    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// Stable snake_case tag used in error bodies and batch entries.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "bad_request",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::ModelUnavailable => "model_unavailable",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Timeout => "timeout",
            GatewayError::Internal => "internal_error",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            code: self.status_code().as_u16(),
        }
    }
}

/// Backend causes are logged at the engine boundary; only the category crosses it.
impl From<InferenceError> for GatewayError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::ModelUnavailable => GatewayError::ModelUnavailable,
            InferenceError::UnknownItem(id) => GatewayError::NotFound(format!("item {}", id)),
            InferenceError::Timeout { .. } => GatewayError::Timeout,
            InferenceError::BackendFailure(_) => GatewayError::Internal,
        }
    }
}

impl From<LoadError> for GatewayError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::NotFound(_) => GatewayError::NotFound("model bundle".to_string()),
            LoadError::Io { .. } | LoadError::Invalid(_) => GatewayError::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    pub code: u16,
}

impl ResponseError for GatewayError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.body())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
