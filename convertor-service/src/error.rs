use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Stage of the pipeline a transform failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    Validation,
    StagingIo,
    EngineInvocation,
    OutputMissing,
    Unknown,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Validation => "validation",
            ErrorStage::StagingIo => "staging_io",
            ErrorStage::EngineInvocation => "engine_invocation",
            ErrorStage::OutputMissing => "output_missing",
            ErrorStage::Unknown => "unknown",
        }
    }
}

/// Main transform error type.
///
/// Display output is what callers see in the `error` field, so messages must
/// never carry absolute scratch paths or configured secrets.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("{message}")]
    Validation { message: String },

    #[error("Failed to stage {name}")]
    StagingIo {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{engine} failed: {message}")]
    EngineInvocation {
        engine: &'static str,
        message: String,
    },

    #[error("{artifact} was not created")]
    OutputMissing { artifact: String },

    #[error("Internal error: {message}")]
    Unknown { message: String },
}

impl TransformError {
    pub fn validation(message: impl Into<String>) -> Self {
        TransformError::Validation {
            message: message.into(),
        }
    }

    pub fn engine(engine: &'static str, message: impl Into<String>) -> Self {
        TransformError::EngineInvocation {
            engine,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> ErrorStage {
        match self {
            TransformError::Validation { .. } => ErrorStage::Validation,
            TransformError::StagingIo { .. } => ErrorStage::StagingIo,
            TransformError::EngineInvocation { .. } => ErrorStage::EngineInvocation,
            TransformError::OutputMissing { .. } => ErrorStage::OutputMissing,
            TransformError::Unknown { .. } => ErrorStage::Unknown,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.stage() {
            ErrorStage::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for TransformError {
    fn from(error: tokio::task::JoinError) -> Self {
        let message = if error.is_panic() {
            "engine task panicked".to_string()
        } else {
            "engine task was cancelled".to_string()
        };
        TransformError::Unknown { message }
    }
}

/// Error body returned by every transform endpoint
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for TransformError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let response = ErrorResponse {
            error: self.to_string(),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for transform operations
pub type TransformResult<T> = Result<T, TransformError>;

/// Client-secret authentication failures
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("You need to be authenticated to access this resource")]
    MissingCredentials,

    #[error("Invalid CLIENT-KEY.")]
    InvalidKey,

    #[error("The CLIENT SECRET received and the CLIENT SECRET configured do not match.")]
    SecretMismatch,
}

/// 401 body, kept in the shape existing clients already parse
#[derive(Serialize)]
pub struct AuthErrorResponse {
    pub success: bool,
    pub message: String,
    pub code: u16,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::UNAUTHORIZED;
        let response = AuthErrorResponse {
            success: false,
            message: self.to_string(),
            code: status.as_u16(),
        };

        (status, Json(response)).into_response()
    }
}

/// Startup and configuration errors
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to prepare scratch directory")]
    ScratchDir(#[source] std::io::Error),

    #[error("Failed to load matting model: {message}")]
    ModelInit { message: String },

    #[error("Failed to install metrics recorder: {message}")]
    Metrics { message: String },
}

/// Format an error and its full source chain on one line for logging
pub fn format_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
