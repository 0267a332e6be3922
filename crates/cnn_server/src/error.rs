use actix_web::error::BlockingError;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use tracing::error;

use crate::preprocess::PreprocessError;

/// Failures of an `/invocations` or `/ping` call, rendered as plain text.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("This predictor only supports image/jpeg content type")]
    UnsupportedMediaType,

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error("model is not available")]
    ModelUnavailable,

    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("blocking task failed: {0}")]
    Blocking(#[from] BlockingError),
}

impl ResponseError for InvocationError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Preprocess(_) => StatusCode::BAD_REQUEST,
            Self::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Inference(_) | Self::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{self}");
        }
        HttpResponse::build(status)
            .content_type(ContentType::plaintext())
            .body(self.to_string())
    }
}
