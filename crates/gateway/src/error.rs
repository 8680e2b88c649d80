use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Model not loaded.")]
    ModelNotLoaded,

    #[error("No file uploaded: expected a multipart field named `file`")]
    MissingFile,

    #[error("{0}")]
    Multipart(String),

    #[error("{0}")]
    Decode(#[from] image::ImageError),

    #[error("{0:#}")]
    Inference(anyhow::Error),

    #[error("failed to encode result image: {0}")]
    Encode(image::ImageError),

    #[error("inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        ApiError::Multipart(err.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart(err.body_text())
    }
}

/// JSON body of every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.to_string();
        tracing::warn!(error = %error, "Request failed");

        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error })).into_response()
    }
}
