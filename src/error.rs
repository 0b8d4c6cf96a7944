use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use thiserror::Error;

/// Everything that can go wrong while serving `POST /convert`.
///
/// Any variant aborts the whole batch: no archive is sent once one file fails.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode {name}: {reason}")]
    Encode { name: String, reason: String },

    #[error("failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("conversion worker stopped: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("quality must be an integer, got {0:?}")]
    InvalidQuality(String),

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("{name} exceeds the per-file limit of {limit} bytes")]
    FileTooLarge { name: String, limit: usize },

    #[error("batch exceeds the limit of {limit} bytes")]
    BatchTooLarge { limit: usize },

    #[error("request body too large: {0}")]
    BodyTooLarge(String),

    #[error("batch exceeds the limit of {limit} files")]
    TooManyFiles { limit: usize },
}

impl ConvertError {
    pub fn status(&self) -> StatusCode {
        match self {
            ConvertError::InvalidQuality(_) | ConvertError::Multipart(_) => StatusCode::BAD_REQUEST,
            ConvertError::FileTooLarge { .. }
            | ConvertError::BatchTooLarge { .. }
            | ConvertError::BodyTooLarge(_)
            | ConvertError::TooManyFiles { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ConvertError::Decode { .. }
            | ConvertError::Encode { .. }
            | ConvertError::Archive(_)
            | ConvertError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ConvertError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        // The body limit layer surfaces through the multipart stream
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ConvertError::BodyTooLarge(err.body_text())
        } else {
            ConvertError::Multipart(err.body_text())
        }
    }
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let status = self.status();
        error!("Conversion failed ({}): {}", status.as_u16(), self);
        (status, format!("Conversion failed: {}", self)).into_response()
    }
}
