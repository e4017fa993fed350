use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::vision::VisionError;

// API-facing errors with structured JSON responses
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limit exceeded, try again in {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("image of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("image could not be fetched: {0}")]
    ImageUnreachable(String),

    #[error("vision backend error: {0}")]
    Upstream(String),

    #[error("vision backend timed out")]
    UpstreamTimeout,
}

// Error body returned to clients
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub request_id: Uuid,
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            ApiError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ApiError::ImageUnreachable(_) => "IMAGE_UNREACHABLE",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ImageUnreachable(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error_code(),
            message: self.to_string(),
            request_id: Uuid::new_v4(),
        };

        let mut response = (self.status_code(), Json(body)).into_response();

        if let ApiError::RateLimited { retry_after } = &self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
        }

        response
    }
}

// Status mapping for failures coming out of the vision client
impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::EmptyImage => ApiError::BadRequest("image data is empty".to_string()),
            VisionError::TooLarge { size, max } => ApiError::PayloadTooLarge { size, max },
            VisionError::UnrecognizedFormat => {
                ApiError::UnsupportedMediaType("payload is not a recognized image format".to_string())
            }
            VisionError::Unreachable(message) => ApiError::ImageUnreachable(message),
            VisionError::Timeout => ApiError::UpstreamTimeout,
            VisionError::Upstream { status, message } => {
                ApiError::Upstream(format!("{status}: {message}"))
            }
            VisionError::Transport(message) | VisionError::Decode(message) => {
                ApiError::Upstream(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response = ApiError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from(42u64)
        );
    }

    #[test]
    fn vision_errors_map_onto_expected_statuses() {
        let cases = [
            (VisionError::EmptyImage, StatusCode::BAD_REQUEST),
            (
                VisionError::TooLarge { size: 11, max: 10 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (VisionError::UnrecognizedFormat, StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (
                VisionError::Unreachable("nope".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (VisionError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (
                VisionError::Upstream {
                    status: 500,
                    message: "boom".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                VisionError::Transport("refused".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }
}
