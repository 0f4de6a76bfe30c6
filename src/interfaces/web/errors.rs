use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt::Display;

use super::jsonapi::{MEDIA_TYPE, error_document};

/// Request failure with its HTTP status. Client errors echo their cause;
/// internal errors are logged and answered with a generic body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(&'static str),
    Unprocessable(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(err: impl Display) -> Self {
        ApiError::BadRequest(err.to_string())
    }

    pub fn unprocessable(err: impl Display) -> Self {
        ApiError::Unprocessable(err.to_string())
    }

    pub fn internal(err: impl Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::BadRequest(msg) | ApiError::Unprocessable(msg) => msg,
            ApiError::NotFound(msg) => msg.to_string(),
            ApiError::Internal(cause) => {
                tracing::error!("Request failed: {}", cause);
                "Internal Server Error".to_string()
            }
        };
        let body = error_document(&[detail]).to_string();
        (status, [(header::CONTENT_TYPE, MEDIA_TYPE)], body).into_response()
    }
}
