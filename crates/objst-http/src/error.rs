//! HTTP error type.
//!
//! Bodies are `{ "error": <message>, "status": <code> }`. Messages of
//! server-side failures come from [`objst_common::Error::public_message`],
//! so store paths and engine errors stay in the logs.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

pub type Result<T> = std::result::Result<T, HttpError>;

#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "status": self.status.as_u16(),
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<objst_common::Error> for HttpError {
    fn from(e: objst_common::Error) -> Self {
        let status =
            StatusCode::from_u16(e.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", e);
        }
        Self {
            status,
            message: e.public_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objst_common::Error;

    #[test]
    fn test_status_mapping() {
        assert_eq!(HttpError::from(Error::Unauthorized).status, StatusCode::FORBIDDEN);
        assert_eq!(
            HttpError::from(Error::not_found("x")).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            HttpError::from(Error::StorageUnavailable("busy".into())).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            HttpError::from(Error::Cancelled { removed: 0 }).status.as_u16(),
            499
        );
    }

    #[test]
    fn test_server_error_hides_detail() {
        let err = HttpError::from(Error::storage("/srv/objst/payload/data.redb: broken"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("/srv"));
    }
}
