use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::io::{ErrorKind, StoreError};

/// Error body returned by every route:
/// `{ "error", "message", "statusCode", "details" }`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            error: ErrorKind::Invalid.as_str(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn internal(message: impl ToString) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ErrorKind::Internal.as_str(),
            message: message.to_string(),
            details: None,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let kind = e.kind();
        let status = match kind {
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let details = match &e {
            StoreError::Conflict {
                last_known,
                current,
                ..
            } => Some(json!({ "lastKnownMtime": last_known, "currentMtime": current })),
            _ => None,
        };
        if status.is_server_error() {
            log::error!("{}", e);
        }
        ApiError {
            status,
            error: kind.as_str(),
            message: e.to_string(),
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.error,
            "message": self.message,
            "statusCode": self.status.as_u16(),
            "details": self.details,
        });
        (self.status, Json(body)).into_response()
    }
}
