use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metricity_shared::ErrorEnvelope;

/// Which route produced the error; path updates answer unknown kinds with 501.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Json,
    PathUpdate,
}

/// An envelope on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub envelope: ErrorEnvelope,
}

impl ApiError {
    pub fn new(surface: Surface, envelope: ErrorEnvelope) -> Self {
        Self {
            status: status_for(surface, &envelope),
            envelope,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.envelope.code, message = %self.envelope.message, "request failed");
        } else {
            tracing::debug!(code = %self.envelope.code, message = %self.envelope.message, "request rejected");
        }
        (self.status, self.envelope.message).into_response()
    }
}

pub fn status_for(surface: Surface, envelope: &ErrorEnvelope) -> StatusCode {
    let code = &envelope.code;
    match code.namespace() {
        "metric" if code.code() == "unknown_kind" && surface == Surface::PathUpdate => {
            StatusCode::NOT_IMPLEMENTED
        },
        "metric" if matches!(code.code(), "invalid_key" | "encode") => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
        "http" if code.code() == "body_too_large" => StatusCode::PAYLOAD_TOO_LARGE,
        "metric" | "http" => StatusCode::BAD_REQUEST,
        "store" if code.code() == "not_found" => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
