use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Envelope
///
/// The uniform wire shape of every JSON response: `{status, code, payload}`.
/// Handlers return `Envelope<T>` on success and `AppError` on failure; both serialize
/// through this struct so no endpoint can drift from the shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: bool,
    pub code: u16,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// A successful `200 OK` envelope.
    pub fn ok(payload: T) -> Self {
        Self::with_status(StatusCode::OK, payload)
    }

    /// A successful `201 Created` envelope.
    pub fn created(payload: T) -> Self {
        Self::with_status(StatusCode::CREATED, payload)
    }

    pub fn with_status(code: StatusCode, payload: T) -> Self {
        Self {
            status: code.is_success(),
            code: code.as_u16(),
            payload,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        // The envelope code is always built from a StatusCode, so this cannot fall back
        // in practice.
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
