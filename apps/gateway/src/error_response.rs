//! The single conversion point from any crate's `ApiError` to an HTTP
//! response: the `{"error":{...}}` envelope plus `X-Request-Id` (§7).
//! A local newtype, since neither `ApiError` nor `IntoResponse` lives in
//! this crate.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use control_core::error::{ApiError, ErrorKind};

pub struct ApiErrorResponse(pub ApiError);

impl From<ApiError> for ApiErrorResponse {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.0.to_body())).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.0.request_id.to_string()) {
            response.headers_mut().insert("x-request-id", value);
        }
        if self.0.kind == ErrorKind::RateLimitExceeded {
            response.headers_mut().insert("retry-after", HeaderValue::from_static("60"));
        }
        response
    }
}
