//! Maps `agentgate_core::Error` to the `{success, error:{code,message}}`
//! envelope and HTTP status.

use agentgate_core::protocol::ApiEnvelope;
use agentgate_core::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub struct ApiErrorResponse(pub Error);

impl From<Error> for ApiErrorResponse {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let code = self.0.http_code();
        let status = match code {
            "BAD_REQUEST" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let envelope = ApiEnvelope::<()>::err(code, self.0.to_string());
        (status, Json(envelope)).into_response()
    }
}

pub fn unauthorized() -> Response {
    let envelope = ApiEnvelope::<()>::err("UNAUTHORIZED", "missing or invalid bearer token");
    (StatusCode::UNAUTHORIZED, Json(envelope)).into_response()
}
