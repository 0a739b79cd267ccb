//! HTTP helpers for Lambda functions.

use lambda_http::{Body, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::Error;

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Create a JSON response with the given status code and data.
pub fn json_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, lambda_http::Error> {
    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(data)?))?)
}

/// Create an error response with the given status code and message.
pub fn error_response(status: u16, message: impl Into<String>) -> Result<Response<Body>, lambda_http::Error> {
    json_response(status, &ApiResponse::<()>::error(message))
}

/// Serialize `data` as-is, for bodies that carry their own envelope.
pub fn body_response<T: Serialize>(status: u16, data: &T) -> crate::Result<Response<Body>> {
    json_response(status, data).map_err(|e| Error::Internal(e.to_string()))
}

/// Wrap `data` in the standard success envelope.
pub fn success_response<T: Serialize>(status: u16, data: T) -> crate::Result<Response<Body>> {
    body_response(status, &ApiResponse::success(data))
}

/// Turn a handler error into its JSON response, logging server-side causes.
pub fn error_to_response(err: &Error) -> Result<Response<Body>, lambda_http::Error> {
    let status = err.status_code();
    if status >= 500 {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected ({}): {}", status, err);
    }
    error_response(status, err.public_message())
}

/// Final step of every handler: render failures as JSON error bodies.
pub fn finish(result: crate::Result<Response<Body>>) -> Result<Response<Body>, lambda_http::Error> {
    match result {
        Ok(response) => Ok(response),
        Err(e) => error_to_response(&e),
    }
}

/// Parse a JSON request body.
pub fn parse_json<T: DeserializeOwned>(body: &Body) -> crate::Result<T> {
    let bytes = body.as_ref();
    if bytes.is_empty() {
        return Err(Error::Validation("İstek gövdesi boş".to_string()));
    }
    serde_json::from_slice(bytes)
        .map_err(|e| Error::Validation(format!("Geçersiz istek gövdesi: {}", e)))
}

/// Strip the API Gateway stage prefix and any trailing slash.
pub fn route_path(raw_path: &str) -> &str {
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Path segments after `prefix`, or `None` if the path is elsewhere.
pub fn path_segments<'a>(path: &'a str, prefix: &str) -> Option<Vec<&'a str>> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some(Vec::new());
    }
    let rest = rest.strip_prefix('/')?;
    Some(rest.split('/').filter(|s| !s.is_empty()).collect())
}

/// Parse a path segment as a UUID, failing with a 400.
pub fn parse_id(segment: &str, what: &str) -> crate::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(segment).map_err(|_| Error::Validation(format!("Geçersiz {} kimliği", what)))
}
