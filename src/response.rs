//! HTTP response builders.
//!
//! Every body canopy produces is JSON, except redirects which carry none.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue, LOCATION};
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Response body type used throughout canopy.
pub type Body = Full<Bytes>;

/// Full response type used throughout canopy.
pub type HttpResponse = Response<Body>;

fn with_status(status: StatusCode, body: Body) -> HttpResponse {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

fn json_bytes(status: StatusCode, bytes: Bytes) -> HttpResponse {
    let mut response = with_status(status, Full::new(bytes));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Build a JSON response with the given status code and body.
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> crate::Result<HttpResponse> {
    let json = serde_json::to_vec(body)?;
    Ok(json_bytes(status, Bytes::from(json)))
}

/// Build a 200 OK JSON response.
pub fn ok<T: Serialize>(body: &T) -> crate::Result<HttpResponse> {
    json(StatusCode::OK, body)
}

/// Build a 204 No Content response.
pub fn no_content() -> HttpResponse {
    with_status(StatusCode::NO_CONTENT, Full::new(Bytes::new()))
}

/// Build an `{"error": message}` response.
pub fn error_body(status: StatusCode, message: &str) -> HttpResponse {
    let body = serde_json::json!({ "error": message });
    json_bytes(status, Bytes::from(body.to_string()))
}

/// Build a 404 Not Found JSON response.
pub fn not_found(message: &str) -> HttpResponse {
    error_body(StatusCode::NOT_FOUND, message)
}

/// Build a 307 Temporary Redirect response.
pub fn redirect(location: &str) -> crate::Result<HttpResponse> {
    let value = HeaderValue::from_str(location)
        .map_err(|_| crate::Error::BadRequest(format!("Invalid redirect location: {location}")))?;
    let mut response = with_status(StatusCode::TEMPORARY_REDIRECT, Full::new(Bytes::new()));
    response.headers_mut().insert(LOCATION, value);
    Ok(response)
}
