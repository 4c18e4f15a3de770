//! HTTP response building helpers

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::SheetError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": message }),
    )
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed" }),
    )
}

/// Status code a [`SheetError`] maps to
pub fn error_status(error: &SheetError) -> StatusCode {
    match error {
        SheetError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        SheetError::Forbidden(_) => StatusCode::FORBIDDEN,
        SheetError::NotFound(_) => StatusCode::NOT_FOUND,
        SheetError::InvalidInput(_) | SheetError::Json(_) => StatusCode::BAD_REQUEST,
        // Only untrusted request parameters reach here with a bad coordinate
        SheetError::Domain(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a SheetError to an appropriate HTTP response
pub fn error_response(error: SheetError) -> Response<Full<Bytes>> {
    let status = error_status(&error);
    if status.is_server_error() {
        error!(error = %error, "Request failed");
    }

    let body = match &error {
        SheetError::Reconciliation { .. } => serde_json::json!({
            "error": "Sync failed",
            "detail": error.to_string(),
            "retryable": true,
        }),
        _ => serde_json::json!({
            "error": error.to_string(),
            "retryable": error.is_retryable(),
        }),
    };

    json_response(status, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::DomainViolation;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(error_status(&SheetError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(error_status(&SheetError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            error_status(&SheetError::Domain(DomainViolation::Month(13))),
            StatusCode::BAD_REQUEST
        );
        let failed = SheetError::Reconciliation {
            guest: "g".into(),
            source: Box::new(SheetError::Internal("boom".into())),
        };
        assert_eq!(error_status(&failed), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_json_response_headers() {
        let response = ok(&serde_json::json!({ "status": "ok" }));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
