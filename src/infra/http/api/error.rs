use std::error::Error as StdError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;

const SOURCE: &str = "infra::http::api";

/// Error envelope returned to clients: `{ "status": false, "message": ... }`.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub status: bool,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status,
            report: ErrorReport::from_message(SOURCE, status, message.clone()),
            message,
        }
    }

    /// Client-facing `message`, with the error chain kept for the response log.
    pub fn with_source(
        status: StatusCode,
        message: impl Into<String>,
        source: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "Not authorized. Please log in again.",
        )
    }

    pub fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "Not authorized as admin. Please log in as an admin.",
        )
    }

    pub fn user_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "User not found")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(source: &'static str, error: &dyn StdError) -> Self {
        Self::with_source(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            source,
            error,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            status: false,
            message: self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[tokio::test]
    async fn envelope_hides_internal_detail() {
        let err = std::io::Error::other("socket closed");
        let mut response = ApiError::internal("test", &err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let report = response
            .extensions_mut()
            .remove::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages, vec!["socket closed".to_string()]);

        let body = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["status"], false);
        assert_eq!(json["message"], "Internal server error");
    }
}
