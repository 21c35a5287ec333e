//! Authentication error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::jwt::TokenError;

/// Failure to authenticate an inbound request.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header is empty")]
    EmptyAuthHeader,
    #[error("authorization header is malformed")]
    MalformedAuthHeader,
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedAuthHeader => StatusCode::BAD_REQUEST,
            AuthError::EmptyAuthHeader | AuthError::Token(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthError::EmptyAuthHeader => "Not authenticated",
            AuthError::MalformedAuthHeader => "Malformed authorization header",
            AuthError::Token(e) if e.is_expiry() => "Token expired or not yet valid",
            AuthError::Token(_) => "Invalid token",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));

        response
    }
}

impl From<AuthError> for tonic::Status {
    fn from(e: AuthError) -> Self {
        tonic::Status::unauthenticated(e.to_string())
    }
}
