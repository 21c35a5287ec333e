//! Axum extractors and middleware for bearer authentication.
//!
//! All of them read the process-wide configuration at request time, so a
//! later `config::init` takes effect without rebuilding the router.

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use super::errors::AuthError;
use super::header::{parse_request, parse_request_ignore_skip};

/// Authenticated caller, stored in request extensions by [`require_bearer`]
/// and by the gRPC interceptor. Empty on skip paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

/// Extractor for routes that honour skip paths.
/// Yields an empty identity when the request path is a skip path.
pub struct BearerIdentity(pub String);

impl<S> FromRequestParts<S> for BearerIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_request(&*parts).map(BearerIdentity)
    }
}

/// Extractor that always demands a valid bearer token.
pub struct RequiredBearerIdentity(pub String);

impl<S> FromRequestParts<S> for RequiredBearerIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_request_ignore_skip(&*parts).map(RequiredBearerIdentity)
    }
}

/// Optional authentication extractor - never fails.
/// Useful for endpoints that work both authenticated and unauthenticated.
pub struct MaybeBearerIdentity(pub Option<String>);

impl<S> FromRequestParts<S> for MaybeBearerIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeBearerIdentity(parse_request_ignore_skip(&*parts).ok()))
    }
}

/// Middleware that rejects unauthenticated requests and stores the caller's
/// [`Identity`] in request extensions. Skip paths pass through with an
/// empty identity.
pub async fn require_bearer(mut request: Request, next: Next) -> Result<Response, AuthError> {
    let identity = parse_request(&request)?;
    request.extensions_mut().insert(Identity(identity));
    Ok(next.run(request).await)
}
