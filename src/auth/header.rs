//! Bearer token lookup, independent of the transport.

use axum::extract::OriginalUri;
use axum::http::{Extensions, HeaderMap, Uri, request::Parts};

use super::errors::AuthError;
use crate::config::{self, Config};

/// Header (HTTP) or metadata key (gRPC) carrying the credential.
pub const AUTHORIZATION: &str = "authorization";

/// Scheme keyword expected before the token. Case-sensitive.
pub const BEARER_SCHEME: &str = "Bearer";

/// Anything that can hand out a single header or metadata value by key.
///
/// `Ok(None)` means the key is absent. A value that is present but not
/// visible ASCII is a malformed header, not a missing one.
///
/// Only HTTP sources know their request path; sources without one are never
/// exempted by skip paths.
pub trait HeaderSource {
    fn header(&self, name: &str) -> Result<Option<&str>, AuthError>;

    fn request_path(&self) -> Option<&str> {
        None
    }
}

impl HeaderSource for HeaderMap {
    fn header(&self, name: &str) -> Result<Option<&str>, AuthError> {
        self.get(name)
            .map(|value| value.to_str().map_err(|_| AuthError::MalformedAuthHeader))
            .transpose()
    }
}

impl HeaderSource for Parts {
    fn header(&self, name: &str) -> Result<Option<&str>, AuthError> {
        self.headers.header(name)
    }

    fn request_path(&self) -> Option<&str> {
        Some(full_path(&self.extensions, &self.uri))
    }
}

impl<B> HeaderSource for axum::http::Request<B> {
    fn header(&self, name: &str) -> Result<Option<&str>, AuthError> {
        self.headers().header(name)
    }

    fn request_path(&self) -> Option<&str> {
        Some(full_path(self.extensions(), self.uri()))
    }
}

/// Path as the client sent it. Nested routers strip their prefix from the
/// request URI, so prefer the original one when the router recorded it.
fn full_path<'a>(extensions: &'a Extensions, uri: &'a Uri) -> &'a str {
    extensions
        .get::<OriginalUri>()
        .map_or(uri.path(), |original| original.0.path())
}

/// Split `Bearer <token>` and return the token.
pub fn bearer_token(value: &str) -> Result<&str, AuthError> {
    match value.split_once(' ') {
        Some((BEARER_SCHEME, token)) => Ok(token),
        _ => Err(AuthError::MalformedAuthHeader),
    }
}

impl Config {
    /// Identity of the caller, or an empty identity when the request path is
    /// a skip path.
    pub fn parse_request<R: HeaderSource + ?Sized>(&self, request: &R) -> Result<String, AuthError> {
        if let Some(path) = request.request_path() {
            if self.is_path_skipped(path) {
                return Ok(String::new());
            }
        }
        self.parse_request_ignore_skip(request)
    }

    /// Identity of the caller. A bearer token is always required.
    pub fn parse_request_ignore_skip<R: HeaderSource + ?Sized>(
        &self,
        request: &R,
    ) -> Result<String, AuthError> {
        let value = match request.header(AUTHORIZATION)? {
            Some(value) if !value.is_empty() => value,
            _ => return Err(AuthError::EmptyAuthHeader),
        };

        let token = bearer_token(value)?;
        Ok(self.parse_identity(token, self.key())?)
    }
}

/// Skip-aware extraction with the process-wide configuration.
pub fn parse_request<R: HeaderSource + ?Sized>(request: &R) -> Result<String, AuthError> {
    config::current().parse_request(request)
}

/// Extraction that ignores skip paths, with the process-wide configuration.
pub fn parse_request_ignore_skip<R: HeaderSource + ?Sized>(
    request: &R,
) -> Result<String, AuthError> {
    config::current().parse_request_ignore_skip(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{with_identity_key, with_skip_paths};
    use crate::jwt::TokenError;
    use axum::http::{HeaderValue, Request};

    fn test_config() -> Config {
        Config::new(
            "test-secret-key",
            [with_identity_key("user_id"), with_skip_paths(["/health"])],
        )
        .unwrap()
    }

    fn request(path: &str, authorization: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri(path);
        if let Some(value) = authorization {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token("Bearer ").unwrap(), "");
        assert!(matches!(
            bearer_token("bearer abc"),
            Err(AuthError::MalformedAuthHeader)
        ));
        assert!(matches!(
            bearer_token("Bearer"),
            Err(AuthError::MalformedAuthHeader)
        ));
        assert!(matches!(
            bearer_token("Basic dXNlcjpwYXNz"),
            Err(AuthError::MalformedAuthHeader)
        ));
    }

    #[test]
    fn test_valid_bearer_header() {
        let config = test_config();
        let token = config.sign("test-user-123").unwrap().token;

        let req = request("/test", Some(&format!("Bearer {token}")));
        assert_eq!(config.parse_request(&req).unwrap(), "test-user-123");
    }

    #[test]
    fn test_skip_path_without_header() {
        let config = test_config();
        let req = request("/health", None);

        assert_eq!(config.parse_request(&req).unwrap(), "");
        assert!(matches!(
            config.parse_request_ignore_skip(&req),
            Err(AuthError::EmptyAuthHeader)
        ));
    }

    #[test]
    fn test_missing_and_empty_header() {
        let config = test_config();

        assert!(matches!(
            config.parse_request(&request("/test", None)),
            Err(AuthError::EmptyAuthHeader)
        ));
        assert!(matches!(
            config.parse_request(&request("/test", Some(""))),
            Err(AuthError::EmptyAuthHeader)
        ));
    }

    #[test]
    fn test_malformed_header() {
        let config = test_config();
        let token = config.sign("alice").unwrap().token;

        let req = request("/test", Some(&format!("InvalidFormat {token}")));
        assert!(matches!(
            config.parse_request(&req),
            Err(AuthError::MalformedAuthHeader)
        ));
    }

    #[test]
    fn test_bad_token_surfaces_token_error() {
        let config = test_config();

        let req = request("/test", Some("Bearer not-a-jwt"));
        assert!(matches!(
            config.parse_request(&req),
            Err(AuthError::Token(TokenError::Malformed(_)))
        ));

        let req = request("/test", Some("Bearer "));
        assert!(matches!(
            config.parse_request(&req),
            Err(AuthError::Token(TokenError::EmptyToken))
        ));
    }

    #[test]
    fn test_original_uri_wins_over_nested_uri() {
        let config = test_config();
        let mut req = request("/", None);
        req.extensions_mut()
            .insert(OriginalUri("/health".parse().unwrap()));

        assert_eq!(req.request_path(), Some("/health"));
        assert_eq!(config.parse_request(&req).unwrap(), "");
    }

    #[test]
    fn test_non_ascii_header_is_malformed() {
        let config = test_config();
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_bytes(b"Bearer t\xc3\xb6k").unwrap(),
        );

        assert!(matches!(
            headers.header(AUTHORIZATION),
            Err(AuthError::MalformedAuthHeader)
        ));
        assert!(matches!(
            config.parse_request(&headers),
            Err(AuthError::MalformedAuthHeader)
        ));
        assert!(matches!(headers.header("x-absent"), Ok(None)));
    }

    #[test]
    fn test_header_map_has_no_path() {
        let config = test_config();
        let mut headers = HeaderMap::new();
        assert!(headers.request_path().is_none());
        assert!(matches!(
            config.parse_request(&headers),
            Err(AuthError::EmptyAuthHeader)
        ));

        let token = config.sign("alice").unwrap().token;
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert_eq!(config.parse_request(&headers).unwrap(), "alice");
    }
}
