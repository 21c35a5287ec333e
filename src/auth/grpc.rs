//! gRPC adapter: bearer authentication from tonic request metadata.
//!
//! RPC requests carry no path, so skip paths never apply here.

use tonic::{Request, Status, metadata::MetadataMap};

use super::errors::AuthError;
use super::extractors::Identity;
use super::header::{HeaderSource, parse_request};

impl HeaderSource for MetadataMap {
    fn header(&self, name: &str) -> Result<Option<&str>, AuthError> {
        self.get(name)
            .map(|value| value.to_str().map_err(|_| AuthError::MalformedAuthHeader))
            .transpose()
    }
}

impl<T> HeaderSource for Request<T> {
    fn header(&self, name: &str) -> Result<Option<&str>, AuthError> {
        self.metadata().header(name)
    }
}

/// Interceptor function for tonic services.
///
/// ```ignore
/// let svc = GreeterServer::with_interceptor(greeter, bearer_auth::auth::grpc::intercept);
/// ```
pub fn intercept(mut request: Request<()>) -> Result<Request<()>, Status> {
    let identity = parse_request(&request)?;
    request.extensions_mut().insert(Identity(identity));
    Ok(request)
}

/// Identity stored by [`intercept`], if the request went through it.
pub fn identity<T>(request: &Request<T>) -> Option<&str> {
    request
        .extensions()
        .get::<Identity>()
        .map(|identity| identity.0.as_str())
}
