//! Bearer token authentication for inbound requests.
//!
//! The transport-independent logic lives in [`header`]; the axum and tonic
//! adapters only translate requests into a [`HeaderSource`] and errors into
//! responses.

mod errors;
mod extractors;
pub mod grpc;
mod header;

pub use errors::AuthError;
pub use extractors::{
    BearerIdentity, Identity, MaybeBearerIdentity, RequiredBearerIdentity, require_bearer,
};
pub use header::{
    AUTHORIZATION, BEARER_SCHEME, HeaderSource, bearer_token, parse_request,
    parse_request_ignore_skip,
};
