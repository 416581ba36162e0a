//! Typed async client for the REST backend.
//!
//! # Overview
//! Every endpoint call funnels through one request helper,
//! `HttpClient::request`, which builds the URL and query string, formats
//! the body for its content type, layers headers and fetch policies,
//! registers the call under an optional cancel key, and normalizes the
//! response into an `HttpEnvelope`.
//!
//! # Design
//! - Request assembly (`HttpClient::build_request`) is pure and separate
//!   from execution, so URL, header and body rules are testable without I/O.
//! - The network sits behind the `Transport` trait; `ReqwestTransport` is
//!   the default and `transport_fn` adapts a closure.
//! - Non-2xx responses are always `Err(ApiError::Http(envelope))`; the
//!   envelope keeps the status and the parsed error body.
//! - The backend's collections share one CRUD shape, served by
//!   `Collection` with caller-chosen serde DTOs.

pub mod abort;
pub mod client;
pub mod collection;
pub mod config;
pub mod content;
pub mod error;
pub mod http;
pub mod query;
pub mod response;
pub mod transport;

pub use abort::{AbortRegistry, AbortSignal, CancelKey};
pub use client::{HttpClient, RequestParams};
pub use collection::{CallOptions, Collection};
pub use config::{ClientConfig, RequestOptions, SecurityProvider};
pub use content::{ContentType, FormField, Payload};
pub use error::ApiError;
pub use http::{
    Credentials, HttpMethod, HttpRequest, HttpResponse, RedirectPolicy, ReferrerPolicy, RequestBody,
};
pub use query::{QueryParams, QueryScalar, QueryValue};
pub use response::{EnvelopeError, HttpEnvelope, ResponseBody, ResponseFormat};
pub use transport::{transport_fn, ReqwestTransport, Transport, TransportError};
