//! Error types for the API client.
//!
//! # Design
//! Every call returns `Result`. A completed round-trip with a non-2xx status
//! becomes `ApiError::Http`, which carries the whole normalized envelope so
//! callers can read `status` and the parsed `error` body directly. Faults
//! that stop the round-trip from completing (network, abort) keep their own
//! variants and carry no envelope.

use thiserror::Error;

use crate::response::HttpEnvelope;
use crate::transport::TransportError;

/// Errors returned by `HttpClient` and `Collection` calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The transport could not complete the round-trip.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The request's cancel key was aborted while it was in flight.
    #[error("request aborted")]
    Aborted,

    /// The server answered with a non-2xx status.
    #[error("HTTP {}", .0.status)]
    Http(Box<HttpEnvelope>),

    /// The request payload could not be formatted for its content type.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response data could not be decoded into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status of a non-2xx response.
    pub fn status(&self) -> Option<u16> {
        self.envelope().map(|envelope| envelope.status)
    }

    pub fn envelope(&self) -> Option<&HttpEnvelope> {
        match self {
            ApiError::Http(envelope) => Some(envelope),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ApiError::Aborted)
    }
}
