//! Response parsing and the normalized envelope.
//!
//! # Design
//! Every completed round-trip becomes an `HttpEnvelope`, whatever its
//! status. The body is parsed once, according to the requested
//! `ResponseFormat`, and lands in `data` for 2xx responses or in `error`
//! otherwise. A body that fails to parse is recorded as
//! `EnvelopeError::Parse` and never hides the HTTP status.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::{header_value, Headers, HttpResponse};

/// How the response body is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseFormat {
    Json,
    Text,
    Blob,
    ArrayBuffer,
    /// `application/x-www-form-urlencoded` pairs.
    FormData,
}

impl ResponseFormat {
    pub fn parse(&self, body: &Bytes) -> Result<ResponseBody, String> {
        match self {
            ResponseFormat::Json => serde_json::from_slice(body)
                .map(ResponseBody::Json)
                .map_err(|e| e.to_string()),
            ResponseFormat::Text => Ok(ResponseBody::Text(
                String::from_utf8_lossy(body).into_owned(),
            )),
            ResponseFormat::Blob | ResponseFormat::ArrayBuffer => {
                Ok(ResponseBody::Binary(body.clone()))
            }
            ResponseFormat::FormData => serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
                .map(ResponseBody::Form)
                .map_err(|e| e.to_string()),
        }
    }
}

/// A parsed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Binary(Bytes),
    Form(Vec<(String, String)>),
}

impl ResponseBody {
    /// Decode into `T`. JSON bodies decode directly; text bodies are parsed
    /// as JSON first.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        match self {
            ResponseBody::Json(value) => T::deserialize(value)
                .map_err(|e| ApiError::Deserialization(e.to_string())),
            ResponseBody::Text(text) => serde_json::from_str(text)
                .map_err(|e| ApiError::Deserialization(e.to_string())),
            ResponseBody::Binary(_) | ResponseBody::Form(_) => Err(ApiError::Deserialization(
                "body was not parsed as JSON or text".to_string(),
            )),
        }
    }
}

/// What ended up in the envelope's `error` slot.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeError {
    /// Parsed body of a non-2xx response.
    Body(ResponseBody),
    /// The body could not be parsed in the requested format.
    Parse(String),
}

/// Normalized result of one request.
///
/// When parsing succeeds exactly one of `data` and `error` is populated.
/// Without a response format neither is.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpEnvelope {
    pub ok: bool,
    pub status: u16,
    pub headers: Headers,
    pub data: Option<ResponseBody>,
    pub error: Option<EnvelopeError>,
}

impl HttpEnvelope {
    pub fn from_response(response: HttpResponse, format: Option<ResponseFormat>) -> Self {
        let ok = response.is_success();
        let mut envelope = Self {
            ok,
            status: response.status,
            headers: response.headers,
            data: None,
            error: None,
        };

        let Some(format) = format else {
            return envelope;
        };

        match format.parse(&response.body) {
            Ok(body) if ok => envelope.data = Some(body),
            Ok(body) => envelope.error = Some(EnvelopeError::Body(body)),
            Err(reason) => {
                tracing::warn!(status = envelope.status, ?format, "response body parse failed: {reason}");
                envelope.error = Some(EnvelopeError::Parse(reason));
            }
        }
        envelope
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Decode `data` into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        match (&self.data, &self.error) {
            (Some(body), _) => body.decode(),
            (None, Some(EnvelopeError::Parse(reason))) => {
                Err(ApiError::Deserialization(reason.clone()))
            }
            (None, _) => Err(ApiError::Deserialization(format!(
                "HTTP {} response carried no data",
                self.status
            ))),
        }
    }

    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        self.json()
    }

    /// The parsed error body of a non-2xx response, if any.
    pub fn error_body(&self) -> Option<&ResponseBody> {
        match &self.error {
            Some(EnvelopeError::Body(body)) => Some(body),
            _ => None,
        }
    }
}
