//! Request body formatting per content kind.
//!
//! # Design
//! `ContentType` is a closed enum; each variant owns its formatting rule and
//! its `Content-Type` header value, so adding a kind forces every match to be
//! revisited. Payloads are `serde_json::Value` trees, or explicit form fields
//! when a multipart body needs to carry raw bytes.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::{FormPart, FormPartValue, RequestBody};
use crate::query::{number_text, QueryParams};

/// How a request body is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Json,
    FormData,
    UrlEncoded,
    Text,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::FormData => "multipart/form-data",
            ContentType::UrlEncoded => "application/x-www-form-urlencoded",
            ContentType::Text => "text/plain",
        }
    }

    /// Value for the `Content-Type` request header. Multipart has none: the
    /// transport writes it along with the boundary.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            ContentType::FormData => None,
            other => Some(other.mime()),
        }
    }

    /// Format `payload` for this content kind. A missing payload, or a JSON
    /// `null`, produces an empty body.
    pub fn format(&self, payload: Option<&Payload>) -> Result<RequestBody, ApiError> {
        let payload = match payload {
            None => return Ok(RequestBody::Empty),
            Some(payload) if payload.is_null() => return Ok(RequestBody::Empty),
            Some(payload) => payload,
        };

        match self {
            ContentType::Json => format_json(payload),
            ContentType::Text => format_text(payload),
            ContentType::FormData => format_multipart(payload),
            ContentType::UrlEncoded => format_url_encoded(payload),
        }
    }
}

/// A request body before formatting.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Value(Value),
    /// Named fields for a multipart body, in order.
    Form(Vec<(String, FormField)>),
}

impl Payload {
    /// Serialize any value into a JSON payload.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ApiError> {
        serde_json::to_value(value)
            .map(Payload::Value)
            .map_err(|e| ApiError::Serialization(e.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Value(Value::Null))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

/// One field of a multipart payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Value(Value),
    Binary {
        bytes: Bytes,
        file_name: Option<String>,
        mime: Option<String>,
    },
}

impl FormField {
    pub fn file(bytes: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        FormField::Binary {
            bytes: bytes.into(),
            file_name: Some(file_name.into()),
            mime: None,
        }
    }
}

fn format_json(payload: &Payload) -> Result<RequestBody, ApiError> {
    match payload {
        Payload::Value(value @ (Value::Object(_) | Value::Array(_) | Value::String(_))) => {
            serde_json::to_string(value)
                .map(RequestBody::Text)
                .map_err(|e| ApiError::Serialization(e.to_string()))
        }
        // Numbers and booleans go out as their plain text.
        Payload::Value(Value::Number(number)) => Ok(RequestBody::Text(number_text(number))),
        Payload::Value(primitive) => Ok(RequestBody::Text(primitive.to_string())),
        Payload::Form(_) => Err(ApiError::Serialization(
            "form fields need the multipart content type".to_string(),
        )),
    }
}

fn format_text(payload: &Payload) -> Result<RequestBody, ApiError> {
    match payload {
        Payload::Value(Value::String(text)) => Ok(RequestBody::Text(text.clone())),
        Payload::Value(value) => serde_json::to_string(value)
            .map(RequestBody::Text)
            .map_err(|e| ApiError::Serialization(e.to_string())),
        Payload::Form(_) => Err(ApiError::Serialization(
            "form fields need the multipart content type".to_string(),
        )),
    }
}

fn format_multipart(payload: &Payload) -> Result<RequestBody, ApiError> {
    let parts = match payload {
        Payload::Value(Value::Object(object)) => object
            .iter()
            .map(|(name, value)| FormPart {
                name: name.clone(),
                value: FormPartValue::Text(form_text(value)),
            })
            .collect(),
        Payload::Value(other) => {
            return Err(ApiError::Serialization(format!(
                "multipart body must be an object, got {}",
                json_kind(other)
            )))
        }
        Payload::Form(fields) => fields
            .iter()
            .map(|(name, field)| FormPart {
                name: name.clone(),
                value: match field {
                    FormField::Value(value) => FormPartValue::Text(form_text(value)),
                    FormField::Binary {
                        bytes,
                        file_name,
                        mime,
                    } => FormPartValue::Binary {
                        bytes: bytes.clone(),
                        file_name: file_name.clone(),
                        mime: mime.clone(),
                    },
                },
            })
            .collect(),
    };
    Ok(RequestBody::Multipart(parts))
}

fn format_url_encoded(payload: &Payload) -> Result<RequestBody, ApiError> {
    match payload {
        Payload::Value(Value::Object(object)) => Ok(RequestBody::Text(
            QueryParams::from_json_object(object).encode(),
        )),
        Payload::Value(other) => Err(ApiError::Serialization(format!(
            "url-encoded body must be an object, got {}",
            json_kind(other)
        ))),
        Payload::Form(_) => Err(ApiError::Serialization(
            "form fields need the multipart content type".to_string(),
        )),
    }
}

/// Text of a multipart field: nested structures as JSON, scalars as-is.
fn form_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number_text(number),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
