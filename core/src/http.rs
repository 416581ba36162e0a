//! HTTP wire types exchanged between `HttpClient` and a `Transport`.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The
//! client assembles an `HttpRequest`, hands it to whichever transport it was
//! built with, and normalizes the returned `HttpResponse` into an envelope.
//! Nothing here depends on a particular HTTP library, so tests can answer
//! requests from a closure instead of a socket.
//!
//! Fetch-style policies (credentials, redirect, referrer) travel with the
//! request; interpreting them is the transport's job.

use std::fmt;

use bytes::Bytes;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header list. Names compare case-insensitively.
pub type Headers = Vec<(String, String)>;

/// Look up a header value by name, ignoring ASCII case.
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Insert or replace a header. An existing entry keeps its position.
pub fn set_header(headers: &mut Headers, name: &str, value: &str) {
    match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
        Some(entry) => {
            entry.0 = name.to_string();
            entry.1 = value.to_string();
        }
        None => headers.push((name.to_string(), value.to_string())),
    }
}

/// Remove every header with the given name.
pub fn remove_header(headers: &mut Headers, name: &str) {
    headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
}

/// Whether cookies and auth headers accompany the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    Omit,
    SameOrigin,
    Include,
}

/// What to do when the server answers with a 3xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    Follow,
    /// Hand the 3xx response back untouched.
    Manual,
    /// Treat a 3xx as a transport fault.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferrerPolicy {
    NoReferrer,
    NoReferrerWhenDowngrade,
    Origin,
    OriginWhenCrossOrigin,
    SameOrigin,
    StrictOrigin,
    StrictOriginWhenCrossOrigin,
    UnsafeUrl,
}

/// A formatted request body, ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Text(String),
    /// Multipart parts; the transport picks the boundary.
    Multipart(Vec<FormPart>),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RequestBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// One named part of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub value: FormPartValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPartValue {
    Text(String),
    Binary {
        bytes: Bytes,
        file_name: Option<String>,
        mime: Option<String>,
    },
}

/// An HTTP request described as plain data.
///
/// Built by `HttpClient::build_request`; executed by a `Transport`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: RequestBody,
    pub credentials: Option<Credentials>,
    pub redirect: Option<RedirectPolicy>,
    pub referrer_policy: Option<ReferrerPolicy>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut headers = vec![("content-type".to_string(), "text/plain".to_string())];
        set_header(&mut headers, "Content-Type", "application/json");
        assert_eq!(headers.len(), 1);
        assert_eq!(header_value(&headers, "CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn remove_header_drops_all_matches() {
        let mut headers = vec![
            ("Cookie".to_string(), "a=1".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
            ("cookie".to_string(), "b=2".to_string()),
        ];
        remove_header(&mut headers, "COOKIE");
        assert_eq!(headers, vec![("Accept".to_string(), "*/*".to_string())]);
    }

    #[test]
    fn success_is_2xx_only() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(199, "").is_success());
        assert!(!HttpResponse::new(301, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
    }
}
