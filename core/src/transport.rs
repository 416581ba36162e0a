//! Pluggable transport executing `HttpRequest`s.
//!
//! `ReqwestTransport` is the default. `transport_fn` adapts any async
//! closure, which is how tests answer requests without a socket.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{redirect, Client, Method};
use thiserror::Error;

use crate::http::{
    remove_header, Credentials, FormPart, FormPartValue, HttpMethod, HttpRequest, HttpResponse,
    RedirectPolicy, ReferrerPolicy, RequestBody,
};

/// Faults that keep a request from producing a response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request failed: {0}")]
    Request(String),

    /// A 3xx arrived under `RedirectPolicy::Error`.
    #[error("redirect refused: HTTP {status}")]
    Redirect { status: u16 },

    #[error("reading body failed: {0}")]
    Body(String),
}

/// Executes one HTTP round-trip.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by reqwest.
///
/// Holds two clients because reqwest fixes the redirect policy per client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    following: Client,
    manual: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let following = Client::builder()
            .referer(false)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let manual = Client::builder()
            .redirect(redirect::Policy::none())
            .referer(false)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { following, manual })
    }

    fn client_for(&self, policy: Option<RedirectPolicy>) -> &Client {
        match policy {
            Some(RedirectPolicy::Manual | RedirectPolicy::Error) => &self.manual,
            Some(RedirectPolicy::Follow) | None => &self.following,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            mut headers,
            body,
            credentials,
            redirect,
            referrer_policy,
        } = request;

        if credentials == Some(Credentials::Omit) {
            remove_header(&mut headers, "authorization");
            remove_header(&mut headers, "cookie");
        }
        if referrer_policy == Some(ReferrerPolicy::NoReferrer) {
            remove_header(&mut headers, "referer");
        }

        let mut builder = self
            .client_for(redirect)
            .request(reqwest_method(method), url.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Text(text) => builder.body(text),
            RequestBody::Multipart(parts) => builder.multipart(multipart_form(parts)?),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        if redirect == Some(RedirectPolicy::Error) && status.is_redirection() {
            return Err(TransportError::Redirect {
                status: status.as_u16(),
            });
        }

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

fn reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn multipart_form(parts: Vec<FormPart>) -> Result<Form, TransportError> {
    parts.into_iter().try_fold(Form::new(), |form, part| {
        Ok(match part.value {
            FormPartValue::Text(text) => form.text(part.name, text),
            FormPartValue::Binary {
                bytes,
                file_name,
                mime,
            } => {
                let mut file = Part::bytes(bytes.to_vec());
                if let Some(file_name) = file_name {
                    file = file.file_name(file_name);
                }
                if let Some(mime) = mime {
                    file = file
                        .mime_str(&mime)
                        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                }
                form.part(part.name, file)
            }
        })
    })
}

/// Transport that delegates to an async closure.
pub struct FnTransport<F> {
    handler: F,
}

/// Wrap an async closure as a `Transport`.
pub fn transport_fn<F, Fut>(handler: F) -> FnTransport<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HttpResponse, TransportError>> + Send + 'static,
{
    FnTransport { handler }
}

impl<F> fmt::Debug for FnTransport<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnTransport")
    }
}

#[async_trait]
impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HttpResponse, TransportError>> + Send + 'static,
{
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (self.handler)(request).await
    }
}
