//! The generic request helper every endpoint call goes through.
//!
//! # Design
//! `HttpClient::request` is split in two like the rest of the crate:
//! `build_request` turns `RequestParams` plus the client configuration into
//! a plain `HttpRequest` without doing any I/O, and `request` executes it
//! through the configured `Transport` and normalizes the response into an
//! `HttpEnvelope`.
//!
//! The client owns its abort registry and its security data, so two
//! clients never share cancellation state or credentials.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::abort::{AbortRegistry, CancelKey};
use crate::collection::Collection;
use crate::config::{ClientConfig, RequestOptions};
use crate::content::{ContentType, Payload};
use crate::error::ApiError;
use crate::http::{set_header, HttpMethod, HttpRequest};
use crate::query::QueryParams;
use crate::response::{HttpEnvelope, ResponseFormat};
use crate::transport::{ReqwestTransport, Transport};

/// Everything that describes one call.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub method: HttpMethod,
    pub path: String,
    pub query: QueryParams,
    pub body: Option<Payload>,
    pub content_type: Option<ContentType>,
    pub format: Option<ResponseFormat>,
    pub cancel_key: Option<CancelKey>,
    /// Overrides `ClientConfig::secure` for this call.
    pub secure: Option<bool>,
    pub options: RequestOptions,
}

impl RequestParams {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: QueryParams::default(),
            body: None,
            content_type: None,
            format: None,
            cancel_key: None,
            secure: None,
            options: RequestOptions::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    pub fn body(mut self, body: impl Into<Payload>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn cancel_key(mut self, key: impl Into<CancelKey>) -> Self {
        self.cancel_key = Some(key.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        set_header(&mut self.options.headers, name, value);
        self
    }
}

/// Typed client for the REST backend.
///
/// `S` is the security data handed to the configured security provider,
/// typically an access token.
#[derive(Debug)]
pub struct HttpClient<S = String> {
    config: ClientConfig<S>,
    security_data: RwLock<Option<Arc<S>>>,
    transport: Arc<dyn Transport>,
    aborts: AbortRegistry,
}

impl<S> HttpClient<S> {
    /// Build a client on the default reqwest transport.
    pub fn new(config: ClientConfig<S>) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: ClientConfig<S>, transport: impl Transport + 'static) -> Self {
        Self::with_shared_transport(config, Arc::new(transport))
    }

    pub fn with_shared_transport(config: ClientConfig<S>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            security_data: RwLock::new(None),
            transport,
            aborts: AbortRegistry::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig<S> {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Replace the stored security data used by secure calls.
    pub fn set_security_data(&self, data: Option<S>) {
        *self
            .security_data
            .write()
            .unwrap_or_else(PoisonError::into_inner) = data.map(Arc::new);
    }

    pub fn aborts(&self) -> &AbortRegistry {
        &self.aborts
    }

    /// Abort whatever is in flight under `key`. Returns `false` if nothing was.
    pub fn abort_request(&self, key: &CancelKey) -> bool {
        self.aborts.abort(key)
    }

    /// Accessor for the collection mounted at `/{name}`.
    pub fn collection(&self, name: &str) -> Collection<'_, S> {
        Collection::new(self, name)
    }

    /// Assemble the wire request for `params` without sending it.
    pub fn build_request(&self, params: &RequestParams) -> Result<HttpRequest, ApiError> {
        let secure = params.secure.unwrap_or(self.config.secure);
        let security_layer = if secure { self.security_options() } else { None };

        let options = RequestOptions::layered(
            security_layer
                .iter()
                .chain([
                    &self.config.defaults,
                    &self.config.base_options,
                    &params.options,
                ]),
        );

        let content_type = params.content_type.unwrap_or(ContentType::Json);
        let body = content_type.format(params.body.as_ref())?;

        let mut headers = options.headers;
        if let Some(value) = params.content_type.and_then(|kind| kind.header_value()) {
            set_header(&mut headers, "Content-Type", value);
        }

        Ok(HttpRequest {
            method: params.method,
            url: format!(
                "{}{}{}",
                self.config.base_url,
                params.path,
                params.query.to_query_string()
            ),
            headers,
            body,
            credentials: options.credentials,
            redirect: options.redirect,
            referrer_policy: options.referrer_policy,
        })
    }

    /// Send `params` and normalize the response.
    ///
    /// A non-2xx response comes back as `ApiError::Http` carrying the
    /// envelope, with its parsed body in `error`. Transport faults and
    /// aborts come back as `ApiError::Transport` and `ApiError::Aborted`.
    pub async fn request(&self, params: RequestParams) -> Result<HttpEnvelope, ApiError> {
        let format = params.format.or(self.config.format);
        let request = self.build_request(&params)?;
        debug!(method = %request.method, url = %request.url, "sending request");

        let lease = params.cancel_key.as_ref().map(|key| self.aborts.acquire(key));
        let response = match &lease {
            Some(lease) => {
                let signal = lease.signal();
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => {
                        debug!(key = %lease.key(), "request aborted");
                        return Err(ApiError::Aborted);
                    }
                    result = self.transport.execute(request) => result?,
                }
            }
            None => self.transport.execute(request).await?,
        };
        drop(lease);

        let envelope = HttpEnvelope::from_response(response, format);
        if envelope.ok {
            Ok(envelope)
        } else {
            debug!(status = envelope.status, "request failed");
            Err(ApiError::Http(Box::new(envelope)))
        }
    }

    fn security_options(&self) -> Option<RequestOptions> {
        let provider = self.config.security_provider.as_ref()?;
        let data = self
            .security_data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        provider(data.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock, Weak};
    use std::time::Duration;

    use bytes::Bytes;
    use serde_json::{json, Value};

    use super::*;
    use crate::http::{Credentials, HttpResponse, RedirectPolicy, ReferrerPolicy, RequestBody};
    use crate::response::{EnvelopeError, ResponseBody};
    use crate::transport::{transport_fn, TransportError};

    const BASE_URL: &str = "http://localhost:3000";

    fn config() -> ClientConfig<String> {
        ClientConfig::new(BASE_URL).with_security_provider(|token: Option<&String>| {
            token.map(|token| {
                RequestOptions::new().with_header("Authorization", &format!("Bearer {token}"))
            })
        })
    }

    /// Client whose transport answers every request with `status`/`body` and
    /// records what it was sent.
    fn client_answering(
        status: u16,
        body: &'static str,
    ) -> (HttpClient<String>, Arc<Mutex<Vec<HttpRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let transport = transport_fn(move |request: HttpRequest| {
            recorder.lock().unwrap().push(request);
            async move { Ok(HttpResponse::new(status, body)) }
        });
        (HttpClient::with_transport(config(), transport), seen)
    }

    fn client() -> HttpClient<String> {
        client_answering(200, "{}").0
    }

    #[test]
    fn builds_url_from_base_path_and_query() {
        let params = RequestParams::get("/projects")
            .query(QueryParams::new().with("status", "open").with("tag", vec!["a", "b"]));
        let request = client().build_request(&params).unwrap();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(
            request.url,
            "http://localhost:3000/projects?status=open&tag=a&tag=b"
        );
        assert!(request.body.is_empty());
    }

    #[test]
    fn content_type_header_follows_content_kind() {
        let params = RequestParams::post("/projects")
            .header("content-type", "text/html")
            .content_type(ContentType::Json)
            .body(json!({"name": "Atlas"}));
        let request = client().build_request(&params).unwrap();
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.body.as_text(), Some(r#"{"name":"Atlas"}"#));
    }

    #[test]
    fn multipart_leaves_content_type_to_transport() {
        let params = RequestParams::post("/uploads")
            .content_type(ContentType::FormData)
            .body(json!({"name": "report"}));
        let request = client().build_request(&params).unwrap();
        assert_eq!(request.header("Content-Type"), None);
        assert!(matches!(request.body, RequestBody::Multipart(_)));
    }

    #[test]
    fn body_without_content_kind_is_json_formatted_without_header() {
        let params = RequestParams::post("/events").body(json!({"a": 1}));
        let request = client().build_request(&params).unwrap();
        assert_eq!(request.header("Content-Type"), None);
        assert_eq!(request.body.as_text(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn base_options_apply_and_calls_override() {
        let request = client()
            .build_request(
                &RequestParams::get("/wallets")
                    .options(RequestOptions::new().with_redirect(RedirectPolicy::Manual)),
            )
            .unwrap();
        assert_eq!(request.credentials, Some(Credentials::SameOrigin));
        assert_eq!(request.redirect, Some(RedirectPolicy::Manual));
    }

    #[test]
    fn base_headers_keep_client_defaults() {
        let client = HttpClient::with_transport(
            config().with_base_options(RequestOptions::new().with_header("X-App", "1")),
            transport_fn(|_| async { Ok(HttpResponse::new(200, "")) }),
        );
        let request = client.build_request(&RequestParams::get("/a")).unwrap();
        assert_eq!(request.header("x-app"), Some("1"));
        assert_eq!(request.credentials, Some(Credentials::SameOrigin));
        assert_eq!(request.redirect, Some(RedirectPolicy::Follow));
        assert_eq!(request.referrer_policy, Some(ReferrerPolicy::NoReferrer));
    }

    #[test]
    fn provider_may_replace_security_data() {
        let slot: Arc<OnceLock<Weak<HttpClient<String>>>> = Arc::new(OnceLock::new());
        let handle = slot.clone();
        let config = ClientConfig::new(BASE_URL).with_security_provider(
            move |token: Option<&String>| {
                let options = token.map(|token| {
                    RequestOptions::new().with_header("Authorization", &format!("Bearer {token}"))
                });
                if let Some(client) = handle.get().and_then(Weak::upgrade) {
                    client.set_security_data(Some("rotated".to_string()));
                }
                options
            },
        );
        let client = Arc::new(HttpClient::with_transport(
            config,
            transport_fn(|_| async { Ok(HttpResponse::new(200, "")) }),
        ));
        slot.set(Arc::downgrade(&client)).unwrap();
        client.set_security_data(Some("t0k3n".to_string()));

        let first = client
            .build_request(&RequestParams::get("/a").secure(true))
            .unwrap();
        assert_eq!(first.header("authorization"), Some("Bearer t0k3n"));
        let second = client
            .build_request(&RequestParams::get("/a").secure(true))
            .unwrap();
        assert_eq!(second.header("authorization"), Some("Bearer rotated"));
    }

    #[test]
    fn secure_call_gets_security_headers() {
        let client = client();
        client.set_security_data(Some("t0k3n".to_string()));
        let request = client
            .build_request(&RequestParams::get("/customers").secure(true))
            .unwrap();
        assert_eq!(request.header("authorization"), Some("Bearer t0k3n"));

        let request = client
            .build_request(&RequestParams::get("/customers"))
            .unwrap();
        assert_eq!(request.header("authorization"), None);
    }

    #[test]
    fn security_layer_has_lowest_priority() {
        let client = client();
        client.set_security_data(Some("t0k3n".to_string()));
        let params = RequestParams::get("/customers")
            .secure(true)
            .header("Authorization", "Basic abc");
        let request = client.build_request(&params).unwrap();
        assert_eq!(request.header("authorization"), Some("Basic abc"));
    }

    #[test]
    fn secure_default_comes_from_config() {
        let client = HttpClient::with_transport(
            config().with_secure(true),
            transport_fn(|_| async { Ok(HttpResponse::new(200, "")) }),
        );
        client.set_security_data(Some("abc".to_string()));
        let request = client
            .build_request(&RequestParams::get("/employees"))
            .unwrap();
        assert_eq!(request.header("authorization"), Some("Bearer abc"));

        let request = client
            .build_request(&RequestParams::get("/employees").secure(false))
            .unwrap();
        assert_eq!(request.header("authorization"), None);
    }

    #[test]
    fn security_options_do_not_persist() {
        let client = client();
        client.set_security_data(Some("one".to_string()));
        client
            .build_request(&RequestParams::get("/a").secure(true))
            .unwrap();
        client.set_security_data(None);
        let request = client
            .build_request(&RequestParams::get("/a").secure(true))
            .unwrap();
        assert_eq!(request.header("authorization"), None);
        assert!(client.config().base_options.headers.is_empty());
    }

    #[tokio::test]
    async fn success_returns_envelope_with_data() {
        let (client, seen) = client_answering(200, r#"{"id":"p1","name":"Atlas"}"#);
        let envelope = client
            .request(RequestParams::get("/projects/p1").format(ResponseFormat::Json))
            .await
            .unwrap();
        assert!(envelope.ok);
        assert_eq!(envelope.status, 200);
        let project: Value = envelope.json().unwrap();
        assert_eq!(project["name"], "Atlas");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_success_is_err_with_parsed_error_body() {
        let (client, _) = client_answering(404, r#"{"message":"no such project"}"#);
        let err = client
            .request(RequestParams::get("/projects/nope").format(ResponseFormat::Json))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let envelope = err.envelope().unwrap();
        assert!(!envelope.ok);
        assert!(envelope.data.is_none());
        assert_eq!(
            envelope.error_body(),
            Some(&ResponseBody::Json(json!({"message": "no such project"})))
        );
    }

    #[tokio::test]
    async fn parse_failure_keeps_original_status() {
        let (client, _) = client_answering(503, "upstream down");
        let err = client
            .request(RequestParams::get("/events").format(ResponseFormat::Json))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(matches!(
            err.envelope().unwrap().error,
            Some(EnvelopeError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn config_format_used_when_call_has_none() {
        let client = HttpClient::with_transport(
            ClientConfig::<String>::new(BASE_URL).with_format(ResponseFormat::Text),
            transport_fn(|_| async { Ok(HttpResponse::new(200, "pong")) }),
        );
        let envelope = client.request(RequestParams::get("/ping")).await.unwrap();
        assert_eq!(envelope.data, Some(ResponseBody::Text("pong".to_string())));
    }

    #[tokio::test]
    async fn transport_fault_propagates_unchanged() {
        let client = HttpClient::with_transport(
            config(),
            transport_fn(|_| async { Err(TransportError::Request("connection refused".to_string())) }),
        );
        let err = client
            .request(RequestParams::get("/projects"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(TransportError::Request(_))));
    }

    #[tokio::test]
    async fn serialization_failure_sends_nothing() {
        let (client, seen) = client_answering(200, "");
        let err = client
            .request(
                RequestParams::post("/events")
                    .content_type(ContentType::UrlEncoded)
                    .body(json!("not an object")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Serialization(_)));
        assert!(seen.lock().unwrap().is_empty());
    }

    fn hanging_client() -> HttpClient<String> {
        HttpClient::with_transport(
            config(),
            transport_fn(|_| async {
                std::future::pending::<Result<HttpResponse, TransportError>>().await
            }),
        )
    }

    #[tokio::test]
    async fn abort_fails_in_flight_call_and_deregisters() {
        let client = hanging_client();
        let key = CancelKey::from("slow");

        let call = client.request(RequestParams::get("/slow").cancel_key(key.clone()));
        let abort = async {
            tokio::task::yield_now().await;
            client.abort_request(&key)
        };
        let (result, aborted) = tokio::join!(call, abort);

        assert!(aborted);
        assert!(result.unwrap_err().is_aborted());
        assert!(!client.aborts().contains(&key));
    }

    #[tokio::test]
    async fn settled_call_deregisters_its_key() {
        let (client, _) = client_answering(500, "");
        let key = CancelKey::from("once");
        let _ = client
            .request(RequestParams::get("/x").cancel_key(key.clone()))
            .await;
        assert!(!client.aborts().contains(&key));
    }

    #[tokio::test]
    async fn dropped_call_deregisters_its_key() {
        let client = hanging_client();
        let key = CancelKey::from("dropped");
        let call = client.request(RequestParams::get("/slow").cancel_key(key.clone()));
        let timed_out = tokio::time::timeout(Duration::from_millis(20), call).await;
        assert!(timed_out.is_err());
        assert!(client.aborts().is_empty());
    }

    #[tokio::test]
    async fn calls_sharing_a_key_are_aborted_together() {
        let client = hanging_client();
        let key = CancelKey::from("shared");

        let first = client.request(RequestParams::get("/a").cancel_key(key.clone()));
        let second = client.request(RequestParams::get("/b").cancel_key(key.clone()));
        let abort = async {
            tokio::task::yield_now().await;
            client.abort_request(&key)
        };
        let (first, second, aborted) = tokio::join!(first, second, abort);

        assert!(aborted);
        assert!(first.unwrap_err().is_aborted());
        assert!(second.unwrap_err().is_aborted());
    }

    #[tokio::test]
    async fn binary_response_is_kept_as_bytes() {
        let client = HttpClient::with_transport(
            config(),
            transport_fn(|_| async { Ok(HttpResponse::new(200, &b"\x89PNG"[..])) }),
        );
        let envelope = client
            .request(RequestParams::get("/files/1").format(ResponseFormat::Blob))
            .await
            .unwrap();
        assert_eq!(
            envelope.data,
            Some(ResponseBody::Binary(Bytes::from_static(b"\x89PNG")))
        );
    }
}
