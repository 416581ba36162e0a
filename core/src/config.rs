//! Client configuration and layered request options.
//!
//! # Design
//! `RequestOptions` is one configuration layer. A request's effective
//! options are folded from, lowest priority first: the security provider's
//! options, the client defaults (`fetch_defaults`), the per-instance base
//! options, then the per-call options. A later
//! layer replaces each policy field it sets; headers merge name by name.

use std::fmt;
use std::sync::Arc;

use crate::error::ApiError;
use crate::http::{set_header, Credentials, Headers, RedirectPolicy, ReferrerPolicy};
use crate::response::ResponseFormat;

/// One layer of request options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub headers: Headers,
    pub credentials: Option<Credentials>,
    pub redirect: Option<RedirectPolicy>,
    pub referrer_policy: Option<ReferrerPolicy>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Browser-style defaults: same-origin credentials, follow redirects, no referrer.
    pub fn fetch_defaults() -> Self {
        Self {
            headers: Vec::new(),
            credentials: Some(Credentials::SameOrigin),
            redirect: Some(RedirectPolicy::Follow),
            referrer_policy: Some(ReferrerPolicy::NoReferrer),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        set_header(&mut self.headers, name, value);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_redirect(mut self, redirect: RedirectPolicy) -> Self {
        self.redirect = Some(redirect);
        self
    }

    pub fn with_referrer_policy(mut self, policy: ReferrerPolicy) -> Self {
        self.referrer_policy = Some(policy);
        self
    }

    /// Lay `later` over `self`.
    pub fn merge(mut self, later: &RequestOptions) -> RequestOptions {
        for (name, value) in &later.headers {
            set_header(&mut self.headers, name, value);
        }
        self.credentials = later.credentials.or(self.credentials);
        self.redirect = later.redirect.or(self.redirect);
        self.referrer_policy = later.referrer_policy.or(self.referrer_policy);
        self
    }

    /// Fold layers in order, lowest priority first.
    pub fn layered<'a>(layers: impl IntoIterator<Item = &'a RequestOptions>) -> RequestOptions {
        layers
            .into_iter()
            .fold(RequestOptions::default(), |acc, layer| acc.merge(layer))
    }
}

/// Turns the stored security data into extra options for a secure request.
///
/// Called with a snapshot of the data, so a provider may replace it through
/// `HttpClient::set_security_data`; the new value applies from the next call.
pub type SecurityProvider<S> = Arc<dyn Fn(Option<&S>) -> Option<RequestOptions> + Send + Sync>;

/// Settings an `HttpClient` is built from.
pub struct ClientConfig<S> {
    pub base_url: String,
    /// Client-wide defaults under the base options.
    pub defaults: RequestOptions,
    pub base_options: RequestOptions,
    /// Applies the security provider to calls that don't say otherwise.
    pub secure: bool,
    /// Response format for calls that don't name one.
    pub format: Option<ResponseFormat>,
    pub security_provider: Option<SecurityProvider<S>>,
}

impl<S> ClientConfig<S> {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            defaults: RequestOptions::fetch_defaults(),
            base_options: RequestOptions::new(),
            secure: false,
            format: None,
            security_provider: None,
        }
    }

    /// Read `API_BASE_URL` (required) and `API_SECURE` (optional bool).
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let base_url = var("API_BASE_URL")
            .ok_or_else(|| ApiError::Config("API_BASE_URL is not set".to_string()))?;
        let mut config = Self::new(&base_url);
        if let Some(secure) = var("API_SECURE") {
            config.secure = parse_flag(&secure)
                .ok_or_else(|| ApiError::Config(format!("API_SECURE: invalid flag {secure:?}")))?;
        }
        Ok(config)
    }

    /// Replace the client-wide defaults.
    pub fn with_defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Per-instance options, layered over the defaults.
    pub fn with_base_options(mut self, options: RequestOptions) -> Self {
        self.base_options = options;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_security_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn(Option<&S>) -> Option<RequestOptions> + Send + Sync + 'static,
    {
        self.security_provider = Some(Arc::new(provider));
        self
    }
}

impl<S> fmt::Debug for ClientConfig<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("defaults", &self.defaults)
            .field("base_options", &self.base_options)
            .field("secure", &self.secure)
            .field("format", &self.format)
            .field("security_provider", &self.security_provider.is_some())
            .finish()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
