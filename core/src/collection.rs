//! Typed CRUD access to one resource collection.
//!
//! # Design
//! Every collection on the backend (projects, customers, employees, events,
//! wallets, ...) exposes the same five endpoints, so one accessor covers all
//! of them. Each operation is a fixed verb and path template handed to
//! `HttpClient::request`; DTOs are chosen at the call site through serde.
//! Identifiers are interpolated as given, without escaping.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::abort::CancelKey;
use crate::client::{HttpClient, RequestParams};
use crate::config::RequestOptions;
use crate::content::{ContentType, Payload};
use crate::error::ApiError;
use crate::query::QueryParams;
use crate::response::ResponseFormat;

/// Per-call knobs shared by every collection operation.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub cancel_key: Option<CancelKey>,
    /// Defaults to `true` for collection calls.
    pub secure: Option<bool>,
    pub options: RequestOptions,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_key(mut self, key: impl Into<CancelKey>) -> Self {
        self.cancel_key = Some(key.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.options = self.options.with_header(name, value);
        self
    }
}

/// CRUD endpoints under `/{name}`.
#[derive(Debug)]
pub struct Collection<'a, S> {
    client: &'a HttpClient<S>,
    name: String,
}

impl<'a, S> Collection<'a, S> {
    pub(crate) fn new(client: &'a HttpClient<S>, name: &str) -> Self {
        Self {
            client,
            name: name.trim_matches('/').to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> String {
        format!("/{}", self.name)
    }

    pub fn item_path(&self, id: impl fmt::Display) -> String {
        format!("/{}/{id}", self.name)
    }

    /// `GET /{name}`
    pub async fn list<T: DeserializeOwned>(
        &self,
        query: QueryParams,
        call: CallOptions,
    ) -> Result<Vec<T>, ApiError> {
        let params = RequestParams::get(self.path()).query(query);
        self.send_json(params, call).await
    }

    /// `GET /{name}/{id}`
    pub async fn get<T: DeserializeOwned>(&self, id: &str, call: CallOptions) -> Result<T, ApiError> {
        let params = RequestParams::get(self.item_path(id));
        self.send_json(params, call).await
    }

    /// `POST /{name}`
    pub async fn create<B, T>(&self, body: &B, call: CallOptions) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let params = RequestParams::post(self.path())
            .content_type(ContentType::Json)
            .body(Payload::json(body)?);
        self.send_json(params, call).await
    }

    /// `PUT /{name}/{id}`
    pub async fn update<B, T>(&self, id: &str, body: &B, call: CallOptions) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let params = RequestParams::put(self.item_path(id))
            .content_type(ContentType::Json)
            .body(Payload::json(body)?);
        self.send_json(params, call).await
    }

    /// `DELETE /{name}/{id}`
    pub async fn delete(&self, id: &str, call: CallOptions) -> Result<(), ApiError> {
        let params = with_call(RequestParams::delete(self.item_path(id)), call);
        self.client.request(params).await?;
        Ok(())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        params: RequestParams,
        call: CallOptions,
    ) -> Result<T, ApiError> {
        let params = with_call(params.format(ResponseFormat::Json), call);
        self.client.request(params).await?.into_json()
    }
}

fn with_call(mut params: RequestParams, call: CallOptions) -> RequestParams {
    params.cancel_key = call.cancel_key;
    params.secure = Some(call.secure.unwrap_or(true));
    params.options = call.options;
    params
}
