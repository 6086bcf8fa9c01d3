//! Request description and raw HTTP exchange types.
//!
//! # Design
//! A [`Request`] is the logical description of one CRM call: method, an
//! already-interpolated path, query parameters, an optional JSON body and a
//! resource-type tag. It is built once and handed to the dispatcher by value,
//! so nothing can mutate it after dispatch begins.
//!
//! [`HttpRequest`] and [`HttpResponse`] are the wire-level forms: a fully
//! resolved URL with headers and body bytes going out, status/headers/bytes
//! coming back. The dispatcher owns the translation between the two levels,
//! and a [`crate::transport::Transport`] only ever sees the wire form.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ApiError;
use crate::options::RequestOption;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether repeating the call has the same effect as issuing it once.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Put | HttpMethod::Delete)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical description of one CRM call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: HttpMethod,
    path: String,
    query: BTreeMap<String, Vec<String>>,
    body: Option<serde_json::Value>,
    resource_type: Option<String>,
    idempotent: bool,
}

impl Request {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            body: None,
            resource_type: None,
            idempotent: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Set a query parameter. A later call with the same name replaces the
    /// earlier value.
    pub fn add_query_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.query.insert(name.into(), vec![value.into()]);
    }

    /// Set a repeated query parameter (`name=a&name=b`), replacing any
    /// earlier value for `name`.
    pub fn set_query_values<I, S>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let name = name.into();
        if values.is_empty() {
            self.query.remove(&name);
        } else {
            self.query.insert(name, values);
        }
    }

    /// Tag the request with the resource area it belongs to. Only used for
    /// logs and error messages; the wire request is unaffected.
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_body<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(ApiError::Serialization)?;
        self.body = Some(value);
        Ok(self)
    }

    /// Mark a POST/PATCH as safe to repeat, making it eligible for retry.
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Fold `options` into the query, left to right.
    pub fn with_options(mut self, options: &[RequestOption]) -> Self {
        for option in options {
            option.apply(&mut self);
        }
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &BTreeMap<String, Vec<String>> {
        &self.query
    }

    /// The value of a single-valued query parameter (the last one for a
    /// repeated parameter).
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).and_then(|v| v.last()).map(String::as_str)
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    /// Whether the dispatcher may retry this request on a transient failure.
    pub fn is_retryable(&self) -> bool {
        self.idempotent || self.method.is_idempotent()
    }
}

/// An HTTP request described as plain data, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
