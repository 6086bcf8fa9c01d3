//! Error types and the server-error classifier.
//!
//! # Design
//! Failures are split by where they happened. [`TransportError`] means the
//! server was never heard from. [`ServerError`] is the structured body of a
//! non-2xx response, kept exactly as the server sent it. [`classify`] maps a
//! `ServerError` onto a domain variant (`NotFound`, `Validation`,
//! `AlreadyExists`) using the status and category, and every domain variant
//! keeps the original `ServerError` so nothing reported by the server is lost.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::batch::BatchPartialError;

/// Category string the server uses for field-level validation failures.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";

/// One nested entry of a server or batch error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, Vec<String>>,
}

/// Structured error returned by the server with a non-2xx status.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{}", render_server(self))]
pub struct ServerError {
    /// HTTP status of the response.
    pub status: u16,
    pub category: String,
    pub message: String,
    pub correlation_id: Option<String>,
    pub sub_category: Option<String>,
    pub context: HashMap<String, Vec<String>>,
    pub errors: Vec<ErrorDetail>,
}

impl ServerError {
    pub fn new(status: u16, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            category: category.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Name of the offending property, when the server reported one.
    pub fn property_name(&self) -> Option<&str> {
        fn from_context(ctx: &HashMap<String, Vec<String>>) -> Option<&str> {
            ctx.get("propertyName").and_then(|v| v.first()).map(String::as_str)
        }
        from_context(&self.context)
            .or_else(|| self.errors.iter().find_map(|e| from_context(&e.context)))
    }
}

fn render_server(err: &ServerError) -> String {
    if err.category.is_empty() {
        format!("server returned {}: {}", err.status, err.message)
    } else {
        format!("server returned {} ({}): {}", err.status, err.category, err.message)
    }
}

/// The server could not be reached or did not answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("could not connect: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Connection failures and timeouts are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout)
    }
}

/// Errors returned by every client operation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A server rejection that no classification rule matched.
    #[error(transparent)]
    Server(ServerError),

    #[error("{}", describe(resource_type, identifier, "not found"))]
    NotFound {
        resource_type: String,
        identifier: String,
        original: ServerError,
    },

    #[error("validation error on field {field}: {message}")]
    Validation {
        field: String,
        message: String,
        original: ServerError,
    },

    #[error("{}", describe(resource_type, identifier, "already exists"))]
    AlreadyExists {
        resource_type: String,
        identifier: String,
        original: ServerError,
    },

    /// The response body did not match the shape the named call expects.
    #[error("failed to decode {call} response: {source}")]
    Parse {
        call: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The batch call finished but at least one item failed.
    #[error(transparent)]
    BatchPartial(Box<BatchPartialError>),

    /// An endpoint that must return something came back empty. `response`
    /// is the decoded (empty) envelope.
    #[error("no {resource} found")]
    NoResults {
        resource: &'static str,
        response: serde_json::Value,
    },

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("call cancelled")]
    Cancelled,

    #[error("call deadline exceeded")]
    DeadlineExceeded,
}

fn describe(resource_type: &str, identifier: &str, what: &str) -> String {
    if identifier.is_empty() {
        format!("{resource_type} {what}")
    } else {
        format!("{resource_type} {identifier} {what}")
    }
}

impl ApiError {
    /// The server error behind this one, classified or not.
    pub fn original(&self) -> Option<&ServerError> {
        match self {
            ApiError::Server(original)
            | ApiError::NotFound { original, .. }
            | ApiError::Validation { original, .. }
            | ApiError::AlreadyExists { original, .. } => Some(original),
            _ => None,
        }
    }

    /// HTTP status reported by the server, if the server answered.
    pub fn status(&self) -> Option<u16> {
        self.original().map(|e| e.status)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }

    /// The partial batch outcome, when a batch call reported item failures.
    pub fn batch(&self) -> Option<&BatchPartialError> {
        match self {
            ApiError::BatchPartial(partial) => Some(partial),
            _ => None,
        }
    }
}

impl From<BatchPartialError> for ApiError {
    fn from(err: BatchPartialError) -> Self {
        ApiError::BatchPartial(Box::new(err))
    }
}

/// Map a server error onto a domain variant.
///
/// | status | category           | result          |
/// |--------|--------------------|-----------------|
/// | 404    | any                | `NotFound`      |
/// | 400    | `VALIDATION_ERROR` | `Validation`    |
/// | 409    | any                | `AlreadyExists` |
/// | other  | any                | unchanged       |
///
/// Anything that is not an unclassified [`ApiError::Server`] is returned
/// unchanged.
pub fn classify(err: ApiError, resource_type: &str, identifier: &str) -> ApiError {
    let original = match err {
        ApiError::Server(original) => original,
        other => return other,
    };
    match (original.status, original.category.as_str()) {
        (404, _) => ApiError::NotFound {
            resource_type: resource_type.to_string(),
            identifier: identifier.to_string(),
            original,
        },
        (400, VALIDATION_ERROR) => ApiError::Validation {
            field: original.property_name().unwrap_or_default().to_string(),
            message: original.message.clone(),
            original,
        },
        (409, _) => ApiError::AlreadyExists {
            resource_type: resource_type.to_string(),
            identifier: identifier.to_string(),
            original,
        },
        _ => ApiError::Server(original),
    }
}
