//! Response envelope parsing.
//!
//! Success bodies decode into the caller's type; error bodies decode into
//! [`ServerError`]. Decode failures always name the call that produced them.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::batch::{BatchPartialError, BatchResult};
use crate::error::{ApiError, ErrorDetail, ServerError};
use crate::http::HttpResponse;

/// Cursor for the next page of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextPage {
    pub after: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousPage {
    pub before: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NextPage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<PreviousPage>,
}

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default)]
    pub results: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
    /// Total match count, reported by search endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl<T> Page<T> {
    /// Cursor for the following page; `None` at the end of the collection.
    pub fn next_after(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .map(|n| n.after.as_str())
    }

    pub fn is_last(&self) -> bool {
        self.next_after().is_none()
    }
}

/// Wire shape of a server error body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    sub_category: Option<String>,
    #[serde(default)]
    context: HashMap<String, Vec<String>>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

/// Build a [`ServerError`] from a non-2xx response. A body that is not the
/// usual JSON shape still produces an error, with the raw text as message.
pub fn server_error(response: &HttpResponse) -> ServerError {
    match serde_json::from_slice::<ErrorBody>(&response.body) {
        Ok(body) => ServerError {
            status: response.status,
            category: body.category,
            message: body.message,
            correlation_id: body.correlation_id,
            sub_category: body.sub_category,
            context: body.context,
            errors: body.errors,
        },
        Err(_) => ServerError {
            status: response.status,
            message: response.body_text(),
            ..ServerError::default()
        },
    }
}

/// Decode a success body into `T`.
pub fn decode<T: DeserializeOwned>(
    call: &'static str,
    response: &HttpResponse,
) -> Result<T, ApiError> {
    serde_json::from_slice(&response.body).map_err(|source| ApiError::Parse { call, source })
}

/// Decode a batch body. Any failed item turns the whole call into
/// [`ApiError::BatchPartial`], which still carries every result. Only a 204
/// may come back without a body; a blank 200 is a parse error.
pub fn decode_batch<T: DeserializeOwned>(
    call: &'static str,
    response: &HttpResponse,
) -> Result<BatchResult<T>, ApiError> {
    if response.status == 204 {
        return Ok(BatchResult::complete_empty());
    }
    let raw: BatchResult<serde_json::Value> = decode(call, response)?;
    if raw.has_errors() {
        tracing::warn!(
            call,
            num_errors = raw.error_count(),
            succeeded = raw.results.len(),
            "batch reported failed items"
        );
        return Err(BatchPartialError::new(raw).into());
    }
    raw.try_map(serde_json::from_value)
        .map_err(|source| ApiError::Parse { call, source })
}

/// Enforce a non-empty result set for endpoints where zero results means
/// something went wrong rather than "no matches". The empty page travels
/// inside the error.
pub fn require_results<T: Serialize>(
    resource: &'static str,
    page: &Page<T>,
) -> Result<(), ApiError> {
    if !page.results.is_empty() {
        return Ok(());
    }
    let response = serde_json::to_value(page).map_err(ApiError::Serialization)?;
    Err(ApiError::NoResults { resource, response })
}
