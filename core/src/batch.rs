//! Outcome model for bulk operations.
//!
//! # Design
//! A batch call can succeed for some items and fail for others while the HTTP
//! exchange itself returns 200 and `status: COMPLETE`. [`BatchResult`] keeps
//! both halves. Whenever it reports at least one failed item the dispatcher
//! turns it into [`BatchPartialError`], which still owns the full result so
//! callers can see which items went through.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ErrorDetail;

/// Server-reported state of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Processing,
    Complete,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Failure report for one or more members of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{}", render_item(self))]
pub struct BatchItemError {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub links: HashMap<String, String>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

fn render_item(err: &BatchItemError) -> String {
    match (err.message.is_empty(), err.errors.first()) {
        (false, None) => err.message.clone(),
        (false, Some(_)) => {
            let details: Vec<&str> = err.errors.iter().map(|e| e.message.as_str()).collect();
            format!("{}: {}", err.message, details.join("; "))
        }
        (true, Some(first)) => format!("batch error: {}", first.message),
        (true, None) => "batch error".to_string(),
    }
}

/// Outcome of a bulk create/read/update/upsert/archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct BatchResult<T> {
    #[serde(default)]
    pub status: BatchStatus,
    #[serde(default)]
    pub results: Vec<T>,
    #[serde(default)]
    pub num_errors: usize,
    #[serde(default)]
    pub errors: Vec<BatchItemError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub links: HashMap<String, String>,
}

impl<T> BatchResult<T> {
    /// A finished batch with no items, used when the server answers 204.
    pub fn complete_empty() -> Self {
        Self {
            status: BatchStatus::Complete,
            results: Vec::new(),
            num_errors: 0,
            errors: Vec::new(),
            requested_at: None,
            started_at: None,
            completed_at: None,
            links: HashMap::new(),
        }
    }

    /// Number of failed items, trusting whichever of `numErrors` and the
    /// error list reports more.
    pub fn error_count(&self) -> usize {
        self.num_errors.max(self.errors.len())
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Convert every result item, keeping the rest of the outcome intact.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<BatchResult<U>, E> {
        let results = self.results.into_iter().map(f).collect::<Result<Vec<U>, E>>()?;
        Ok(BatchResult {
            status: self.status,
            results,
            num_errors: self.num_errors,
            errors: self.errors,
            requested_at: self.requested_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            links: self.links,
        })
    }
}

/// A batch call that completed with at least one failed item.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", render_partial(self))]
pub struct BatchPartialError {
    result: BatchResult<serde_json::Value>,
}

impl BatchPartialError {
    pub fn new(result: BatchResult<serde_json::Value>) -> Self {
        Self { result }
    }

    /// The full outcome, successful items included.
    pub fn result(&self) -> &BatchResult<serde_json::Value> {
        &self.result
    }

    pub fn into_result(self) -> BatchResult<serde_json::Value> {
        self.result
    }

    /// Decode the items that did succeed.
    pub fn results<T: DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> {
        self.result
            .results
            .iter()
            .map(|v| T::deserialize(v))
            .collect()
    }

    pub fn errors(&self) -> &[BatchItemError] {
        &self.result.errors
    }

    pub fn num_errors(&self) -> usize {
        self.result.error_count()
    }
}

fn render_partial(err: &BatchPartialError) -> String {
    let head = format!("batch reported {} failed item(s)", err.num_errors());
    if err.result.errors.is_empty() {
        return head;
    }
    let rendered: Vec<String> = err.result.errors.iter().map(ToString::to_string).collect();
    format!("{head}: {}", rendered.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(message: &str) -> ErrorDetail {
        ErrorDetail {
            message: message.to_string(),
            ..ErrorDetail::default()
        }
    }

    fn item_error(message: &str, details: &[&str]) -> BatchItemError {
        BatchItemError {
            status: "error".to_string(),
            category: "BATCH_ERROR".to_string(),
            message: message.to_string(),
            errors: details.iter().map(|m| detail(m)).collect(),
            ..BatchItemError::default()
        }
    }

    #[test]
    fn renders_message_only() {
        assert_eq!(item_error("Batch operation failed", &[]).to_string(), "Batch operation failed");
    }

    #[test]
    fn renders_message_with_sub_errors() {
        let err = item_error(
            "Batch operation failed",
            &["Object 1 not found", "Object 2 validation error"],
        );
        assert_eq!(
            err.to_string(),
            "Batch operation failed: Object 1 not found; Object 2 validation error"
        );
    }

    #[test]
    fn renders_first_sub_error_without_message() {
        assert_eq!(
            item_error("", &["Object 1 not found"]).to_string(),
            "batch error: Object 1 not found"
        );
    }

    #[test]
    fn renders_placeholder_when_empty() {
        assert_eq!(item_error("", &[]).to_string(), "batch error");
    }

    #[test]
    fn decodes_partial_batch_body() {
        let body = r#"{
            "status": "COMPLETE",
            "results": [{"id": "1"}],
            "numErrors": 1,
            "errors": [{
                "status": "error",
                "category": "OBJECT_NOT_FOUND",
                "message": "Object not found",
                "context": {"ids": ["99999"]},
                "links": {},
                "errors": [{"message": "Object with ID 99999 not found", "subCategory": "NOT_FOUND"}]
            }],
            "startedAt": "2024-01-01T00:00:00.000Z",
            "completedAt": "2024-01-01T00:00:05.000Z"
        }"#;
        let result: BatchResult<serde_json::Value> = serde_json::from_str(body).unwrap();
        assert_eq!(result.status, BatchStatus::Complete);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.num_errors, 1);
        assert_eq!(result.errors[0].context["ids"], vec!["99999"]);
        assert_eq!(result.errors[0].errors[0].sub_category.as_deref(), Some("NOT_FOUND"));
        assert!(result.has_errors());
    }

    #[test]
    fn unknown_status_does_not_fail_decoding() {
        let result: BatchResult<serde_json::Value> =
            serde_json::from_str(r#"{"status": "CANCELED", "results": []}"#).unwrap();
        assert_eq!(result.status, BatchStatus::Unknown);
        assert!(!result.has_errors());
    }

    #[test]
    fn error_count_uses_the_larger_report() {
        let mut result = BatchResult::<serde_json::Value>::complete_empty();
        result.num_errors = 2;
        assert_eq!(result.error_count(), 2);
        result.num_errors = 0;
        result.errors.push(item_error("x", &[]));
        assert_eq!(result.error_count(), 1);
    }

    #[test]
    fn partial_error_exposes_successful_items() {
        let mut result = BatchResult::complete_empty();
        result.results.push(serde_json::json!({"id": "1"}));
        result.num_errors = 1;
        result.errors.push(item_error("Object not found", &["Object with ID 99999 not found"]));
        let err = BatchPartialError::new(result);

        #[derive(Deserialize)]
        struct Id {
            id: String,
        }
        let ok: Vec<Id> = err.results().unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].id, "1");
        assert_eq!(err.num_errors(), 1);
        assert_eq!(
            err.to_string(),
            "batch reported 1 failed item(s): Object not found: Object with ID 99999 not found"
        );
        let as_std: &dyn std::error::Error = &err;
        assert!(as_std.source().is_none());
    }
}
