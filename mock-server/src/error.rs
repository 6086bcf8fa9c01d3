//! Error responses in the CRM's error envelope.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// Wire shape of every error body the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
    pub correlation_id: Uuid,
    pub category: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Vec<String>>,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Conflict(String),
    /// Field-level rejection; the first value names the offending property.
    Validation { property: String, message: String },
    BadRequest(String),
}

impl AppError {
    pub fn object_not_found() -> Self {
        AppError::NotFound("Object not found.  objectId are usually numeric.".to_string())
    }

    pub fn invalid_email(value: &str) -> Self {
        AppError::Validation {
            property: "email".to_string(),
            message: format!("Property values were not valid: invalid email address {value:?}"),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation { .. } | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (category, message, context) = match self {
            AppError::NotFound(msg) => ("OBJECT_NOT_FOUND", msg.clone(), BTreeMap::new()),
            AppError::Conflict(msg) => ("CONFLICT", msg.clone(), BTreeMap::new()),
            AppError::Validation { property, message } => (
                "VALIDATION_ERROR",
                message.clone(),
                BTreeMap::from([("propertyName".to_string(), vec![property.clone()])]),
            ),
            AppError::BadRequest(msg) => ("BAD_REQUEST", msg.clone(), BTreeMap::new()),
        };
        ErrorBody {
            status: "error",
            message,
            correlation_id: Uuid::new_v4(),
            category: category.to_string(),
            context,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = self.body();
        tracing::debug!(status = %self.status(), category = %body.category, "rejecting request");
        (self.status(), Json(body)).into_response()
    }
}
