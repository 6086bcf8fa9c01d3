//! In-memory stand-in for the CRM REST API.
//!
//! Serves the subset of endpoints the client exercises (objects, v4
//! associations, lists, schemas) with the same JSON shapes, paging cursors,
//! batch envelopes and error bodies as the real service. State lives in one
//! [`Store`] behind an async `RwLock` and is lost when the process exits.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;

mod associations;
pub mod error;
mod lists;
mod objects;
mod schemas;

pub use associations::Link;
pub use error::{AppError, ErrorBody};
pub use lists::StoredList;
pub use objects::Record;
pub use schemas::SchemaView;

#[derive(Debug, Default)]
pub struct Store {
    next_id: u64,
    /// Records per object type, keyed by numeric id.
    pub objects: HashMap<String, BTreeMap<u64, Record>>,
    pub links: Vec<Link>,
    pub lists: BTreeMap<u64, StoredList>,
    /// Record ids per list id.
    pub members: HashMap<u64, BTreeSet<String>>,
    pub schemas: Vec<SchemaView>,
}

impl Store {
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    router(Db::default())
}

/// Router over an existing store, so tests can seed or inspect state.
pub fn router(db: Db) -> Router {
    Router::new()
        .route(
            "/crm/v3/objects/{object_type}",
            get(objects::list).post(objects::create),
        )
        .route(
            "/crm/v3/objects/{object_type}/{id}",
            get(objects::read).patch(objects::update).delete(objects::archive),
        )
        .route("/crm/v3/objects/{object_type}/merge", post(objects::merge))
        .route("/crm/v3/objects/{object_type}/search", post(objects::search))
        .route("/crm/v3/objects/{object_type}/batch/read", post(objects::batch_read))
        .route("/crm/v3/objects/{object_type}/batch/create", post(objects::batch_create))
        .route("/crm/v3/objects/{object_type}/batch/update", post(objects::batch_update))
        .route("/crm/v3/objects/{object_type}/batch/upsert", post(objects::batch_upsert))
        .route("/crm/v3/objects/{object_type}/batch/archive", post(objects::batch_archive))
        .route(
            "/crm/v4/objects/{from_type}/{from_id}/associations/{to_type}",
            get(associations::list),
        )
        .route(
            "/crm/v4/objects/{from_type}/{from_id}/associations/{to_type}/{to_id}",
            put(associations::create).delete(associations::remove),
        )
        .route("/crm/v3/lists", get(lists::get_many).post(lists::create))
        .route("/crm/v3/lists/search", post(lists::search))
        .route(
            "/crm/v3/lists/object-type-id/{object_type_id}/name/{name}",
            get(lists::get_by_name),
        )
        .route(
            "/crm/v3/lists/records/{object_type_id}/{record_id}/memberships",
            get(lists::record_memberships),
        )
        .route("/crm/v3/lists/{list_id}", get(lists::get).delete(lists::delete))
        .route("/crm/v3/lists/{list_id}/restore", put(lists::restore))
        .route("/crm/v3/lists/{list_id}/update-list-name", put(lists::update_name))
        .route("/crm/v3/lists/{list_id}/update-list-filters", put(lists::update_filters))
        .route(
            "/crm/v3/lists/{list_id}/memberships",
            get(lists::memberships).delete(lists::remove_all),
        )
        .route("/crm/v3/lists/{list_id}/memberships/add", put(lists::add_records))
        .route("/crm/v3/lists/{list_id}/memberships/remove", put(lists::remove_records))
        .route(
            "/crm-object-schemas/v3/schemas",
            get(schemas::get_all).post(schemas::create),
        )
        .route(
            "/crm-object-schemas/v3/schemas/{object_type}",
            get(schemas::get).patch(schemas::update).delete(schemas::delete),
        )
        .route(
            "/crm-object-schemas/v3/schemas/{object_type}/associations",
            post(schemas::create_association),
        )
        .route(
            "/crm-object-schemas/v3/schemas/{object_type}/associations/{association_id}",
            delete(schemas::remove_association),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Milliseconds since the epoch, as a string.
pub(crate) fn now() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string()
}

/// Parse a path id; anything non-numeric cannot exist.
pub(crate) fn parse_id(id: &str) -> Result<u64, AppError> {
    id.parse().map_err(|_| AppError::object_not_found())
}

#[derive(Debug, Serialize)]
pub struct NextPage {
    pub after: String,
    pub link: String,
}

#[derive(Debug, Serialize)]
pub struct Paging {
    pub next: NextPage,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl<T> Page<T> {
    /// Cut one page out of `items`, which must be sorted by cursor. `after`
    /// is the last cursor the caller saw.
    pub fn cut<I>(items: I, after: Option<u64>, limit: usize, link: &str) -> Self
    where
        I: IntoIterator<Item = (u64, T)>,
    {
        let mut rest = items
            .into_iter()
            .filter(|(cursor, _)| after.map_or(true, |a| *cursor > a))
            .peekable();
        let mut results = Vec::new();
        let mut last = None;
        while results.len() < limit {
            match rest.next() {
                Some((cursor, item)) => {
                    last = Some(cursor);
                    results.push(item);
                }
                None => break,
            }
        }
        let paging = match (rest.peek(), last) {
            (Some(_), Some(cursor)) => Some(Paging {
                next: NextPage {
                    after: cursor.to_string(),
                    link: format!("{link}?after={cursor}"),
                },
            }),
            _ => None,
        };
        Self {
            results,
            paging,
            total: None,
        }
    }
}

/// Per-item failure inside a batch response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub status: &'static str,
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Vec<String>>,
}

impl From<AppError> for BatchItemError {
    fn from(err: AppError) -> Self {
        let body = err.body();
        Self {
            status: "error",
            category: body.category,
            message: body.message,
            context: body.context,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse<T> {
    pub status: &'static str,
    pub results: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_errors: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchItemError>,
    pub started_at: String,
    pub completed_at: String,
}

/// Complete batch outcome: `ok` when nothing failed, 207 Multi-Status
/// otherwise.
pub(crate) fn batch_response<T: Serialize>(
    ok: StatusCode,
    results: Vec<T>,
    errors: Vec<BatchItemError>,
) -> Response {
    let status = if errors.is_empty() { ok } else { StatusCode::MULTI_STATUS };
    let started_at = now();
    let body = BatchResponse {
        status: "COMPLETE",
        results,
        num_errors: (!errors.is_empty()).then_some(errors.len()),
        errors,
        completed_at: started_at.clone(),
        started_at,
    };
    (status, Json(body)).into_response()
}
