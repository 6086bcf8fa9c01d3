use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{now, AppError, Db, Store};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView {
    pub list_id: String,
    pub name: String,
    pub object_type_id: String,
    pub processing_type: String,
    pub processing_status: &'static str,
    pub list_version: u32,
    pub size: usize,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_branch: Option<serde_json::Value>,
}

#[derive(Clone, Debug)]
pub struct StoredList {
    pub view: ListView,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ListEnvelope {
    pub list: ListView,
}

#[derive(Debug, Serialize)]
pub struct ListsEnvelope {
    pub lists: Vec<ListView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListInput {
    pub name: String,
    pub object_type_id: String,
    pub processing_type: String,
    pub filter_branch: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub include_filters: Option<bool>,
    pub list_name: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFiltersInput {
    pub filter_branch: serde_json::Value,
    #[serde(default)]
    pub include_filters: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchInput {
    pub query: Option<String>,
    pub count: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutput {
    pub lists: Vec<ListView>,
    pub total: usize,
    pub has_more: bool,
    pub offset: usize,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    pub record_ids_added: Vec<String>,
    pub record_ids_removed: Vec<String>,
    pub record_ids_missing: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipsPage {
    pub results: Vec<String>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMembership {
    pub list_id: String,
    pub list_version: u32,
    pub first_added_timestamp: String,
    pub last_added_timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct RecordMemberships {
    pub results: Vec<RecordMembership>,
    pub total: usize,
}

fn list_not_found(list_id: &str) -> AppError {
    AppError::NotFound(format!("List {list_id} does not exist."))
}

/// Built-in object type ids used by lists, mapped to object store names.
fn object_type_name(object_type_id: &str) -> &str {
    match object_type_id {
        "0-1" => "contacts",
        "0-2" => "companies",
        "0-3" => "deals",
        "0-5" => "tickets",
        other => other,
    }
}

impl Store {
    fn live_list(&mut self, list_id: &str) -> Result<&mut StoredList, AppError> {
        list_id
            .parse::<u64>()
            .ok()
            .and_then(|id| self.lists.get_mut(&id))
            .filter(|l| !l.deleted)
            .ok_or_else(|| list_not_found(list_id))
    }

    fn name_taken(&self, object_type_id: &str, name: &str, except: Option<&str>) -> bool {
        self.lists.values().any(|l| {
            !l.deleted
                && l.view.object_type_id == object_type_id
                && l.view.name == name
                && Some(l.view.list_id.as_str()) != except
        })
    }

    fn view(&self, list: &StoredList, include_filters: bool) -> ListView {
        let mut view = list.view.clone();
        view.size = list
            .view
            .list_id
            .parse::<u64>()
            .ok()
            .and_then(|id| self.members.get(&id))
            .map_or(0, |m| m.len());
        if !include_filters {
            view.filter_branch = None;
        }
        view
    }
}

fn list_key(list_id: &str) -> Result<u64, AppError> {
    list_id.parse().map_err(|_| list_not_found(list_id))
}

pub async fn create(
    State(db): State<Db>,
    Json(input): Json<CreateListInput>,
) -> Result<Json<ListEnvelope>, AppError> {
    let mut store = db.write().await;
    if store.name_taken(&input.object_type_id, &input.name, None) {
        return Err(AppError::Conflict(format!("A list named {:?} already exists", input.name)));
    }
    let id = store.next_id();
    let ts = now();
    let list = StoredList {
        view: ListView {
            list_id: id.to_string(),
            name: input.name,
            object_type_id: input.object_type_id,
            processing_type: input.processing_type,
            processing_status: "COMPLETE",
            list_version: 1,
            size: 0,
            created_at: ts.clone(),
            updated_at: ts,
            filter_branch: input.filter_branch,
        },
        deleted: false,
    };
    let view = store.view(&list, true);
    store.lists.insert(id, list);
    Ok(Json(ListEnvelope { list: view }))
}

pub async fn get(
    State(db): State<Db>,
    Path(list_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListEnvelope>, AppError> {
    let mut store = db.write().await;
    let list = store.live_list(&list_id)?.clone();
    let view = store.view(&list, params.include_filters.unwrap_or(false));
    Ok(Json(ListEnvelope { list: view }))
}

pub async fn get_by_name(
    State(db): State<Db>,
    Path((object_type_id, name)): Path<(String, String)>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListEnvelope>, AppError> {
    let store = db.read().await;
    let list = store
        .lists
        .values()
        .find(|l| !l.deleted && l.view.object_type_id == object_type_id && l.view.name == name)
        .ok_or_else(|| list_not_found(&name))?;
    let view = store.view(list, params.include_filters.unwrap_or(false));
    Ok(Json(ListEnvelope { list: view }))
}

/// `listIds` repeats once per id, so the raw pairs are read directly.
pub async fn get_many(
    State(db): State<Db>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Json<ListsEnvelope> {
    let include_filters = pairs.iter().any(|(k, v)| k == "includeFilters" && v == "true");
    let store = db.read().await;
    let lists = pairs
        .iter()
        .filter(|(k, _)| k == "listIds")
        .filter_map(|(_, id)| id.parse::<u64>().ok())
        .filter_map(|id| store.lists.get(&id))
        .filter(|l| !l.deleted)
        .map(|l| store.view(l, include_filters))
        .collect();
    Json(ListsEnvelope { lists })
}

pub async fn search(State(db): State<Db>, Json(input): Json<SearchInput>) -> Json<SearchOutput> {
    let store = db.read().await;
    let query = input.query.unwrap_or_default().to_lowercase();
    let hits: Vec<ListView> = store
        .lists
        .values()
        .filter(|l| !l.deleted && l.view.name.to_lowercase().contains(&query))
        .map(|l| store.view(l, false))
        .collect();
    let offset = input.offset.unwrap_or(0);
    let count = input.count.unwrap_or(20);
    let total = hits.len();
    let lists: Vec<ListView> = hits.into_iter().skip(offset).take(count).collect();
    let next = offset + lists.len();
    Json(SearchOutput {
        lists,
        total,
        has_more: next < total,
        offset: next,
    })
}

pub async fn update_name(
    State(db): State<Db>,
    Path(list_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListEnvelope>, AppError> {
    let name = params
        .list_name
        .ok_or_else(|| AppError::BadRequest("listName is required".to_string()))?;
    let mut store = db.write().await;
    let object_type_id = store.live_list(&list_id)?.view.object_type_id.clone();
    if store.name_taken(&object_type_id, &name, Some(&list_id)) {
        return Err(AppError::Conflict(format!("A list named {name:?} already exists")));
    }
    let list = store.live_list(&list_id)?;
    list.view.name = name;
    list.view.list_version += 1;
    list.view.updated_at = now();
    let list = list.clone();
    let view = store.view(&list, params.include_filters.unwrap_or(false));
    Ok(Json(ListEnvelope { list: view }))
}

pub async fn update_filters(
    State(db): State<Db>,
    Path(list_id): Path<String>,
    Json(input): Json<UpdateFiltersInput>,
) -> Result<Json<ListEnvelope>, AppError> {
    let mut store = db.write().await;
    let list = store.live_list(&list_id)?;
    if list.view.processing_type != "DYNAMIC" {
        return Err(AppError::BadRequest(format!(
            "List {list_id} is {} and has no filters",
            list.view.processing_type
        )));
    }
    list.view.filter_branch = Some(input.filter_branch);
    list.view.list_version += 1;
    list.view.updated_at = now();
    let list = list.clone();
    let view = store.view(&list, input.include_filters);
    Ok(Json(ListEnvelope { list: view }))
}

pub async fn delete(
    State(db): State<Db>,
    Path(list_id): Path<String>,
) -> Result<StatusCode, AppError> {
    db.write().await.live_list(&list_id)?.deleted = true;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore(
    State(db): State<Db>,
    Path(list_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let mut store = db.write().await;
    let list = store
        .lists
        .get_mut(&list_key(&list_id)?)
        .ok_or_else(|| list_not_found(&list_id))?;
    list.deleted = false;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_records(
    State(db): State<Db>,
    Path(list_id): Path<String>,
    Json(record_ids): Json<Vec<String>>,
) -> Result<Json<MembershipChange>, AppError> {
    let mut store = db.write().await;
    let object_type = object_type_name(&store.live_list(&list_id)?.view.object_type_id).to_string();
    let mut change = MembershipChange::default();
    let mut added = Vec::new();
    for id in record_ids {
        if store.find(&object_type, &id, None).is_some() {
            added.push(id);
        } else {
            change.record_ids_missing.push(id);
        }
    }
    let members = store.members.entry(list_key(&list_id)?).or_default();
    for id in added {
        if members.insert(id.clone()) {
            change.record_ids_added.push(id);
        }
    }
    Ok(Json(change))
}

pub async fn remove_records(
    State(db): State<Db>,
    Path(list_id): Path<String>,
    Json(record_ids): Json<Vec<String>>,
) -> Result<Json<MembershipChange>, AppError> {
    let mut store = db.write().await;
    store.live_list(&list_id)?;
    let members = store.members.entry(list_key(&list_id)?).or_default();
    let mut change = MembershipChange::default();
    for id in record_ids {
        if members.remove(&id) {
            change.record_ids_removed.push(id);
        } else {
            change.record_ids_missing.push(id);
        }
    }
    Ok(Json(change))
}

/// Member ids in ascending order, paged by a numeric `offset`.
pub async fn memberships(
    State(db): State<Db>,
    Path(list_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<MembershipsPage>, AppError> {
    let mut store = db.write().await;
    store.live_list(&list_id)?;
    let offset = match params.offset.as_deref() {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| AppError::BadRequest(format!("invalid offset {raw:?}")))?,
        None => 0,
    };
    let limit = params.limit.unwrap_or(100);
    let all: Vec<String> = store
        .members
        .get(&list_key(&list_id)?)
        .map(|m| m.iter().cloned().collect())
        .unwrap_or_default();
    let results: Vec<String> = all.iter().skip(offset).take(limit).cloned().collect();
    let next = offset + results.len();
    let has_more = next < all.len();
    Ok(Json(MembershipsPage {
        results,
        has_more,
        offset: has_more.then(|| next.to_string()),
    }))
}

pub async fn remove_all(
    State(db): State<Db>,
    Path(list_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let mut store = db.write().await;
    store.live_list(&list_id)?;
    store.members.remove(&list_key(&list_id)?);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_memberships(
    State(db): State<Db>,
    Path((object_type_id, record_id)): Path<(String, String)>,
) -> Result<Json<RecordMemberships>, AppError> {
    let mut store = db.write().await;
    if store
        .find(object_type_name(&object_type_id), &record_id, None)
        .is_none()
    {
        return Err(AppError::object_not_found());
    }
    let ts = now();
    let results: Vec<RecordMembership> = store
        .lists
        .iter()
        .filter(|(id, l)| {
            !l.deleted && store.members.get(*id).is_some_and(|m| m.contains(&record_id))
        })
        .map(|(id, l)| RecordMembership {
            list_id: id.to_string(),
            list_version: l.view.list_version,
            first_added_timestamp: ts.clone(),
            last_added_timestamp: ts.clone(),
        })
        .collect();
    Ok(Json(RecordMemberships {
        total: results.len(),
        results,
    }))
}
