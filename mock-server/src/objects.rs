use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{batch_response, now, parse_id, AppError, BatchItemError, Db, Page, Store};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: u64,
    pub properties: BTreeMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
    pub archived: bool,
}

/// A record as returned to clients. Requested properties the record does not
/// have come back as `null`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectView {
    pub id: String,
    pub properties: BTreeMap<String, Option<String>>,
    pub created_at: String,
    pub updated_at: String,
    pub archived: bool,
}

impl Record {
    fn view(&self, properties: Option<&[String]>) -> ObjectView {
        let properties = match properties {
            Some(names) => names
                .iter()
                .map(|name| (name.clone(), self.properties.get(name).cloned()))
                .collect(),
            None => self
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), Some(v.clone())))
                .collect(),
        };
        ObjectView {
            id: self.id.to_string(),
            properties,
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            archived: self.archived,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadParams {
    pub limit: Option<usize>,
    pub after: Option<String>,
    pub properties: Option<String>,
    pub archived: Option<bool>,
    pub id_property: Option<String>,
}

impl ReadParams {
    fn property_names(&self) -> Option<Vec<String>> {
        self.properties
            .as_deref()
            .map(|p| p.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
    }
}

#[derive(Debug, Deserialize)]
pub struct PropertiesInput {
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeInput {
    pub primary_object_id: String,
    pub object_id_to_merge: String,
}

#[derive(Debug, Deserialize)]
pub struct IdInput {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchInput<T> {
    pub inputs: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReadInput {
    #[serde(default)]
    pub properties: Vec<String>,
    pub id_property: Option<String>,
    pub inputs: Vec<IdInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateItem {
    pub id: String,
    pub id_property: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: String,
    pub value: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub filters: Vec<Filter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchInput {
    #[serde(default)]
    pub filter_groups: Vec<FilterGroup>,
    #[serde(default)]
    pub properties: Vec<String>,
    pub limit: Option<usize>,
    pub after: Option<String>,
}

fn validate(properties: &BTreeMap<String, String>) -> Result<(), AppError> {
    match properties.get("email") {
        Some(email) if !email.contains('@') => Err(AppError::invalid_email(email)),
        _ => Ok(()),
    }
}

fn parse_cursor(after: Option<&str>) -> Result<Option<u64>, AppError> {
    after
        .map(|a| {
            a.parse()
                .map_err(|_| AppError::BadRequest(format!("invalid paging cursor {a:?}")))
        })
        .transpose()
}

impl Store {
    fn records(&mut self, object_type: &str) -> &mut BTreeMap<u64, Record> {
        self.objects.entry(object_type.to_string()).or_default()
    }

    /// A live record by id, or by the value of a unique property.
    pub(crate) fn find(
        &mut self,
        object_type: &str,
        id: &str,
        id_property: Option<&str>,
    ) -> Option<&mut Record> {
        let records = self.records(object_type);
        match id_property {
            Some(prop) => records
                .values_mut()
                .find(|r| !r.archived && r.properties.get(prop).map(String::as_str) == Some(id)),
            None => id
                .parse::<u64>()
                .ok()
                .and_then(|n| records.get_mut(&n))
                .filter(|r| !r.archived),
        }
    }

    pub(crate) fn insert(
        &mut self,
        object_type: &str,
        properties: BTreeMap<String, String>,
    ) -> Record {
        let id = self.next_id();
        let ts = now();
        let record = Record {
            id,
            properties,
            created_at: ts.clone(),
            updated_at: ts,
            archived: false,
        };
        self.records(object_type).insert(id, record.clone());
        record
    }
}

fn apply_update(record: &mut Record, properties: BTreeMap<String, String>) {
    record.properties.extend(properties);
    record.updated_at = now();
}

pub async fn list(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Query(params): Query<ReadParams>,
) -> Result<Json<Page<ObjectView>>, AppError> {
    let after = parse_cursor(params.after.as_deref())?;
    let names = params.property_names();
    let archived = params.archived.unwrap_or(false);
    let mut store = db.write().await;
    let items = store
        .records(&object_type)
        .values()
        .filter(|r| r.archived == archived)
        .map(|r| (r.id, r.view(names.as_deref())));
    let link = format!("/crm/v3/objects/{object_type}");
    Ok(Json(Page::cut(items, after, params.limit.unwrap_or(10).min(100), &link)))
}

pub async fn create(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(input): Json<PropertiesInput>,
) -> Result<(StatusCode, Json<ObjectView>), AppError> {
    validate(&input.properties)?;
    let record = db.write().await.insert(&object_type, input.properties);
    tracing::debug!(object_type = %object_type, id = record.id, "created record");
    Ok((StatusCode::CREATED, Json(record.view(None))))
}

pub async fn read(
    State(db): State<Db>,
    Path((object_type, id)): Path<(String, String)>,
    Query(params): Query<ReadParams>,
) -> Result<Json<ObjectView>, AppError> {
    let names = params.property_names();
    let mut store = db.write().await;
    let record = store
        .find(&object_type, &id, params.id_property.as_deref())
        .ok_or_else(AppError::object_not_found)?;
    Ok(Json(record.view(names.as_deref())))
}

pub async fn update(
    State(db): State<Db>,
    Path((object_type, id)): Path<(String, String)>,
    Query(params): Query<ReadParams>,
    Json(input): Json<PropertiesInput>,
) -> Result<Json<ObjectView>, AppError> {
    validate(&input.properties)?;
    let mut store = db.write().await;
    let record = store
        .find(&object_type, &id, params.id_property.as_deref())
        .ok_or_else(AppError::object_not_found)?;
    apply_update(record, input.properties);
    Ok(Json(record.view(None)))
}

pub async fn archive(
    State(db): State<Db>,
    Path((object_type, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    parse_id(&id)?;
    let mut store = db.write().await;
    let record = store.find(&object_type, &id, None).ok_or_else(AppError::object_not_found)?;
    record.archived = true;
    record.updated_at = now();
    Ok(StatusCode::NO_CONTENT)
}

/// Fold `objectIdToMerge` into the primary record. Properties already set on
/// the primary win; the merged record is archived.
pub async fn merge(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(input): Json<MergeInput>,
) -> Result<Json<ObjectView>, AppError> {
    let mut store = db.write().await;
    let merged = {
        let other = store
            .find(&object_type, &input.object_id_to_merge, None)
            .ok_or_else(AppError::object_not_found)?;
        other.archived = true;
        other.properties.clone()
    };
    let primary = store
        .find(&object_type, &input.primary_object_id, None)
        .ok_or_else(AppError::object_not_found)?;
    for (name, value) in merged {
        primary.properties.entry(name).or_insert(value);
    }
    primary.updated_at = now();
    Ok(Json(primary.view(None)))
}

fn matches(record: &Record, filter: &Filter) -> Result<bool, AppError> {
    let value = record.properties.get(&filter.property_name);
    let wanted = filter.value.as_ref();
    Ok(match filter.operator.as_str() {
        "EQ" => value.is_some() && value == wanted,
        "NEQ" => value != wanted,
        "HAS_PROPERTY" => value.is_some(),
        "NOT_HAS_PROPERTY" => value.is_none(),
        "CONTAINS_TOKEN" => match (value, wanted) {
            (Some(v), Some(token)) => v.to_lowercase().contains(&token.to_lowercase()),
            _ => false,
        },
        "IN" => value.is_some_and(|v| filter.values.contains(v)),
        "NOT_IN" => value.map_or(true, |v| !filter.values.contains(v)),
        other => return Err(AppError::BadRequest(format!("unsupported filter operator {other}"))),
    })
}

pub async fn search(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(input): Json<SearchInput>,
) -> Result<Json<Page<ObjectView>>, AppError> {
    let after = parse_cursor(input.after.as_deref())?;
    let names = (!input.properties.is_empty()).then_some(input.properties.as_slice());
    let mut store = db.write().await;

    let mut hits = Vec::new();
    for record in store.records(&object_type).values().filter(|r| !r.archived) {
        let mut hit = input.filter_groups.is_empty();
        for group in &input.filter_groups {
            let mut all = true;
            for filter in &group.filters {
                all &= matches(record, filter)?;
            }
            hit |= all;
        }
        if hit {
            hits.push((record.id, record.view(names)));
        }
    }

    let total = hits.len();
    let link = format!("/crm/v3/objects/{object_type}/search");
    let mut page = Page::cut(hits, after, input.limit.unwrap_or(10).min(200), &link);
    page.total = Some(total);
    Ok(Json(page))
}

pub async fn batch_read(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(input): Json<BatchReadInput>,
) -> Response {
    let names = (!input.properties.is_empty()).then_some(input.properties.as_slice());
    let mut store = db.write().await;
    let mut results = Vec::new();
    let mut missing = Vec::new();
    for item in &input.inputs {
        match store.find(&object_type, &item.id, input.id_property.as_deref()) {
            Some(record) => results.push(record.view(names)),
            None => missing.push(item.id.clone()),
        }
    }
    let errors = if missing.is_empty() {
        Vec::new()
    } else {
        vec![BatchItemError {
            status: "error",
            category: "OBJECT_NOT_FOUND".to_string(),
            message: format!("Could not get some {object_type} objects, they may be deleted or not exist."),
            context: BTreeMap::from([("ids".to_string(), missing)]),
        }]
    };
    batch_response(StatusCode::OK, results, errors)
}

pub async fn batch_create(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(input): Json<BatchInput<PropertiesInput>>,
) -> Response {
    let mut store = db.write().await;
    let mut results = Vec::new();
    let mut errors: Vec<BatchItemError> = Vec::new();
    for item in input.inputs {
        match validate(&item.properties) {
            Ok(()) => results.push(store.insert(&object_type, item.properties).view(None)),
            Err(err) => errors.push(BatchItemError::from(err)),
        }
    }
    batch_response(StatusCode::CREATED, results, errors)
}

pub async fn batch_update(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(input): Json<BatchInput<BatchUpdateItem>>,
) -> Response {
    let mut store = db.write().await;
    let mut results = Vec::new();
    let mut errors: Vec<BatchItemError> = Vec::new();
    for item in input.inputs {
        if let Err(err) = validate(&item.properties) {
            errors.push(err.into());
            continue;
        }
        match store.find(&object_type, &item.id, item.id_property.as_deref()) {
            Some(record) => {
                apply_update(record, item.properties);
                results.push(record.view(None));
            }
            None => {
                let mut err = BatchItemError::from(AppError::object_not_found());
                err.context.insert("ids".to_string(), vec![item.id]);
                errors.push(err);
            }
        }
    }
    batch_response(StatusCode::OK, results, errors)
}

/// Update records matched by `idProperty`, create the rest with that
/// property set.
pub async fn batch_upsert(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(input): Json<BatchInput<BatchUpdateItem>>,
) -> Response {
    let mut store = db.write().await;
    let mut results = Vec::new();
    let mut errors: Vec<BatchItemError> = Vec::new();
    for item in input.inputs {
        let Some(id_property) = item.id_property else {
            errors.push(BatchItemError::from(AppError::BadRequest(format!(
                "idProperty is required for upsert of {}",
                item.id
            ))));
            continue;
        };
        if let Err(err) = validate(&item.properties) {
            errors.push(err.into());
            continue;
        }
        match store.find(&object_type, &item.id, Some(&id_property)) {
            Some(record) => {
                apply_update(record, item.properties);
                results.push(record.view(None));
            }
            None => {
                let mut properties = item.properties;
                properties.insert(id_property, item.id);
                results.push(store.insert(&object_type, properties).view(None));
            }
        }
    }
    batch_response(StatusCode::OK, results, errors)
}

/// Unknown ids are ignored; the call answers 204 either way.
pub async fn batch_archive(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(input): Json<BatchInput<IdInput>>,
) -> impl IntoResponse {
    let mut store = db.write().await;
    for item in &input.inputs {
        if let Some(record) = store.find(&object_type, &item.id, None) {
            record.archived = true;
            record.updated_at = now();
        }
    }
    StatusCode::NO_CONTENT
}
