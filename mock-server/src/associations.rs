use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{parse_id, AppError, Db, Page, Store};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSpec {
    pub association_category: String,
    pub association_type_id: u32,
}

/// A stored link between two records.
#[derive(Clone, Debug)]
pub struct Link {
    pub from_type: String,
    pub from_id: u64,
    pub to_type: String,
    pub to_id: u64,
    pub types: Vec<AssociationSpec>,
}

impl Link {
    fn connects(&self, from_type: &str, from_id: u64, to_type: &str, to_id: u64) -> bool {
        self.from_type == from_type
            && self.from_id == from_id
            && self.to_type == to_type
            && self.to_id == to_id
    }
}

/// The v4 API reports record ids as numbers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationView {
    pub from_object_type_id: String,
    pub from_object_id: u64,
    pub to_object_type_id: String,
    pub to_object_id: u64,
    pub labels: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationType {
    pub category: String,
    pub type_id: u32,
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatedView {
    pub to_object_id: u64,
    pub association_types: Vec<AssociationType>,
}

type LinkPath = (String, String, String, String);

fn require(store: &mut Store, object_type: &str, id: &str) -> Result<u64, AppError> {
    let id = parse_id(id)?;
    store
        .find(object_type, &id.to_string(), None)
        .map(|r| r.id)
        .ok_or_else(AppError::object_not_found)
}

pub async fn create(
    State(db): State<Db>,
    Path((from_type, from_id, to_type, to_id)): Path<LinkPath>,
    Json(types): Json<Vec<AssociationSpec>>,
) -> Result<Json<AssociationView>, AppError> {
    let mut store = db.write().await;
    let from_id = require(&mut store, &from_type, &from_id)?;
    let to_id = require(&mut store, &to_type, &to_id)?;
    store
        .links
        .retain(|l| !l.connects(&from_type, from_id, &to_type, to_id));
    store.links.push(Link {
        from_type: from_type.clone(),
        from_id,
        to_type: to_type.clone(),
        to_id,
        types,
    });
    Ok(Json(AssociationView {
        from_object_type_id: from_type,
        from_object_id: from_id,
        to_object_type_id: to_type,
        to_object_id: to_id,
        labels: Vec::new(),
    }))
}

pub async fn remove(
    State(db): State<Db>,
    Path((from_type, from_id, to_type, to_id)): Path<LinkPath>,
) -> Result<StatusCode, AppError> {
    let from_id = parse_id(&from_id)?;
    let to_id = parse_id(&to_id)?;
    db.write()
        .await
        .links
        .retain(|l| !l.connects(&from_type, from_id, &to_type, to_id));
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list(
    State(db): State<Db>,
    Path((from_type, from_id, to_type)): Path<(String, String, String)>,
) -> Result<Json<Page<AssociatedView>>, AppError> {
    let mut store = db.write().await;
    let from_id = require(&mut store, &from_type, &from_id)?;
    let results = store
        .links
        .iter()
        .filter(|l| l.from_type == from_type && l.from_id == from_id && l.to_type == to_type)
        .map(|l| AssociatedView {
            to_object_id: l.to_id,
            association_types: l
                .types
                .iter()
                .map(|t| AssociationType {
                    category: t.association_category.clone(),
                    type_id: t.association_type_id,
                    label: None,
                })
                .collect(),
        })
        .collect();
    Ok(Json(Page {
        results,
        paging: None,
        total: None,
    }))
}
