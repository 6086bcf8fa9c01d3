use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{now, AppError, Db, Store};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Labels {
    pub singular: String,
    pub plural: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAssociationView {
    pub id: String,
    pub from_object_type_id: String,
    pub to_object_type_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaView {
    pub id: String,
    pub name: String,
    pub object_type_id: String,
    pub fully_qualified_name: String,
    pub labels: Labels,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_display_property: Option<String>,
    pub secondary_display_properties: Vec<String>,
    pub required_properties: Vec<String>,
    pub searchable_properties: Vec<String>,
    /// Property definitions are echoed back as received.
    pub properties: Vec<Value>,
    pub associations: Vec<SchemaAssociationView>,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl SchemaView {
    fn matches(&self, key: &str) -> bool {
        self.name == key || self.object_type_id == key || self.fully_qualified_name == key
    }

    fn defines(&self, property: &str) -> bool {
        self.properties
            .iter()
            .any(|p| p.get("name").and_then(Value::as_str) == Some(property))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInput {
    pub name: String,
    pub labels: Labels,
    #[serde(default)]
    pub required_properties: Vec<String>,
    #[serde(default)]
    pub properties: Vec<Value>,
    #[serde(default)]
    pub associated_objects: Vec<String>,
    #[serde(default)]
    pub secondary_display_properties: Vec<String>,
    #[serde(default)]
    pub searchable_properties: Vec<String>,
    pub primary_display_property: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInput {
    pub labels: Option<Labels>,
    pub required_properties: Option<Vec<String>>,
    pub searchable_properties: Option<Vec<String>>,
    pub secondary_display_properties: Option<Vec<String>>,
    pub primary_display_property: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub clear_description: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationInput {
    pub from_object_type_id: String,
    pub to_object_type_id: String,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchivedParam {
    pub archived: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SchemaList {
    pub results: Vec<SchemaView>,
}

fn schema_not_found(key: &str) -> AppError {
    AppError::NotFound(format!("Unable to find object type {key}"))
}

impl Store {
    fn schema_mut(&mut self, key: &str) -> Result<&mut SchemaView, AppError> {
        self.schemas
            .iter_mut()
            .find(|s| !s.archived && s.matches(key))
            .ok_or_else(|| schema_not_found(key))
    }
}

pub async fn get_all(
    State(db): State<Db>,
    Query(params): Query<ArchivedParam>,
) -> Json<SchemaList> {
    let archived = params.archived.unwrap_or(false);
    let results = db
        .read()
        .await
        .schemas
        .iter()
        .filter(|s| s.archived == archived)
        .cloned()
        .collect();
    Json(SchemaList { results })
}

pub async fn create(
    State(db): State<Db>,
    Json(input): Json<CreateInput>,
) -> Result<(StatusCode, Json<SchemaView>), AppError> {
    let mut store = db.write().await;
    if store.schemas.iter().any(|s| s.name == input.name) {
        return Err(AppError::Conflict(format!("Object type {} already exists", input.name)));
    }
    let id = store.next_id();
    let ts = now();
    let object_type_id = format!("2-{id}");
    let associations = input
        .associated_objects
        .iter()
        .map(|to| SchemaAssociationView {
            id: store.next_id().to_string(),
            from_object_type_id: object_type_id.clone(),
            to_object_type_id: to.clone(),
            name: None,
            created_at: ts.clone(),
            updated_at: ts.clone(),
        })
        .collect();
    let schema = SchemaView {
        id: id.to_string(),
        fully_qualified_name: format!("p0_{}", input.name),
        name: input.name,
        object_type_id,
        labels: input.labels,
        description: input.description,
        primary_display_property: input.primary_display_property,
        secondary_display_properties: input.secondary_display_properties,
        required_properties: input.required_properties,
        searchable_properties: input.searchable_properties,
        properties: input.properties,
        associations,
        archived: false,
        created_at: ts.clone(),
        updated_at: ts,
    };
    if let Some(missing) = schema.required_properties.iter().find(|p| !schema.defines(p)) {
        return Err(AppError::Validation {
            property: missing.clone(),
            message: format!("Required property {missing} is not defined on the object"),
        });
    }
    tracing::debug!(name = %schema.name, object_type_id = %schema.object_type_id, "created schema");
    store.schemas.push(schema.clone());
    Ok((StatusCode::CREATED, Json(schema)))
}

pub async fn get(
    State(db): State<Db>,
    Path(object_type): Path<String>,
) -> Result<Json<SchemaView>, AppError> {
    Ok(Json(db.write().await.schema_mut(&object_type)?.clone()))
}

pub async fn update(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(input): Json<UpdateInput>,
) -> Result<Json<SchemaView>, AppError> {
    let mut store = db.write().await;
    let schema = store.schema_mut(&object_type)?;
    if let Some(labels) = input.labels {
        schema.labels = labels;
    }
    if let Some(required) = input.required_properties {
        schema.required_properties = required;
    }
    if let Some(searchable) = input.searchable_properties {
        schema.searchable_properties = searchable;
    }
    if let Some(secondary) = input.secondary_display_properties {
        schema.secondary_display_properties = secondary;
    }
    if let Some(primary) = input.primary_display_property {
        schema.primary_display_property = Some(primary);
    }
    if input.clear_description {
        schema.description = None;
    } else if let Some(description) = input.description {
        schema.description = Some(description);
    }
    schema.updated_at = now();
    Ok(Json(schema.clone()))
}

/// Soft delete by default; `archived=true` purges an already archived
/// schema.
pub async fn delete(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Query(params): Query<ArchivedParam>,
) -> Result<StatusCode, AppError> {
    let mut store = db.write().await;
    if params.archived.unwrap_or(false) {
        let before = store.schemas.len();
        store.schemas.retain(|s| !(s.archived && s.matches(&object_type)));
        if store.schemas.len() == before {
            return Err(schema_not_found(&object_type));
        }
    } else {
        store.schema_mut(&object_type)?.archived = true;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_association(
    State(db): State<Db>,
    Path(object_type): Path<String>,
    Json(input): Json<AssociationInput>,
) -> Result<Json<SchemaAssociationView>, AppError> {
    let mut store = db.write().await;
    store.schema_mut(&object_type)?;
    let id = store.next_id().to_string();
    let ts = now();
    let association = SchemaAssociationView {
        id,
        from_object_type_id: input.from_object_type_id,
        to_object_type_id: input.to_object_type_id,
        name: input.name,
        created_at: ts.clone(),
        updated_at: ts,
    };
    store.schema_mut(&object_type)?.associations.push(association.clone());
    Ok(Json(association))
}

pub async fn remove_association(
    State(db): State<Db>,
    Path((object_type, association_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let mut store = db.write().await;
    let schema = store.schema_mut(&object_type)?;
    let before = schema.associations.len();
    schema.associations.retain(|a| a.id != association_id);
    if schema.associations.len() == before {
        return Err(AppError::NotFound(format!("Association {association_id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pets() -> SchemaView {
        SchemaView {
            id: "7".into(),
            name: "pets".into(),
            object_type_id: "2-7".into(),
            fully_qualified_name: "p0_pets".into(),
            labels: Labels {
                singular: "Pet".into(),
                plural: "Pets".into(),
            },
            description: None,
            primary_display_property: None,
            secondary_display_properties: vec![],
            required_properties: vec![],
            searchable_properties: vec![],
            properties: vec![json!({"name": "pet_name", "type": "string"})],
            associations: vec![],
            archived: false,
            created_at: "0".into(),
            updated_at: "0".into(),
        }
    }

    #[test]
    fn schema_is_found_by_any_identifier() {
        let schema = pets();
        assert!(schema.matches("pets"));
        assert!(schema.matches("2-7"));
        assert!(schema.matches("p0_pets"));
        assert!(!schema.matches("7"));
    }

    #[test]
    fn defined_properties_are_looked_up_by_name() {
        let schema = pets();
        assert!(schema.defines("pet_name"));
        assert!(!schema.defines("owner"));
    }
}
