//! Domain DTOs for the CRM API.
//!
//! # Design
//! These types mirror the server's JSON (camelCase keys) but are defined
//! independently of the mock-server crate; integration tests catch schema
//! drift between the two. Response fields the server may omit carry
//! `#[serde(default)]` so a sparse payload still decodes, and input fields
//! that are optional are skipped when unset so the server applies its own
//! defaults.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::envelope::Page;

/// Ids that the server sends as JSON numbers in some APIs and as strings in
/// others.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// A CRM record: contact, company, deal, ticket or custom object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmObject {
    pub id: String,
    /// Unset properties come back as `null`.
    #[serde(default)]
    pub properties: HashMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties_with_history: HashMap<String, Vec<PropertyWithHistory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    /// Associated record ids per object type, present when the call asked
    /// for `associations`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub associations: HashMap<String, Page<AssociationRef>>,
}

impl CrmObject {
    /// The value of `name`, or `None` when it is absent or null.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(|v| v.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyWithHistory {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by_user_id: Option<u64>,
}

/// An associated record embedded in an object read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationRef {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Payload for creating a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateObject {
    pub properties: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<ObjectAssociationInput>,
}

impl CreateObject {
    pub fn new<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            associations: Vec::new(),
        }
    }
}

/// Associate a record with another one while creating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectAssociationInput {
    pub to: ObjectId,
    pub types: Vec<AssociationSpec>,
}

/// Payload for a partial update. Only the listed properties change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateObject {
    pub properties: HashMap<String, String>,
}

impl UpdateObject {
    pub fn new<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeInput {
    pub primary_object_id: String,
    pub object_id_to_merge: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectId {
    pub id: String,
}

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// `{"inputs": [...]}`, the body shape shared by batch endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInput<T> {
    pub inputs: Vec<T>,
}

impl<T> BatchInput<T> {
    pub fn new(inputs: Vec<T>) -> Self {
        Self { inputs }
    }
}

impl<T> FromIterator<T> for BatchInput<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReadInput {
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub properties_with_history: Vec<String>,
    /// Read by a unique property instead of the record id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_property: Option<String>,
    pub inputs: Vec<ObjectId>,
}

impl BatchReadInput {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: ids.into_iter().map(ObjectId::new).collect(),
            ..Self::default()
        }
    }

    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = names.into_iter().map(Into::into).collect();
        self
    }
}

/// One member of a batch update or upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateItem {
    pub id: String,
    /// Required by upsert: which unique property `id` refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_property: Option<String>,
    pub properties: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Inclusive range: `value` to `high_value`.
    Between,
    In,
    NotIn,
    HasProperty,
    NotHasProperty,
    ContainsToken,
    NotContainsToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(
        property_name: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            operator,
            value: Some(value.into()),
            high_value: None,
            values: Vec::new(),
        }
    }

    pub fn between(
        property_name: impl Into<String>,
        low: impl Into<String>,
        high: impl Into<String>,
    ) -> Self {
        Self {
            high_value: Some(high.into()),
            ..Self::new(property_name, FilterOperator::Between, low)
        }
    }

    /// `IN` / `NOT_IN` style filters.
    pub fn any_of<I, S>(
        property_name: impl Into<String>,
        operator: FilterOperator,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            property_name: property_name.into(),
            operator,
            value: None,
            high_value: None,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `HAS_PROPERTY` / `NOT_HAS_PROPERTY`, which take no value.
    pub fn presence(property_name: impl Into<String>, operator: FilterOperator) -> Self {
        Self::any_of(property_name, operator, Vec::<String>::new())
    }
}

/// Filters in a group are ANDed; groups are ORed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub filter_groups: Vec<FilterGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl SearchRequest {
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter_groups.push(FilterGroup { filters: vec![filter] });
        self
    }
}

// ---------------------------------------------------------------------------
// Associations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssociationCategory {
    HubspotDefined,
    UserDefined,
    IntegratorDefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSpec {
    pub association_category: AssociationCategory,
    pub association_type_id: u32,
}

impl AssociationSpec {
    pub fn new(category: AssociationCategory, type_id: u32) -> Self {
        Self {
            association_category: category,
            association_type_id: type_id,
        }
    }
}

/// A labelled association type between two object types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationLabel {
    pub category: AssociationCategory,
    pub type_id: u32,
    #[serde(default)]
    pub label: Option<String>,
}

/// The link created between two records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationResult {
    pub from_object_type_id: String,
    #[serde(deserialize_with = "id_string")]
    pub from_object_id: String,
    pub to_object_type_id: String,
    #[serde(deserialize_with = "id_string")]
    pub to_object_id: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A record on the other side of an association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatedObject {
    #[serde(deserialize_with = "id_string")]
    pub to_object_id: String,
    #[serde(default)]
    pub association_types: Vec<AssociationLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationBatchItem {
    pub from: ObjectId,
    pub to: ObjectId,
    pub types: Vec<AssociationSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationArchiveItem {
    pub from: ObjectId,
    pub to: Vec<ObjectId>,
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListProcessingType {
    Manual,
    Dynamic,
    Snapshot,
}

/// A list (segment) of records. Filter branches are kept as raw JSON trees;
/// the server owns their schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmList {
    pub list_id: String,
    pub name: String,
    pub object_type_id: String,
    pub processing_type: ListProcessingType,
    #[serde(default)]
    pub processing_status: Option<String>,
    #[serde(default)]
    pub list_version: u32,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(default)]
    pub filters_updated_at: Option<String>,
    #[serde(default)]
    pub created_by_id: Option<String>,
    #[serde(default)]
    pub updated_by_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_branch: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateList {
    pub name: String,
    pub object_type_id: String,
    pub processing_type: ListProcessingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_branch: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_folder_id: Option<u64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_properties: HashMap<String, String>,
}

impl CreateList {
    pub fn new(
        name: impl Into<String>,
        object_type_id: impl Into<String>,
        processing_type: ListProcessingType,
    ) -> Self {
        Self {
            name: name.into(),
            object_type_id: object_type_id.into(),
            processing_type,
            filter_branch: None,
            list_folder_id: None,
            custom_properties: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSearchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processing_types: Vec<ListProcessingType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSearchResponse {
    #[serde(default)]
    pub lists: Vec<CrmList>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub offset: u64,
}

/// A list a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMembership {
    #[serde(deserialize_with = "id_string")]
    pub list_id: String,
    #[serde(default)]
    pub list_version: u32,
    #[serde(default)]
    pub first_added_timestamp: Option<String>,
    #[serde(default)]
    pub last_added_timestamp: Option<String>,
    #[serde(default)]
    pub is_public_list: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMemberships {
    #[serde(default)]
    pub results: Vec<RecordMembership>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Outcome of adding or removing records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    #[serde(default)]
    pub record_ids_added: Vec<String>,
    #[serde(default)]
    pub record_ids_removed: Vec<String>,
    /// Ids the server did not recognise.
    #[serde(default)]
    pub record_ids_missing: Vec<String>,
}

/// One page of list members, paged by `offset`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMemberships {
    #[serde(default)]
    pub results: Vec<String>,
    #[serde(default)]
    pub has_more: Option<bool>,
    #[serde(default)]
    pub offset: Option<String>,
}

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaLabels {
    pub singular: String,
    pub plural: String,
}

impl SchemaLabels {
    pub fn new(singular: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            singular: singular.into(),
            plural: plural.into(),
        }
    }
}

/// A custom object schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Schema {
    pub id: String,
    pub name: String,
    pub object_type_id: String,
    pub fully_qualified_name: String,
    pub labels: SchemaLabels,
    pub description: Option<String>,
    pub primary_display_property: Option<String>,
    pub secondary_display_properties: Vec<String>,
    pub required_properties: Vec<String>,
    pub searchable_properties: Vec<String>,
    pub properties: Vec<PropertyDefinition>,
    pub associations: Vec<SchemaAssociation>,
    pub archived: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub portal_id: Option<u64>,
}

/// A property as defined on a schema, used both in schema reads and as
/// input when creating one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<PropertyOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub has_unique_value: bool,
    #[serde(default)]
    pub hubspot_defined: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_display_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_sensitivity: Option<String>,
}

impl PropertyDefinition {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        kind: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: kind.into(),
            field_type: field_type.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyOption {
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An association definition between a schema and another object type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAssociation {
    pub id: String,
    pub from_object_type_id: String,
    pub to_object_type_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSchema {
    pub name: String,
    pub labels: SchemaLabels,
    pub required_properties: Vec<String>,
    pub properties: Vec<PropertyDefinition>,
    pub associated_objects: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_display_properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub searchable_properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_display_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSchemaAssociation {
    pub from_object_type_id: String,
    pub to_object_type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Partial schema update. Omitted fields stay unchanged on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<SchemaLabels>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_properties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub searchable_properties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_display_properties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_display_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear_description: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restorable: Option<bool>,
}
