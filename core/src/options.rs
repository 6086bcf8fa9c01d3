//! Per-call query options.
//!
//! Options are plain values applied to a [`Request`] in the order the caller
//! passes them. Each one writes a single query key, so a later option for the
//! same key replaces an earlier one. No option performs I/O.

use crate::http::Request;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOption {
    /// `properties` = comma-joined names.
    Properties(Vec<String>),
    /// `propertiesWithHistory` = comma-joined names.
    PropertiesWithHistory(Vec<String>),
    /// `associations` = comma-joined object types.
    Associations(Vec<String>),
    /// `limit` = page size.
    Limit(u32),
    /// `after` = paging cursor.
    After(String),
    /// `archived=true`. There is no "false" form; omit the option instead.
    Archived,
    /// `idProperty` = unique property used in place of the record id.
    IdProperty(String),
    /// `includeFilters=true` when set; `false` writes nothing.
    IncludeFilters(bool),
    /// `offset` = list-membership paging offset.
    Offset(String),
}

impl RequestOption {
    pub fn properties<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequestOption::Properties(names.into_iter().map(Into::into).collect())
    }

    pub fn properties_with_history<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequestOption::PropertiesWithHistory(names.into_iter().map(Into::into).collect())
    }

    pub fn associations<I, S>(object_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequestOption::Associations(object_types.into_iter().map(Into::into).collect())
    }

    pub fn limit(limit: u32) -> Self {
        RequestOption::Limit(limit)
    }

    pub fn after(cursor: impl Into<String>) -> Self {
        RequestOption::After(cursor.into())
    }

    pub fn archived() -> Self {
        RequestOption::Archived
    }

    pub fn id_property(name: impl Into<String>) -> Self {
        RequestOption::IdProperty(name.into())
    }

    pub fn include_filters(include: bool) -> Self {
        RequestOption::IncludeFilters(include)
    }

    pub fn offset(offset: impl Into<String>) -> Self {
        RequestOption::Offset(offset.into())
    }

    pub fn apply(&self, req: &mut Request) {
        match self {
            RequestOption::Properties(names) => req.add_query_param("properties", names.join(",")),
            RequestOption::PropertiesWithHistory(names) => {
                req.add_query_param("propertiesWithHistory", names.join(","))
            }
            RequestOption::Associations(types) => {
                req.add_query_param("associations", types.join(","))
            }
            RequestOption::Limit(limit) => req.add_query_param("limit", limit.to_string()),
            RequestOption::After(cursor) => req.add_query_param("after", cursor.as_str()),
            RequestOption::Archived => req.add_query_param("archived", "true"),
            RequestOption::IdProperty(name) => req.add_query_param("idProperty", name.as_str()),
            RequestOption::IncludeFilters(true) => req.add_query_param("includeFilters", "true"),
            RequestOption::IncludeFilters(false) => {}
            RequestOption::Offset(offset) => req.add_query_param("offset", offset.as_str()),
        }
    }
}
