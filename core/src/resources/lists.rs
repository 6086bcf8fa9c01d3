use serde::{Deserialize, Serialize};

use crate::client::CrmClient;
use crate::context::CallContext;
use crate::error::{classify, ApiError};
use crate::http::Request;
use crate::options::RequestOption;
use crate::types::{
    CreateList, CrmList, ListMemberships, ListSearchRequest, ListSearchResponse, MembershipChange,
    RecordMemberships,
};

const RESOURCE: &str = "list";
const BASE: &str = "/crm/v3/lists";

/// Single lists come back wrapped as `{"list": {...}}`.
#[derive(Deserialize)]
struct ListEnvelope {
    list: CrmList,
}

#[derive(Deserialize)]
struct ListsEnvelope {
    #[serde(default)]
    lists: Vec<CrmList>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateFilters<'a> {
    filter_branch: &'a serde_json::Value,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    include_filters: bool,
}

/// Lists (segments) and their memberships.
#[derive(Debug, Clone)]
pub struct Lists<'a> {
    client: &'a CrmClient,
}

impl<'a> Lists<'a> {
    pub(crate) fn new(client: &'a CrmClient) -> Self {
        Self { client }
    }

    async fn send_list(
        &self,
        ctx: &CallContext,
        request: Request,
        call: &'static str,
        identifier: &str,
    ) -> Result<CrmList, ApiError> {
        let envelope: ListEnvelope = self
            .client
            .send(ctx, request.with_resource_type(RESOURCE), call)
            .await
            .map_err(|e| classify(e, RESOURCE, identifier))?;
        Ok(envelope.list)
    }

    async fn send_empty(
        &self,
        ctx: &CallContext,
        request: Request,
        identifier: &str,
    ) -> Result<(), ApiError> {
        self.client
            .send_empty(ctx, request.with_resource_type(RESOURCE))
            .await
            .map_err(|e| classify(e, RESOURCE, identifier))
    }

    pub async fn get(
        &self,
        ctx: &CallContext,
        list_id: &str,
        options: &[RequestOption],
    ) -> Result<CrmList, ApiError> {
        let request = Request::get(format!("{BASE}/{list_id}")).with_options(options);
        self.send_list(ctx, request, "lists.get", list_id).await
    }

    pub async fn get_by_name(
        &self,
        ctx: &CallContext,
        object_type_id: &str,
        name: &str,
        options: &[RequestOption],
    ) -> Result<CrmList, ApiError> {
        let path = format!("{BASE}/object-type-id/{object_type_id}/name/{name}");
        let request = Request::get(path).with_options(options);
        self.send_list(ctx, request, "lists.get_by_name", name).await
    }

    pub async fn create(&self, ctx: &CallContext, input: &CreateList) -> Result<CrmList, ApiError> {
        let request = Request::post(BASE).with_body(input)?;
        self.send_list(ctx, request, "lists.create", &input.name).await
    }

    /// Fetch several lists at once. Unknown ids are left out of the result.
    pub async fn get_many<S: AsRef<str>>(
        &self,
        ctx: &CallContext,
        list_ids: &[S],
        options: &[RequestOption],
    ) -> Result<Vec<CrmList>, ApiError> {
        let mut request = Request::get(BASE).with_resource_type(RESOURCE);
        request.set_query_values("listIds", list_ids.iter().map(|id| id.as_ref().to_string()));
        let envelope: ListsEnvelope = self
            .client
            .send(ctx, request.with_options(options), "lists.get_many")
            .await
            .map_err(|e| classify(e, RESOURCE, ""))?;
        Ok(envelope.lists)
    }

    pub async fn search(
        &self,
        ctx: &CallContext,
        search: &ListSearchRequest,
    ) -> Result<ListSearchResponse, ApiError> {
        let request = Request::post(format!("{BASE}/search"))
            .with_resource_type(RESOURCE)
            .with_body(search)?
            .idempotent();
        self.client
            .send(ctx, request, "lists.search")
            .await
            .map_err(|e| classify(e, RESOURCE, ""))
    }

    pub async fn update_name(
        &self,
        ctx: &CallContext,
        list_id: &str,
        name: &str,
        include_filters: bool,
    ) -> Result<CrmList, ApiError> {
        let mut request = Request::put(format!("{BASE}/{list_id}/update-list-name"));
        request.add_query_param("listName", name);
        let request = request.with_options(&[RequestOption::include_filters(include_filters)]);
        self.send_list(ctx, request, "lists.update_name", list_id).await
    }

    /// Replace the filter tree of a dynamic list.
    pub async fn update_filters(
        &self,
        ctx: &CallContext,
        list_id: &str,
        filter_branch: &serde_json::Value,
        include_filters: bool,
    ) -> Result<CrmList, ApiError> {
        let body = UpdateFilters {
            filter_branch,
            include_filters,
        };
        let request =
            Request::put(format!("{BASE}/{list_id}/update-list-filters")).with_body(&body)?;
        self.send_list(ctx, request, "lists.update_filters", list_id).await
    }

    pub async fn delete(&self, ctx: &CallContext, list_id: &str) -> Result<(), ApiError> {
        self.send_empty(ctx, Request::delete(format!("{BASE}/{list_id}")), list_id)
            .await
    }

    /// Undo a delete.
    pub async fn restore(&self, ctx: &CallContext, list_id: &str) -> Result<(), ApiError> {
        self.send_empty(ctx, Request::put(format!("{BASE}/{list_id}/restore")), list_id)
            .await
    }

    /// Lists a single record belongs to. A 404 names the record, not a list.
    pub async fn record_memberships(
        &self,
        ctx: &CallContext,
        object_type_id: &str,
        record_id: &str,
    ) -> Result<RecordMemberships, ApiError> {
        let path = format!("{BASE}/records/{object_type_id}/{record_id}/memberships");
        let request = Request::get(path).with_resource_type(RESOURCE);
        self.client
            .send(ctx, request, "lists.record_memberships")
            .await
            .map_err(|e| classify(e, "record", record_id))
    }

    pub async fn add_records<S: AsRef<str>>(
        &self,
        ctx: &CallContext,
        list_id: &str,
        record_ids: &[S],
    ) -> Result<MembershipChange, ApiError> {
        self.change_membership(ctx, list_id, "add", record_ids, "lists.add_records")
            .await
    }

    pub async fn remove_records<S: AsRef<str>>(
        &self,
        ctx: &CallContext,
        list_id: &str,
        record_ids: &[S],
    ) -> Result<MembershipChange, ApiError> {
        self.change_membership(ctx, list_id, "remove", record_ids, "lists.remove_records")
            .await
    }

    async fn change_membership<S: AsRef<str>>(
        &self,
        ctx: &CallContext,
        list_id: &str,
        action: &str,
        record_ids: &[S],
        call: &'static str,
    ) -> Result<MembershipChange, ApiError> {
        let ids: Vec<&str> = record_ids.iter().map(|id| id.as_ref()).collect();
        let request = Request::put(format!("{BASE}/{list_id}/memberships/{action}"))
            .with_resource_type(RESOURCE)
            .with_body(&ids)?;
        self.client
            .send(ctx, request, call)
            .await
            .map_err(|e| classify(e, RESOURCE, list_id))
    }

    /// One page of member record ids. Page with `limit` and `offset`.
    pub async fn memberships(
        &self,
        ctx: &CallContext,
        list_id: &str,
        options: &[RequestOption],
    ) -> Result<ListMemberships, ApiError> {
        let request = Request::get(format!("{BASE}/{list_id}/memberships"))
            .with_resource_type(RESOURCE)
            .with_options(options);
        self.client
            .send(ctx, request, "lists.memberships")
            .await
            .map_err(|e| classify(e, RESOURCE, list_id))
    }

    pub async fn remove_all(&self, ctx: &CallContext, list_id: &str) -> Result<(), ApiError> {
        self.send_empty(ctx, Request::delete(format!("{BASE}/{list_id}/memberships")), list_id)
            .await
    }
}
