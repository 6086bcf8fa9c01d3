use crate::client::CrmClient;
use crate::context::CallContext;
use crate::envelope::{self, Page};
use crate::error::{classify, ApiError};
use crate::http::Request;
use crate::options::RequestOption;
use crate::types::{CreateSchema, CreateSchemaAssociation, Schema, SchemaAssociation, UpdateSchema};

const RESOURCE: &str = "schema";
const BASE: &str = "/crm-object-schemas/v3/schemas";

/// Custom object schemas.
#[derive(Debug, Clone)]
pub struct Schemas<'a> {
    client: &'a CrmClient,
}

impl<'a> Schemas<'a> {
    pub(crate) fn new(client: &'a CrmClient) -> Self {
        Self { client }
    }

    /// Every schema in the account. Unlike ordinary listings, an empty
    /// result is an error: [`ApiError::NoResults`] ("no schemas found"),
    /// carrying the empty envelope.
    pub async fn get_all(
        &self,
        ctx: &CallContext,
        options: &[RequestOption],
    ) -> Result<Vec<Schema>, ApiError> {
        let request = Request::get(BASE).with_resource_type(RESOURCE).with_options(options);
        let page: Page<Schema> = self
            .client
            .send(ctx, request, "schemas.get_all")
            .await
            .map_err(|e| classify(e, RESOURCE, ""))?;
        envelope::require_results("schemas", &page)?;
        Ok(page.results)
    }

    pub async fn get(&self, ctx: &CallContext, object_type: &str) -> Result<Schema, ApiError> {
        let request = Request::get(format!("{BASE}/{object_type}")).with_resource_type(RESOURCE);
        self.client
            .send(ctx, request, "schemas.get")
            .await
            .map_err(|e| classify(e, RESOURCE, object_type))
    }

    pub async fn create(
        &self,
        ctx: &CallContext,
        input: &CreateSchema,
    ) -> Result<Schema, ApiError> {
        let request = Request::post(BASE).with_resource_type(RESOURCE).with_body(input)?;
        self.client
            .send(ctx, request, "schemas.create")
            .await
            .map_err(|e| classify(e, RESOURCE, &input.name))
    }

    pub async fn create_association(
        &self,
        ctx: &CallContext,
        object_type: &str,
        input: &CreateSchemaAssociation,
    ) -> Result<SchemaAssociation, ApiError> {
        let request = Request::post(format!("{BASE}/{object_type}/associations"))
            .with_resource_type(RESOURCE)
            .with_body(input)?;
        self.client
            .send(ctx, request, "schemas.create_association")
            .await
            .map_err(|e| classify(e, RESOURCE, object_type))
    }

    pub async fn update(
        &self,
        ctx: &CallContext,
        object_type: &str,
        input: &UpdateSchema,
    ) -> Result<Schema, ApiError> {
        let request = Request::patch(format!("{BASE}/{object_type}"))
            .with_resource_type(RESOURCE)
            .with_body(input)?;
        self.client
            .send(ctx, request, "schemas.update")
            .await
            .map_err(|e| classify(e, RESOURCE, object_type))
    }

    /// Delete a schema. With [`RequestOption::archived`] a previously
    /// archived schema is removed for good.
    pub async fn delete(
        &self,
        ctx: &CallContext,
        object_type: &str,
        options: &[RequestOption],
    ) -> Result<(), ApiError> {
        let request = Request::delete(format!("{BASE}/{object_type}"))
            .with_resource_type(RESOURCE)
            .with_options(options);
        self.client
            .send_empty(ctx, request)
            .await
            .map_err(|e| classify(e, RESOURCE, object_type))
    }

    pub async fn remove_association(
        &self,
        ctx: &CallContext,
        object_type: &str,
        association_id: &str,
    ) -> Result<(), ApiError> {
        let request = Request::delete(format!("{BASE}/{object_type}/associations/{association_id}"))
            .with_resource_type(RESOURCE);
        self.client
            .send_empty(ctx, request)
            .await
            .map_err(|e| classify(e, RESOURCE, association_id))
    }
}
