use crate::batch::BatchResult;
use crate::client::CrmClient;
use crate::context::CallContext;
use crate::envelope::Page;
use crate::error::{classify, ApiError};
use crate::http::Request;
use crate::options::RequestOption;
use crate::types::{
    AssociatedObject, AssociationArchiveItem, AssociationBatchItem, AssociationLabel,
    AssociationResult, AssociationSpec, BatchInput,
};

const RESOURCE: &str = "association";

/// Record-to-record links (v4 associations API).
#[derive(Debug, Clone)]
pub struct Associations<'a> {
    client: &'a CrmClient,
}

fn link_path(from_type: &str, from_id: &str, to_type: &str) -> String {
    format!("/crm/v4/objects/{from_type}/{from_id}/associations/{to_type}")
}

fn link_id(from_id: &str, to_id: &str) -> String {
    format!("{from_id}->{to_id}")
}

impl<'a> Associations<'a> {
    pub(crate) fn new(client: &'a CrmClient) -> Self {
        Self { client }
    }

    /// Link two records with the given association types. PUT, so repeating
    /// it is safe.
    pub async fn create(
        &self,
        ctx: &CallContext,
        from_type: &str,
        from_id: &str,
        to_type: &str,
        to_id: &str,
        specs: &[AssociationSpec],
    ) -> Result<AssociationResult, ApiError> {
        let request = Request::put(format!("{}/{to_id}", link_path(from_type, from_id, to_type)))
            .with_resource_type(RESOURCE)
            .with_body(specs)?;
        self.client
            .send(ctx, request, "associations.create")
            .await
            .map_err(|e| classify(e, RESOURCE, &link_id(from_id, to_id)))
    }

    /// Remove every association between two records.
    pub async fn remove(
        &self,
        ctx: &CallContext,
        from_type: &str,
        from_id: &str,
        to_type: &str,
        to_id: &str,
    ) -> Result<(), ApiError> {
        let request = Request::delete(format!("{}/{to_id}", link_path(from_type, from_id, to_type)))
            .with_resource_type(RESOURCE);
        self.client
            .send_empty(ctx, request)
            .await
            .map_err(|e| classify(e, RESOURCE, &link_id(from_id, to_id)))
    }

    /// Records of `to_type` linked to one record. Honours `limit`/`after`.
    pub async fn list(
        &self,
        ctx: &CallContext,
        from_type: &str,
        from_id: &str,
        to_type: &str,
        options: &[RequestOption],
    ) -> Result<Page<AssociatedObject>, ApiError> {
        let request = Request::get(link_path(from_type, from_id, to_type))
            .with_resource_type(RESOURCE)
            .with_options(options);
        self.client
            .send(ctx, request, "associations.list")
            .await
            .map_err(|e| classify(e, from_type, from_id))
    }

    pub async fn batch_create(
        &self,
        ctx: &CallContext,
        from_type: &str,
        to_type: &str,
        input: &BatchInput<AssociationBatchItem>,
    ) -> Result<BatchResult<AssociationResult>, ApiError> {
        let path = format!("/crm/v4/associations/{from_type}/{to_type}/batch/create");
        let request = Request::post(path)
            .with_resource_type(RESOURCE)
            .with_body(input)?;
        self.client
            .send_batch(ctx, request, "associations.batch_create")
            .await
            .map_err(|e| classify(e, RESOURCE, ""))
    }

    /// Item failures still surface as [`ApiError::BatchPartial`].
    pub async fn batch_archive(
        &self,
        ctx: &CallContext,
        from_type: &str,
        to_type: &str,
        input: &BatchInput<AssociationArchiveItem>,
    ) -> Result<(), ApiError> {
        let path = format!("/crm/v4/associations/{from_type}/{to_type}/batch/archive");
        let request = Request::post(path)
            .with_resource_type(RESOURCE)
            .with_body(input)?;
        self.client
            .send_batch::<serde_json::Value>(ctx, request, "associations.batch_archive")
            .await
            .map(|_| ())
            .map_err(|e| classify(e, RESOURCE, ""))
    }

    /// Association types defined between two object types.
    pub async fn labels(
        &self,
        ctx: &CallContext,
        from_type: &str,
        to_type: &str,
    ) -> Result<Vec<AssociationLabel>, ApiError> {
        let request = Request::get(format!("/crm/v4/associations/{from_type}/{to_type}/labels"))
            .with_resource_type(RESOURCE);
        let page: Page<AssociationLabel> = self
            .client
            .send(ctx, request, "associations.labels")
            .await
            .map_err(|e| classify(e, RESOURCE, &format!("{from_type}->{to_type}")))?;
        Ok(page.results)
    }
}
