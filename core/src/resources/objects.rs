use crate::batch::BatchResult;
use crate::client::CrmClient;
use crate::context::CallContext;
use crate::envelope::Page;
use crate::error::{classify, ApiError};
use crate::http::{HttpMethod, Request};
use crate::options::RequestOption;
use crate::types::{
    BatchInput, BatchReadInput, BatchUpdateItem, CreateObject, CrmObject, MergeInput, ObjectId,
    SearchRequest, UpdateObject,
};

/// CRUD, search and batch calls for one object type under
/// `/crm/v3/objects/{type}`.
#[derive(Debug, Clone)]
pub struct Objects<'a> {
    client: &'a CrmClient,
    object_type: String,
}

impl<'a> Objects<'a> {
    pub(crate) fn new(client: &'a CrmClient, object_type: String) -> Self {
        Self { client, object_type }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    fn request(&self, method: HttpMethod, suffix: &str) -> Request {
        Request::new(method, format!("/crm/v3/objects/{}{suffix}", self.object_type))
            .with_resource_type(self.object_type.as_str())
    }

    fn classify(&self, identifier: &str) -> impl FnOnce(ApiError) -> ApiError + '_ {
        let identifier = identifier.to_string();
        move |err| classify(err, &self.object_type, &identifier)
    }

    /// One page of records. An empty page is a normal result.
    pub async fn list(
        &self,
        ctx: &CallContext,
        options: &[RequestOption],
    ) -> Result<Page<CrmObject>, ApiError> {
        let request = self.request(HttpMethod::Get, "").with_options(options);
        self.client
            .send(ctx, request, "objects.list")
            .await
            .map_err(self.classify(""))
    }

    pub async fn create(
        &self,
        ctx: &CallContext,
        input: &CreateObject,
    ) -> Result<CrmObject, ApiError> {
        let request = self.request(HttpMethod::Post, "").with_body(input)?;
        self.client
            .send(ctx, request, "objects.create")
            .await
            .map_err(self.classify(""))
    }

    pub async fn read(
        &self,
        ctx: &CallContext,
        id: &str,
        options: &[RequestOption],
    ) -> Result<CrmObject, ApiError> {
        let request = self.request(HttpMethod::Get, &format!("/{id}")).with_options(options);
        self.client
            .send(ctx, request, "objects.read")
            .await
            .map_err(self.classify(id))
    }

    /// Partial update. Pass [`RequestOption::id_property`] to address the
    /// record by a unique property instead of its id.
    pub async fn update(
        &self,
        ctx: &CallContext,
        id: &str,
        input: &UpdateObject,
        options: &[RequestOption],
    ) -> Result<CrmObject, ApiError> {
        let request = self
            .request(HttpMethod::Patch, &format!("/{id}"))
            .with_options(options)
            .with_body(input)?;
        self.client
            .send(ctx, request, "objects.update")
            .await
            .map_err(self.classify(id))
    }

    pub async fn archive(&self, ctx: &CallContext, id: &str) -> Result<(), ApiError> {
        let request = self.request(HttpMethod::Delete, &format!("/{id}"));
        self.client.send_empty(ctx, request).await.map_err(self.classify(id))
    }

    pub async fn merge(
        &self,
        ctx: &CallContext,
        input: &MergeInput,
    ) -> Result<CrmObject, ApiError> {
        let request = self.request(HttpMethod::Post, "/merge").with_body(input)?;
        self.client
            .send(ctx, request, "objects.merge")
            .await
            .map_err(self.classify(&input.object_id_to_merge))
    }

    /// Filtered search. The returned page carries `total`.
    pub async fn search(
        &self,
        ctx: &CallContext,
        search: &SearchRequest,
    ) -> Result<Page<CrmObject>, ApiError> {
        let request = self.request(HttpMethod::Post, "/search").with_body(search)?.idempotent();
        self.client
            .send(ctx, request, "objects.search")
            .await
            .map_err(self.classify(""))
    }

    pub async fn batch_read(
        &self,
        ctx: &CallContext,
        input: &BatchReadInput,
    ) -> Result<BatchResult<CrmObject>, ApiError> {
        let request = self.request(HttpMethod::Post, "/batch/read").with_body(input)?.idempotent();
        self.send_batch(ctx, request, "objects.batch_read").await
    }

    pub async fn batch_create(
        &self,
        ctx: &CallContext,
        input: &BatchInput<CreateObject>,
    ) -> Result<BatchResult<CrmObject>, ApiError> {
        let request = self.request(HttpMethod::Post, "/batch/create").with_body(input)?;
        self.send_batch(ctx, request, "objects.batch_create").await
    }

    pub async fn batch_update(
        &self,
        ctx: &CallContext,
        input: &BatchInput<BatchUpdateItem>,
    ) -> Result<BatchResult<CrmObject>, ApiError> {
        let request = self.request(HttpMethod::Post, "/batch/update").with_body(input)?;
        self.send_batch(ctx, request, "objects.batch_update").await
    }

    /// Create or update by unique property; each item needs `id_property`.
    pub async fn batch_upsert(
        &self,
        ctx: &CallContext,
        input: &BatchInput<BatchUpdateItem>,
    ) -> Result<BatchResult<CrmObject>, ApiError> {
        let request = self.request(HttpMethod::Post, "/batch/upsert").with_body(input)?;
        self.send_batch(ctx, request, "objects.batch_upsert").await
    }

    /// The server answers 204 on full success, which yields a complete
    /// result with no items.
    pub async fn batch_archive(
        &self,
        ctx: &CallContext,
        input: &BatchInput<ObjectId>,
    ) -> Result<BatchResult<CrmObject>, ApiError> {
        let request = self.request(HttpMethod::Post, "/batch/archive").with_body(input)?;
        self.send_batch(ctx, request, "objects.batch_archive").await
    }

    async fn send_batch(
        &self,
        ctx: &CallContext,
        request: Request,
        call: &'static str,
    ) -> Result<BatchResult<CrmObject>, ApiError> {
        self.client
            .send_batch(ctx, request, call)
            .await
            .map_err(self.classify(""))
    }
}
