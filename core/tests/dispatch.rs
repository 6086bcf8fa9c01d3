//! Dispatch behaviour driven through a scripted transport.
//!
//! # Design
//! `ScriptedTransport` replays canned responses in order and records every
//! request it sees, so retry, cancellation, rate limiting and error mapping
//! can be checked without a server. Tests that wait run on paused tokio time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crm_core::{
    ApiError, BatchInput, CallContext, ClientConfig, CreateObject, CrmClient, HttpMethod,
    HttpRequest, HttpResponse, RateLimit, RequestOption, RetryPolicy, Transport, TransportError,
};
use serde_json::json;

#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    seen: Mutex<Vec<HttpRequest>>,
    /// Never answer; used to test cancellation of an in-flight exchange.
    hang: bool,
}

impl ScriptedTransport {
    fn new(replies: impl IntoIterator<Item = Result<HttpResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        })
    }

    fn hanging() -> Arc<Self> {
        Arc::new(Self {
            hang: true,
            ..Self::default()
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.lock().unwrap().push(request);
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
    }
}

fn ok(body: serde_json::Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(200, body.to_string()))
}

fn status(code: u16, body: serde_json::Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(code, body.to_string()))
}

fn contact(id: &str) -> serde_json::Value {
    json!({"id": id, "properties": {"email": format!("{id}@example.com")}, "archived": false})
}

fn client_with(transport: Arc<ScriptedTransport>, config: ClientConfig) -> CrmClient {
    CrmClient::with_transport(config, transport).unwrap()
}

fn config() -> ClientConfig {
    ClientConfig::new("https://crm.test").with_access_token("pat-abc")
}

fn retrying() -> ClientConfig {
    let policy =
        RetryPolicy::new(2).with_backoff(Duration::from_millis(100), Duration::from_secs(1));
    config().with_retry(policy)
}

// --- request shape ---

#[tokio::test]
async fn read_sends_options_and_auth() {
    let transport = ScriptedTransport::new([ok(contact("42"))]);
    let client = client_with(transport.clone(), config());

    let obj = client
        .objects("contacts")
        .read(
            &CallContext::background(),
            "42",
            &[RequestOption::properties(["email", "phone"]), RequestOption::archived()],
        )
        .await
        .unwrap();
    assert_eq!(obj.id, "42");

    let sent = &transport.requests()[0];
    assert_eq!(sent.method, HttpMethod::Get);
    assert!(sent.url.starts_with("https://crm.test/crm/v3/objects/contacts/42?"));
    assert!(sent.url.contains("properties=email%2Cphone"), "{}", sent.url);
    assert!(sent.url.contains("archived=true"));
    assert!(sent
        .headers
        .contains(&("authorization".to_string(), "Bearer pat-abc".to_string())));
    assert!(sent.body.is_none());
}

#[tokio::test]
async fn create_posts_json_body() {
    let transport = ScriptedTransport::new([status(201, contact("7"))]);
    let client = client_with(transport.clone(), config());

    client
        .objects("contacts")
        .create(&CallContext::background(), &CreateObject::new([("email", "7@example.com")]))
        .await
        .unwrap();

    let sent = &transport.requests()[0];
    assert_eq!(sent.method, HttpMethod::Post);
    let body: serde_json::Value = serde_json::from_slice(sent.body.as_deref().unwrap()).unwrap();
    assert_eq!(body["properties"]["email"], "7@example.com");
    assert!(sent
        .headers
        .contains(&("content-type".to_string(), "application/json".to_string())));
}

// --- retry ---

#[tokio::test(start_paused = true)]
async fn get_retries_transient_statuses() {
    let transport = ScriptedTransport::new([
        status(429, json!({"category": "RATE_LIMITS", "message": "slow down"})),
        status(503, json!({"message": "unavailable"})),
        ok(contact("1")),
    ]);
    let client = client_with(transport.clone(), retrying());

    let obj = client
        .objects("contacts")
        .read(&CallContext::background(), "1", &[])
        .await
        .unwrap();
    assert_eq!(obj.id, "1");
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn retries_stop_at_the_policy_limit() {
    let transport = ScriptedTransport::new([
        status(503, json!({"message": "a"})),
        status(503, json!({"message": "b"})),
        status(503, json!({"message": "c"})),
        ok(contact("1")),
    ]);
    let client = client_with(transport.clone(), retrying());

    let err = client
        .objects("contacts")
        .read(&CallContext::background(), "1", &[])
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.original().unwrap().message, "c");
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn post_is_not_retried() {
    let transport = ScriptedTransport::new([
        status(503, json!({"message": "busy"})),
        status(201, contact("2")),
    ]);
    let client = client_with(transport.clone(), retrying());

    let err = client
        .objects("contacts")
        .create(&CallContext::background(), &CreateObject::new([("email", "x@example.com")]))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn search_post_is_retried() {
    let transport = ScriptedTransport::new([
        status(502, json!({"message": "bad gateway"})),
        ok(json!({"total": 0, "results": []})),
    ]);
    let client = client_with(transport.clone(), retrying());

    let page = client
        .objects("contacts")
        .search(&CallContext::background(), &Default::default())
        .await
        .unwrap();
    assert_eq!(page.total, Some(0));
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn connect_errors_are_retried() {
    let transport = ScriptedTransport::new([
        Err(TransportError::Connect("refused".into())),
        ok(contact("3")),
    ]);
    let client = client_with(transport.clone(), retrying());
    client
        .objects("contacts")
        .read(&CallContext::background(), "3", &[])
        .await
        .unwrap();
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn transport_error_without_retry_surfaces() {
    let transport = ScriptedTransport::new([Err(TransportError::Timeout)]);
    let client = client_with(transport, config());
    let err = client
        .objects("contacts")
        .read(&CallContext::background(), "3", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport(TransportError::Timeout)));
}

// --- cancellation and deadlines ---

#[tokio::test(start_paused = true)]
async fn deadline_interrupts_in_flight_call() {
    let client = client_with(ScriptedTransport::hanging(), config());
    let ctx = CallContext::background().with_timeout(Duration::from_secs(2));
    let err = client.objects("contacts").read(&ctx, "1", &[]).await.unwrap_err();
    assert!(matches!(err, ApiError::DeadlineExceeded));
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_in_flight_call() {
    let client = client_with(ScriptedTransport::hanging(), config());
    let (ctx, canceller) = CallContext::background().with_cancel();

    let task = tokio::spawn(async move { client.objects("contacts").read(&ctx, "1", &[]).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    canceller.cancel();
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, ApiError::Cancelled));
}

#[tokio::test]
async fn cancelled_context_sends_nothing() {
    let transport = ScriptedTransport::new([ok(contact("1"))]);
    let client = client_with(transport.clone(), config());
    let (ctx, canceller) = CallContext::background().with_cancel();
    canceller.cancel();

    let err = client.objects("contacts").read(&ctx, "1", &[]).await.unwrap_err();
    assert!(matches!(err, ApiError::Cancelled));
    assert!(transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_cuts_retry_backoff_short() {
    let transport =
        ScriptedTransport::new([status(503, json!({"message": "busy"})), ok(contact("1"))]);
    let policy =
        RetryPolicy::new(3).with_backoff(Duration::from_secs(30), Duration::from_secs(30));
    let config = config().with_retry(policy);
    let client = client_with(transport.clone(), config);
    let ctx = CallContext::background().with_timeout(Duration::from_secs(1));

    let err = client.objects("contacts").read(&ctx, "1", &[]).await.unwrap_err();
    assert!(matches!(err, ApiError::DeadlineExceeded));
    assert_eq!(transport.requests().len(), 1);
}

// --- rate limiting ---

#[tokio::test(start_paused = true)]
async fn rate_limit_spaces_out_calls() {
    let replies = (0..3).map(|n| ok(contact(&n.to_string())));
    let transport = ScriptedTransport::new(replies);
    let client = client_with(
        transport.clone(),
        config().with_rate_limit(RateLimit::new(2, Duration::from_secs(10))),
    );
    let ctx = CallContext::background();
    let start = tokio::time::Instant::now();

    for id in ["0", "1"] {
        client.objects("contacts").read(&ctx, id, &[]).await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(1));

    client.objects("contacts").read(&ctx, "2", &[]).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(4), "waited {:?}", start.elapsed());
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_wait_honours_deadline() {
    let transport = ScriptedTransport::new([ok(contact("0")), ok(contact("1"))]);
    let client = client_with(
        transport.clone(),
        config().with_rate_limit(RateLimit::new(1, Duration::from_secs(60))),
    );
    client
        .objects("contacts")
        .read(&CallContext::background(), "0", &[])
        .await
        .unwrap();

    let ctx = CallContext::background().with_timeout(Duration::from_secs(1));
    let err = client.objects("contacts").read(&ctx, "1", &[]).await.unwrap_err();
    assert!(matches!(err, ApiError::DeadlineExceeded));
    assert_eq!(transport.requests().len(), 1);
}

// --- error mapping ---

#[tokio::test]
async fn not_found_carries_identifier_and_original() {
    let transport = ScriptedTransport::new([status(
        404,
        json!({
            "status": "error",
            "message": "Object not found",
            "correlationId": "c0ffee",
            "category": "OBJECT_NOT_FOUND"
        }),
    )]);
    let client = client_with(transport, config());
    let err = client
        .deals()
        .read(&CallContext::background(), "555", &[])
        .await
        .unwrap_err();
    match err {
        ApiError::NotFound {
            resource_type,
            identifier,
            original,
        } => {
            assert_eq!(resource_type, "deals");
            assert_eq!(identifier, "555");
            assert_eq!(original.correlation_id.as_deref(), Some("c0ffee"));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn unclassified_server_error_is_kept_verbatim() {
    let transport = ScriptedTransport::new([status(
        403,
        json!({
            "message": "missing scopes",
            "category": "MISSING_SCOPES",
            "subCategory": "crm.objects.contacts.read",
            "context": {"requiredScopes": ["crm.objects.contacts.read"]}
        }),
    )]);
    let client = client_with(transport, config());
    let err = client
        .objects("contacts")
        .list(&CallContext::background(), &[])
        .await
        .unwrap_err();
    match err {
        ApiError::Server(original) => {
            assert_eq!(original.status, 403);
            assert_eq!(original.category, "MISSING_SCOPES");
            assert_eq!(original.sub_category.as_deref(), Some("crm.objects.contacts.read"));
            assert_eq!(
                original.context["requiredScopes"],
                vec!["crm.objects.contacts.read".to_string()]
            );
        }
        other => panic!("expected Server, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_error_body_becomes_message() {
    let transport =
        ScriptedTransport::new([Ok(HttpResponse::new(502, "<html>Bad Gateway</html>"))]);
    let client = client_with(transport, config());
    let err = client
        .objects("contacts")
        .list(&CallContext::background(), &[])
        .await
        .unwrap_err();
    let original = err.original().unwrap();
    assert_eq!(original.status, 502);
    assert_eq!(original.message, "<html>Bad Gateway</html>");
}

#[tokio::test]
async fn malformed_success_body_names_the_call() {
    let transport = ScriptedTransport::new([Ok(HttpResponse::new(200, "{\"results\": 5}"))]);
    let client = client_with(transport, config());
    let err = client
        .objects("contacts")
        .list(&CallContext::background(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Parse { call: "objects.list", .. }));
    assert!(err.to_string().contains("objects.list"));
}

// --- empty results ---

#[tokio::test]
async fn empty_object_listing_is_not_an_error() {
    let transport = ScriptedTransport::new([ok(json!({"results": []}))]);
    let client = client_with(transport, config());
    let page = client
        .objects("contacts")
        .list(&CallContext::background(), &[])
        .await
        .unwrap();
    assert!(page.results.is_empty());
}

#[tokio::test]
async fn empty_schema_listing_is_no_results() {
    let transport = ScriptedTransport::new([ok(json!({"results": []}))]);
    let client = client_with(transport, config());
    let err = client
        .schemas()
        .get_all(&CallContext::background(), &[])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no schemas found");
    match err {
        ApiError::NoResults { resource, response } => {
            assert_eq!(resource, "schemas");
            assert_eq!(response, json!({"results": []}));
        }
        other => panic!("expected NoResults, got {other:?}"),
    }
}

// --- batches ---

#[tokio::test]
async fn batch_partial_keeps_successes_and_failures() {
    let transport = ScriptedTransport::new([status(
        207,
        json!({
            "status": "COMPLETE",
            "results": [contact("10")],
            "numErrors": 1,
            "errors": [{
                "status": "error",
                "category": "VALIDATION_ERROR",
                "message": "Property values were not valid",
                "context": {"propertyName": ["email"]}
            }],
            "startedAt": "2024-01-01T00:00:00Z",
            "completedAt": "2024-01-01T00:00:01Z"
        }),
    )]);
    let client = client_with(transport, config());
    let input: BatchInput<CreateObject> = ["10@example.com", "broken"]
        .into_iter()
        .map(|email| CreateObject::new([("email", email)]))
        .collect();

    let err = client
        .objects("contacts")
        .batch_create(&CallContext::background(), &input)
        .await
        .unwrap_err();
    let partial = err.batch().expect("partial batch");
    assert_eq!(partial.num_errors(), 1);
    assert_eq!(partial.errors()[0].context["propertyName"], vec!["email".to_string()]);
    let created: Vec<crm_core::CrmObject> = partial.results().unwrap();
    assert_eq!(created[0].id, "10");
}

#[tokio::test]
async fn batch_archive_accepts_no_content() {
    let transport = ScriptedTransport::new([Ok(HttpResponse::new(204, ""))]);
    let client = client_with(transport, config());
    let input: BatchInput<crm_core::ObjectId> =
        ["1", "2"].into_iter().map(crm_core::ObjectId::new).collect();
    let result = client
        .objects("contacts")
        .batch_archive(&CallContext::background(), &input)
        .await
        .unwrap();
    assert!(!result.has_errors());
    assert!(result.results.is_empty());
}

#[tokio::test]
async fn blank_batch_create_response_is_a_parse_error() {
    let transport = ScriptedTransport::new([Ok(HttpResponse::new(200, ""))]);
    let client = client_with(transport, config());
    let input: BatchInput<CreateObject> = ["a@example.com", "b@example.com"]
        .into_iter()
        .map(|email| CreateObject::new([("email", email)]))
        .collect();
    let err = client
        .objects("contacts")
        .batch_create(&CallContext::background(), &input)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ApiError::Parse { call: "objects.batch_create", .. }),
        "{err:?}"
    );
}

// --- lists ---

#[tokio::test]
async fn get_many_repeats_list_ids() {
    let transport = ScriptedTransport::new([ok(json!({"lists": []}))]);
    let client = client_with(transport.clone(), config());
    let lists = client
        .lists()
        .get_many(
            &CallContext::background(),
            &["11", "12"],
            &[RequestOption::include_filters(true)],
        )
        .await
        .unwrap();
    assert!(lists.is_empty());

    let url = &transport.requests()[0].url;
    assert!(url.contains("listIds=11&listIds=12"), "{url}");
    assert!(url.contains("includeFilters=true"), "{url}");
}

// --- associations ---

#[tokio::test]
async fn association_labels_come_from_results() {
    let transport = ScriptedTransport::new([ok(json!({
        "results": [
            {"category": "HUBSPOT_DEFINED", "typeId": 279, "label": null},
            {"category": "USER_DEFINED", "typeId": 7, "label": "Billing contact"}
        ]
    }))]);
    let client = client_with(transport.clone(), config());
    let labels = client
        .associations()
        .labels(&CallContext::background(), "contacts", "companies")
        .await
        .unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[1].label.as_deref(), Some("Billing contact"));
    assert!(transport.requests()[0]
        .url
        .ends_with("/crm/v4/associations/contacts/companies/labels"));
}

#[tokio::test]
async fn association_batch_create_decodes_numeric_ids() {
    let transport = ScriptedTransport::new([status(
        201,
        json!({
            "status": "COMPLETE",
            "results": [{
                "fromObjectTypeId": "0-1",
                "fromObjectId": 101,
                "toObjectTypeId": "0-2",
                "toObjectId": 202,
                "labels": []
            }]
        }),
    )]);
    let client = client_with(transport, config());
    let item = crm_core::AssociationBatchItem {
        from: crm_core::ObjectId::new("101"),
        to: crm_core::ObjectId::new("202"),
        types: vec![crm_core::AssociationSpec::new(
            crm_core::AssociationCategory::HubspotDefined,
            1,
        )],
    };
    let result = client
        .associations()
        .batch_create(
            &CallContext::background(),
            "contacts",
            "companies",
            &BatchInput::new(vec![item]),
        )
        .await
        .unwrap();
    assert_eq!(result.results[0].from_object_id, "101");
    assert_eq!(result.results[0].to_object_id, "202");
}

#[tokio::test]
async fn association_batch_archive_surfaces_item_failures() {
    let transport = ScriptedTransport::new([status(
        207,
        json!({
            "status": "COMPLETE",
            "results": [],
            "numErrors": 1,
            "errors": [{"status": "error", "category": "OBJECT_NOT_FOUND", "message": "no such link"}]
        }),
    )]);
    let client = client_with(transport, config());
    let item = crm_core::AssociationArchiveItem {
        from: crm_core::ObjectId::new("1"),
        to: vec![crm_core::ObjectId::new("2")],
    };
    let err = client
        .associations()
        .batch_archive(
            &CallContext::background(),
            "contacts",
            "companies",
            &BatchInput::new(vec![item]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.batch().unwrap().errors()[0].to_string(), "no such link");
}
