//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port in its own thread and
//! drives it through the real reqwest transport, so request building, the
//! dispatch loop and envelope parsing are exercised against actual HTTP.
//! Every test gets a fresh server, so state never leaks between them.

use std::net::SocketAddr;

use crm_core::{
    ApiError, AssociationCategory, AssociationSpec, BatchInput, BatchReadInput, CallContext,
    ClientConfig, CreateList, CreateObject, CreateSchema, CrmClient, Filter, FilterOperator,
    ListProcessingType, PropertyDefinition, RequestOption, SchemaLabels, SearchRequest,
    UpdateObject, UpdateSchema,
};

fn spawn_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

fn client() -> CrmClient {
    let addr = spawn_server();
    let config = ClientConfig::new(format!("http://{addr}")).with_access_token("pat-test");
    CrmClient::new(config).unwrap()
}

async fn create_contact(client: &CrmClient, ctx: &CallContext, email: &str) -> String {
    client
        .objects("contacts")
        .create(ctx, &CreateObject::new([("email", email)]))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn object_lifecycle() {
    let client = client();
    let ctx = CallContext::background();
    let contacts = client.objects("contacts");

    let page = contacts.list(&ctx, &[]).await.unwrap();
    assert!(page.results.is_empty(), "a fresh server has no contacts");
    assert!(page.is_last());

    let created = contacts
        .create(&ctx, &CreateObject::new([("email", "ada@example.com"), ("firstname", "Ada")]))
        .await
        .unwrap();
    assert_eq!(created.property("email"), Some("ada@example.com"));

    let read = contacts
        .read(&ctx, &created.id, &[RequestOption::properties(["email", "phone"])])
        .await
        .unwrap();
    assert_eq!(read.property("email"), Some("ada@example.com"));
    assert_eq!(read.property("phone"), None);

    let by_email = contacts
        .read(&ctx, "ada@example.com", &[RequestOption::id_property("email")])
        .await
        .unwrap();
    assert_eq!(by_email.id, created.id);

    let updated = contacts
        .update(&ctx, &created.id, &UpdateObject::new([("firstname", "Augusta")]), &[])
        .await
        .unwrap();
    assert_eq!(updated.property("firstname"), Some("Augusta"));

    contacts.archive(&ctx, &created.id).await.unwrap();
    let err = contacts.read(&ctx, &created.id, &[]).await.unwrap_err();
    match err {
        ApiError::NotFound {
            resource_type,
            identifier,
            original,
        } => {
            assert_eq!(resource_type, "contacts");
            assert_eq!(identifier, created.id);
            assert_eq!(original.status, 404);
            assert!(original.correlation_id.is_some());
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn validation_error_names_the_field() {
    let client = client();
    let ctx = CallContext::background();
    let err = client
        .objects("contacts")
        .create(&ctx, &CreateObject::new([("email", "not-an-email")]))
        .await
        .unwrap_err();
    match err {
        ApiError::Validation { field, original, .. } => {
            assert_eq!(field, "email");
            assert_eq!(original.status, 400);
        }
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn paging_walks_every_record() {
    let client = client();
    let ctx = CallContext::background();
    for n in 0..5 {
        create_contact(&client, &ctx, &format!("user{n}@example.com")).await;
    }

    let contacts = client.objects("contacts");
    let mut seen = Vec::new();
    let mut options = vec![RequestOption::limit(2)];
    loop {
        let page = contacts.list(&ctx, &options).await.unwrap();
        seen.extend(page.results.iter().map(|o| o.id.clone()));
        match page.next_after() {
            Some(after) => options = vec![RequestOption::limit(2), RequestOption::after(after)],
            None => break,
        }
    }
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn search_finds_matching_record() {
    let client = client();
    let ctx = CallContext::background();
    create_contact(&client, &ctx, "a@example.com").await;
    let wanted = create_contact(&client, &ctx, "b@example.com").await;

    let search = SearchRequest::default().with_filter(Filter::new(
        "email",
        FilterOperator::Eq,
        "b@example.com",
    ));
    let page = client.objects("contacts").search(&ctx, &search).await.unwrap();
    assert_eq!(page.total, Some(1));
    assert_eq!(page.results[0].id, wanted);
}

#[tokio::test]
async fn batch_read_with_missing_id_is_partial() {
    let client = client();
    let ctx = CallContext::background();
    let id = create_contact(&client, &ctx, "x@example.com").await;

    let input = BatchReadInput::new([id.as_str(), "424242"]).with_properties(["email"]);
    let err = client.objects("contacts").batch_read(&ctx, &input).await.unwrap_err();
    let partial = err.batch().expect("batch partial error");
    assert_eq!(partial.num_errors(), 1);
    assert_eq!(partial.errors()[0].category, "OBJECT_NOT_FOUND");
    let found: Vec<crm_core::CrmObject> = partial.results().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);
}

#[tokio::test]
async fn batch_create_all_valid_succeeds() {
    let client = client();
    let ctx = CallContext::background();
    let input: BatchInput<CreateObject> = ["one@example.com", "two@example.com"]
        .into_iter()
        .map(|email| CreateObject::new([("email", email)]))
        .collect();
    let result = client.objects("contacts").batch_create(&ctx, &input).await.unwrap();
    assert!(!result.has_errors());
    assert_eq!(result.results.len(), 2);
}

#[tokio::test]
async fn associations_round_trip() {
    let client = client();
    let ctx = CallContext::background();
    let contact = create_contact(&client, &ctx, "c@example.com").await;
    let company = client
        .companies()
        .create(&ctx, &CreateObject::new([("name", "Acme")]))
        .await
        .unwrap()
        .id;

    let spec = AssociationSpec::new(AssociationCategory::HubspotDefined, 1);
    let link = client
        .associations()
        .create(&ctx, "contacts", &contact, "companies", &company, &[spec])
        .await
        .unwrap();
    assert_eq!(link.from_object_id, contact);
    assert_eq!(link.to_object_id, company);

    let page = client
        .associations()
        .list(&ctx, "contacts", &contact, "companies", &[])
        .await
        .unwrap();
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].to_object_id, company);
    assert_eq!(page.results[0].association_types[0].type_id, 1);

    client
        .associations()
        .remove(&ctx, "contacts", &contact, "companies", &company)
        .await
        .unwrap();
    let page = client
        .associations()
        .list(&ctx, "contacts", &contact, "companies", &[])
        .await
        .unwrap();
    assert!(page.results.is_empty());
}

#[tokio::test]
async fn list_lifecycle() {
    let client = client();
    let ctx = CallContext::background();
    let lists = client.lists();
    let contact = create_contact(&client, &ctx, "m@example.com").await;

    let list = lists
        .create(&ctx, &CreateList::new("Newsletter", "0-1", ListProcessingType::Manual))
        .await
        .unwrap();
    assert_eq!(list.name, "Newsletter");

    let err = lists
        .create(&ctx, &CreateList::new("Newsletter", "0-1", ListProcessingType::Manual))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::AlreadyExists { ref identifier, .. } if identifier == "Newsletter"
    ));

    let by_name = lists.get_by_name(&ctx, "0-1", "Newsletter", &[]).await.unwrap();
    assert_eq!(by_name.list_id, list.list_id);

    let many = lists.get_many(&ctx, &[list.list_id.as_str(), "999999"], &[]).await.unwrap();
    assert_eq!(many.len(), 1);

    let renamed = lists.update_name(&ctx, &list.list_id, "Weekly", false).await.unwrap();
    assert_eq!(renamed.name, "Weekly");
    assert!(renamed.list_version > list.list_version);

    let change = lists.add_records(&ctx, &list.list_id, &[contact.as_str()]).await.unwrap();
    assert_eq!(change.record_ids_added, vec![contact.clone()]);

    let members = lists.memberships(&ctx, &list.list_id, &[]).await.unwrap();
    assert_eq!(members.results, vec![contact.clone()]);

    let memberships = lists.record_memberships(&ctx, "0-1", &contact).await.unwrap();
    assert_eq!(memberships.results[0].list_id, list.list_id);

    let change = lists.remove_records(&ctx, &list.list_id, &[contact.as_str()]).await.unwrap();
    assert_eq!(change.record_ids_removed, vec![contact.clone()]);

    lists.delete(&ctx, &list.list_id).await.unwrap();
    assert!(lists.get(&ctx, &list.list_id, &[]).await.unwrap_err().is_not_found());
    lists.restore(&ctx, &list.list_id).await.unwrap();
    lists.get(&ctx, &list.list_id, &[]).await.unwrap();
}

#[tokio::test]
async fn record_memberships_for_unknown_record_names_the_record() {
    let client = client();
    let ctx = CallContext::background();
    let err = client.lists().record_memberships(&ctx, "0-1", "777").await.unwrap_err();
    match err {
        ApiError::NotFound {
            resource_type,
            identifier,
            ..
        } => {
            assert_eq!(resource_type, "record");
            assert_eq!(identifier, "777");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn schema_lifecycle() {
    let client = client();
    let ctx = CallContext::background();
    let schemas = client.schemas();

    let err = schemas.get_all(&ctx, &[]).await.unwrap_err();
    assert!(matches!(err, ApiError::NoResults { resource: "schemas", .. }));

    let input = CreateSchema {
        name: "pets".into(),
        labels: SchemaLabels::new("Pet", "Pets"),
        required_properties: vec!["pet_name".into()],
        properties: vec![PropertyDefinition::new("pet_name", "Name", "string", "text")],
        associated_objects: vec!["CONTACT".into()],
        primary_display_property: Some("pet_name".into()),
        ..CreateSchema::default()
    };
    let schema = schemas.create(&ctx, &input).await.unwrap();
    assert_eq!(schema.name, "pets");
    assert_eq!(schema.properties[0].name, "pet_name");

    let all = schemas.get_all(&ctx, &[]).await.unwrap();
    assert_eq!(all.len(), 1);

    let update = UpdateSchema {
        description: Some("Household animals".into()),
        ..UpdateSchema::default()
    };
    let updated = schemas.update(&ctx, &schema.object_type_id, &update).await.unwrap();
    assert_eq!(updated.description.as_deref(), Some("Household animals"));

    let err = schemas.create(&ctx, &input).await.unwrap_err();
    assert!(matches!(err, ApiError::AlreadyExists { .. }));

    schemas.delete(&ctx, &schema.object_type_id, &[]).await.unwrap();
    schemas
        .delete(&ctx, &schema.object_type_id, &[RequestOption::archived()])
        .await
        .unwrap();
    let err = schemas.get(&ctx, &schema.object_type_id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = CrmClient::new(ClientConfig::new(format!("http://{addr}"))).unwrap();
    let err = client
        .objects("contacts")
        .list(&CallContext::background(), &[])
        .await
        .unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
}
