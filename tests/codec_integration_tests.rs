mod common;

use common::{connector, get_operation, pet_catalog, query_request, server};
use indexmap::IndexMap;
use prism_connector::codec::compression::{compress, ContentEncoding};
use prism_connector::config::models::Configuration;
use prism_connector::connector::models::{MutationOperation, MutationRequest};
use prism_connector::schema::models::{
    ArgumentInfo, ParameterLocation, RequestBodyInfo, RequestParameter, Type,
};
use serde_json::json;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn gzip_encoded_responses_are_inflated_before_decoding() {
    let payload = json!({"name": "Rex"});
    let compressed = compress(
        ContentEncoding::Gzip,
        serde_json::to_vec(&payload).unwrap().as_slice(),
    )
    .unwrap();

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pet"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .insert_header("content-type", "application/json")
                .set_body_bytes(compressed),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let catalog = pet_catalog(vec![server("server-1", &mock_server.uri())]);
    let connector = connector(Configuration::default(), catalog);

    let response = connector
        .query(query_request("findPets", &[]), CancellationToken::new())
        .await
        .unwrap();
    let row = &response[0].rows.as_ref().unwrap()[0];
    assert_eq!(row["__value"], payload);
}

#[tokio::test]
async fn mismatched_content_encoding_surfaces_a_decode_error() {
    let payload = json!({"name": "Rex"});
    // zlib body under a gzip header
    let compressed = compress(
        ContentEncoding::Deflate,
        serde_json::to_vec(&payload).unwrap().as_slice(),
    )
    .unwrap();

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pet"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(compressed),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let catalog = pet_catalog(vec![server("server-1", &mock_server.uri())]);
    let connector = connector(Configuration::default(), catalog);

    let err = connector
        .query(query_request("findPets", &[]), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn json_bodies_are_posted_with_the_declared_content_type() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pet"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"name": "Rex"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "name": "Rex"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut catalog = pet_catalog(vec![server("server-1", &mock_server.uri())]);
    let mut add_pet = get_operation("/pet", Type::named("JSON"));
    add_pet.request.method = "post".into();
    add_pet.request.request_body = Some(RequestBodyInfo {
        content_type: "application/json".into(),
        encoding: IndexMap::new(),
    });
    add_pet.arguments.insert(
        "body".to_string(),
        ArgumentInfo {
            argument_type: Type::named("Pet"),
            description: None,
            http: RequestParameter {
                name: "body".into(),
                location: ParameterLocation::Body,
                schema: None,
                encoding: None,
            },
        },
    );
    catalog.procedures.insert("addPet".into(), add_pet);
    let connector = connector(Configuration::default(), catalog);

    let mut arguments = BTreeMap::new();
    arguments.insert("body".to_string(), json!({"name": "Rex"}));
    let response = connector
        .mutation(MutationRequest {
            operations: vec![MutationOperation {
                name: "addPet".into(),
                arguments,
                fields: None,
            }],
        }, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        response.operation_results[0].result,
        json!({"id": 1, "name": "Rex"})
    );
}

#[tokio::test]
async fn xml_responses_decode_into_the_declared_type() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pet"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<Pet><name>Rex</name></Pet>", "application/xml"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut catalog = pet_catalog(vec![server("server-1", &mock_server.uri())]);
    if let Some(op) = catalog.functions.get_mut("findPets") {
        op.result_type = Type::named("Pet");
        op.request.response.content_type = "application/xml".into();
    }
    let connector = connector(Configuration::default(), catalog);

    let response = connector
        .query(query_request("findPets", &[]), CancellationToken::new())
        .await
        .unwrap();
    let row = &response[0].rows.as_ref().unwrap()[0];
    assert_eq!(row["__value"], json!({"name": "Rex"}));
}
