//! Tests for the ingestion pipeline.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use logforward::bulk_dispatch::{BulkDispatchConfig, BulkDispatcher, BulkFailure, BulkSummary};
use logforward::envelope::encode_envelope;
use logforward::pipeline::{IngestOutcome, IngestPipeline};
use logforward::sigv4::{Credentials, RequestSigner};
use logforward::types::{EncodedData, IngestInput, LogBatch, LogEvent, MessageType};

const HOST: &str = "search-logs-abc123.us-east-1.es.amazonaws.com";

fn pipeline(endpoint: &str) -> IngestPipeline {
    let creds = Credentials::new("AKIDEXAMPLE", "secret", Some("token".to_string()));
    let signer = RequestSigner::for_host(creds, HOST).unwrap();
    let dispatcher = BulkDispatcher::new(
        BulkDispatchConfig {
            host: HOST.to_string(),
            endpoint: Some(endpoint.to_string()),
            timeout: Duration::from_secs(5),
            log_failed_items: false,
        },
        signer,
    )
    .unwrap();
    IngestPipeline::new("cwl", dispatcher)
}

fn batch(message_type: MessageType, events: Vec<LogEvent>) -> LogBatch {
    LogBatch {
        message_type,
        owner: "123456789012".to_string(),
        log_group: "/aws/lambda/hello".to_string(),
        log_stream: "stream-1".to_string(),
        subscription_filters: Vec::new(),
        log_events: events,
    }
}

fn event(id: &str, message: &str) -> LogEvent {
    LogEvent {
        id: id.to_string(),
        timestamp: 1_733_220_000_000,
        message: message.to_string(),
        extracted_fields: None,
    }
}

fn input(batch: &LogBatch) -> IngestInput {
    IngestInput::AwsLogs {
        awslogs: EncodedData {
            data: encode_envelope(batch).unwrap(),
        },
    }
}

async fn bulk_server(status: u16, body: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_control_message_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let control = batch(MessageType::Control, vec![event("c1", "CWL CONTROL MESSAGE")]);
    let outcome = pipeline(&server.uri()).handle(&input(&control)).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Control);
}

#[tokio::test]
async fn test_empty_batch_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let empty = batch(MessageType::Data, Vec::new());
    let outcome = pipeline(&server.uri()).handle(&input(&empty)).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Empty);
}

#[tokio::test]
async fn test_data_batch_is_indexed() {
    let server = bulk_server(
        200,
        json!({
            "errors": false,
            "items": [
                { "index": { "_id": "e1", "status": 201 } },
                { "index": { "_id": "e2", "status": 201 } }
            ]
        }),
    )
    .await;

    let data = batch(
        MessageType::Data,
        vec![event("e1", "first"), event("e2", "second {\"level\":\"warn\"}")],
    );
    let outcome = pipeline(&server.uri()).handle(&input(&data)).await.unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::Indexed(BulkSummary {
            attempted: 2,
            successful: 2,
            failed: 0
        })
    );

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let lines: Vec<Value> = body
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["index"]["_index"], "cwl-2024-12-03");
    assert_eq!(lines[0]["index"]["_id"], "e1");
    assert_eq!(lines[1]["@message"], "first");
    assert_eq!(lines[2]["index"]["_id"], "e2");
    assert_eq!(lines[3]["level"], "warn");
    assert_eq!(lines[3]["@log_group"], "/aws/lambda/hello");
    assert!(body.ends_with('\n'));
}

#[tokio::test]
async fn test_bad_data_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let bad = IngestInput::Direct(EncodedData {
        data: "not base64 at all!".to_string(),
    });
    let err = pipeline(&server.uri()).handle(&bad).await.unwrap_err();
    assert!(format!("{err:#}").contains("decoding log delivery"));
}

#[tokio::test]
async fn test_rejected_bulk_request_is_an_error() {
    let server = bulk_server(400, json!({ "error": "bad request" })).await;

    let data = batch(MessageType::Data, vec![event("e1", "first")]);
    let err = pipeline(&server.uri()).handle(&input(&data)).await.unwrap_err();
    let failure = err.downcast_ref::<BulkFailure>().unwrap();
    assert_eq!(failure.status_code, Some(400));
    assert_eq!(failure.response_body, json!({ "error": "bad request" }));
}

#[tokio::test]
async fn test_success_status_without_items_is_an_error() {
    let server = bulk_server(200, json!({})).await;

    let data = batch(MessageType::Data, vec![event("e1", "first")]);
    let err = pipeline(&server.uri()).handle(&input(&data)).await.unwrap_err();
    let failure = err.downcast_ref::<BulkFailure>().unwrap();
    assert_eq!(failure.status_code, Some(200));
}
