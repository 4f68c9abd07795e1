//! Tests for the API call log query handler.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{basic_auth, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use logforward::query::{
    get_api_call_logs, search_body, QueryConfig, ERROR_MISSING_PAGE_NO, ERROR_MISSING_USER_ID,
    ERROR_PROCESSING_REQUEST, ERROR_SEARCH_CREDENTIALS,
};
use logforward::types::ApiRequest;

const SEARCH_PATH: &str = "/cwl-*/_search";

fn config(search_url: Option<String>) -> QueryConfig {
    QueryConfig {
        search_url,
        username: Some("reader".to_string()),
        password: Some("hunter2".to_string()),
        page_size: 10,
        timeout: Duration::from_secs(5),
    }
}

fn request(params: &[(&str, &str)]) -> ApiRequest {
    let params: BTreeMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ApiRequest {
        query_string_parameters: Some(params),
        ..Default::default()
    }
}

fn body_of(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

#[test]
fn test_search_body_pages() {
    let body = search_body("alice", 3, 10);
    assert_eq!(body["from"], 20);
    assert_eq!(body["size"], 10);
    assert_eq!(
        body["query"]["bool"]["must"],
        json!([
            { "match_phrase": { "@message": "endpointUrl" } },
            { "match_phrase": { "@message": "userId: alice" } }
        ])
    );
    assert_eq!(body["sort"], json!([{ "@timestamp": { "order": "desc" } }]));
    assert_eq!(search_body("alice", 1, 25)["from"], 0);
}

#[tokio::test]
async fn test_missing_user_id_is_bad_request() {
    let cfg = config(None);
    for req in [
        request(&[("pageNo", "1")]),
        request(&[("userId", ""), ("pageNo", "1")]),
        ApiRequest::default(),
    ] {
        let resp = get_api_call_logs(&cfg, &req).await;
        assert_eq!(resp.status_code, 400);
        assert_eq!(body_of(&resp.body), json!(ERROR_MISSING_USER_ID));
    }
}

#[tokio::test]
async fn test_missing_or_invalid_page_is_bad_request() {
    let cfg = config(None);
    for params in [
        vec![("userId", "alice")],
        vec![("userId", "alice"), ("pageNo", "0")],
        vec![("userId", "alice"), ("pageNo", "two")],
        vec![("userId", "alice"), ("pageNo", "-1")],
    ] {
        let resp = get_api_call_logs(&cfg, &request(&params)).await;
        assert_eq!(resp.status_code, 400);
        assert_eq!(body_of(&resp.body), json!(ERROR_MISSING_PAGE_NO));
    }
}

#[tokio::test]
async fn test_missing_credentials_is_server_error() {
    let mut cfg = config(Some("http://127.0.0.1:1/_search".to_string()));
    cfg.password = None;
    let resp = get_api_call_logs(&cfg, &request(&[("userId", "alice"), ("pageNo", "1")])).await;
    assert_eq!(resp.status_code, 500);
    assert_eq!(body_of(&resp.body), json!(ERROR_SEARCH_CREDENTIALS));
}

#[tokio::test]
async fn test_returns_parsed_records() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(basic_auth("reader", "hunter2"))
        .and(body_partial_json(json!({ "from": 10, "size": 10 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": {
                "hits": [
                    { "_source": { "@message": " userId: alice ,  Response: { requestId: 'r1', method: 'GET', status: 200, responseBody: { statusCode: 200, body: '{\"x\":1}' } }" } },
                    { "_source": { "@message": "START RequestId: r2" } },
                    { "_source": {} }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(Some(format!("{}{}", server.uri(), SEARCH_PATH)));
    let resp = get_api_call_logs(&cfg, &request(&[("userId", "alice"), ("pageNo", "2")])).await;
    assert_eq!(resp.status_code, 200);

    let records = body_of(&resp.body);
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["requestId"], "r1");
    assert_eq!(records[0]["method"], "GET");
    assert_eq!(records[0]["status"], 200);
    assert_eq!(records[0]["responseBody"], json!({ "x": 1 }));
    assert!(records[0]["requestBody"].is_null());
}

#[tokio::test]
async fn test_search_failure_is_generic_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let cfg = config(Some(format!("{}{}", server.uri(), SEARCH_PATH)));
    let resp = get_api_call_logs(&cfg, &request(&[("userId", "alice"), ("pageNo", "1")])).await;
    assert_eq!(resp.status_code, 500);
    assert_eq!(body_of(&resp.body), json!(ERROR_PROCESSING_REQUEST));
}

#[tokio::test]
async fn test_unconfigured_search_url_is_generic_server_error() {
    let resp = get_api_call_logs(
        &config(None),
        &request(&[("userId", "alice"), ("pageNo", "1")]),
    )
    .await;
    assert_eq!(resp.status_code, 500);
    assert_eq!(body_of(&resp.body), json!(ERROR_PROCESSING_REQUEST));
}
