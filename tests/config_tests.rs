//! Tests for config file loading.

use std::fs;

use tempfile::tempdir;

use logforward::config::Config;
use logforward::hit_counter::HitCounterBackend;

#[test]
fn test_load_from_toml_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
region = "eu-west-1"
index_prefix = "app"
opensearch_host = "search-logs-abc123.eu-west-1.es.amazonaws.com"
opensearch_endpoint = "http://localhost:9200"
log_processor_arn = "arn:aws:lambda:eu-west-1:123456789012:function:log-processor"
exclude_log_groups = ["/aws/lambda/log-processor", "  ", "/aws/lambda/subscriber"]
page_size = 25
hit_counter_backend = "stub"
"#,
    )
    .unwrap();

    let cfg = Config::load(Some(path)).unwrap();
    assert_eq!(
        cfg.log_processor_arn.as_deref(),
        Some("arn:aws:lambda:eu-west-1:123456789012:function:log-processor")
    );
    let excluded: Vec<&str> = cfg.exclude_log_groups.iter().map(|g| &**g).collect();
    assert_eq!(excluded, vec!["/aws/lambda/log-processor", "/aws/lambda/subscriber"]);
    assert_eq!(cfg.page_size, 25);
    assert_eq!(cfg.hit_counter_backend, HitCounterBackend::Stub);

    let bulk = cfg.bulk_dispatch().unwrap();
    assert_eq!(bulk.endpoint.as_deref(), Some("http://localhost:9200"));
    assert_eq!(bulk.timeout, cfg.http_timeout());

    let query = cfg.query();
    assert_eq!(query.page_size, 25);
}

#[test]
fn test_file_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "region = \"us-east-1\"\n").unwrap();

    let cfg = Config::load(Some(path)).unwrap();
    assert!(!cfg.index_prefix.is_empty());
    assert!(cfg.http_timeout_secs > 0);
    assert!(cfg.page_size > 0);
}

#[test]
fn test_zero_page_size_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "region = \"us-east-1\"\npage_size = 0\n").unwrap();
    assert!(Config::load(Some(path)).is_err());
}

#[test]
fn test_unknown_backend_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "region = \"us-east-1\"\nhit_counter_backend = \"orm\"\n").unwrap();
    assert!(Config::load(Some(path)).is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = Config::load(Some(dir.path().join("absent.toml"))).unwrap_err();
    assert!(format!("{err:#}").contains("reading config"));
}
