use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aws_config::{timeout::TimeoutConfig, BehaviorVersion};
use dotenvy::dotenv;
use tokio::io::AsyncReadExt;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use logforward::bulk_dispatch::BulkDispatcher;
use logforward::config::Config;
use logforward::hit_counter::{build_hit_counter, hit_handler, InMemoryStore};
use logforward::pipeline::IngestPipeline;
use logforward::query::get_api_call_logs;
use logforward::request_log::RequestLogLayer;
use logforward::sigv4::{Credentials, RequestSigner};
use logforward::subscription::{SubscriptionEvent, SubscriptionManager};
use logforward::types::{ApiRequest, ApiResponse, IngestInput};

const USAGE: &str = "usage: logforward <ingest | subscribe | query <userId> [pageNo] | hit>";

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_default();
    let cfg_path = std::env::var("LOGFORWARD_CONFIG").ok().map(PathBuf::from);
    let cfg = Config::load(cfg_path)?;
    info!(
        "starting logforward {} region={} index_prefix={}",
        command, cfg.region, cfg.index_prefix
    );

    let request_log = RequestLogLayer::new();
    match command.as_str() {
        "ingest" => run_ingest(&cfg).await,
        "subscribe" => run_subscribe(&cfg).await,
        "query" => run_query(&cfg, &request_log, args.next(), args.next()).await,
        "hit" => run_hit(&cfg, &request_log).await,
        _ => anyhow::bail!(USAGE),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::DEBUG)
        .init();
}

async fn read_stdin() -> Result<String> {
    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("reading event from stdin")?;
    Ok(raw)
}

async fn run_ingest(cfg: &Config) -> Result<()> {
    let input: IngestInput =
        serde_json::from_str(&read_stdin().await?).context("parsing ingestion event")?;
    let dispatch_cfg = cfg.bulk_dispatch()?;
    let credentials = Credentials::from_env()?;
    let signer = RequestSigner::for_host(credentials, &dispatch_cfg.host)?
        .debug_transcripts(cfg.signing_debug);
    let pipeline = IngestPipeline::new(
        cfg.index_prefix.clone(),
        BulkDispatcher::new(dispatch_cfg, signer)?,
    );

    match pipeline.handle(&input).await {
        Ok(outcome) => {
            info!("ingestion finished: {:?}", outcome);
            Ok(())
        }
        Err(err) => {
            error!("ingestion failed: {err:#}");
            Err(err)
        }
    }
}

async fn create_aws_config(cfg: &Config) -> aws_config::SdkConfig {
    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(10))
        .operation_timeout(cfg.http_timeout())
        .build();

    aws_config::defaults(BehaviorVersion::latest())
        .region(aws_sdk_cloudwatchlogs::config::Region::new(
            cfg.region.to_string(),
        ))
        .timeout_config(timeout_config)
        .load()
        .await
}

async fn run_subscribe(cfg: &Config) -> Result<()> {
    let event: SubscriptionEvent =
        serde_json::from_str(&read_stdin().await?).context("parsing subscription event")?;
    let aws_cfg = create_aws_config(cfg).await;
    let client = Arc::new(aws_sdk_cloudwatchlogs::Client::new(&aws_cfg));
    let destination = cfg.log_processor_arn.clone().unwrap_or_else(|| Arc::from(""));
    let manager = SubscriptionManager::new(client, destination)
        .with_excluded(cfg.exclude_log_groups.iter().map(|g| g.to_string()));

    let report = manager.handle_event(&event).await;
    for (group, err) in &report.failed {
        error!("log group {group}: {err}");
    }
    Ok(())
}

async fn run_query(
    cfg: &Config,
    request_log: &RequestLogLayer,
    user_id: Option<String>,
    page_no: Option<String>,
) -> Result<()> {
    let mut params = BTreeMap::new();
    if let Some(user_id) = user_id {
        params.insert("userId".to_string(), user_id);
    }
    if let Some(page_no) = page_no {
        params.insert("pageNo".to_string(), page_no);
    }
    let request = ApiRequest {
        query_string_parameters: Some(params),
        ..Default::default()
    };
    let query_cfg = cfg.query();
    let response = request_log
        .wrap(request, |req, _logger| async move {
            Ok(get_api_call_logs(&query_cfg, &req).await)
        })
        .await?;
    print_response(&response);
    Ok(())
}

async fn run_hit(cfg: &Config, request_log: &RequestLogLayer) -> Result<()> {
    let counter = build_hit_counter(cfg.hit_counter_backend, Arc::new(InMemoryStore::default()));
    let response = request_log
        .wrap(ApiRequest::default(), |_req, logger| async move {
            logger.log("hit counter invoked");
            hit_handler(counter.as_ref()).await
        })
        .await?;
    print_response(&response);
    Ok(())
}

fn print_response(response: &ApiResponse) {
    println!("{}", response.status_code);
    println!("{}", response.body);
}
