//! Idempotent wiring of log groups into the ingestion entry point.
//!
//! A log group counts as subscribed when it has at least one subscription filter,
//! whatever that filter points at. The manager only ever adds a filter to a group
//! that has none; it never edits or removes existing filters.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::Client as CwClient;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::naming::subscription_filter_name;

pub const SUBSCRIBE_ALL_ACTION: &str = "subscribeAllLogGroups";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub log_group: String,
    pub filter_name: String,
    pub filter_pattern: String,
    pub destination_arn: String,
}

#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    async fn list_log_groups(&self) -> Result<Vec<String>>;
    async fn subscription_filter_count(&self, log_group: &str) -> Result<usize>;
    async fn create_subscription_filter(&self, filter: &FilterSpec) -> Result<()>;
}

#[async_trait]
impl SubscriptionApi for CwClient {
    async fn list_log_groups(&self) -> Result<Vec<String>> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut req = self.describe_log_groups();
            if let Some(token) = &next_token {
                req = req.next_token(token);
            }
            let resp = req.send().await.context("describe_log_groups")?;
            if let Some(page) = resp.log_groups {
                groups.extend(page.into_iter().filter_map(|g| g.log_group_name));
            }
            next_token = resp.next_token;
            if next_token.is_none() {
                break;
            }
        }
        Ok(groups)
    }

    async fn subscription_filter_count(&self, log_group: &str) -> Result<usize> {
        let resp = self
            .describe_subscription_filters()
            .log_group_name(log_group)
            .send()
            .await
            .context("describe_subscription_filters")?;
        Ok(resp.subscription_filters.map(|f| f.len()).unwrap_or(0))
    }

    async fn create_subscription_filter(&self, filter: &FilterSpec) -> Result<()> {
        self.put_subscription_filter()
            .log_group_name(&filter.log_group)
            .filter_name(&filter.filter_name)
            .filter_pattern(&filter.filter_pattern)
            .destination_arn(&filter.destination_arn)
            .send()
            .await
            .context("put_subscription_filter")?;
        Ok(())
    }
}

/// Invocation payload of the subscription entry point.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    pub log_group_name: Option<String>,
    pub action: Option<String>,
    pub detail: Option<EventDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    pub request_parameters: Option<RequestParameters>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameters {
    pub log_group_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionRequest {
    Single(String),
    All,
}

impl SubscriptionEvent {
    /// Creation notifications carry the group under `detail.requestParameters`.
    pub fn request(&self) -> Option<SubscriptionRequest> {
        if self.action.as_deref() == Some(SUBSCRIBE_ALL_ACTION) {
            return Some(SubscriptionRequest::All);
        }
        self.detail
            .as_ref()
            .and_then(|d| d.request_parameters.as_ref())
            .and_then(|p| p.log_group_name.clone())
            .or_else(|| self.log_group_name.clone())
            .filter(|name| !name.trim().is_empty())
            .map(SubscriptionRequest::Single)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    Created,
    AlreadySubscribed,
}

#[derive(Debug, Default)]
pub struct SubscriptionReport {
    pub created: Vec<String>,
    pub already_subscribed: Vec<String>,
    pub excluded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl SubscriptionReport {
    fn record(&mut self, log_group: String, result: Result<SubscriptionOutcome>) {
        match result {
            Ok(SubscriptionOutcome::Created) => self.created.push(log_group),
            Ok(SubscriptionOutcome::AlreadySubscribed) => self.already_subscribed.push(log_group),
            Err(err) => self.failed.push((log_group, format!("{err:#}"))),
        }
    }
}

pub struct SubscriptionManager<A> {
    api: Arc<A>,
    destination_arn: Arc<str>,
    excluded: Arc<HashSet<String>>,
}

impl<A> Clone for SubscriptionManager<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            destination_arn: self.destination_arn.clone(),
            excluded: self.excluded.clone(),
        }
    }
}

impl<A: SubscriptionApi + 'static> SubscriptionManager<A> {
    pub fn new(api: Arc<A>, destination_arn: impl Into<Arc<str>>) -> Self {
        Self {
            api,
            destination_arn: destination_arn.into(),
            excluded: Arc::new(HashSet::new()),
        }
    }

    /// Groups never subscribed in bulk mode, such as the processor's own log group.
    pub fn with_excluded<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded = Arc::new(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter_for(&self, log_group: &str) -> FilterSpec {
        FilterSpec {
            log_group: log_group.to_string(),
            filter_name: subscription_filter_name(log_group),
            filter_pattern: String::new(),
            destination_arn: self.destination_arn.to_string(),
        }
    }

    pub async fn ensure_subscribed(&self, log_group: &str) -> Result<SubscriptionOutcome> {
        let existing = self
            .api
            .subscription_filter_count(log_group)
            .await
            .with_context(|| format!("listing subscription filters for {log_group}"))?;
        if existing > 0 {
            info!("log group {log_group} already has {existing} subscription(s); skipping");
            return Ok(SubscriptionOutcome::AlreadySubscribed);
        }
        self.api
            .create_subscription_filter(&self.filter_for(log_group))
            .await
            .with_context(|| format!("creating subscription filter for {log_group}"))?;
        info!("subscription filter created for log group {log_group}");
        Ok(SubscriptionOutcome::Created)
    }

    /// Reconcile every known log group concurrently. Per-group failures are collected
    /// in the report; only a failed enumeration is an error.
    pub async fn subscribe_all(&self) -> Result<SubscriptionReport> {
        let groups = self.api.list_log_groups().await.context("enumerating log groups")?;
        info!("reconciling subscriptions for {} log groups", groups.len());

        let mut report = SubscriptionReport::default();
        let mut handles = FuturesUnordered::new();
        for group in groups {
            if self.excluded.contains(&group) {
                report.excluded.push(group);
                continue;
            }
            let manager = self.clone();
            let task_group = group.clone();
            let handle =
                tokio::spawn(async move { manager.ensure_subscribed(&task_group).await });
            // The group travels with its handle so a panicked task is still reported.
            handles.push(async move { (group, handle.await) });
        }

        while let Some((group, joined)) = handles.next().await {
            let result = joined
                .map_err(|err| anyhow::anyhow!("subscription task failed: {err}"))
                .and_then(|r| r);
            if let Err(err) = &result {
                warn!("subscription for {group} failed: {err:#}");
            }
            report.record(group, result);
        }
        info!(
            "subscription pass: created={} existing={} excluded={} failed={}",
            report.created.len(),
            report.already_subscribed.len(),
            report.excluded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Entry point for a subscription invocation. Nothing is raised to the caller;
    /// outcomes are logged and returned.
    pub async fn handle_event(&self, event: &SubscriptionEvent) -> SubscriptionReport {
        let mut report = SubscriptionReport::default();
        if self.destination_arn.trim().is_empty() {
            error!("log processor destination ARN is not configured");
            return report;
        }
        match event.request() {
            Some(SubscriptionRequest::All) => match self.subscribe_all().await {
                Ok(r) => report = r,
                Err(err) => error!("bulk subscription failed: {err:#}"),
            },
            Some(SubscriptionRequest::Single(group)) => {
                let result = self.ensure_subscribed(&group).await;
                if let Err(err) = &result {
                    error!("subscription for {group} failed: {err:#}");
                }
                report.record(group, result);
            }
            None => error!("subscription event carries no log group name"),
        }
        report
    }
}
