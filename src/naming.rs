use chrono::{DateTime, Utc};

/// Daily index name `<prefix>-YYYY-MM-DD` in UTC.
pub fn daily_index(index_prefix: &str, timestamp_ms: i64) -> String {
    let ts = event_time(timestamp_ms);
    format!("{}-{}", index_prefix, ts.format("%Y-%m-%d"))
}

pub fn event_time(timestamp_ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn subscription_filter_name(log_group: &str) -> String {
    format!("SubscriptionFilter-{log_group}")
}
