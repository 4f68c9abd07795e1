//! Per-invocation ingestion flow: decode, transform, sign and dispatch.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::bulk_dispatch::{BulkDispatcher, BulkOutcome, BulkSummary};
use crate::envelope::{decode_envelope, Envelope};
use crate::transform::transform_batch;
use crate::types::IngestInput;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Control message; nothing to index.
    Control,
    /// Data batch without events; no request was sent.
    Empty,
    Indexed(BulkSummary),
}

pub struct IngestPipeline {
    index_prefix: Arc<str>,
    dispatcher: BulkDispatcher,
}

impl IngestPipeline {
    pub fn new(index_prefix: impl Into<Arc<str>>, dispatcher: BulkDispatcher) -> Self {
        Self {
            index_prefix: index_prefix.into(),
            dispatcher,
        }
    }

    /// Errors are decode failures and failed bulk requests; the caller resubmits the
    /// whole delivery.
    pub async fn handle(&self, input: &IngestInput) -> Result<IngestOutcome> {
        let batch = match decode_envelope(input.data()).context("decoding log delivery")? {
            Envelope::Control(_) => {
                info!("received a control message");
                return Ok(IngestOutcome::Control);
            }
            Envelope::Data(batch) => batch,
        };

        let payload = transform_batch(&batch, &self.index_prefix)?;
        if payload.is_empty() {
            info!("data message for {} carried no events", batch.log_group);
            return Ok(IngestOutcome::Empty);
        }
        info!(
            "forwarding {} events from {}/{}",
            payload.actions, batch.log_group, batch.log_stream
        );

        match self.dispatcher.dispatch(&payload).await {
            BulkOutcome::Indexed(summary) => Ok(IngestOutcome::Indexed(summary)),
            BulkOutcome::Failed(failure) => Err(failure).context("bulk dispatch"),
        }
    }
}
