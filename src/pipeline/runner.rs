//! Run orchestrator — one pass over all pending messages.
//!
//! Per message: extract → classify → append → acknowledge. Failures are
//! isolated at the message boundary; only a failed unread listing is
//! fatal to the run. **Append-before-acknowledge is a hard invariant**:
//! a message is marked read only after the sink confirmed the row, so a
//! crash anywhere leaves the message unread and safe to retry
//! (at-least-once; duplicates are accepted, losses are not).

use std::sync::Arc;

use tracing::{info, warn};

use crate::classify::Classifier;
use crate::error::SourceError;
use crate::extract;
use crate::pipeline::types::{CandidateMessage, RunOutcome};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::sink::LedgerSink;
use crate::source::MessageSource;

/// Drives one sync pass. Stateless between runs — the source's unread
/// flag is the only durability marker.
pub struct SyncRunner {
    source: Arc<dyn MessageSource>,
    classifier: Classifier,
    sink: Arc<dyn LedgerSink>,
    append_retry: RetryPolicy,
}

impl SyncRunner {
    pub fn new(
        source: Arc<dyn MessageSource>,
        classifier: Classifier,
        sink: Arc<dyn LedgerSink>,
        append_retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            classifier,
            sink,
            append_retry,
        }
    }

    /// Run one orchestration pass over all unread messages.
    ///
    /// Returns `Err` only when the message listing itself fails; every
    /// per-message failure is counted in the outcome instead.
    pub async fn run(&self) -> Result<RunOutcome, SourceError> {
        let messages = self.source.list_unread().await?;

        let mut outcome = RunOutcome {
            total: messages.len(),
            ..Default::default()
        };

        if messages.is_empty() {
            info!("No unread transaction notifications");
            return Ok(outcome);
        }

        info!(count = messages.len(), "Processing unread notifications");

        for message in &messages {
            if self.process_message(message).await {
                outcome.processed += 1;
            } else {
                outcome.failed += 1;
            }
        }

        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            total = outcome.total,
            "Sync pass complete"
        );
        Ok(outcome)
    }

    /// Run one message through extract → classify → append → acknowledge.
    ///
    /// Returns `true` when the row is durably appended. A skipped message
    /// stays unread and is retried on the next activation.
    async fn process_message(&self, message: &CandidateMessage) -> bool {
        let record = match extract::extract(&message.body) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    id = %message.id,
                    subject = message.subject.as_deref().unwrap_or(""),
                    error = %e,
                    "Skipping unparseable message"
                );
                return false;
            }
        };

        let category = self.classifier.classify(&record.merchant).await;
        info!(
            id = %message.id,
            merchant = %record.merchant,
            category = %category,
            "Extracted transaction"
        );

        let row = record.to_row(&category);
        let appended = retry_with_backoff(
            self.append_retry,
            |e: &crate::error::SinkError| e.is_transient(),
            || self.sink.append_row(&row),
        )
        .await;

        if let Err(e) = appended {
            warn!(id = %message.id, error = %e, "Ledger append failed, leaving message unread");
            return false;
        }

        // The row is durable from here on. An acknowledgment failure is
        // an accepted duplication risk, never a reason to undo anything.
        if let Err(e) = self.source.mark_read(&message.id).await {
            warn!(
                id = %message.id,
                error = %e,
                "Row appended but acknowledgment failed; message may be reprocessed"
            );
        }

        true
    }
}
