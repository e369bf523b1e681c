//! Digest orchestrator — fetch, summarize, persist, then acknowledge.
//!
//! **Core invariant: nothing is marked read before its summary row is
//! durably stored.** Any failure up to and including the append leaves the
//! mailbox untouched, so the next run picks the same messages up again.
//!
//! Flow:
//! 1. Acquire the run slot (or return `Skipped`)
//! 2. List unread ids (empty → `NoOp`)
//! 3. Fetch each message in list order
//! 4. Summarize the whole batch in one call
//! 5. Append one summary row
//! 6. Mark every message read, in batch order

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::batch::{Batch, BatchEntry, SummaryRecord};
use super::run_slot::{RunSlot, RunState};
use crate::config::DEFAULT_ADAPTER_TIMEOUT_SECS;
use crate::error::{Adapter, AdapterError};
use crate::mail::{MailSource, MessageId};
use crate::store::RecordStore;
use crate::summarize::Summarizer;

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on each individual adapter call.
    pub adapter_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS),
        }
    }
}

/// Terminal outcome of one `run()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    /// Mailbox had no unread messages.
    NoOp,
    Success {
        record: SummaryRecord,
    },
    /// Another run held the slot.
    Skipped,
    /// Aborted before acknowledgment; mailbox unchanged.
    Failed {
        reason: AdapterError,
    },
    /// Row stored, but marking these ids read failed or timed out. They will
    /// be summarized again by a later run.
    ///
    /// A timed-out acknowledgment may still land after the deadline (the
    /// IMAP session keeps running on its blocking thread), so an id listed
    /// here can end up read anyway. The list is "not confirmed read", not
    /// "known unread".
    PartialFailure {
        record: SummaryRecord,
        unacknowledged: Vec<MessageId>,
    },
}

impl RunResult {
    pub fn label(&self) -> &'static str {
        match self {
            RunResult::NoOp => "no_op",
            RunResult::Success { .. } => "success",
            RunResult::Skipped => "skipped",
            RunResult::Failed { .. } => "failed",
            RunResult::PartialFailure { .. } => "partial_failure",
        }
    }

    /// The appended record, if the run got that far.
    pub fn record(&self) -> Option<&SummaryRecord> {
        match self {
            RunResult::Success { record } | RunResult::PartialFailure { record, .. } => {
                Some(record)
            }
            _ => None,
        }
    }
}

/// Reachability of each adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdapterHealth {
    pub mail: bool,
    pub summarizer: bool,
    pub store: bool,
}

/// Coordinates one digest run across the three adapters.
pub struct Orchestrator {
    mail: Arc<dyn MailSource>,
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn RecordStore>,
    config: OrchestratorConfig,
    slot: RunSlot,
}

impl Orchestrator {
    pub fn new(
        mail: Arc<dyn MailSource>,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn RecordStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            mail,
            summarizer,
            store,
            config,
            slot: RunSlot::new(),
        }
    }

    pub fn run_state(&self) -> RunState {
        self.slot.state()
    }

    /// Run one digest. Safe to call concurrently; all but one caller get
    /// `Skipped` without touching any adapter.
    pub async fn run(&self) -> RunResult {
        let Some(_guard) = self.slot.try_acquire() else {
            debug!("Digest run already in progress, skipping");
            return RunResult::Skipped;
        };

        let span = info_span!("digest_run", run_id = %Uuid::new_v4());
        self.run_locked().instrument(span).await
    }

    async fn run_locked(&self) -> RunResult {
        // Step 1: list
        let ids = match self
            .bounded(Adapter::Mail, "list_unread_ids", self.mail.list_unread_ids())
            .await
        {
            Ok(ids) => ids,
            Err(reason) => return self.fail(reason),
        };

        if ids.is_empty() {
            debug!("No unread messages");
            return RunResult::NoOp;
        }
        info!(count = ids.len(), mailbox = self.mail.name(), "Unread messages found");

        // Step 2: fetch, whole batch or nothing
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            match self.bounded(Adapter::Mail, "fetch", self.mail.fetch(&id)).await {
                Ok(message) => entries.push(BatchEntry::new(id, message)),
                Err(reason) => {
                    warn!(id = %id, "Fetch failed, abandoning batch");
                    return self.fail(reason);
                }
            }
        }
        let Some(batch) = Batch::new(entries) else {
            return RunResult::NoOp;
        };

        // Step 3: summarize
        let combined = batch.combined_text();
        let summary = match self
            .bounded(
                Adapter::Summarizer,
                "summarize",
                self.summarizer.summarize(&combined),
            )
            .await
        {
            Ok(summary) => summary,
            Err(reason) => return self.fail(reason),
        };

        // Step 4: persist
        let record = SummaryRecord::from_batch(&batch, summary, Utc::now());
        if let Err(reason) = self
            .bounded(Adapter::Store, "append_row", self.store.append_row(&record))
            .await
        {
            return self.fail(reason);
        }
        info!(count = batch.len(), store = self.store.name(), "Summary row stored");

        // Step 5: acknowledge every id, even after a failure
        let mut unacknowledged = Vec::new();
        for id in batch.ids() {
            if let Err(e) = self
                .bounded(Adapter::Mail, "mark_read", self.mail.mark_read(id))
                .await
            {
                warn!(id = %id, error = %e, "Failed to mark message read");
                unacknowledged.push(id.clone());
            }
        }

        if unacknowledged.is_empty() {
            info!(count = batch.len(), "Digest run complete");
            RunResult::Success { record }
        } else {
            warn!(
                unacknowledged = ?unacknowledged,
                "Summary stored but some messages remain unread; they will be summarized again next run"
            );
            RunResult::PartialFailure {
                record,
                unacknowledged,
            }
        }
    }

    fn fail(&self, reason: AdapterError) -> RunResult {
        error!(
            adapter = ?reason.adapter(),
            operation = ?reason.operation(),
            error = %reason,
            "Digest run failed; mailbox left unchanged"
        );
        RunResult::Failed { reason }
    }

    /// Bound an adapter call by the configured timeout and normalize its error.
    async fn bounded<T, E, F>(
        &self,
        adapter: Adapter,
        operation: &'static str,
        call: F,
    ) -> Result<T, AdapterError>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        let timeout = self.config.adapter_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AdapterError::Unavailable {
                adapter,
                operation,
                reason: e.to_string(),
            }),
            Err(_) => Err(AdapterError::Timeout {
                adapter,
                operation,
                timeout,
            }),
        }
    }

    /// Check every adapter concurrently.
    pub async fn health(&self) -> AdapterHealth {
        let (mail, summarizer, store) = tokio::join!(
            self.bounded(Adapter::Mail, "health_check", self.mail.health_check()),
            self.bounded(
                Adapter::Summarizer,
                "health_check",
                self.summarizer.health_check()
            ),
            self.bounded(Adapter::Store, "health_check", self.store.health_check()),
        );

        for err in [&mail, &summarizer, &store].into_iter().filter_map(|r| r.as_ref().err()) {
            debug!(error = %err, "Adapter health check failed");
        }

        AdapterHealth {
            mail: mail.is_ok(),
            summarizer: summarizer.is_ok(),
            store: store.is_ok(),
        }
    }
}
