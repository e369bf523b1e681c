//! Fires the orchestrator on an interval and on demand.
//!
//! Scheduled and manual runs both go through [`Scheduler::trigger`], which
//! calls `Orchestrator::run()` on its own task. The orchestrator's run slot
//! is the only lock; an overlapping tick just gets `Skipped`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::digest::{AdapterHealth, Orchestrator, RunResult, RunState};
use crate::error::AdapterError;

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
}

/// A finished run, as recorded for the status query.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: RunResult,
}

/// Running totals per result kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub no_op: u64,
    pub success: u64,
    pub skipped: u64,
    pub failed: u64,
    pub partial_failure: u64,
}

impl RunStats {
    fn record(&mut self, result: &RunResult) {
        let counter = match result {
            RunResult::NoOp => &mut self.no_op,
            RunResult::Success { .. } => &mut self.success,
            RunResult::Skipped => &mut self.skipped,
            RunResult::Failed { .. } => &mut self.failed,
            RunResult::PartialFailure { .. } => &mut self.partial_failure,
        };
        *counter += 1;
    }
}

#[derive(Debug, Default)]
struct RunHistory {
    /// Skipped runs never replace this; they did no work.
    last: Option<RunOutcome>,
    stats: RunStats,
}

/// Handle shared by the ticker and the HTTP trigger.
#[derive(Clone)]
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    history: Arc<Mutex<RunHistory>>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            history: Arc::new(Mutex::new(RunHistory::default())),
        }
    }

    /// Run the orchestrator once and record the outcome.
    ///
    /// The run itself is spawned, so dropping this future (an HTTP client
    /// going away) detaches the run instead of cancelling it mid-step. The
    /// outcome is recorded either way.
    pub async fn trigger(&self, trigger: Trigger) -> RunResult {
        let started_at = Utc::now();
        let this = self.clone();
        let run = tokio::spawn(async move {
            let result = this.orchestrator.run().await;
            this.record(trigger, started_at, &result);
            result
        });

        match run.await {
            Ok(result) => result,
            Err(e) => {
                error!(?trigger, error = %e, "Digest run task died");
                let result = RunResult::Failed {
                    reason: AdapterError::Aborted {
                        reason: e.to_string(),
                    },
                };
                self.record(trigger, started_at, &result);
                result
            }
        }
    }

    fn record(&self, trigger: Trigger, started_at: DateTime<Utc>, result: &RunResult) {
        let finished_at = Utc::now();

        match result {
            RunResult::Skipped => debug!(?trigger, "Run skipped, another run in progress"),
            RunResult::NoOp => debug!(?trigger, "Run finished with nothing to do"),
            RunResult::Success { .. } => info!(?trigger, "Run succeeded"),
            RunResult::PartialFailure { unacknowledged, .. } => warn!(
                ?trigger,
                unacknowledged = unacknowledged.len(),
                "Run partially failed"
            ),
            RunResult::Failed { reason } => error!(?trigger, error = %reason, "Run failed"),
        }

        if let Ok(mut history) = self.history.lock() {
            history.stats.record(result);
            if *result != RunResult::Skipped {
                history.last = Some(RunOutcome {
                    trigger,
                    started_at,
                    finished_at,
                    result: result.clone(),
                });
            }
        }
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.history.lock().ok().and_then(|h| h.last.clone())
    }

    pub fn stats(&self) -> RunStats {
        self.history
            .lock()
            .map(|h| h.stats)
            .unwrap_or_default()
    }

    pub fn run_state(&self) -> RunState {
        self.orchestrator.run_state()
    }

    pub async fn adapter_health(&self) -> AdapterHealth {
        self.orchestrator.health().await
    }
}

/// Handle to the background ticker started by [`spawn_digest_ticker`].
pub struct DigestTicker {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl DigestTicker {
    /// Stop future ticks and wait up to `grace` for in-flight runs to finish.
    ///
    /// Returns `false` if runs were still going when `grace` ran out; those
    /// are then aborted.
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.shutdown.store(true, Ordering::Relaxed);
        self.wake.notify_one();

        let mut handle = self.handle;
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "In-flight digest runs outlived shutdown grace"
                );
                handle.abort();
                false
            }
        }
    }
}

/// Spawn the interval ticker. The first tick fires immediately.
///
/// Each tick runs in its own task so a hung run cannot hold up the next
/// tick. Tick tasks are tracked so shutdown can wait for them.
pub fn spawn_digest_ticker(scheduler: Scheduler, interval: Duration) -> DigestTicker {
    let shutdown = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    let shutdown_flag = Arc::clone(&shutdown);
    let wake_signal = Arc::clone(&wake);

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Digest scheduler started");

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut runs = JoinSet::new();

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = wake.notified() => {}
            }
            while runs.try_join_next().is_some() {}

            if shutdown.load(Ordering::Relaxed) {
                info!(in_flight = runs.len(), "Digest scheduler shutting down");
                while runs.join_next().await.is_some() {}
                return;
            }

            let scheduler = scheduler.clone();
            runs.spawn(async move {
                scheduler.trigger(Trigger::Scheduled).await;
            });
        }
    });

    DigestTicker {
        handle,
        shutdown: shutdown_flag,
        wake: wake_signal,
    }
}
