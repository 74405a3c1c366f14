use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use super::domain::{ErrorReason, FailureStage, OutcomeKind, RawRecord, RowError, RowOutcome};
use super::pipeline::{RowPipeline, StageTracker};
use super::retry::call_with_retry;
use super::services::ProximityFailure;

/// Conditions that stop a batch before any row is processed.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("premises store unreachable; batch aborted before processing: {0}")]
    StoreUnavailable(#[source] ProximityFailure),
}

/// Cooperative stop signal: in-flight rows finish, no new rows start.
#[derive(Debug, Clone, Default)]
pub struct DrainHandle(Arc<AtomicBool>);

impl DrainHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcomes of one run, partitioned by kind and ordered by input row.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub accepted: Vec<RowOutcome>,
    pub errored: Vec<RowOutcome>,
    pub duplicates: Vec<RowOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// True when a drain stopped the run before every record was started.
    pub drained: bool,
    /// Records never started because of a drain.
    pub unprocessed: usize,
}

impl BatchResult {
    fn from_outcomes(
        mut outcomes: Vec<RowOutcome>,
        started_at: DateTime<Utc>,
        drained: bool,
        unprocessed: usize,
    ) -> Self {
        outcomes.sort_by_key(RowOutcome::row_id);

        let mut accepted = Vec::new();
        let mut errored = Vec::new();
        let mut duplicates = Vec::new();
        for outcome in outcomes {
            match outcome.kind() {
                OutcomeKind::Accepted => accepted.push(outcome),
                OutcomeKind::Errored => errored.push(outcome),
                OutcomeKind::Duplicate => duplicates.push(outcome),
            }
        }

        Self {
            accepted,
            errored,
            duplicates,
            started_at,
            finished_at: Utc::now(),
            drained,
            unprocessed,
        }
    }

    /// Records that reached a terminal outcome.
    pub fn total(&self) -> usize {
        self.accepted.len() + self.errored.len() + self.duplicates.len()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            accepted: self.accepted.len(),
            errored: self.errored.len(),
            duplicates: self.duplicates.len(),
            unprocessed: self.unprocessed,
            drained: self.drained,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub accepted: usize,
    pub errored: usize,
    pub duplicates: usize,
    pub unprocessed: usize,
    pub drained: bool,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} accepted, {} errored, {} duplicates",
            self.accepted, self.errored, self.duplicates
        )?;
        if self.drained {
            write!(f, " (drained, {} not started)", self.unprocessed)?;
        }
        Ok(())
    }
}

/// Runs the row pipeline over a batch with a bounded number of rows in flight.
pub struct BatchRunner {
    pipeline: Arc<RowPipeline>,
    workers: usize,
}

impl BatchRunner {
    pub fn new(pipeline: RowPipeline) -> Self {
        let workers = pipeline.config().workers.max(1);
        Self {
            pipeline: Arc::new(pipeline),
            workers,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Batch-fatal check: the premises store must answer before any row starts.
    pub async fn preflight(&self) -> Result<(), BatchError> {
        let proximity = &self.pipeline.services().proximity;
        call_with_retry(&self.pipeline.config().retry, "store_health_check", || {
            proximity.health_check()
        })
        .await
        .map_err(|failure| {
            error!(error = %failure, "premises store health check failed");
            BatchError::StoreUnavailable(failure)
        })
    }

    /// Preflight, then run. Nothing is processed when preflight fails.
    pub async fn execute(
        &self,
        records: Vec<RawRecord>,
        drain: &DrainHandle,
    ) -> Result<BatchResult, BatchError> {
        self.preflight().await?;
        Ok(self.run(records, drain).await)
    }

    /// Every started record yields exactly one outcome. A panic inside a row becomes an
    /// `internal_error` outcome for that row only.
    pub async fn run(&self, records: Vec<RawRecord>, drain: &DrainHandle) -> BatchResult {
        let started_at = Utc::now();
        let total = records.len();
        info!(records = total, workers = self.workers, "batch started");

        let mut pending = records.into_iter();
        let mut in_flight = JoinSet::new();
        let mut outcomes = Vec::with_capacity(total);
        let mut drained = false;

        loop {
            while !drained && in_flight.len() < self.workers {
                if drain.is_requested() {
                    drained = true;
                    break;
                }
                match pending.next() {
                    Some(record) => {
                        in_flight.spawn(isolated(Arc::clone(&self.pipeline), record));
                    }
                    None => break,
                }
            }

            match in_flight.join_next().await {
                Some(Ok(outcome)) => outcomes.push(outcome),
                Some(Err(join_error)) => {
                    error!(error = %join_error, "row supervisor task failed")
                }
                None => break,
            }
        }

        let unprocessed = if drained { pending.len() } else { 0 };
        if drained {
            warn!(unprocessed, "batch drained before all records started");
        }

        let result = BatchResult::from_outcomes(outcomes, started_at, drained, unprocessed);
        let summary = result.summary();
        info!(
            accepted = summary.accepted,
            errored = summary.errored,
            duplicates = summary.duplicates,
            unprocessed = summary.unprocessed,
            "batch finished"
        );
        result
    }
}

/// Runs one row on its own task so a panic is contained to that row.
async fn isolated(pipeline: Arc<RowPipeline>, record: RawRecord) -> RowOutcome {
    let tracker = StageTracker::new();
    let row_tracker = tracker.clone();
    let row_record = record.clone();

    let task = tokio::spawn(async move { pipeline.run(row_record, &row_tracker).await });
    match task.await {
        Ok(outcome) => outcome,
        Err(join_error) => {
            let stage = tracker.current();
            error!(row = %record.row_id, stage = stage.label(), "row processing panicked");
            RowOutcome::errored(record, internal_error(stage, join_error))
        }
    }
}

fn internal_error(stage: FailureStage, join_error: JoinError) -> RowError {
    if join_error.is_cancelled() {
        return RowError::new(stage, ErrorReason::InternalError, "cancelled", "row task cancelled");
    }

    let payload = join_error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "row processing panicked".to_string());
    RowError::new(stage, ErrorReason::InternalError, "panic", message)
}
