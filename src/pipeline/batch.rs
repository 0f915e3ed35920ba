//! Group-wise concurrent execution of stage workers.
//!
//! Items are split into consecutive groups of at most `batch_size`. All
//! workers of a group run concurrently on the calling task; the next group
//! starts only after the previous one has fully completed.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tracing::{debug, warn};

use super::progress::{Counter, ErrorStage, GroupProgress, PipelineProgress, ProgressObserver};
use super::stages::{StageOutcome, StageResult};

/// Where a stage reports into the run's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    /// Stage name used for error-log entries and observer events.
    pub stage: ErrorStage,
    /// Counter advanced once per successful item.
    pub counter: Counter,
}

impl StageReport {
    pub fn new(stage: ErrorStage, counter: Counter) -> Self {
        Self { stage, counter }
    }
}

/// Runs stage workers over items in fixed-size concurrent groups.
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    batch_size: usize,
}

impl BatchExecutor {
    /// A zero batch size is treated as one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of groups `item_count` items are split into.
    pub fn group_count(&self, item_count: usize) -> usize {
        item_count.div_ceil(self.batch_size)
    }

    /// Runs `worker` over every item and returns the successful payloads.
    ///
    /// Successes keep group order, and completion order within a group.
    /// Failures, including worker panics, are logged to `progress` against
    /// `item_id(item)` and dropped. Progress is updated and `observer`
    /// notified once per group.
    pub async fn run<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        item_id: impl Fn(&I) -> i64,
        worker: F,
        report: StageReport,
        progress: &mut PipelineProgress,
        observer: &dyn ProgressObserver,
    ) -> Vec<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = StageResult<T>>,
    {
        let groups = self.group_count(items.len());
        let mut successes = Vec::with_capacity(items.len());
        let mut remaining = items.into_iter().peekable();
        let mut group = 0;

        while remaining.peek().is_some() {
            let mut in_flight: FuturesUnordered<_> = remaining
                .by_ref()
                .take(self.batch_size)
                .map(|item| {
                    let id = item_id(&item);
                    AssertUnwindSafe(worker(item))
                        .catch_unwind()
                        .map(move |joined| match joined {
                            Ok(result) => result,
                            Err(panic) => StageResult::failure(id, panic_message(&*panic)),
                        })
                })
                .collect();

            debug!(
                stage = %report.stage,
                group = group + 1,
                groups,
                size = in_flight.len(),
                "Starting batch group"
            );

            let mut failures = Vec::new();
            let mut succeeded = 0;
            while let Some(result) = in_flight.next().await {
                match result.outcome {
                    StageOutcome::Success(value) => {
                        successes.push(value);
                        succeeded += 1;
                    }
                    StageOutcome::Failure(message) => failures.push((result.question_id, message)),
                }
            }

            progress.record(report.counter, succeeded);
            let failed = failures.len();
            for (question_id, message) in failures {
                warn!(stage = %report.stage, question_id, error = %message, "Item dropped");
                progress.add_error(question_id, report.stage, message);
            }

            observer.group_completed(&GroupProgress {
                stage: report.stage,
                group,
                groups,
                succeeded,
                failed,
                summary: progress.summary(),
            });
            group += 1;
        }

        successes
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("Worker panicked: {}", detail)
}
