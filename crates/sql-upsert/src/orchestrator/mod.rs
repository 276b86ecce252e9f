//! Multi-table upsert scheduling.
//!
//! Fans a set of `(table, rows)` pairs out over a bounded worker pool that
//! shares the engine's connection pool. Each table succeeds or fails on its
//! own; the caller gets one [`UpsertOutcome`] per table.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::value::RowSet;
use crate::error::{Result, UpsertError};
use crate::upsert::{UpsertCoordinator, UpsertOptions, UpsertRequest, UpsertSummary};

/// Final state of one table in a multi-table upsert.
#[derive(Debug)]
pub enum UpsertOutcome {
    /// The upsert committed.
    Success(UpsertSummary),
    /// The upsert failed; siblings were unaffected.
    Failed(UpsertError),
    /// Never dispatched because cancellation was requested first.
    Skipped,
}

impl UpsertOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UpsertOutcome::Success(_))
    }

    /// The captured error, if this table failed.
    pub fn error(&self) -> Option<&UpsertError> {
        match self {
            UpsertOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-table outcomes of [`ConcurrentUpsertScheduler::upsert_many`].
#[derive(Debug, Default)]
pub struct UpsertReport {
    /// Outcome per target table.
    pub outcomes: BTreeMap<String, UpsertOutcome>,
    /// Number of workers used.
    pub workers: usize,
    /// Whether cancellation was requested during the run.
    pub cancelled: bool,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum OutcomeView<'a> {
    Success(&'a UpsertSummary),
    Failed { error: String },
    Skipped,
}

#[derive(Serialize)]
struct ReportView<'a> {
    workers: usize,
    cancelled: bool,
    tables: BTreeMap<&'a str, OutcomeView<'a>>,
}

impl UpsertReport {
    /// True when every table succeeded and nothing was skipped.
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(UpsertOutcome::is_success)
    }

    /// Tables whose upsert committed.
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_success())
            .map(|(t, _)| t.as_str())
            .collect()
    }

    /// Tables that failed, with their errors.
    pub fn failed(&self) -> Vec<(&str, &UpsertError)> {
        self.outcomes
            .iter()
            .filter_map(|(t, o)| o.error().map(|e| (t.as_str(), e)))
            .collect()
    }

    /// Tables that were never started.
    pub fn skipped(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, UpsertOutcome::Skipped))
            .map(|(t, _)| t.as_str())
            .collect()
    }

    /// Render the report as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        let view = ReportView {
            workers: self.workers,
            cancelled: self.cancelled,
            tables: self
                .outcomes
                .iter()
                .map(|(table, outcome)| {
                    let view = match outcome {
                        UpsertOutcome::Success(summary) => OutcomeView::Success(summary),
                        UpsertOutcome::Failed(e) => OutcomeView::Failed {
                            error: e.to_string(),
                        },
                        UpsertOutcome::Skipped => OutcomeView::Skipped,
                    };
                    (table.as_str(), view)
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&view)?)
    }
}

/// Runs [`UpsertCoordinator`] over many tables with bounded concurrency.
#[derive(Clone)]
pub struct ConcurrentUpsertScheduler {
    coordinator: Arc<UpsertCoordinator>,
}

impl ConcurrentUpsertScheduler {
    pub fn new(coordinator: Arc<UpsertCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Worker count for `tables` tables: never more than the pool can serve.
    pub fn worker_count(&self, max_workers: usize, tables: usize) -> usize {
        max_workers
            .min(self.coordinator.engine().pool_size())
            .min(tables)
            .max(1)
    }

    /// Upsert every `(table, rows)` pair with the same options.
    ///
    /// A single table runs directly on the calling task. Otherwise tables
    /// are dispatched to at most [`Self::worker_count`] concurrent tasks.
    /// When `cancel` fires, tables not yet dispatched are marked
    /// [`UpsertOutcome::Skipped`]; dispatched ones are awaited to completion
    /// so their cleanup runs before this returns.
    pub async fn upsert_many<I>(
        &self,
        tables: I,
        options: &UpsertOptions,
        max_workers: usize,
        cancel: &CancellationToken,
    ) -> UpsertReport
    where
        I: IntoIterator<Item = (String, RowSet)>,
    {
        let requests: Vec<UpsertRequest> = tables
            .into_iter()
            .map(|(table, rows)| UpsertRequest::new(table, rows, options.clone()))
            .collect();

        let mut report = UpsertReport::default();
        if requests.is_empty() {
            return report;
        }

        let workers = self.worker_count(max_workers, requests.len());
        report.workers = workers;

        if requests.len() == 1 {
            for request in requests {
                let outcome = if cancel.is_cancelled() {
                    UpsertOutcome::Skipped
                } else {
                    outcome_of(&request.table, self.coordinator.upsert(&request).await)
                };
                report.outcomes.insert(request.table, outcome);
            }
            report.cancelled = cancel.is_cancelled();
            return report;
        }

        info!(
            "Upserting {} tables into {} with {} workers",
            requests.len(),
            self.coordinator.engine().db_type(),
            workers
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(requests.len());

        for request in requests {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                report
                    .outcomes
                    .insert(request.table, UpsertOutcome::Skipped);
                continue;
            };

            let coordinator = self.coordinator.clone();
            let table = request.table.clone();
            let handle = tokio::spawn(async move {
                let result = coordinator.upsert(&request).await;
                drop(permit);
                result
            });
            handles.push((table, handle));
        }

        if cancel.is_cancelled() {
            warn!(
                "Cancellation requested, waiting for {} dispatched upserts to finish",
                handles.len()
            );
        }

        for (table, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => outcome_of(&table, result),
                Err(e) => {
                    error!("{}: task panicked - {}", table, e);
                    UpsertOutcome::Failed(UpsertError::TaskFailed {
                        table: table.clone(),
                        message: e.to_string(),
                    })
                }
            };
            report.outcomes.insert(table, outcome);
        }

        report.cancelled = cancel.is_cancelled();
        report
    }
}

fn outcome_of(table: &str, result: Result<UpsertSummary>) -> UpsertOutcome {
    match result {
        Ok(summary) => UpsertOutcome::Success(summary),
        Err(e) => {
            error!("{}: failed - {}", table, e);
            UpsertOutcome::Failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_views() {
        let mut report = UpsertReport {
            workers: 2,
            ..Default::default()
        };
        report.outcomes.insert(
            "a".into(),
            UpsertOutcome::Success(UpsertSummary {
                table: "a".into(),
                rows_loaded: 3,
                ..Default::default()
            }),
        );
        report
            .outcomes
            .insert("b".into(), UpsertOutcome::Failed(UpsertError::Config("bad".into())));
        report.outcomes.insert("c".into(), UpsertOutcome::Skipped);

        assert!(!report.is_success());
        assert_eq!(report.succeeded(), vec!["a"]);
        assert_eq!(report.failed().len(), 1);
        assert_eq!(report.skipped(), vec!["c"]);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["workers"], 2);
        assert_eq!(json["tables"]["a"]["status"], "success");
        assert_eq!(json["tables"]["a"]["rows_loaded"], 3);
        assert_eq!(json["tables"]["b"]["status"], "failed");
        assert_eq!(json["tables"]["c"]["status"], "skipped");
    }
}
