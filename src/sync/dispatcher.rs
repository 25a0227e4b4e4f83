// ABOUTME: Runs table syncs concurrently with a bounded worker count
// ABOUTME: Each task opens its own connections; failures are isolated and reported per table

use super::cursor::CursorStore;
use super::engine::{SyncEngine, TableStats};
use super::error::SyncError;
use super::registry::MappingRegistry;
use super::source::SourceReader;
use super::writer::Destination;
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Default number of tables synced at the same time.
pub const DEFAULT_MAX_WORKERS: usize = 3;

/// Opens a fresh source reader and destination for one table task.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Source: SourceReader + 'static;
    type Target: Destination + CursorStore + 'static;

    async fn connect_source(&self) -> Result<Self::Source>;
    async fn connect_target(&self) -> Result<Self::Target>;
}

/// Result of one table task.
#[derive(Debug)]
pub struct TableOutcome {
    pub table: String,
    pub duration: Duration,
    pub result: Result<TableStats, SyncError>,
}

impl TableOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.result.as_ref().err()
    }
}

/// Outcomes of one dispatcher run, in completion order.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcomes: Vec<TableOutcome>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.table.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_success())
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.outcomes.iter().find(|o| o.table == table)
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "Run {} finished in {}ms: {} tables, {} succeeded, {} failed",
            self.run_id,
            self.duration_ms,
            self.total(),
            self.succeeded(),
            self.total() - self.succeeded()
        );
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(stats) => tracing::info!(
                    "  ✓ {}: {} fetched, {} processed, {} errors",
                    outcome.table,
                    stats.fetched,
                    stats.processed,
                    stats.errors
                ),
                Err(err) => tracing::error!("  ✗ {}: {}", outcome.table, err),
            }
        }
    }

    /// Turn a run with failed tables into an error naming each of them.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let failures = self
            .outcomes
            .iter()
            .filter_map(|o| o.error().map(|e| format!("  - {}: {}", o.table, e)))
            .collect::<Vec<_>>()
            .join("\n");
        anyhow::bail!(
            "{} of {} tables failed to sync:\n{}",
            self.total() - self.succeeded(),
            self.total(),
            failures
        )
    }
}

pub struct Dispatcher<C: Connector> {
    registry: Arc<MappingRegistry>,
    connector: Arc<C>,
    engine: SyncEngine,
    max_workers: usize,
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(registry: Arc<MappingRegistry>, connector: Arc<C>, engine: SyncEngine) -> Self {
        Self {
            registry,
            connector,
            engine,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    /// Sync `tables`, or every registered mapping when `tables` is empty.
    ///
    /// Unknown names fail the call before any connection is opened. Table failures do not;
    /// they are reported in the returned [`RunReport`].
    pub async fn run<S: AsRef<str>>(&self, tables: &[S]) -> Result<RunReport, SyncError> {
        let mappings = if tables.is_empty() {
            self.registry.iter().cloned().collect::<Vec<_>>()
        } else {
            self.registry.resolve_all(tables)?
        };

        let run_id = Uuid::new_v4();
        let start = Instant::now();
        tracing::info!(
            "Run {} starting: {} tables with up to {} workers",
            run_id,
            mappings.len(),
            self.max_workers
        );

        let expected: Vec<String> = mappings.iter().map(|m| m.name().to_string()).collect();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for mapping in mappings {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let connector = Arc::clone(&self.connector);
            let engine = self.engine.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let table = mapping.name().to_string();
                let task_start = Instant::now();

                let work = async {
                    let mut source = connector
                        .connect_source()
                        .await
                        .map_err(|e| SyncError::connect(&table, e))?;
                    let mut target = connector
                        .connect_target()
                        .await
                        .map_err(|e| SyncError::connect(&table, e))?;
                    engine.sync_table(&mapping, &mut source, &mut target).await
                };

                let result = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(SyncError::Panicked {
                        table: table.clone(),
                        message: panic_message(panic.as_ref()),
                    }),
                };

                TableOutcome {
                    table,
                    duration: task_start.elapsed(),
                    result,
                }
            });
        }

        let mut outcomes = Vec::new();
        let mut join_errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!("Sync task could not be joined: {}", e);
                    join_errors.push(e.to_string());
                }
            }
        }
        record_missing_outcomes(&expected, &mut outcomes, &join_errors);

        Ok(RunReport {
            run_id,
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Every requested table appears in the report, even when its task vanished.
fn record_missing_outcomes(
    expected: &[String],
    outcomes: &mut Vec<TableOutcome>,
    join_errors: &[String],
) {
    let reason = if join_errors.is_empty() {
        "task was never started".to_string()
    } else {
        join_errors.join("; ")
    };
    for table in expected {
        if outcomes.iter().any(|o| &o.table == table) {
            continue;
        }
        tracing::error!("No outcome for table {}: {}", table, reason);
        outcomes.push(TableOutcome {
            table: table.clone(),
            duration: Duration::ZERO,
            result: Err(SyncError::Lost {
                table: table.clone(),
                reason: reason.clone(),
            }),
        });
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
