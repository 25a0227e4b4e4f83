// ABOUTME: SyncDaemon re-runs the dispatcher on a fixed interval
// ABOUTME: Stops cleanly when a shutdown broadcast arrives, even mid-cycle

use super::dispatcher::{Connector, Dispatcher, RunReport};
use super::error::SyncError;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Time between the starts of two cycles.
    pub interval: Duration,
    /// Tables to sync (empty = every registered mapping)
    pub tables: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            tables: Vec::new(),
        }
    }
}

pub struct SyncDaemon<C: Connector> {
    dispatcher: Dispatcher<C>,
    config: DaemonConfig,
}

impl<C: Connector> SyncDaemon<C> {
    pub fn new(dispatcher: Dispatcher<C>, config: DaemonConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Run one dispatcher cycle over the configured tables.
    pub async fn run_cycle(&self) -> Result<RunReport, SyncError> {
        self.dispatcher.run(&self.config.tables).await
    }

    /// Run cycles until `shutdown` fires. Returns the number of completed cycles.
    ///
    /// Table failures are logged and the next cycle still runs; an unknown table name stops the
    /// daemon since no later cycle could succeed.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<u64> {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        tracing::info!(
            "Starting SyncDaemon with interval={:?}, tables={}",
            self.config.interval,
            if self.config.tables.is_empty() {
                "all".to_string()
            } else {
                self.config.tables.join(",")
            }
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping SyncDaemon");
                    break;
                }
                _ = ticker.tick() => {
                    tracing::info!("Starting sync cycle {}", cycles + 1);

                    tokio::select! {
                        biased;
                        _ = shutdown.recv() => {
                            tracing::info!("Shutdown signal received during sync cycle, aborting");
                            break;
                        }
                        result = self.run_cycle() => {
                            cycles += 1;
                            match result {
                                Ok(report) => {
                                    report.log_summary();
                                    if !report.is_success() {
                                        tracing::warn!(
                                            "Sync cycle {} had {} failed tables",
                                            cycles,
                                            report.failed_tables().len()
                                        );
                                    }
                                }
                                Err(e) => {
                                    tracing::error!("Sync cycle {} failed: {}", cycles, e);
                                    return Err(e.into());
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_config_default() {
        let config = DaemonConfig::default();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert!(config.tables.is_empty());
    }
}
