// ABOUTME: Library root for sap-pg-sync
// ABOUTME: Exposes the sync engine, database adapters and the connector wiring them together

pub mod config;
pub mod mappings;
pub mod mssql;
pub mod postgres;
pub mod preflight;
pub mod sync;
pub mod utils;

use anyhow::Result;
use async_trait::async_trait;
use config::SyncSettings;
use mssql::MssqlReader;
use postgres::PgTarget;
use std::time::Duration;
use sync::Connector;

/// Opens SQL Server readers and PostgreSQL targets for the dispatcher.
///
/// Each table task gets its own pair of connections, opened with retry.
#[derive(Debug, Clone)]
pub struct SapConnector {
    source_url: String,
    target_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl SapConnector {
    pub fn new(
        source_url: impl Into<String>,
        target_url: impl Into<String>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            target_url: target_url.into(),
            max_retries,
            retry_delay,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            settings.source_url.clone(),
            settings.target_url.clone(),
            settings.max_retries,
            settings.retry_delay,
        )
    }
}

#[async_trait]
impl Connector for SapConnector {
    type Source = MssqlReader;
    type Target = PgTarget;

    async fn connect_source(&self) -> Result<MssqlReader> {
        MssqlReader::connect(&self.source_url, self.max_retries, self.retry_delay).await
    }

    async fn connect_target(&self) -> Result<PgTarget> {
        PgTarget::connect(&self.target_url, self.max_retries, self.retry_delay).await
    }
}
