// ABOUTME: SyncEngine drives one table through cursor read, query, transform, write and commit
// ABOUTME: Row failures are counted and skipped; query, write and cursor failures roll back

use super::cursor::CursorStore;
use super::error::SyncError;
use super::mapping::{RowOutcome, SyncStrategy, TableMapping};
use super::query::build_select;
use super::source::SourceReader;
use super::value::SourceRow;
use super::writer::{BatchWriter, Destination};
use chrono::NaiveDateTime;
use std::time::Instant;

/// Default number of records per flush.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Statistics for one table sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStats {
    pub table: String,
    /// Rows returned by the source query.
    pub fetched: usize,
    /// Rows transformed and handed to the writer.
    pub processed: usize,
    /// Rows dropped because a transform failed.
    pub errors: usize,
    pub batches: usize,
    pub written: u64,
    pub cursor_before: Option<NaiveDateTime>,
    pub cursor_after: Option<NaiveDateTime>,
    pub duration_ms: u64,
}

impl TableStats {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }
}

/// Runs the per-table pipeline against any source and destination.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    batch_size: usize,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl SyncEngine {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Sync one table.
    ///
    /// Nothing is written when the query returns no rows. Otherwise every write, including the
    /// cursor update, happens inside one destination transaction that is committed at the end
    /// or rolled back on the first fatal error.
    pub async fn sync_table<S, D>(
        &self,
        mapping: &TableMapping,
        source: &mut S,
        destination: &mut D,
    ) -> Result<TableStats, SyncError>
    where
        S: SourceReader + ?Sized,
        D: Destination + CursorStore + ?Sized,
    {
        let start = Instant::now();
        let table = mapping.name();
        let mut stats = TableStats::new(table);

        if mapping.strategy() == SyncStrategy::Upsert {
            stats.cursor_before = destination
                .last_synced_at(table)
                .await
                .map_err(|e| SyncError::cursor(table, e))?;
            match stats.cursor_before {
                Some(at) => tracing::info!("Last sync for {}: {}", table, at),
                None => tracing::info!("No previous sync for {}, reading the full table", table),
            }
        }
        stats.cursor_after = stats.cursor_before;

        let query = build_select(mapping, stats.cursor_before);
        tracing::debug!("Source query for {}: {}", table, query);

        let rows = source
            .fetch(&query)
            .await
            .map_err(|e| SyncError::query(table, e))?;
        stats.fetched = rows.len();
        tracing::info!("{} rows to sync for {}", rows.len(), table);

        if rows.is_empty() {
            stats.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(stats);
        }

        destination
            .begin()
            .await
            .map_err(|e| SyncError::write(table, e))?;

        if let Err(err) = self.write_rows(mapping, rows, destination, &mut stats).await {
            if let Err(rollback_err) = destination.rollback().await {
                tracing::warn!("Rollback failed for {}: {:#}", table, rollback_err);
            }
            tracing::error!("Sync failed for {}: {}", table, err);
            return Err(err);
        }

        if let Err(err) = destination.commit().await {
            if let Err(rollback_err) = destination.rollback().await {
                tracing::warn!("Rollback failed for {}: {:#}", table, rollback_err);
            }
            return Err(SyncError::write(table, err));
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Sync complete for {}: {} processed, {} errors, {} batches in {}ms",
            table,
            stats.processed,
            stats.errors,
            stats.batches,
            stats.duration_ms
        );
        Ok(stats)
    }

    async fn write_rows<D>(
        &self,
        mapping: &TableMapping,
        rows: Vec<SourceRow>,
        destination: &mut D,
        stats: &mut TableStats,
    ) -> Result<(), SyncError>
    where
        D: Destination + CursorStore + ?Sized,
    {
        let table = mapping.name();
        let mut max_synced_at: Option<NaiveDateTime> = None;

        let mut writer = BatchWriter::new(&mut *destination, mapping, self.batch_size);
        writer
            .prepare()
            .await
            .map_err(|e| SyncError::write(table, e))?;

        for row in &rows {
            match mapping.transform_row(row) {
                RowOutcome::Transformed(out) => {
                    if let Some(at) = out.synced_at {
                        if max_synced_at.map_or(true, |max| at > max) {
                            max_synced_at = Some(at);
                        }
                    }
                    writer
                        .push(out.record)
                        .await
                        .map_err(|e| SyncError::write(table, e))?;
                    stats.processed += 1;
                }
                RowOutcome::Rejected(err) => {
                    stats.errors += 1;
                    tracing::warn!("Skipping row of {}: {}", table, err);
                }
            }
        }

        let written = writer
            .finish()
            .await
            .map_err(|e| SyncError::write(table, e))?;
        stats.batches = written.flushes;
        stats.written = written.written;

        let next_cursor = match mapping.strategy() {
            SyncStrategy::Upsert => max_synced_at
                .filter(|max| stats.cursor_before.map_or(true, |before| *max > before)),
            SyncStrategy::TruncateInsert => Some(chrono::Local::now().naive_local()),
        };

        if let Some(at) = next_cursor {
            destination
                .set_last_synced_at(table, at)
                .await
                .map_err(|e| SyncError::cursor(table, e))?;
            stats.cursor_after = Some(at);
        }

        Ok(())
    }
}
