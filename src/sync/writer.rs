// ABOUTME: Destination trait and the BatchWriter that buffers records into bounded flushes
// ABOUTME: Applies upsert-on-conflict or truncate-then-insert semantics per mapping

use super::mapping::{Record, SyncStrategy, TableMapping};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Transactional write side of a table sync.
///
/// All calls between `begin` and `commit`/`rollback` belong to one transaction; flushed
/// rows are visible inside it but not durable until `commit`.
#[async_trait]
pub trait Destination: Send {
    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;

    /// Remove every row of the mapping's destination table.
    async fn truncate(&mut self, mapping: &TableMapping) -> Result<()>;

    /// Plain insert; key violations are errors.
    async fn insert(&mut self, mapping: &TableMapping, records: &[Record]) -> Result<u64>;

    /// Insert, updating non-key columns of rows whose key already exists.
    async fn upsert(&mut self, mapping: &TableMapping, records: &[Record]) -> Result<u64>;
}

/// Counters reported when the writer is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub flushes: usize,
    pub written: u64,
}

pub struct BatchWriter<'a, D: Destination + ?Sized> {
    destination: &'a mut D,
    mapping: &'a TableMapping,
    batch_size: usize,
    buffer: Vec<Record>,
    truncated: bool,
    stats: WriterStats,
}

impl<'a, D: Destination + ?Sized> BatchWriter<'a, D> {
    pub fn new(destination: &'a mut D, mapping: &'a TableMapping, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            destination,
            mapping,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            truncated: false,
            stats: WriterStats::default(),
        }
    }

    /// Clear the destination table for TRUNCATE_INSERT mappings. Runs at most once.
    pub async fn prepare(&mut self) -> Result<()> {
        if self.mapping.strategy() == SyncStrategy::TruncateInsert && !self.truncated {
            self.destination.truncate(self.mapping).await?;
            self.truncated = true;
            tracing::debug!("Truncated {}", self.mapping.destination().qualified_name());
        }
        Ok(())
    }

    /// Buffer a record, flushing when the batch is full.
    pub async fn push(&mut self, record: Record) -> Result<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.prepare().await?;

        let batch = std::mem::take(&mut self.buffer);
        let written = match self.mapping.strategy() {
            SyncStrategy::Upsert => {
                let batch = dedupe_by_key(batch, self.mapping.key_positions());
                self.destination.upsert(self.mapping, &batch).await?
            }
            SyncStrategy::TruncateInsert => self.destination.insert(self.mapping, &batch).await?,
        };

        self.stats.flushes += 1;
        self.stats.written += written;
        tracing::debug!(
            "Flushed batch {} of {} ({} rows)",
            self.stats.flushes,
            self.mapping.name(),
            written
        );
        Ok(())
    }

    /// Flush whatever is left and report counters.
    pub async fn finish(mut self) -> Result<WriterStats> {
        self.flush().await?;
        Ok(self.stats)
    }
}

/// Collapse records sharing a key, keeping the last one's values at the first one's position.
///
/// PostgreSQL refuses an `ON CONFLICT DO UPDATE` statement that touches the same row twice.
fn dedupe_by_key(batch: Vec<Record>, key_positions: &[usize]) -> Vec<Record> {
    let mut seen: HashMap<String, usize> = HashMap::with_capacity(batch.len());
    let mut out: Vec<Record> = Vec::with_capacity(batch.len());

    for record in batch {
        let key = format!("{:?}", record.project(key_positions));
        match seen.get(&key) {
            Some(&idx) => out[idx] = record,
            None => {
                seen.insert(key, out.len());
                out.push(record);
            }
        }
    }

    out
}
