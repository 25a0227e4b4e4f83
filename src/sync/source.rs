// ABOUTME: Source-side collaborator trait for reading raw rows
// ABOUTME: Implemented on tiberius by MssqlReader and by in-memory fakes in tests

use super::value::SourceRow;
use anyhow::Result;
use async_trait::async_trait;

/// Executes a read-only query and returns its rows in source order.
#[async_trait]
pub trait SourceReader: Send {
    async fn fetch(&mut self, query: &str) -> Result<Vec<SourceRow>>;
}
