// ABOUTME: Persisted per-table "last synchronized" timestamp
// ABOUTME: Writes must share the destination's open transaction

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// Name of the PostgreSQL table holding one cursor row per mapping.
pub const CURSOR_TABLE: &str = "SAP_sync_states";

#[async_trait]
pub trait CursorStore: Send {
    /// Latest cursor for `table`, `None` when the table was never synced.
    async fn last_synced_at(&mut self, table: &str) -> Result<Option<NaiveDateTime>>;

    /// Insert or overwrite the cursor for `table`.
    async fn set_last_synced_at(&mut self, table: &str, at: NaiveDateTime) -> Result<()>;
}
