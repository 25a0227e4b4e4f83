// ABOUTME: Synchronization engine: mappings, transforms, query building, batching, orchestration
// ABOUTME: Database-agnostic; adapters live in the mssql and postgres modules

pub mod cursor;
pub mod daemon;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod query;
pub mod registry;
pub mod source;
pub mod transform;
pub mod value;
pub mod writer;

pub use cursor::{CursorStore, CURSOR_TABLE};
pub use daemon::{DaemonConfig, SyncDaemon};
pub use dispatcher::{Connector, Dispatcher, RunReport, TableOutcome, DEFAULT_MAX_WORKERS};
pub use engine::{SyncEngine, TableStats, DEFAULT_BATCH_SIZE};
pub use error::SyncError;
pub use mapping::{
    DestinationTable, Field, FieldType, MappingError, Record, RowOutcome, SyncStrategy,
    TableMapping,
};
pub use registry::MappingRegistry;
pub use source::SourceReader;
pub use transform::{Transform, TransformError};
pub use value::{SourceRow, Value};
pub use writer::{BatchWriter, Destination};
