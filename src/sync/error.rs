// ABOUTME: Typed error taxonomy for table-level sync failures
// ABOUTME: Collaborator errors (anyhow) are wrapped with the table and phase they hit

use std::error::Error as StdError;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("unknown table mapping '{name}' (known: {known})")]
    UnknownMapping { name: String, known: String },

    #[error("table '{table}': failed to connect: {source}")]
    Connect {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("table '{table}': source query failed: {source}")]
    Query {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("table '{table}': write failed: {source}")]
    Write {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("table '{table}': cursor update failed: {source}")]
    Cursor {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("table '{table}': sync task panicked: {message}")]
    Panicked { table: String, message: String },

    #[error("table '{table}': sync task ended without an outcome: {reason}")]
    Lost { table: String, reason: String },
}

impl SyncError {
    pub fn connect(table: &str, source: impl Into<BoxError>) -> Self {
        SyncError::Connect {
            table: table.to_string(),
            source: source.into(),
        }
    }

    pub fn query(table: &str, source: impl Into<BoxError>) -> Self {
        SyncError::Query {
            table: table.to_string(),
            source: source.into(),
        }
    }

    pub fn write(table: &str, source: impl Into<BoxError>) -> Self {
        SyncError::Write {
            table: table.to_string(),
            source: source.into(),
        }
    }

    pub fn cursor(table: &str, source: impl Into<BoxError>) -> Self {
        SyncError::Cursor {
            table: table.to_string(),
            source: source.into(),
        }
    }

    /// Table the error belongs to, if it is table-scoped.
    pub fn table(&self) -> Option<&str> {
        match self {
            SyncError::UnknownMapping { .. } => None,
            SyncError::Connect { table, .. }
            | SyncError::Query { table, .. }
            | SyncError::Write { table, .. }
            | SyncError::Cursor { table, .. }
            | SyncError::Panicked { table, .. }
            | SyncError::Lost { table, .. } => Some(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_anyhow_errors() {
        let err = SyncError::write("ordiniAcquisto", anyhow::anyhow!("duplicate key"));
        assert_eq!(
            err.to_string(),
            "table 'ordiniAcquisto': write failed: duplicate key"
        );
        assert_eq!(err.table(), Some("ordiniAcquisto"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_unknown_mapping_has_no_table() {
        let err = SyncError::UnknownMapping {
            name: "x".to_string(),
            known: "a, b".to_string(),
        };
        assert_eq!(err.table(), None);
    }
}
