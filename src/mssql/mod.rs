// ABOUTME: SQL Server (SAP Business One) source side
// ABOUTME: Connection parsing plus the SourceReader implementation

pub mod connection;
pub mod reader;

pub use connection::{connect, connect_with_retry, parse_config, MssqlClient};
pub use reader::MssqlReader;
