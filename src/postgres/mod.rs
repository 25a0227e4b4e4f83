// ABOUTME: PostgreSQL side: connections, privilege checks and the sync target
// ABOUTME: PgTarget implements both Destination and CursorStore on one client

pub mod connection;
pub mod privileges;
pub mod target;

pub use connection::{connect, connect_with_retry};
pub use privileges::{check_table_privileges, TablePrivileges};
pub use target::PgTarget;
