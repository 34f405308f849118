//! fluxsql: Unix-native SQL over heterogeneous data sources.
//!
//! One SELECT dialect over delimited files, newline-JSON files, SQLite
//! databases on disk, and live record streams on standard input, emitting
//! newline-JSON results. Queries with an `OVER` clause run continuously
//! against tumbling time windows; without one they run once over fully
//! materialised inputs.

// Export the fluxsql module structure
pub mod fluxsql;

// Re-export main API
pub use fluxsql::datasource::{
    create_source, parse_source_uri, DataSource, FileFormat, FileSource, SourceKind, SourceUri,
    SqliteSource, StdinSource,
};
pub use fluxsql::output::JsonLineWriter;
pub use fluxsql::sql::{
    FieldValue, QueryEngine, Record, SelectStatement, SqlError, SqlResult, StreamingSqlParser,
};
