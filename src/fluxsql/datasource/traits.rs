//! Uniform source abstraction.
//!
//! Every input — delimited file, newline-JSON file, SQLite database,
//! standard input — is exposed to the engine through [`DataSource`]:
//! a named, typed producer of records delivered over a bounded channel.
//! Sources backed by a queryable database file additionally expose the
//! [`AttachableSource`] capability so the engine can ATTACH them without
//! moving rows.

use crate::fluxsql::sql::error::SqlResult;
use crate::fluxsql::sql::execution::types::Record;
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// Bounded capacity of every per-source record channel.
pub const SOURCE_CHANNEL_CAPACITY: usize = 64;

/// Whether a source's record sequence is finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Finite sequence, fully readable before query execution
    Static,
    /// Potentially infinite sequence, terminated only by closure or
    /// end-of-input
    Streaming,
}

/// Core trait for record inputs.
#[async_trait]
pub trait DataSource: Send {
    /// The table name this source is bound to (unique within a query).
    fn name(&self) -> &str;

    /// Static (batch) or streaming.
    fn kind(&self) -> SourceKind;

    /// Start producing records and return the receiving end of the
    /// channel. Production starts at most once; a second call is a
    /// source error. Malformed records may be skipped by the reader;
    /// a fatal read error closes the channel.
    async fn records(&mut self) -> SqlResult<mpsc::Receiver<Record>>;

    /// Release resources. Idempotent; reader tasks observe closure
    /// through their channel.
    async fn close(&mut self) -> SqlResult<()>;

    /// The attachable capability, for sources whose backing file can be
    /// ATTACHed directly by the embedded engine.
    fn as_attachable(&self) -> Option<&dyn AttachableSource> {
        None
    }
}

/// Capability of sources backed by an attachable database file.
pub trait AttachableSource {
    /// Filesystem path of the database file.
    fn file_path(&self) -> &Path;

    /// Table name within the database (may differ from the source name).
    fn table_name(&self) -> &str;
}
