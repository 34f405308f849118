//! Data source adapters: every input — file, database, standard input —
//! is exposed to the engine through the same record-channel contract.

pub mod file;
pub mod sqlite;
pub mod stdin;
pub mod traits;
pub mod uri;

pub use file::{FileFormat, FileSource};
pub use sqlite::SqliteSource;
pub use stdin::StdinSource;
pub use traits::{AttachableSource, DataSource, SourceKind, SOURCE_CHANNEL_CAPACITY};
pub use uri::{create_source, parse_source_uri, SourceUri};
