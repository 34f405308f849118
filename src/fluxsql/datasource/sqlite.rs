//! SQLite database file source.
//!
//! Reads every row of one table via `SELECT *`; columns and types come
//! from the driver. Exposes the attachable capability so the planner can
//! mount the file directly instead of moving rows.

use crate::fluxsql::datasource::traits::{
    AttachableSource, DataSource, SourceKind, SOURCE_CHANNEL_CAPACITY,
};
use crate::fluxsql::sql::error::{SqlError, SqlResult};
use crate::fluxsql::sql::execution::types::{FieldValue, Record};
use crate::fluxsql::sql::translator::quote_ident;
use async_trait::async_trait;
use log::warn;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// A static source reading all rows from one table of a SQLite file.
pub struct SqliteSource {
    name: String,
    path: PathBuf,
    table: String,
    started: bool,
}

impl SqliteSource {
    /// The table defaults to the source name when not overridden.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        table: Option<String>,
    ) -> Self {
        let name = name.into();
        let table = table.unwrap_or_else(|| name.clone());
        Self {
            name,
            path: path.into(),
            table,
            started: false,
        }
    }
}

#[async_trait]
impl DataSource for SqliteSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Static
    }

    async fn records(&mut self) -> SqlResult<mpsc::Receiver<Record>> {
        if self.started {
            return Err(SqlError::source_error(
                self.name.clone(),
                "records() called more than once",
            ));
        }
        self.started = true;

        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
        let name = self.name.clone();
        let path = self.path.clone();
        let table = self.table.clone();

        // Synchronous driver; run the scan off the async executor
        tokio::task::spawn_blocking(move || {
            if let Err(e) = read_table(&path, &table, &tx) {
                warn!("source '{}': {}", name, e);
            }
        });
        Ok(rx)
    }

    async fn close(&mut self) -> SqlResult<()> {
        Ok(())
    }

    fn as_attachable(&self) -> Option<&dyn AttachableSource> {
        Some(self)
    }
}

impl AttachableSource for SqliteSource {
    fn file_path(&self) -> &Path {
        &self.path
    }

    fn table_name(&self) -> &str {
        &self.table
    }
}

fn read_table(path: &Path, table: &str, tx: &mpsc::Sender<Record>) -> SqlResult<()> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| SqlError::io_error(format!("open {}: {}", path.display(), e)))?;

    let sql = format!("SELECT * FROM {}", quote_ident(table));
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| SqlError::execution_error(e.to_string(), Some(sql.clone())))?;
    let column_names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = stmt
        .query([])
        .map_err(|e| SqlError::execution_error(e.to_string(), Some(sql.clone())))?;
    while let Some(row) = rows
        .next()
        .map_err(|e| SqlError::execution_error(e.to_string(), Some(sql.clone())))?
    {
        let mut record = Record::with_capacity(column_names.len());
        for (i, column) in column_names.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map(FieldValue::from_sqlite)
                .unwrap_or(FieldValue::Null);
            record.insert(column.clone(), value);
        }
        if tx.blocking_send(record).is_err() {
            break;
        }
    }
    Ok(())
}
