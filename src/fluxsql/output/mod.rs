//! Result output: one newline-terminated JSON object per row, attributes
//! keyed by the result column names in engine order.

use crate::fluxsql::sql::error::{SqlError, SqlResult};
use crate::fluxsql::sql::execution::types::Record;
use std::io::Write;

/// Writes result records as JSON lines.
pub struct JsonLineWriter<W: Write> {
    inner: W,
}

impl<W: Write> JsonLineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Serialize one record and terminate the line. Write failures
    /// (broken pipe included) are fatal to the query.
    pub fn write_record(&mut self, record: &Record) -> SqlResult<()> {
        serde_json::to_writer(&mut self.inner, record)
            .map_err(|e| SqlError::io_error(format!("serialize row: {}", e)))?;
        self.inner
            .write_all(b"\n")
            .map_err(|e| SqlError::io_error(format!("write row: {}", e)))?;
        Ok(())
    }

    pub fn flush(&mut self) -> SqlResult<()> {
        self.inner
            .flush()
            .map_err(|e| SqlError::io_error(format!("flush output: {}", e)))
    }
}
