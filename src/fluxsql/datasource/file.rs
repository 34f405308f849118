//! File-based data source: delimited files with a header row, and
//! newline-JSON files.
//!
//! CSV values are typed by trying integer, then float, then boolean,
//! falling back to text. JSON lines must be objects; blank lines are
//! skipped, malformed lines are skipped with a warning.

use crate::fluxsql::datasource::traits::{DataSource, SourceKind, SOURCE_CHANNEL_CAPACITY};
use crate::fluxsql::sql::error::{SqlError, SqlResult};
use crate::fluxsql::sql::execution::types::{FieldValue, Record};
use async_trait::async_trait;
use log::warn;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Delimited with a header row
    Csv,
    /// One JSON object per line
    JsonLines,
}

/// A static source reading records from a local file.
pub struct FileSource {
    name: String,
    path: PathBuf,
    format: FileFormat,
    started: bool,
}

impl FileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            format,
            started: false,
        }
    }
}

#[async_trait]
impl DataSource for FileSource {
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

        let file = File::open(&self.path).await.map_err(|e| {
            SqlError::source_error(
                self.name.clone(),
                format!("open {}: {}", self.path.display(), e),
            )
        })?;

        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
        let name = self.name.clone();
        let format = self.format;
        tokio::spawn(async move {
            let reader = BufReader::new(file);
            match format {
                FileFormat::Csv => read_csv(reader, &name, tx).await,
                FileFormat::JsonLines => read_json_lines(reader, &name, tx).await,
            }
        });
        Ok(rx)
    }

    async fn close(&mut self) -> SqlResult<()> {
        Ok(())
    }
}

async fn read_csv(reader: BufReader<File>, source_name: &str, tx: mpsc::Sender<Record>) {
    let mut lines = reader.lines();

    let header = loop {
        match lines.next_line().await {
            Ok(Some(line)) => break parse_csv_line(&line),
            Ok(None) => return,
            Err(e) => {
                warn!("source '{}': read error: {}", source_name, e);
                return;
            }
        }
    };

    // Quoted fields may span lines; accumulate until quotes balance
    let mut pending = String::new();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("source '{}': read error: {}", source_name, e);
                break;
            }
        };
        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(&line);
        if count_unescaped_quotes(&pending) % 2 != 0 {
            continue;
        }
        let row = parse_csv_line(&pending);
        pending.clear();
        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let mut record = Record::with_capacity(header.len());
        for (i, column) in header.iter().enumerate() {
            if let Some(cell) = row.get(i) {
                record.insert(column.clone(), infer_csv_type(cell));
            }
        }
        if tx.send(record).await.is_err() {
            return;
        }
    }
}

async fn read_json_lines(reader: BufReader<File>, source_name: &str, tx: mpsc::Sender<Record>) {
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("source '{}': read error: {}", source_name, e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let record = match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(value) => match Record::from_json_object(&value) {
                Some(record) => record,
                None => {
                    warn!("source '{}': skipping non-object line", source_name);
                    continue;
                }
            },
            Err(e) => {
                warn!("source '{}': skipping malformed line: {}", source_name, e);
                continue;
            }
        };
        if tx.send(record).await.is_err() {
            return;
        }
    }
}

/// Split one delimited record into cells, honoring double-quoted fields
/// with doubled-quote escapes.
pub(crate) fn parse_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cell.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    cells.push(std::mem::take(&mut cell));
                }
                _ => cell.push(c),
            }
        }
    }
    cells.push(cell);
    cells
}

fn count_unescaped_quotes(text: &str) -> usize {
    text.chars().filter(|&c| c == '"').count()
}

/// Type a CSV cell: integer, else float, else boolean, else text.
pub(crate) fn infer_csv_type(cell: &str) -> FieldValue {
    if let Ok(i) = cell.parse::<i64>() {
        return FieldValue::Integer(i);
    }
    if let Ok(v) = cell.parse::<f64>() {
        return FieldValue::Float(v);
    }
    match cell {
        "true" | "TRUE" | "True" => FieldValue::Boolean(true),
        "false" | "FALSE" | "False" => FieldValue::Boolean(false),
        _ => FieldValue::String(cell.to_string()),
    }
}
