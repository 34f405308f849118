//! Shared fixtures for the integration suites: scripted and
//! channel-driven sources, record builders, output collection.

#![allow(dead_code)]

use async_trait::async_trait;
use fluxsql::fluxsql::datasource::traits::{DataSource, SourceKind, SOURCE_CHANNEL_CAPACITY};
use fluxsql::fluxsql::sql::ast::SelectStatement;
use fluxsql::fluxsql::sql::error::SqlResult;
use fluxsql::fluxsql::sql::execution::types::{FieldValue, Record};
use fluxsql::fluxsql::sql::parser::StreamingSqlParser;
use std::io::Write;
use tokio::sync::mpsc;

/// A source that produces a fixed sequence of records.
pub struct ScriptedSource {
    name: String,
    kind: SourceKind,
    records: Vec<Record>,
    started: bool,
}

impl ScriptedSource {
    pub fn new(name: &str, kind: SourceKind, records: Vec<Record>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            records,
            started: false,
        }
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn records(&mut self) -> SqlResult<mpsc::Receiver<Record>> {
        assert!(!self.started, "records() called twice");
        self.started = true;
        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
        let records = std::mem::take(&mut self.records);
        tokio::spawn(async move {
            for record in records {
                if tx.send(record).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn close(&mut self) -> SqlResult<()> {
        Ok(())
    }
}

/// A streaming source whose records are fed by the test through a channel,
/// for tests that control arrival timing.
pub struct ChannelSource {
    name: String,
    rx: Option<mpsc::Receiver<Record>>,
}

impl ChannelSource {
    pub fn new(name: &str) -> (Self, mpsc::Sender<Record>) {
        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
        (
            Self {
                name: name.to_string(),
                rx: Some(rx),
            },
            tx,
        )
    }
}

#[async_trait]
impl DataSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Streaming
    }

    async fn records(&mut self) -> SqlResult<mpsc::Receiver<Record>> {
        Ok(self.rx.take().expect("records() called twice"))
    }

    async fn close(&mut self) -> SqlResult<()> {
        Ok(())
    }
}

/// Build a record from field pairs.
pub fn record(fields: &[(&str, FieldValue)]) -> Record {
    fields
        .iter()
        .map(|(n, v)| (n.to_string(), v.clone()))
        .collect()
}

/// Shorthand for a single-string-field record.
pub fn string_record(field: &str, value: &str) -> Record {
    record(&[(field, FieldValue::String(value.to_string()))])
}

pub fn parse(sql: &str) -> SelectStatement {
    StreamingSqlParser::new().parse(sql).expect("parse failed")
}

/// Drain the output channel after the engine has finished.
pub async fn collect(mut rx: mpsc::UnboundedReceiver<Record>) -> Vec<Record> {
    let mut rows = Vec::new();
    while let Some(row) = rx.recv().await {
        rows.push(row);
    }
    rows
}

/// Render rows the way the CLI does, one JSON object per line.
pub fn to_json_lines(rows: &[Record]) -> Vec<String> {
    rows.iter()
        .map(|r| serde_json::to_string(r).expect("serialize row"))
        .collect()
}

/// Write a temp file with the given contents, keeping it alive.
pub fn temp_file(extension: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}
