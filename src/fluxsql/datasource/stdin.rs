//! Standard-input streaming source: one JSON object per line.
//!
//! Blank lines are skipped; malformed lines are skipped with a warning;
//! end-of-input closes the channel, which in streaming mode is the
//! engine's termination signal.

use crate::fluxsql::datasource::traits::{DataSource, SourceKind, SOURCE_CHANNEL_CAPACITY};
use crate::fluxsql::sql::error::{SqlError, SqlResult};
use crate::fluxsql::sql::execution::types::Record;
use async_trait::async_trait;
use log::warn;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// A streaming source reading newline-JSON from standard input.
pub struct StdinSource {
    name: String,
    started: bool,
}

impl StdinSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: false,
        }
    }
}

#[async_trait]
impl DataSource for StdinSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Streaming
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
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("source '{}': read error: {}", name, e);
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
                            warn!("source '{}': skipping non-object line", name);
                            continue;
                        }
                    },
                    Err(e) => {
                        warn!("source '{}': skipping malformed line: {}", name, e);
                        continue;
                    }
                };
                if tx.send(record).await.is_err() {
                    // Consumer stopped; unblock and exit
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
