//! fluxsql command-line entry point.
//!
//! ```bash
//! fluxsql --source u=file://users.csv 'SELECT name FROM u WHERE age > 29'
//! tail -f events.log | fluxsql 'SELECT a, COUNT(*) FROM s GROUP BY a OVER 1h'
//! ```
//!
//! Each `--source` binds a table name to a URI; any table the query
//! references without a binding reads newline-JSON from standard input
//! (at most one such table is permitted).

use clap::Parser;
use fluxsql::fluxsql::datasource::{create_source, parse_source_uri, SourceUri};
use fluxsql::fluxsql::output::JsonLineWriter;
use fluxsql::fluxsql::sql::error::{SqlError, SqlResult};
use fluxsql::fluxsql::sql::execution::QueryEngine;
use fluxsql::fluxsql::sql::parser::StreamingSqlParser;
use log::{debug, error};
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "fluxsql")]
#[command(about = "SQL over CSV, JSON, SQLite and live stdin streams")]
#[command(version)]
struct Cli {
    /// Bind a table to a source URI, as name=uri. Repeatable.
    /// Schemes: file://<path> (.csv, .json, .jsonl),
    /// sqlite://<path>[?table=<name>], stdin
    #[arg(short, long = "source", value_name = "NAME=URI")]
    source: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// The SELECT statement to execute
    query: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("fluxsql: {}", first_line(&e.to_string()));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> SqlResult<()> {
    let parser = StreamingSqlParser::new();
    let stmt = parser.parse(&cli.query)?;

    let bindings = parse_bindings(&cli.source)?;
    debug!("bound sources: {:?}", bindings.keys().collect::<Vec<_>>());

    // Resolve every referenced table; unbound tables fall back to stdin
    let mut unbound = Vec::new();
    for table in stmt.referenced_tables() {
        if !bindings.contains_key(table) && !unbound.contains(&table.to_string()) {
            unbound.push(table.to_string());
        }
    }
    if unbound.len() > 1 {
        return Err(SqlError::schema_error(
            format!(
                "only one table may read from stdin; unbound tables: {}",
                unbound.join(", ")
            ),
            None,
        ));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut engine = QueryEngine::new(tx);
    for table in stmt.referenced_tables() {
        let uri = bindings.get(table).cloned().unwrap_or(SourceUri::Stdin);
        engine.add_source(create_source(table, &uri));
    }

    // Rows print as they arrive so streaming queries emit continuously
    let writer_task = tokio::spawn(async move {
        let mut writer = JsonLineWriter::new(std::io::stdout());
        while let Some(row) = rx.recv().await {
            writer.write_record(&row)?;
            writer.flush()?;
        }
        Ok::<(), SqlError>(())
    });

    let result = engine.execute(&stmt).await;
    drop(engine); // closes the output channel so the writer drains and exits

    let writer_result = writer_task
        .await
        .map_err(|e| SqlError::io_error(format!("output task failed: {}", e)))?;

    result.and(writer_result)
}

/// Parse repeated `name=uri` bindings, rejecting duplicates.
fn parse_bindings(args: &[String]) -> SqlResult<HashMap<String, SourceUri>> {
    let mut bindings = HashMap::new();
    for arg in args {
        let (name, uri) = arg.split_once('=').ok_or_else(|| {
            SqlError::schema_error(
                format!("invalid --source '{}' (expected name=uri)", arg),
                None,
            )
        })?;
        if name.is_empty() {
            return Err(SqlError::schema_error(
                format!("invalid --source '{}' (empty name)", arg),
                None,
            ));
        }
        let parsed = parse_source_uri(uri)?;
        if bindings.insert(name.to_string(), parsed).is_some() {
            return Err(SqlError::schema_error(
                "table bound more than once",
                Some(name.to_string()),
            ));
        }
    }
    Ok(bindings)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}
