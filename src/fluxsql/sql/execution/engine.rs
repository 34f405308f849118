//! Query orchestration: source registry, batch execution, and the
//! streaming execution loop.
//!
//! Batch mode materialises every static source once into a single
//! in-memory database (or ATTACHes it) and runs the compiled query
//! exactly once. Streaming mode classifies batch sources through the
//! access planner, fans streaming sources into one tagged channel, routes
//! each record into the current tumbling window, and re-executes the
//! compiled query per arrival or on a periodic tick.
//!
//! Result rows flow through an unbounded output channel consumed by the
//! caller (normally the newline-JSON writer task).

use crate::fluxsql::datasource::{DataSource, SourceKind};
use crate::fluxsql::sql::ast::SelectStatement;
use crate::fluxsql::sql::error::{SqlError, SqlResult};
use crate::fluxsql::sql::execution::multiplexer::merge_streams;
use crate::fluxsql::sql::execution::planner::{
    analyze_batch_access, BatchAccess, BatchTablePlan, SourceInfo, ATTACH_SCHEMA_PREFIX,
};
use crate::fluxsql::sql::execution::table::{insert_record, is_no_such_table};
use crate::fluxsql::sql::execution::types::{FieldValue, IndexKey, Record, TaggedRecord};
use crate::fluxsql::sql::execution::window::{AttachInfo, Window, WindowManager};
use crate::fluxsql::sql::translator::{self, quote_ident, quote_literal};
use log::{debug, info};
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Process-unique suffix for shared static database names, so concurrent
/// engines (tests, library embedders) never share a cache=shared namespace.
static STATIC_DB_SEQ: AtomicU64 = AtomicU64::new(0);

/// An in-memory index over one batch source, keyed on its join column.
/// Built once at engine start; immutable afterwards.
struct IndexedTable {
    /// Table name in the window database
    table: String,
    /// Streaming-record column probed on every arrival
    probe_column: String,
    records: HashMap<IndexKey, Vec<Record>>,
}

/// The query engine: owns the bound sources and the output channel.
pub struct QueryEngine {
    sources: HashMap<String, Box<dyn DataSource>>,
    output: mpsc::UnboundedSender<Record>,
    /// Keeps the shared static database alive while windows reference it
    static_conn: Option<Connection>,
}

impl QueryEngine {
    pub fn new(output: mpsc::UnboundedSender<Record>) -> Self {
        Self {
            sources: HashMap::new(),
            output,
            static_conn: None,
        }
    }

    /// Bind a source to its table name. Names are unique; rebinding a
    /// name replaces the previous source.
    pub fn add_source(&mut self, source: Box<dyn DataSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    /// Execute a parsed statement to completion, streaming result rows to
    /// the output channel.
    pub async fn execute(&mut self, stmt: &SelectStatement) -> SqlResult<()> {
        for table in stmt.referenced_tables() {
            if !self.sources.contains_key(table) {
                return Err(SqlError::schema_error(
                    "no source bound for table",
                    Some(table.to_string()),
                ));
            }
        }

        let result = match stmt.window {
            Some(window) if !window.is_zero() => self.execute_streaming(stmt, window).await,
            _ => self.execute_batch(stmt).await,
        };

        for source in self.sources.values_mut() {
            source.close().await?;
        }
        result
    }

    async fn execute_batch(&mut self, stmt: &SelectStatement) -> SqlResult<()> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SqlError::execution_error(format!("open database: {}", e), None))?;

        let mut plans: HashMap<String, BatchTablePlan> = HashMap::new();
        for table in referenced_in_order(stmt) {
            let source = self.sources.get_mut(&table).ok_or_else(|| {
                SqlError::schema_error("no source bound for table", Some(table.clone()))
            })?;

            if let Some(attachable) = source.as_attachable() {
                let schema = format!("{}{}", ATTACH_SCHEMA_PREFIX, table);
                let path = attachable.file_path().to_path_buf();
                let sql_table = attachable.table_name().to_string();
                conn.execute(
                    &format!(
                        "ATTACH DATABASE {} AS {}",
                        quote_literal(&path.to_string_lossy()),
                        quote_ident(&schema)
                    ),
                    [],
                )
                .map_err(|e| {
                    SqlError::source_error(table.clone(), format!("attach: {}", e))
                })?;
                plans.insert(
                    table.clone(),
                    BatchTablePlan {
                        access: BatchAccess::Attached,
                        schema,
                        sql_table,
                        index_column: None,
                        probe_column: None,
                        attach_path: Some(path),
                    },
                );
                continue;
            }

            // Everything else is bulk-loaded; streaming sources drain to
            // end-of-input first (batch mode has no notion of arrival)
            let mut records = source.records().await?;
            let mut count = 0usize;
            while let Some(record) = records.recv().await {
                insert_record(&conn, &table, &record)?;
                count += 1;
            }
            debug!("loaded {} records into '{}'", count, table);
        }

        let sql = translator::compile(stmt, &plans);
        info!("compiled query: {}", sql);

        let rows = match run_query(&conn, &sql) {
            Ok(rows) => rows,
            // A source with zero records never creates its table; that is
            // an empty result, not an error
            Err(e) if is_no_such_table(&e) => Vec::new(),
            Err(e) => return Err(SqlError::execution_error(e.to_string(), Some(sql))),
        };
        self.emit(rows)
    }

    async fn execute_streaming(
        &mut self,
        stmt: &SelectStatement,
        window_duration: std::time::Duration,
    ) -> SqlResult<()> {
        if !self
            .sources
            .values()
            .any(|s| s.kind() == SourceKind::Streaming)
        {
            return Err(SqlError::schema_error(
                "OVER requires at least one streaming source",
                None,
            ));
        }

        let infos: HashMap<String, SourceInfo> = self
            .sources
            .iter()
            .map(|(name, source)| {
                (
                    name.clone(),
                    SourceInfo {
                        streaming: source.kind() == SourceKind::Streaming,
                        attach: source.as_attachable().map(|a| {
                            (a.file_path().to_path_buf(), a.table_name().to_string())
                        }),
                    },
                )
            })
            .collect();
        let plans = analyze_batch_access(stmt, &infos);

        let mut attachments = Vec::new();
        let mut indexed_tables = Vec::new();
        let mut static_uri: Option<String> = None;

        for (name, plan) in &plans {
            match plan.access {
                BatchAccess::Attached => {
                    let path = plan.attach_path.clone().ok_or_else(|| {
                        SqlError::source_error(name.clone(), "attach plan missing file path")
                    })?;
                    attachments.push(AttachInfo {
                        schema: plan.schema.clone(),
                        path,
                    });
                }
                BatchAccess::Indexed => {
                    let indexed = self.build_indexed_table(name, plan).await?;
                    info!(
                        "indexed source '{}' on column '{}' ({} keys)",
                        name,
                        plan.index_column.as_deref().unwrap_or(""),
                        indexed.records.len()
                    );
                    indexed_tables.push(indexed);
                }
                BatchAccess::FullScan => {
                    if static_uri.is_none() {
                        let uri = format!(
                            "file:fluxstatic_{}?mode=memory&cache=shared",
                            STATIC_DB_SEQ.fetch_add(1, Ordering::Relaxed)
                        );
                        let conn = Connection::open_with_flags(
                            &uri,
                            OpenFlags::SQLITE_OPEN_READ_WRITE
                                | OpenFlags::SQLITE_OPEN_CREATE
                                | OpenFlags::SQLITE_OPEN_URI,
                        )
                        .map_err(|e| {
                            SqlError::execution_error(
                                format!("open static database: {}", e),
                                None,
                            )
                        })?;
                        self.static_conn = Some(conn);
                        static_uri = Some(uri);
                    }
                    let conn = self.static_conn.as_ref().ok_or_else(|| {
                        SqlError::execution_error("static database not open", None)
                    })?;
                    let source = self.sources.get_mut(name).ok_or_else(|| {
                        SqlError::schema_error("no source bound for table", Some(name.clone()))
                    })?;
                    let mut records = source.records().await?;
                    let mut count = 0usize;
                    while let Some(record) = records.recv().await {
                        insert_record(conn, name, &record)?;
                        count += 1;
                    }
                    debug!("static-loaded {} records into '{}'", count, name);
                }
            }
        }

        let compiled = translator::compile(stmt, &plans);
        info!("compiled query: {}", compiled);

        let manager = WindowManager::new(window_duration, static_uri, attachments);

        let mut streams = Vec::new();
        for (name, source) in self.sources.iter_mut() {
            if source.kind() == SourceKind::Streaming {
                streams.push((name.clone(), source.records().await?));
            }
        }
        let merged = merge_streams(streams);

        let result = match stmt.emit_interval {
            Some(every) if !every.is_zero() => {
                self.run_interval_loop(&manager, merged, &compiled, &indexed_tables, every)
                    .await
            }
            _ => {
                self.run_arrival_loop(&manager, merged, &compiled, &indexed_tables)
                    .await
            }
        };

        manager.close();
        result
    }

    /// Pre-read an indexed source into an in-memory map keyed on its join
    /// column. Rows with a null or missing key are never probed, so they
    /// are dropped here.
    async fn build_indexed_table(
        &mut self,
        name: &str,
        plan: &BatchTablePlan,
    ) -> SqlResult<IndexedTable> {
        let (index_column, probe_column) = match (&plan.index_column, &plan.probe_column) {
            (Some(index), Some(probe)) => (index.clone(), probe.clone()),
            _ => {
                return Err(SqlError::source_error(
                    name,
                    "indexed plan missing join columns",
                ))
            }
        };

        let source = self.sources.get_mut(name).ok_or_else(|| {
            SqlError::schema_error("no source bound for table", Some(name.to_string()))
        })?;
        let mut records = source.records().await?;

        let mut index: HashMap<IndexKey, Vec<Record>> = HashMap::new();
        while let Some(record) = records.recv().await {
            let key = record
                .get(&index_column)
                .and_then(IndexKey::from_field);
            if let Some(key) = key {
                index.entry(key).or_default().push(record);
            }
        }

        Ok(IndexedTable {
            table: name.to_string(),
            probe_column,
            records: index,
        })
    }

    /// Arrival-driven loop: insert, materialise indexed matches, then
    /// re-execute and emit for every record.
    async fn run_arrival_loop(
        &self,
        manager: &WindowManager,
        mut merged: mpsc::Receiver<TaggedRecord>,
        compiled: &str,
        indexed_tables: &[IndexedTable],
    ) -> SqlResult<()> {
        while let Some(tagged) = merged.recv().await {
            let rows = {
                let mut window = manager.current()?;
                insert_record(window.conn(), &tagged.table, &tagged.record)?;
                populate_indexed(&mut window, indexed_tables, &tagged.record)?;

                match run_query(window.conn(), compiled) {
                    Ok(rows) => Some(rows),
                    // In multi-stream mode a referenced table may not exist
                    // until its stream produces a first record
                    Err(e) if is_no_such_table(&e) => None,
                    Err(e) => {
                        return Err(SqlError::execution_error(
                            e.to_string(),
                            Some(compiled.to_string()),
                        ))
                    }
                }
            };
            if let Some(rows) = rows {
                self.emit(rows)?;
            }
        }
        Ok(())
    }

    /// Interval-driven loop: arrivals only ingest; the ticker executes and
    /// emits. A final query runs when the merged channel closes.
    async fn run_interval_loop(
        &self,
        manager: &WindowManager,
        mut merged: mpsc::Receiver<TaggedRecord>,
        compiled: &str,
        indexed_tables: &[IndexedTable],
        every: std::time::Duration,
    ) -> SqlResult<()> {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe = merged.recv() => match maybe {
                    Some(tagged) => {
                        let mut window = manager.current()?;
                        insert_record(window.conn(), &tagged.table, &tagged.record)?;
                        populate_indexed(&mut window, indexed_tables, &tagged.record)?;
                    }
                    None => {
                        // All streams ended; issue a final query
                        let rows = {
                            let window = manager.current()?;
                            match run_query(window.conn(), compiled) {
                                Ok(rows) => rows,
                                Err(e) if is_no_such_table(&e) => Vec::new(),
                                Err(e) => {
                                    return Err(SqlError::execution_error(
                                        e.to_string(),
                                        Some(compiled.to_string()),
                                    ))
                                }
                            }
                        };
                        return self.emit(rows);
                    }
                },
                _ = ticker.tick() => {
                    let rows = {
                        let window = manager.current()?;
                        match run_query(window.conn(), compiled) {
                            Ok(rows) => Some(rows),
                            Err(e) if is_no_such_table(&e) => None,
                            Err(e) => {
                                return Err(SqlError::execution_error(
                                    e.to_string(),
                                    Some(compiled.to_string()),
                                ))
                            }
                        }
                    };
                    if let Some(rows) = rows {
                        self.emit(rows)?;
                    }
                }
            }
        }
    }

    fn emit(&self, rows: Vec<Record>) -> SqlResult<()> {
        for row in rows {
            self.output
                .send(row)
                .map_err(|_| SqlError::io_error("output channel closed"))?;
        }
        Ok(())
    }
}

/// Lazily materialise indexed batch rows matching this record's probe
/// keys into the window, at most once per (table, key) pair.
fn populate_indexed(
    window: &mut Window,
    indexed_tables: &[IndexedTable],
    record: &Record,
) -> SqlResult<()> {
    for indexed in indexed_tables {
        let key = match record
            .get(&indexed.probe_column)
            .and_then(IndexKey::from_field)
        {
            Some(key) => key,
            None => continue,
        };
        if window.has_key(&indexed.table, &key) {
            continue;
        }
        if let Some(matches) = indexed.records.get(&key) {
            for row in matches {
                insert_record(window.conn(), &indexed.table, row)?;
            }
        }
        // Mark even when nothing matched, so misses are not re-probed
        window.mark_key(&indexed.table, key);
    }
    Ok(())
}

/// Execute the compiled SQL and collect result rows, with column names in
/// engine-reported order.
fn run_query(conn: &Connection, sql: &str) -> Result<Vec<Record>, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = stmt.query([])?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::with_capacity(column_names.len());
        for (i, column) in column_names.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map(FieldValue::from_sqlite)
                .unwrap_or(FieldValue::Null);
            record.insert(column.clone(), value);
        }
        results.push(record);
    }
    Ok(results)
}

/// Referenced tables, FROM first then joins, deduplicated preserving order.
fn referenced_in_order(stmt: &SelectStatement) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for table in stmt.referenced_tables() {
        if !seen.iter().any(|t| t.as_str() == table) {
            seen.push(table.to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluxsql::datasource::traits::SOURCE_CHANNEL_CAPACITY;
    use crate::fluxsql::sql::parser::StreamingSqlParser;
    use async_trait::async_trait;

    /// Test source producing a fixed record sequence, static or streaming.
    struct VecSource {
        name: String,
        kind: SourceKind,
        records: Vec<Record>,
        started: bool,
    }

    impl VecSource {
        fn new(name: &str, kind: SourceKind, records: Vec<Record>) -> Self {
            Self {
                name: name.to_string(),
                kind,
                records,
                started: false,
            }
        }
    }

    #[async_trait]
    impl DataSource for VecSource {
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

    fn record(fields: &[(&str, FieldValue)]) -> Record {
        fields
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect()
    }

    fn parse(sql: &str) -> SelectStatement {
        StreamingSqlParser::new().parse(sql).expect("parse failed")
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<Record>) -> Vec<Record> {
        let mut rows = Vec::new();
        while let Some(row) = rx.recv().await {
            rows.push(row);
        }
        rows
    }

    #[tokio::test]
    async fn test_batch_filter_and_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut engine = QueryEngine::new(tx);
        engine.add_source(Box::new(VecSource::new(
            "u",
            SourceKind::Static,
            vec![
                record(&[
                    ("id", FieldValue::Integer(1)),
                    ("name", FieldValue::String("Alice".into())),
                    ("age", FieldValue::Integer(30)),
                ]),
                record(&[
                    ("id", FieldValue::Integer(2)),
                    ("name", FieldValue::String("Bob".into())),
                    ("age", FieldValue::Integer(25)),
                ]),
                record(&[
                    ("id", FieldValue::Integer(3)),
                    ("name", FieldValue::String("Eve".into())),
                    ("age", FieldValue::Integer(42)),
                ]),
            ],
        )));

        let stmt = parse("SELECT name FROM u WHERE age > 29 ORDER BY age DESC");
        engine.execute(&stmt).await.unwrap();
        drop(engine);

        let rows = collect(rx).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].get("name"),
            Some(&FieldValue::String("Eve".into()))
        );
        assert_eq!(
            rows[1].get("name"),
            Some(&FieldValue::String("Alice".into()))
        );
    }

    #[tokio::test]
    async fn test_batch_missing_binding_is_schema_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut engine = QueryEngine::new(tx);
        let stmt = parse("SELECT * FROM nowhere");
        match engine.execute(&stmt).await {
            Err(SqlError::SchemaError { table, .. }) => {
                assert_eq!(table.as_deref(), Some("nowhere"))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_empty_source_yields_empty_result() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut engine = QueryEngine::new(tx);
        engine.add_source(Box::new(VecSource::new("t", SourceKind::Static, vec![])));
        let stmt = parse("SELECT * FROM t");
        engine.execute(&stmt).await.unwrap();
        drop(engine);
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_streaming_requires_streaming_source() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut engine = QueryEngine::new(tx);
        engine.add_source(Box::new(VecSource::new("t", SourceKind::Static, vec![])));
        let stmt = parse("SELECT * FROM t OVER 1h");
        assert!(engine.execute(&stmt).await.is_err());
    }

    #[tokio::test]
    async fn test_arrival_driven_reemits_per_record() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut engine = QueryEngine::new(tx);
        engine.add_source(Box::new(VecSource::new(
            "s",
            SourceKind::Streaming,
            vec![
                record(&[("a", FieldValue::String("x".into()))]),
                record(&[("a", FieldValue::String("y".into()))]),
                record(&[("a", FieldValue::String("x".into()))]),
            ],
        )));

        let stmt = parse("SELECT a, COUNT(*) cnt FROM s GROUP BY a ORDER BY a OVER 1h");
        engine.execute(&stmt).await.unwrap();
        drop(engine);

        // Re-query batches of sizes 1, 2, 2
        let rows = collect(rx).await;
        assert_eq!(rows.len(), 5);
        let last_two = &rows[3..];
        assert_eq!(
            last_two[0].get("a"),
            Some(&FieldValue::String("x".into()))
        );
        assert_eq!(last_two[0].get("cnt"), Some(&FieldValue::Integer(2)));
        assert_eq!(
            last_two[1].get("a"),
            Some(&FieldValue::String("y".into()))
        );
        assert_eq!(last_two[1].get("cnt"), Some(&FieldValue::Integer(1)));
    }

    #[tokio::test]
    async fn test_indexed_materialisation_on_probe() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut engine = QueryEngine::new(tx);
        engine.add_source(Box::new(VecSource::new(
            "l",
            SourceKind::Static,
            vec![
                record(&[
                    ("code", FieldValue::String("A".into())),
                    ("label", FieldValue::String("alpha".into())),
                ]),
                record(&[
                    ("code", FieldValue::String("B".into())),
                    ("label", FieldValue::String("beta".into())),
                ]),
            ],
        )));
        engine.add_source(Box::new(VecSource::new(
            "e",
            SourceKind::Streaming,
            vec![record(&[("code", FieldValue::String("A".into()))])],
        )));

        let stmt = parse("SELECT e.code, l.label FROM e JOIN l ON e.code = l.code OVER 1h");
        engine.execute(&stmt).await.unwrap();
        drop(engine);

        let rows = collect(rx).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get("label"),
            Some(&FieldValue::String("alpha".into()))
        );
    }

    #[tokio::test]
    async fn test_interval_driven_emits_once_per_tick() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut engine = QueryEngine::new(tx);
        engine.add_source(Box::new(VecSource::new(
            "s",
            SourceKind::Streaming,
            vec![
                record(&[("a", FieldValue::String("x".into()))]),
                record(&[("a", FieldValue::String("y".into()))]),
                record(&[("a", FieldValue::String("x".into()))]),
            ],
        )));

        // The stream drains immediately, so the loop issues exactly the
        // final query: one batch reflecting all rows seen
        let stmt = parse("SELECT a, COUNT(*) cnt FROM s GROUP BY a ORDER BY a OVER 1h EVERY 1h");
        engine.execute(&stmt).await.unwrap();
        drop(engine);

        let rows = collect(rx).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("cnt"), Some(&FieldValue::Integer(2)));
        assert_eq!(rows[1].get("cnt"), Some(&FieldValue::Integer(1)));
    }

    #[tokio::test]
    async fn test_multi_stream_skips_until_all_tables_exist() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut engine = QueryEngine::new(tx);
        engine.add_source(Box::new(VecSource::new(
            "a",
            SourceKind::Streaming,
            vec![record(&[("id", FieldValue::Integer(1))])],
        )));
        engine.add_source(Box::new(VecSource::new(
            "b",
            SourceKind::Streaming,
            vec![record(&[("id", FieldValue::Integer(1))])],
        )));

        // Cycles before both tables exist are skipped, not fatal
        let stmt = parse("SELECT a.id FROM a JOIN b ON a.id = b.id OVER 1h");
        engine.execute(&stmt).await.unwrap();
        drop(engine);

        let rows = collect(rx).await;
        assert!(!rows.is_empty());
    }
}
