//! End-to-end batch-mode tests: real files on disk, engine execution,
//! newline-JSON output assertions.

mod common;

use common::{collect, parse, temp_file, to_json_lines};
use fluxsql::fluxsql::datasource::{FileFormat, FileSource, SqliteSource};
use fluxsql::fluxsql::sql::execution::QueryEngine;
use rusqlite::Connection;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_batch_filter_over_csv() {
    let users = temp_file(".csv", "id,name,age\n1,Alice,30\n2,Bob,25\n3,Eve,42\n");

    let (tx, rx) = mpsc::unbounded_channel();
    let mut engine = QueryEngine::new(tx);
    engine.add_source(Box::new(FileSource::new("u", users.path(), FileFormat::Csv)));

    let stmt = parse("SELECT name FROM u WHERE age > 29 ORDER BY age DESC");
    engine.execute(&stmt).await.unwrap();
    drop(engine);

    let rows = collect(rx).await;
    assert_eq!(
        to_json_lines(&rows),
        vec![r#"{"name":"Eve"}"#, r#"{"name":"Alice"}"#]
    );
}

#[tokio::test]
async fn test_three_way_join_across_file_types() {
    let users = temp_file(".csv", "id,name\n1,Alice\n2,Bob\n");
    let products = temp_file(".csv", "id,name\n101,Widget\n");
    let orders = temp_file(".jsonl", "{\"user_id\":1,\"product_id\":101,\"qty\":2}\n");

    let (tx, rx) = mpsc::unbounded_channel();
    let mut engine = QueryEngine::new(tx);
    engine.add_source(Box::new(FileSource::new("users", users.path(), FileFormat::Csv)));
    engine.add_source(Box::new(FileSource::new(
        "products",
        products.path(),
        FileFormat::Csv,
    )));
    engine.add_source(Box::new(FileSource::new(
        "orders",
        orders.path(),
        FileFormat::JsonLines,
    )));

    let stmt = parse(
        "SELECT u.name, p.name AS pname, o.qty FROM orders o \
         JOIN users u ON u.id = o.user_id \
         JOIN products p ON p.id = o.product_id",
    );
    engine.execute(&stmt).await.unwrap();
    drop(engine);

    let rows = collect(rx).await;
    assert_eq!(
        to_json_lines(&rows),
        vec![r#"{"name":"Alice","pname":"Widget","qty":2}"#]
    );
}

#[tokio::test]
async fn test_left_join_preserves_unmatched() {
    let users = temp_file(".csv", "id\n1\n2\n3\n4\n5\n");
    let orders = temp_file(
        ".csv",
        "order_id,user_id\n10,1\n11,1\n12,2\n13,3\n14,4\n",
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let mut engine = QueryEngine::new(tx);
    engine.add_source(Box::new(FileSource::new("users", users.path(), FileFormat::Csv)));
    engine.add_source(Box::new(FileSource::new(
        "orders",
        orders.path(),
        FileFormat::Csv,
    )));

    let stmt = parse(
        "SELECT u.id, o.order_id FROM users u \
         LEFT JOIN orders o ON u.id = o.user_id ORDER BY u.id",
    );
    engine.execute(&stmt).await.unwrap();
    drop(engine);

    let rows = collect(rx).await;
    assert_eq!(rows.len(), 6);

    let lines = to_json_lines(&rows);
    let unmatched: Vec<_> = lines.iter().filter(|l| l.contains("null")).collect();
    assert_eq!(unmatched, vec![r#"{"id":5,"order_id":null}"#]);
}

#[tokio::test]
async fn test_right_join_preserves_unmatched_right_rows() {
    let a = temp_file(".csv", "x\n1\n");
    let b = temp_file(".csv", "y\n1\n2\n");

    let (tx, rx) = mpsc::unbounded_channel();
    let mut engine = QueryEngine::new(tx);
    engine.add_source(Box::new(FileSource::new("a", a.path(), FileFormat::Csv)));
    engine.add_source(Box::new(FileSource::new("b", b.path(), FileFormat::Csv)));

    let stmt = parse("SELECT a.x, b.y FROM a RIGHT JOIN b ON a.x = b.y ORDER BY b.y");
    engine.execute(&stmt).await.unwrap();
    drop(engine);

    let lines = to_json_lines(&collect(rx).await);
    assert_eq!(lines, vec![r#"{"x":1,"y":1}"#, r#"{"x":null,"y":2}"#]);
}

#[tokio::test]
async fn test_sqlite_source_is_attached_not_copied() {
    let db = tempfile::Builder::new().suffix(".db").tempfile().unwrap();
    {
        let conn = Connection::open(db.path()).unwrap();
        conn.execute("CREATE TABLE people (id INTEGER, name TEXT)", [])
            .unwrap();
        conn.execute("INSERT INTO people VALUES (1, 'Alice'), (2, 'Bob')", [])
            .unwrap();
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let mut engine = QueryEngine::new(tx);
    engine.add_source(Box::new(SqliteSource::new(
        "u",
        db.path(),
        Some("people".to_string()),
    )));

    let stmt = parse("SELECT name FROM u WHERE id = 2");
    engine.execute(&stmt).await.unwrap();
    drop(engine);

    assert_eq!(to_json_lines(&collect(rx).await), vec![r#"{"name":"Bob"}"#]);
}

#[tokio::test]
async fn test_sqlite_join_with_csv() {
    let db = tempfile::Builder::new().suffix(".db").tempfile().unwrap();
    {
        let conn = Connection::open(db.path()).unwrap();
        conn.execute("CREATE TABLE ref (code TEXT, label TEXT)", [])
            .unwrap();
        conn.execute("INSERT INTO ref VALUES ('A', 'alpha'), ('B', 'beta')", [])
            .unwrap();
    }
    let events = temp_file(".csv", "code,v\nA,1\nB,2\nA,3\n");

    let (tx, rx) = mpsc::unbounded_channel();
    let mut engine = QueryEngine::new(tx);
    engine.add_source(Box::new(SqliteSource::new("lookup", db.path(), Some("ref".to_string()))));
    engine.add_source(Box::new(FileSource::new("e", events.path(), FileFormat::Csv)));

    let stmt = parse(
        "SELECT e.v, l.label FROM e JOIN lookup l ON e.code = l.code ORDER BY e.v",
    );
    engine.execute(&stmt).await.unwrap();
    drop(engine);

    let lines = to_json_lines(&collect(rx).await);
    assert_eq!(
        lines,
        vec![
            r#"{"v":1,"label":"alpha"}"#,
            r#"{"v":2,"label":"beta"}"#,
            r#"{"v":3,"label":"alpha"}"#
        ]
    );
}

#[tokio::test]
async fn test_batch_is_deterministic() {
    let users_csv = "id,name,age\n1,Alice,30\n2,Bob,25\n3,Eve,42\n";
    let mut outputs = Vec::new();

    for _ in 0..3 {
        let users = temp_file(".csv", users_csv);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut engine = QueryEngine::new(tx);
        engine.add_source(Box::new(FileSource::new("u", users.path(), FileFormat::Csv)));

        let stmt = parse("SELECT name, age FROM u WHERE age >= 25 ORDER BY age");
        engine.execute(&stmt).await.unwrap();
        drop(engine);
        outputs.push(to_json_lines(&collect(rx).await));
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
}

#[tokio::test]
async fn test_distinct_limit_and_aggregates() {
    let sales = temp_file(
        ".csv",
        "region,amount\neast,10\nwest,20\neast,30\nwest,40\nnorth,5\n",
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let mut engine = QueryEngine::new(tx);
    engine.add_source(Box::new(FileSource::new("sales", sales.path(), FileFormat::Csv)));

    let stmt = parse(
        "SELECT region, SUM(amount) AS total FROM sales \
         GROUP BY region ORDER BY total DESC LIMIT 2",
    );
    engine.execute(&stmt).await.unwrap();
    drop(engine);

    let lines = to_json_lines(&collect(rx).await);
    assert_eq!(
        lines,
        vec![
            r#"{"region":"west","total":60}"#,
            r#"{"region":"east","total":40}"#
        ]
    );
}

#[tokio::test]
async fn test_where_predicates_like_in_between() {
    let t = temp_file(".csv", "name,n\nalpha,1\nbeta,2\ngamma,3\nalpine,4\n");

    let (tx, rx) = mpsc::unbounded_channel();
    let mut engine = QueryEngine::new(tx);
    engine.add_source(Box::new(FileSource::new("t", t.path(), FileFormat::Csv)));

    let stmt = parse(
        "SELECT name FROM t WHERE name LIKE 'al%' AND n BETWEEN 1 AND 4 \
         AND n NOT IN (2, 3) ORDER BY n",
    );
    engine.execute(&stmt).await.unwrap();
    drop(engine);

    let lines = to_json_lines(&collect(rx).await);
    assert_eq!(lines, vec![r#"{"name":"alpha"}"#, r#"{"name":"alpine"}"#]);
}
