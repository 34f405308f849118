//! Dynamic table and schema management for window and static databases.
//!
//! Tables are created lazily on the first insert for their name, with one
//! column per record attribute; later records with unseen attributes widen
//! the table with ALTER TABLE ADD COLUMN. The retry ladder is:
//! try insert → create table if missing → retry → add missing columns →
//! final retry. Only the final failure surfaces.

use crate::fluxsql::sql::error::{SqlError, SqlResult};
use crate::fluxsql::sql::execution::types::Record;
use crate::fluxsql::sql::translator::quote_ident;
use log::debug;
use rusqlite::{params_from_iter, Connection};

/// Insert a record, creating or widening the table as needed.
pub fn insert_record(conn: &Connection, table: &str, record: &Record) -> SqlResult<()> {
    if record.is_empty() {
        return Ok(());
    }

    let columns: Vec<String> = record.attribute_names().map(quote_ident).collect();
    let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
    let values: Vec<rusqlite::types::Value> =
        record.iter().map(|(_, v)| v.to_sqlite()).collect();

    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    );

    // Fast path
    if conn
        .execute(&insert_sql, params_from_iter(values.iter()))
        .is_ok()
    {
        return Ok(());
    }

    // Table may not exist yet
    let column_defs: Vec<String> = record
        .iter()
        .map(|(name, value)| format!("{} {}", quote_ident(name), value.column_affinity()))
        .collect();
    let create_sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        column_defs.join(", ")
    );
    conn.execute(&create_sql, []).map_err(|e| {
        SqlError::execution_error(format!("create table '{}': {}", table, e), None)
    })?;

    if conn
        .execute(&insert_sql, params_from_iter(values.iter()))
        .is_ok()
    {
        return Ok(());
    }

    // Existing table may be missing some of this record's columns
    debug!("widening table '{}' for new attributes", table);
    for (name, value) in record.iter() {
        let alter_sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(name),
            value.column_affinity()
        );
        // Errors here are expected for columns that already exist
        let _ = conn.execute(&alter_sql, []);
    }

    conn.execute(&insert_sql, params_from_iter(values.iter()))
        .map_err(|e| {
            SqlError::execution_error(format!("insert into '{}': {}", table, e), None)
        })?;
    Ok(())
}

/// True when the error is SQLite's "no such table" — a legitimate state in
/// multi-stream mode before every stream has produced its first record.
pub fn is_no_such_table(err: &rusqlite::Error) -> bool {
    err.to_string().contains("no such table")
}
