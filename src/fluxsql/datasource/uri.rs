//! Source URI parsing and source construction.
//!
//! Supported schemes:
//! - `file://<path>` — `.csv` reads as delimited with a header row,
//!   `.json`/`.jsonl` as newline-JSON
//! - `sqlite://<path>[?table=<name>]` — SQLite database file; `table`
//!   overrides the default (the source name)
//! - `stdin` or the empty string — standard input as newline-JSON
//!
//! A bare path with no scheme is treated as `file://`.

use crate::fluxsql::datasource::file::{FileFormat, FileSource};
use crate::fluxsql::datasource::sqlite::SqliteSource;
use crate::fluxsql::datasource::stdin::StdinSource;
use crate::fluxsql::datasource::traits::DataSource;
use crate::fluxsql::sql::error::{SqlError, SqlResult};
use std::path::{Path, PathBuf};

/// A parsed source URI.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceUri {
    File { path: PathBuf, format: FileFormat },
    Sqlite { path: PathBuf, table: Option<String> },
    Stdin,
}

/// Parse a `--source` URI.
pub fn parse_source_uri(uri: &str) -> SqlResult<SourceUri> {
    if uri.is_empty() || uri == "stdin" {
        return Ok(SourceUri::Stdin);
    }

    if let Some(rest) = uri.strip_prefix("sqlite://") {
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        let table = query.and_then(|q| {
            q.split('&')
                .find_map(|pair| pair.strip_prefix("table="))
                .map(|t| t.to_string())
        });
        if path.is_empty() {
            return Err(SqlError::schema_error(
                format!("missing path in source URI '{}'", uri),
                None,
            ));
        }
        return Ok(SourceUri::Sqlite {
            path: PathBuf::from(path),
            table,
        });
    }

    if let Some(scheme) = uri.split_once("://").map(|(s, _)| s) {
        if scheme != "file" {
            return Err(SqlError::schema_error(
                format!("unsupported source scheme '{}'", scheme),
                None,
            ));
        }
    }

    let path = uri.strip_prefix("file://").unwrap_or(uri);
    let format = file_format_for(Path::new(path))?;
    Ok(SourceUri::File {
        path: PathBuf::from(path),
        format,
    })
}

fn file_format_for(path: &Path) -> SqlResult<FileFormat> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("csv") => Ok(FileFormat::Csv),
        Some("json") | Some("jsonl") => Ok(FileFormat::JsonLines),
        _ => Err(SqlError::schema_error(
            format!(
                "unsupported file type '{}' (use .csv, .json, or .jsonl)",
                path.display()
            ),
            None,
        )),
    }
}

/// Build a source bound to the given table name.
pub fn create_source(name: &str, uri: &SourceUri) -> Box<dyn DataSource> {
    match uri {
        SourceUri::File { path, format } => Box::new(FileSource::new(name, path, *format)),
        SourceUri::Sqlite { path, table } => {
            Box::new(SqliteSource::new(name, path, table.clone()))
        }
        SourceUri::Stdin => Box::new(StdinSource::new(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdin_forms() {
        assert_eq!(parse_source_uri("").unwrap(), SourceUri::Stdin);
        assert_eq!(parse_source_uri("stdin").unwrap(), SourceUri::Stdin);
    }

    #[test]
    fn test_file_extensions() {
        match parse_source_uri("file://data/users.csv").unwrap() {
            SourceUri::File { path, format } => {
                assert_eq!(path, PathBuf::from("data/users.csv"));
                assert_eq!(format, FileFormat::Csv);
            }
            other => panic!("unexpected: {:?}", other),
        }
        match parse_source_uri("events.JSONL").unwrap() {
            SourceUri::File { format, .. } => assert_eq!(format, FileFormat::JsonLines),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_sqlite_with_table_override() {
        match parse_source_uri("sqlite:///data/ref.db?table=lookup").unwrap() {
            SourceUri::Sqlite { path, table } => {
                assert_eq!(path, PathBuf::from("/data/ref.db"));
                assert_eq!(table.as_deref(), Some("lookup"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_sqlite_without_table() {
        match parse_source_uri("sqlite://ref.db").unwrap() {
            SourceUri::Sqlite { table, .. } => assert!(table.is_none()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        assert!(parse_source_uri("mysql://host/db").is_err());
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        assert!(parse_source_uri("file://data.parquet").is_err());
    }
}
