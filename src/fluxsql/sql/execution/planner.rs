//! Batch-source access planning for streaming mode.
//!
//! Every batch (static) source bound to a streaming query is classified
//! into one of three access strategies before the first record arrives:
//!
//! - `Attached` — the source exposes its database file, so the file is
//!   ATTACHed under a per-source schema and no rows move.
//! - `Indexed` — the source is only joined on a simple equi-condition
//!   against a streaming column, so its rows are pre-read into an
//!   in-memory map and materialised into each window on demand.
//! - `FullScan` — the safe fallback: rows are bulk-loaded once into the
//!   shared static database attached to every window.
//!
//! The planner is pure: the same statement and source set always produce
//! the same plan. Any ambiguity falls through to FullScan.

use crate::fluxsql::sql::ast::{BinaryOperator, Expr, SelectStatement};
use std::collections::{HashMap, HashSet};

/// Schema name the shared static database is attached under.
pub const STATIC_SCHEMA: &str = "static";

/// Schema prefix for attached source databases.
pub const ATTACH_SCHEMA_PREFIX: &str = "_src_";

/// How a batch source's rows are made visible to the embedded engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAccess {
    /// Pre-load into the shared static database
    FullScan,
    /// In-memory map, matching rows inserted per window on demand
    Indexed,
    /// ATTACH the original database file directly
    Attached,
}

/// Per-source access plan.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTablePlan {
    pub access: BatchAccess,
    /// SQL schema prefix ("static", "_src_<name>", or "" for indexed)
    pub schema: String,
    /// Actual table name within the schema
    pub sql_table: String,
    /// Batch-side join column (Indexed only)
    pub index_column: Option<String>,
    /// Streaming-side join column (Indexed only)
    pub probe_column: Option<String>,
    /// Database file path (Attached only)
    pub attach_path: Option<std::path::PathBuf>,
}

/// The subset of source facts the planner needs, decoupled from the
/// source trait so the planner stays a pure function.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub streaming: bool,
    /// Present when the source exposes the attachable capability
    pub attach: Option<(std::path::PathBuf, String)>,
}

/// Classify every batch source referenced by the statement.
pub fn analyze_batch_access(
    stmt: &SelectStatement,
    sources: &HashMap<String, SourceInfo>,
) -> HashMap<String, BatchTablePlan> {
    let mut plans = HashMap::new();

    // alias (or name) → source name, from FROM and every JOIN
    let mut alias_to_source: HashMap<&str, &str> = HashMap::new();
    alias_to_source.insert(stmt.from.effective_alias(), stmt.from.name.as_str());
    for join in &stmt.joins {
        alias_to_source.insert(join.table.effective_alias(), join.table.name.as_str());
    }

    let streaming_names: HashSet<&str> = sources
        .iter()
        .filter(|(_, info)| info.streaming)
        .map(|(name, _)| name.as_str())
        .collect();

    for (name, info) in sources {
        if info.streaming {
            continue;
        }

        // Attachable sources are always attached directly
        if let Some((path, table)) = &info.attach {
            plans.insert(
                name.clone(),
                BatchTablePlan {
                    access: BatchAccess::Attached,
                    schema: format!("{}{}", ATTACH_SCHEMA_PREFIX, name),
                    sql_table: table.clone(),
                    index_column: None,
                    probe_column: None,
                    attach_path: Some(path.clone()),
                },
            );
            continue;
        }

        if let Some(plan) = find_equi_join(stmt, name, &alias_to_source, &streaming_names) {
            plans.insert(name.clone(), plan);
            continue;
        }

        plans.insert(
            name.clone(),
            BatchTablePlan {
                access: BatchAccess::FullScan,
                schema: STATIC_SCHEMA.to_string(),
                sql_table: name.clone(),
                index_column: None,
                probe_column: None,
                attach_path: None,
            },
        );
    }

    plans
}

/// Check whether the batch source is referenced only in a JOIN whose ON
/// predicate is a simple equi-condition against a streaming column.
fn find_equi_join(
    stmt: &SelectStatement,
    batch_name: &str,
    alias_to_source: &HashMap<&str, &str>,
    streaming_names: &HashSet<&str>,
) -> Option<BatchTablePlan> {
    // The FROM primary is the scan target, never indexed
    if stmt.from.name == batch_name {
        return None;
    }

    for join in &stmt.joins {
        let join_alias = join.table.effective_alias();
        if alias_to_source.get(join_alias) != Some(&batch_name) {
            continue;
        }

        let (index_column, probe_column) =
            extract_equi_join_cols(&join.condition, join_alias, alias_to_source, streaming_names)?;

        return Some(BatchTablePlan {
            access: BatchAccess::Indexed,
            schema: String::new(), // lives in the window database directly
            sql_table: batch_name.to_string(),
            index_column: Some(index_column),
            probe_column: Some(probe_column),
            attach_path: None,
        });
    }

    None
}

/// Extract (batch column, streaming column) from a `X = Y` condition where
/// exactly one side is a qualified column of the batch table and the other
/// a qualified column of a streaming source.
fn extract_equi_join_cols(
    condition: &Expr,
    batch_alias: &str,
    alias_to_source: &HashMap<&str, &str>,
    streaming_names: &HashSet<&str>,
) -> Option<(String, String)> {
    let (left, right) = match condition {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => (left.as_ref(), right.as_ref()),
        _ => return None,
    };

    let (left_table, left_col) = qualified_column(left)?;
    let (right_table, right_col) = qualified_column(right)?;

    let is_streaming = |alias: &str| {
        alias_to_source
            .get(alias)
            .is_some_and(|name| streaming_names.contains(name))
    };

    if left_table == batch_alias && right_table != batch_alias && is_streaming(right_table) {
        return Some((left_col.to_string(), right_col.to_string()));
    }
    if right_table == batch_alias && left_table != batch_alias && is_streaming(left_table) {
        return Some((right_col.to_string(), left_col.to_string()));
    }

    None
}

fn qualified_column(expr: &Expr) -> Option<(&str, &str)> {
    match expr {
        Expr::Column {
            table: Some(table),
            name,
        } => Some((table.as_str(), name.as_str())),
        _ => None,
    }
}

/// Source name → schema prefix map for SQL generation.
pub fn build_table_schemas(plans: &HashMap<String, BatchTablePlan>) -> HashMap<String, String> {
    plans
        .iter()
        .map(|(name, plan)| (name.clone(), plan.schema.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluxsql::sql::parser::StreamingSqlParser;

    fn sources(entries: &[(&str, bool)]) -> HashMap<String, SourceInfo> {
        entries
            .iter()
            .map(|(name, streaming)| {
                (
                    name.to_string(),
                    SourceInfo {
                        streaming: *streaming,
                        attach: None,
                    },
                )
            })
            .collect()
    }

    fn plan_for(sql: &str, srcs: HashMap<String, SourceInfo>) -> HashMap<String, BatchTablePlan> {
        let stmt = StreamingSqlParser::new().parse(sql).expect("parse failed");
        analyze_batch_access(&stmt, &srcs)
    }

    #[test]
    fn test_attachable_source_is_attached() {
        let mut srcs = sources(&[("e", true)]);
        srcs.insert(
            "ref".to_string(),
            SourceInfo {
                streaming: false,
                attach: Some(("/data/ref.db".into(), "lookup".to_string())),
            },
        );
        let plans = plan_for(
            "SELECT * FROM e JOIN ref r ON r.id = e.id OVER 1m",
            srcs,
        );
        let plan = &plans["ref"];
        assert_eq!(plan.access, BatchAccess::Attached);
        assert_eq!(plan.schema, "_src_ref");
        assert_eq!(plan.sql_table, "lookup");
        assert_eq!(plan.attach_path.as_deref(), Some("/data/ref.db".as_ref()));
    }

    #[test]
    fn test_equi_join_against_stream_is_indexed() {
        let plans = plan_for(
            "SELECT e.v, l.label FROM e JOIN l ON e.code = l.code OVER 1h",
            sources(&[("e", true), ("l", false)]),
        );
        let plan = &plans["l"];
        assert_eq!(plan.access, BatchAccess::Indexed);
        assert_eq!(plan.index_column.as_deref(), Some("code"));
        assert_eq!(plan.probe_column.as_deref(), Some("code"));
        assert!(plan.schema.is_empty());
    }

    #[test]
    fn test_indexed_detection_respects_operand_sides() {
        // Reversed operand order must still index the batch side
        let plans = plan_for(
            "SELECT * FROM e JOIN l ON l.code = e.code OVER 1h",
            sources(&[("e", true), ("l", false)]),
        );
        assert_eq!(plans["l"].access, BatchAccess::Indexed);
        assert_eq!(plans["l"].index_column.as_deref(), Some("code"));
    }

    #[test]
    fn test_from_primary_batch_is_full_scan() {
        let plans = plan_for(
            "SELECT * FROM l JOIN e ON e.code = l.code OVER 1h",
            sources(&[("e", true), ("l", false)]),
        );
        assert_eq!(plans["l"].access, BatchAccess::FullScan);
        assert_eq!(plans["l"].schema, STATIC_SCHEMA);
    }

    #[test]
    fn test_non_equi_join_is_full_scan() {
        let plans = plan_for(
            "SELECT * FROM e JOIN l ON e.code > l.code OVER 1h",
            sources(&[("e", true), ("l", false)]),
        );
        assert_eq!(plans["l"].access, BatchAccess::FullScan);
    }

    #[test]
    fn test_batch_to_batch_join_is_full_scan() {
        // Both sides batch: ambiguity falls through to FullScan
        let plans = plan_for(
            "SELECT * FROM e JOIN a ON a.id = b.id JOIN b ON b.id = a.id OVER 1h",
            sources(&[("e", true), ("a", false), ("b", false)]),
        );
        assert_eq!(plans["a"].access, BatchAccess::FullScan);
        assert_eq!(plans["b"].access, BatchAccess::FullScan);
    }

    #[test]
    fn test_compound_condition_is_full_scan() {
        let plans = plan_for(
            "SELECT * FROM e JOIN l ON e.code = l.code AND l.kind = 'x' OVER 1h",
            sources(&[("e", true), ("l", false)]),
        );
        assert_eq!(plans["l"].access, BatchAccess::FullScan);
    }

    #[test]
    fn test_planner_is_deterministic() {
        let srcs = sources(&[("e", true), ("l", false)]);
        let first = plan_for(
            "SELECT * FROM e JOIN l ON e.code = l.code OVER 1h",
            srcs.clone(),
        );
        let second = plan_for("SELECT * FROM e JOIN l ON e.code = l.code OVER 1h", srcs);
        assert_eq!(first, second);
    }
}
