//! Translation of a parsed [`SelectStatement`] into the SQL executed by the
//! embedded engine.
//!
//! Table references are rewritten according to each source's access plan:
//! `static.<name>` for full-scan sources, `_src_<name>.<underlying>` for
//! attached database files, bare names for streaming tables and indexed
//! tables local to each window. Identifiers are double-quoted, string
//! literals single-quoted, booleans rendered as `1`/`0`.

use crate::fluxsql::sql::ast::*;
use crate::fluxsql::sql::execution::planner::BatchTablePlan;
use std::collections::HashMap;

/// Compile a statement into SQLite SQL. `plans` maps source names to their
/// batch access plans; tables without a plan (streaming or batch-local)
/// stay unprefixed. Pass an empty map in plain batch mode.
pub fn compile(stmt: &SelectStatement, plans: &HashMap<String, BatchTablePlan>) -> String {
    let mut sql = String::from("SELECT ");
    if stmt.distinct {
        sql.push_str("DISTINCT ");
    }

    for (i, field) in stmt.fields.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        match field {
            SelectField::Wildcard => sql.push('*'),
            SelectField::QualifiedWildcard(table) => {
                sql.push_str(&quote_ident(table));
                sql.push_str(".*");
            }
            SelectField::Expression { expr, alias } => {
                sql.push_str(&expr_to_sql(expr));
                if let Some(alias) = alias {
                    sql.push_str(" AS ");
                    sql.push_str(&quote_ident(alias));
                }
            }
        }
    }

    sql.push_str(" FROM ");
    sql.push_str(&table_ref_to_sql(&stmt.from, plans));

    for join in &stmt.joins {
        sql.push_str(match join.join_type {
            JoinType::Inner => " JOIN ",
            JoinType::Left => " LEFT JOIN ",
            JoinType::Right => " RIGHT JOIN ",
        });
        sql.push_str(&table_ref_to_sql(&join.table, plans));
        sql.push_str(" ON ");
        sql.push_str(&expr_to_sql(&join.condition));
    }

    if let Some(where_clause) = &stmt.where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(&expr_to_sql(where_clause));
    }

    if !stmt.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        for (i, expr) in stmt.group_by.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&expr_to_sql(expr));
        }
    }

    if !stmt.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        for (i, ob) in stmt.order_by.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&expr_to_sql(&ob.expr));
            if ob.descending {
                sql.push_str(" DESC");
            }
        }
    }

    if let Some(limit) = stmt.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    sql
}

/// Render a table reference, applying the plan's schema prefix and actual
/// table name when the source has one. Prefixed tables keep the query's
/// name as an alias so qualified column references still resolve.
fn table_ref_to_sql(table: &TableRef, plans: &HashMap<String, BatchTablePlan>) -> String {
    match plans.get(&table.name) {
        Some(plan) if !plan.schema.is_empty() => format!(
            "{}.{} {}",
            quote_ident(&plan.schema),
            quote_ident(&plan.sql_table),
            quote_ident(table.effective_alias())
        ),
        _ => {
            let mut rendered = quote_ident(&table.name);
            if let Some(alias) = &table.alias {
                rendered.push(' ');
                rendered.push_str(&quote_ident(alias));
            }
            rendered
        }
    }
}

fn expr_to_sql(expr: &Expr) -> String {
    match expr {
        Expr::Column { table, name } => match table {
            Some(table) => format!("{}.{}", quote_ident(table), quote_ident(name)),
            None => quote_ident(name),
        },
        Expr::Literal(value) => literal_to_sql(value),
        Expr::BinaryOp { left, op, right } => format!(
            "({} {} {})",
            expr_to_sql(left),
            binary_op_to_sql(*op),
            expr_to_sql(right)
        ),
        Expr::UnaryOp { op, expr } => match op {
            UnaryOperator::Not => format!("(NOT {})", expr_to_sql(expr)),
            UnaryOperator::Minus => format!("(-{})", expr_to_sql(expr)),
        },
        Expr::Function { name, args } => {
            let rendered: Vec<String> = args.iter().map(expr_to_sql).collect();
            format!("{}({})", name, rendered.join(", "))
        }
        Expr::Wildcard => "*".to_string(),
        Expr::IsNull { expr, negated } => {
            if *negated {
                format!("({} IS NOT NULL)", expr_to_sql(expr))
            } else {
                format!("({} IS NULL)", expr_to_sql(expr))
            }
        }
        Expr::Like {
            expr,
            pattern,
            negated,
        } => {
            let not = if *negated { "NOT " } else { "" };
            format!("({} {}LIKE {})", expr_to_sql(expr), not, expr_to_sql(pattern))
        }
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let not = if *negated { "NOT " } else { "" };
            format!(
                "({} {}BETWEEN {} AND {})",
                expr_to_sql(expr),
                not,
                expr_to_sql(low),
                expr_to_sql(high)
            )
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let rendered: Vec<String> = list.iter().map(expr_to_sql).collect();
            let not = if *negated { "NOT " } else { "" };
            format!(
                "({} {}IN ({}))",
                expr_to_sql(expr),
                not,
                rendered.join(", ")
            )
        }
    }
}

fn literal_to_sql(value: &LiteralValue) -> String {
    match value {
        LiteralValue::String(s) => quote_literal(s),
        LiteralValue::Integer(i) => i.to_string(),
        LiteralValue::Float(v) => v.to_string(),
        LiteralValue::Boolean(true) => "1".to_string(),
        LiteralValue::Boolean(false) => "0".to_string(),
        LiteralValue::Null => "NULL".to_string(),
    }
}

fn binary_op_to_sql(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Add => "+",
        BinaryOperator::Subtract => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Modulo => "%",
        BinaryOperator::Eq => "=",
        BinaryOperator::NotEq => "!=",
        BinaryOperator::Lt => "<",
        BinaryOperator::LtEq => "<=",
        BinaryOperator::Gt => ">",
        BinaryOperator::GtEq => ">=",
        BinaryOperator::And => "AND",
        BinaryOperator::Or => "OR",
    }
}

/// Double-quote an identifier, escaping embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a string literal, escaping embedded single quotes.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
