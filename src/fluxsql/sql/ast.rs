use std::time::Duration;

/// A parsed SELECT statement, including the streaming controls.
///
/// `window` (OVER) selects streaming mode when present; `emit_interval`
/// (EVERY) switches the streaming loop from arrival-driven to periodic
/// emission.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub fields: Vec<SelectField>,
    pub from: TableRef,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<u64>,
    /// Tumbling window duration (OVER). None means batch mode.
    pub window: Option<Duration>,
    /// Minimum spacing between emissions (EVERY). Only meaningful with a window.
    pub emit_interval: Option<Duration>,
}

impl SelectStatement {
    /// True when the query runs in streaming mode (OVER with a non-zero duration).
    pub fn is_streaming(&self) -> bool {
        matches!(self.window, Some(d) if !d.is_zero())
    }

    /// Every table name referenced by the statement, FROM first, joins in order.
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut tables = vec![self.from.name.as_str()];
        for j in &self.joins {
            tables.push(j.table.name.as_str());
        }
        tables
    }
}

/// Field selection in the SELECT clause
#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    /// `*`
    Wildcard,
    /// `alias.*`
    QualifiedWildcard(String),
    /// Expression with optional alias: `expr [AS alias]`
    Expression { expr: Expr, alias: Option<String> },
}

/// A table reference with optional alias
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// The name this table is referenced by in expressions: the alias when
    /// given, otherwise the table name itself.
    pub fn effective_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// JOIN variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

/// A JOIN clause with its ON predicate
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: TableRef,
    pub condition: Expr,
}

/// ORDER BY entry with direction
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub descending: bool,
}

/// SQL expressions for projections, predicates and grouping
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference, optionally qualified: `[table.]column`
    Column {
        table: Option<String>,
        name: String,
    },
    /// Literal value
    Literal(LiteralValue),
    /// Binary operation: `left op right`
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary operation: `op expr`
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Function call: `name(args...)`
    Function { name: String, args: Vec<Expr> },
    /// `*` as a function argument (COUNT(*))
    Wildcard,
    /// `expr IS [NOT] NULL`
    IsNull { expr: Box<Expr>, negated: bool },
    /// `expr [NOT] LIKE pattern`
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    /// `expr [NOT] BETWEEN low AND high`
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// `expr [NOT] IN (values...)`
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
}

/// Literal values in SQL text
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}
