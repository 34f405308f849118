//! Recursive-descent parser for the fluxsql SELECT dialect.
//!
//! Grammar, loosely:
//!
//! ```text
//! SELECT [DISTINCT] fields FROM table [alias]
//!   { [INNER|LEFT [OUTER]|RIGHT [OUTER]] JOIN table [alias] ON expr }
//!   [WHERE expr] [GROUP BY exprs] [ORDER BY expr [ASC|DESC], ...]
//!   [LIMIT n] [OVER duration] [EVERY duration]
//! ```

pub mod duration;
mod lexer;

pub use duration::parse_duration;
pub use lexer::{Token, TokenType};

use crate::fluxsql::sql::ast::*;
use crate::fluxsql::sql::error::SqlError;
use std::collections::HashMap;

/// Parser for streaming SQL statements.
#[derive(Debug, Clone)]
pub struct StreamingSqlParser {
    keywords: HashMap<String, TokenType>,
}

impl StreamingSqlParser {
    pub fn new() -> Self {
        Self {
            keywords: lexer::build_keywords(),
        }
    }

    /// Parse a single SELECT statement.
    pub fn parse(&self, sql: &str) -> Result<SelectStatement, SqlError> {
        let tokens = lexer::tokenize(sql, &self.keywords)?;
        let mut state = ParserState { tokens, pos: 0 };
        let stmt = state.parse_select()?;
        // Accept a trailing semicolon, then require end of input
        if state.current().token_type == TokenType::Semicolon {
            state.advance();
        }
        if state.current().token_type != TokenType::Eof {
            return Err(state.unexpected("end of statement"));
        }
        Ok(stmt)
    }
}

impl Default for StreamingSqlParser {
    fn default() -> Self {
        Self::new()
    }
}

struct ParserState {
    tokens: Vec<Token>,
    pos: usize,
}

impl ParserState {
    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn accept(&mut self, token_type: TokenType) -> bool {
        if self.current().token_type == token_type {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token_type: TokenType, what: &str) -> Result<Token, SqlError> {
        if self.current().token_type == token_type {
            let token = self.current().clone();
            self.advance();
            Ok(token)
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> SqlError {
        let token = self.current();
        let found = if token.token_type == TokenType::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", token.value)
        };
        SqlError::parse_error(
            format!("expected {}, found {}", expected, found),
            Some(token.position),
        )
    }

    fn parse_select(&mut self) -> Result<SelectStatement, SqlError> {
        self.expect(TokenType::Select, "SELECT")?;
        let distinct = self.accept(TokenType::Distinct);
        let fields = self.parse_select_fields()?;

        self.expect(TokenType::From, "FROM")?;
        let from = self.parse_table_ref()?;

        let mut joins = Vec::new();
        while let Some(join) = self.parse_join_clause()? {
            joins.push(join);
        }

        let where_clause = if self.accept(TokenType::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.accept(TokenType::Group) {
            self.expect(TokenType::By, "BY after GROUP")?;
            loop {
                group_by.push(self.parse_expr()?);
                if !self.accept(TokenType::Comma) {
                    break;
                }
            }
        }

        let mut order_by = Vec::new();
        if self.accept(TokenType::Order) {
            self.expect(TokenType::By, "BY after ORDER")?;
            loop {
                let expr = self.parse_expr()?;
                let descending = if self.accept(TokenType::Desc) {
                    true
                } else {
                    self.accept(TokenType::Asc);
                    false
                };
                order_by.push(OrderByExpr { expr, descending });
                if !self.accept(TokenType::Comma) {
                    break;
                }
            }
        }

        let limit = if self.accept(TokenType::Limit) {
            let token = self.expect(TokenType::Number, "row count after LIMIT")?;
            let n = token.value.parse::<u64>().map_err(|_| {
                SqlError::parse_error(
                    format!("invalid LIMIT value '{}'", token.value),
                    Some(token.position),
                )
            })?;
            Some(n)
        } else {
            None
        };

        let window = if self.accept(TokenType::Over) {
            Some(self.parse_duration_token("OVER")?)
        } else {
            None
        };

        let emit_interval = if self.accept(TokenType::Every) {
            Some(self.parse_duration_token("EVERY")?)
        } else {
            None
        };

        Ok(SelectStatement {
            distinct,
            fields,
            from,
            joins,
            where_clause,
            group_by,
            order_by,
            limit,
            window,
            emit_interval,
        })
    }

    fn parse_duration_token(&mut self, clause: &str) -> Result<std::time::Duration, SqlError> {
        let token = self.current().clone();
        match token.token_type {
            TokenType::Duration => {
                self.advance();
                parse_duration(&token.value).map_err(|e| match e {
                    SqlError::ParseError { message, .. } => {
                        SqlError::parse_error(message, Some(token.position))
                    }
                    other => other,
                })
            }
            _ => Err(self.unexpected(&format!("duration after {}", clause))),
        }
    }

    fn parse_select_fields(&mut self) -> Result<Vec<SelectField>, SqlError> {
        let mut fields = Vec::new();
        loop {
            fields.push(self.parse_select_field()?);
            if !self.accept(TokenType::Comma) {
                break;
            }
        }
        Ok(fields)
    }

    fn parse_select_field(&mut self) -> Result<SelectField, SqlError> {
        if self.accept(TokenType::Asterisk) {
            return Ok(SelectField::Wildcard);
        }

        // Qualified wildcard: ident.*
        if self.current().token_type == TokenType::Identifier
            && self.tokens.get(self.pos + 1).map(|t| &t.token_type) == Some(&TokenType::Dot)
            && self.tokens.get(self.pos + 2).map(|t| &t.token_type)
                == Some(&TokenType::Asterisk)
        {
            let table = self.current().value.clone();
            self.advance();
            self.advance();
            self.advance();
            return Ok(SelectField::QualifiedWildcard(table));
        }

        let expr = self.parse_expr()?;
        let alias = if self.accept(TokenType::As) {
            Some(
                self.expect(TokenType::Identifier, "alias after AS")?
                    .value,
            )
        } else if self.current().token_type == TokenType::Identifier {
            // Implicit alias: SELECT o.qty qty
            let value = self.current().value.clone();
            self.advance();
            Some(value)
        } else {
            None
        };
        Ok(SelectField::Expression { expr, alias })
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, SqlError> {
        let name = self.expect(TokenType::Identifier, "table name")?.value;
        let alias = if self.accept(TokenType::As) {
            Some(
                self.expect(TokenType::Identifier, "alias after AS")?
                    .value,
            )
        } else if self.current().token_type == TokenType::Identifier {
            let value = self.current().value.clone();
            self.advance();
            Some(value)
        } else {
            None
        };
        Ok(TableRef { name, alias })
    }

    fn parse_join_clause(&mut self) -> Result<Option<JoinClause>, SqlError> {
        let join_type = match self.current().token_type {
            TokenType::Join => {
                self.advance();
                JoinType::Inner
            }
            TokenType::Inner => {
                self.advance();
                self.expect(TokenType::Join, "JOIN after INNER")?;
                JoinType::Inner
            }
            TokenType::Left => {
                self.advance();
                self.accept(TokenType::Outer);
                self.expect(TokenType::Join, "JOIN after LEFT")?;
                JoinType::Left
            }
            TokenType::Right => {
                self.advance();
                self.accept(TokenType::Outer);
                self.expect(TokenType::Join, "JOIN after RIGHT")?;
                JoinType::Right
            }
            _ => return Ok(None),
        };

        let table = self.parse_table_ref()?;
        self.expect(TokenType::On, "ON in JOIN clause")?;
        let condition = self.parse_expr()?;

        Ok(Some(JoinClause {
            join_type,
            table,
            condition,
        }))
    }

    // Expression precedence: OR < AND < NOT < comparison < additive <
    // multiplicative < unary < primary
    fn parse_expr(&mut self) -> Result<Expr, SqlError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, SqlError> {
        let mut left = self.parse_and()?;
        while self.accept(TokenType::Or) {
            let right = self.parse_and()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SqlError> {
        let mut left = self.parse_not()?;
        while self.accept(TokenType::And) {
            let right = self.parse_not()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, SqlError> {
        if self.accept(TokenType::Not) {
            let expr = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, SqlError> {
        let left = self.parse_additive()?;

        let op = match self.current().token_type {
            TokenType::Equal => Some(BinaryOperator::Eq),
            TokenType::NotEqual => Some(BinaryOperator::NotEq),
            TokenType::LessThan => Some(BinaryOperator::Lt),
            TokenType::LessThanOrEqual => Some(BinaryOperator::LtEq),
            TokenType::GreaterThan => Some(BinaryOperator::Gt),
            TokenType::GreaterThanOrEqual => Some(BinaryOperator::GtEq),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }

        // Postfix predicate forms: IS [NOT] NULL, [NOT] LIKE / BETWEEN / IN
        if self.accept(TokenType::Is) {
            let negated = self.accept(TokenType::Not);
            self.expect(TokenType::Null, "NULL after IS")?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let negated = if self.current().token_type == TokenType::Not
            && matches!(
                self.tokens.get(self.pos + 1).map(|t| &t.token_type),
                Some(&TokenType::Like) | Some(&TokenType::Between) | Some(&TokenType::In)
            ) {
            self.advance();
            true
        } else {
            false
        };

        if self.accept(TokenType::Like) {
            let pattern = self.parse_additive()?;
            return Ok(Expr::Like {
                expr: Box::new(left),
                pattern: Box::new(pattern),
                negated,
            });
        }

        if self.accept(TokenType::Between) {
            let low = self.parse_additive()?;
            self.expect(TokenType::And, "AND in BETWEEN")?;
            let high = self.parse_additive()?;
            return Ok(Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            });
        }

        if self.accept(TokenType::In) {
            self.expect(TokenType::LeftParen, "'(' after IN")?;
            let mut list = Vec::new();
            loop {
                list.push(self.parse_additive()?);
                if !self.accept(TokenType::Comma) {
                    break;
                }
            }
            self.expect(TokenType::RightParen, "')' after IN list")?;
            return Ok(Expr::InList {
                expr: Box::new(left),
                list,
                negated,
            });
        }

        if negated {
            return Err(self.unexpected("LIKE, BETWEEN or IN after NOT"));
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, SqlError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().token_type {
                TokenType::Plus => BinaryOperator::Add,
                TokenType::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SqlError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().token_type {
                TokenType::Asterisk => BinaryOperator::Multiply,
                TokenType::Divide => BinaryOperator::Divide,
                TokenType::Percent => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SqlError> {
        if self.accept(TokenType::Minus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, SqlError> {
        let token = self.current().clone();
        match token.token_type {
            TokenType::Number => {
                self.advance();
                if token.value.contains('.') {
                    let v = token.value.parse::<f64>().map_err(|_| {
                        SqlError::parse_error(
                            format!("invalid number '{}'", token.value),
                            Some(token.position),
                        )
                    })?;
                    Ok(Expr::Literal(LiteralValue::Float(v)))
                } else {
                    let v = token.value.parse::<i64>().map_err(|_| {
                        SqlError::parse_error(
                            format!("invalid number '{}'", token.value),
                            Some(token.position),
                        )
                    })?;
                    Ok(Expr::Literal(LiteralValue::Integer(v)))
                }
            }
            TokenType::String => {
                self.advance();
                Ok(Expr::Literal(LiteralValue::String(token.value)))
            }
            TokenType::True => {
                self.advance();
                Ok(Expr::Literal(LiteralValue::Boolean(true)))
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::Literal(LiteralValue::Boolean(false)))
            }
            TokenType::Null => {
                self.advance();
                Ok(Expr::Literal(LiteralValue::Null))
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenType::RightParen, "')'")?;
                Ok(expr)
            }
            TokenType::Asterisk => {
                // Only valid as an aggregate argument: COUNT(*)
                self.advance();
                Ok(Expr::Wildcard)
            }
            TokenType::Identifier => {
                self.advance();
                // Function call
                if self.current().token_type == TokenType::LeftParen {
                    self.advance();
                    let mut args = Vec::new();
                    if self.current().token_type != TokenType::RightParen {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.accept(TokenType::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenType::RightParen, "')' after function arguments")?;
                    return Ok(Expr::Function {
                        name: token.value.to_uppercase(),
                        args,
                    });
                }
                // Qualified column: table.column
                if self.accept(TokenType::Dot) {
                    let column = self
                        .expect(TokenType::Identifier, "column name after '.'")?
                        .value;
                    return Ok(Expr::Column {
                        table: Some(token.value),
                        name: column,
                    });
                }
                Ok(Expr::Column {
                    table: None,
                    name: token.value,
                })
            }
            _ => Err(self.unexpected("expression")),
        }
    }
}
