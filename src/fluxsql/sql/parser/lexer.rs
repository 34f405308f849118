//! Tokenization for the fluxsql SELECT dialect.
//!
//! Converts SQL text into tokens: keywords, operators, literals and
//! punctuation. Position information is carried on every token for error
//! reporting.

use crate::fluxsql::sql::error::SqlError;
use std::collections::HashMap;

/// Token types recognized by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenType {
    // Keywords
    Select,   // SELECT
    Distinct, // DISTINCT
    From,     // FROM
    Where,    // WHERE
    Group,    // GROUP (parsed as GROUP BY)
    Order,    // ORDER (parsed as ORDER BY)
    By,       // BY
    Asc,      // ASC
    Desc,     // DESC
    Limit,    // LIMIT
    As,       // AS
    Join,     // JOIN
    Inner,    // INNER
    Left,     // LEFT
    Right,    // RIGHT
    Outer,    // OUTER
    On,       // ON
    And,      // AND
    Or,       // OR
    Not,      // NOT
    Like,     // LIKE
    Between,  // BETWEEN
    In,       // IN
    Is,       // IS
    Null,     // NULL
    True,     // TRUE
    False,    // FALSE
    Over,     // OVER <duration> (tumbling window)
    Every,    // EVERY <duration> (emit interval)

    // Literals and identifiers
    Identifier, // column, table and function names
    String,     // 'single quoted'
    Number,     // 42, 3.14
    Duration,   // 1h, 100ms, 2h30m

    // Punctuation
    LeftParen,  // (
    RightParen, // )
    Comma,      // ,
    Asterisk,   // * (wildcard or multiplication)
    Dot,        // . (qualified names)

    // Arithmetic operators
    Plus,    // +
    Minus,   // -
    Divide,  // /
    Percent, // %

    // Comparison operators
    Equal,              // =
    NotEqual,           // != or <>
    LessThan,           // <
    GreaterThan,        // >
    LessThanOrEqual,    // <=
    GreaterThanOrEqual, // >=

    // Special
    Semicolon, // ; (accepted and ignored at statement end)
    Eof,       // end of input
}

/// A token with its type, original text and character position.
#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub position: usize,
}

/// Build the keyword lookup table for token classification.
pub(super) fn build_keywords() -> HashMap<String, TokenType> {
    let mut keywords = HashMap::new();
    keywords.insert("SELECT".to_string(), TokenType::Select);
    keywords.insert("DISTINCT".to_string(), TokenType::Distinct);
    keywords.insert("FROM".to_string(), TokenType::From);
    keywords.insert("WHERE".to_string(), TokenType::Where);
    keywords.insert("GROUP".to_string(), TokenType::Group);
    keywords.insert("ORDER".to_string(), TokenType::Order);
    keywords.insert("BY".to_string(), TokenType::By);
    keywords.insert("ASC".to_string(), TokenType::Asc);
    keywords.insert("DESC".to_string(), TokenType::Desc);
    keywords.insert("LIMIT".to_string(), TokenType::Limit);
    keywords.insert("AS".to_string(), TokenType::As);
    keywords.insert("JOIN".to_string(), TokenType::Join);
    keywords.insert("INNER".to_string(), TokenType::Inner);
    keywords.insert("LEFT".to_string(), TokenType::Left);
    keywords.insert("RIGHT".to_string(), TokenType::Right);
    keywords.insert("OUTER".to_string(), TokenType::Outer);
    keywords.insert("ON".to_string(), TokenType::On);
    keywords.insert("AND".to_string(), TokenType::And);
    keywords.insert("OR".to_string(), TokenType::Or);
    keywords.insert("NOT".to_string(), TokenType::Not);
    keywords.insert("LIKE".to_string(), TokenType::Like);
    keywords.insert("BETWEEN".to_string(), TokenType::Between);
    keywords.insert("IN".to_string(), TokenType::In);
    keywords.insert("IS".to_string(), TokenType::Is);
    keywords.insert("NULL".to_string(), TokenType::Null);
    keywords.insert("TRUE".to_string(), TokenType::True);
    keywords.insert("FALSE".to_string(), TokenType::False);
    keywords.insert("OVER".to_string(), TokenType::Over);
    keywords.insert("EVERY".to_string(), TokenType::Every);
    keywords
}

/// Tokenize SQL text into a vector of tokens, ending with Eof.
pub(super) fn tokenize(
    sql: &str,
    keywords: &HashMap<String, TokenType>,
) -> Result<Vec<Token>, SqlError> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    let mut position = 0;

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
                position += 1;
            }
            '(' => {
                tokens.push(Token {
                    token_type: TokenType::LeftParen,
                    value: "(".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            ')' => {
                tokens.push(Token {
                    token_type: TokenType::RightParen,
                    value: ")".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            ',' => {
                tokens.push(Token {
                    token_type: TokenType::Comma,
                    value: ",".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '*' => {
                tokens.push(Token {
                    token_type: TokenType::Asterisk,
                    value: "*".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '.' => {
                tokens.push(Token {
                    token_type: TokenType::Dot,
                    value: ".".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '+' => {
                tokens.push(Token {
                    token_type: TokenType::Plus,
                    value: "+".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '-' => {
                tokens.push(Token {
                    token_type: TokenType::Minus,
                    value: "-".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '/' => {
                tokens.push(Token {
                    token_type: TokenType::Divide,
                    value: "/".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '%' => {
                tokens.push(Token {
                    token_type: TokenType::Percent,
                    value: "%".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            ';' => {
                tokens.push(Token {
                    token_type: TokenType::Semicolon,
                    value: ";".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '=' => {
                tokens.push(Token {
                    token_type: TokenType::Equal,
                    value: "=".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '!' => {
                let start = position;
                chars.next();
                position += 1;
                if chars.peek() == Some(&'=') {
                    chars.next();
                    position += 1;
                    tokens.push(Token {
                        token_type: TokenType::NotEqual,
                        value: "!=".to_string(),
                        position: start,
                    });
                } else {
                    return Err(SqlError::parse_error(
                        "unexpected character '!' (expected '!=')",
                        Some(start),
                    ));
                }
            }
            '<' => {
                let start = position;
                chars.next();
                position += 1;
                match chars.peek() {
                    Some(&'=') => {
                        chars.next();
                        position += 1;
                        tokens.push(Token {
                            token_type: TokenType::LessThanOrEqual,
                            value: "<=".to_string(),
                            position: start,
                        });
                    }
                    Some(&'>') => {
                        chars.next();
                        position += 1;
                        tokens.push(Token {
                            token_type: TokenType::NotEqual,
                            value: "<>".to_string(),
                            position: start,
                        });
                    }
                    _ => {
                        tokens.push(Token {
                            token_type: TokenType::LessThan,
                            value: "<".to_string(),
                            position: start,
                        });
                    }
                }
            }
            '>' => {
                let start = position;
                chars.next();
                position += 1;
                if chars.peek() == Some(&'=') {
                    chars.next();
                    position += 1;
                    tokens.push(Token {
                        token_type: TokenType::GreaterThanOrEqual,
                        value: ">=".to_string(),
                        position: start,
                    });
                } else {
                    tokens.push(Token {
                        token_type: TokenType::GreaterThan,
                        value: ">".to_string(),
                        position: start,
                    });
                }
            }
            '\'' => {
                let start = position;
                chars.next();
                position += 1;
                let mut value = String::new();
                let mut terminated = false;
                while let Some(&c) = chars.peek() {
                    chars.next();
                    position += 1;
                    if c == '\'' {
                        // Doubled single quote is an escaped quote
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                            position += 1;
                            value.push('\'');
                        } else {
                            terminated = true;
                            break;
                        }
                    } else {
                        value.push(c);
                    }
                }
                if !terminated {
                    return Err(SqlError::parse_error("unterminated string literal", Some(start)));
                }
                tokens.push(Token {
                    token_type: TokenType::String,
                    value,
                    position: start,
                });
            }
            '0'..='9' => {
                let start = position;
                let mut value = String::new();
                let mut has_dot = false;
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        value.push(c);
                        chars.next();
                        position += 1;
                    } else if c == '.' && !has_dot {
                        // Lookahead: only part of the number if a digit follows,
                        // otherwise it is the qualified-name dot
                        let mut ahead = chars.clone();
                        ahead.next();
                        if matches!(ahead.peek(), Some(d) if d.is_ascii_digit()) {
                            has_dot = true;
                            value.push(c);
                            chars.next();
                            position += 1;
                        } else {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                // A unit letter glued to the number makes it a duration
                // literal (1h, 100ms, 2h30m)
                if matches!(chars.peek(), Some(c) if c.is_alphabetic() || *c == 'µ') {
                    while let Some(&c) = chars.peek() {
                        if c.is_alphanumeric() || c == 'µ' || c == '.' {
                            value.push(c);
                            chars.next();
                            position += 1;
                        } else {
                            break;
                        }
                    }
                    tokens.push(Token {
                        token_type: TokenType::Duration,
                        value,
                        position: start,
                    });
                } else {
                    tokens.push(Token {
                        token_type: TokenType::Number,
                        value,
                        position: start,
                    });
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = position;
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        value.push(c);
                        chars.next();
                        position += 1;
                    } else {
                        break;
                    }
                }
                let upper = value.to_uppercase();
                let token_type = keywords
                    .get(&upper)
                    .cloned()
                    .unwrap_or(TokenType::Identifier);
                tokens.push(Token {
                    token_type,
                    value,
                    position: start,
                });
            }
            _ => {
                return Err(SqlError::parse_error(
                    format!("unexpected character '{}'", ch),
                    Some(position),
                ));
            }
        }
    }

    tokens.push(Token {
        token_type: TokenType::Eof,
        value: String::new(),
        position,
    });
    Ok(tokens)
}
