use std::fmt;

/// Errors that can occur during SQL parsing and query execution
#[derive(Debug, Clone)]
pub enum SqlError {
    /// SQL parsing errors
    ParseError {
        message: String,
        position: Option<usize>,
    },

    /// Schema and binding errors (bad URI, unknown scheme, unresolvable table)
    SchemaError {
        message: String,
        table: Option<String>,
    },

    /// Embedded-engine execution errors; carries the compiled SQL for post-mortem
    ExecutionError {
        message: String,
        query: Option<String>,
    },

    /// Source acquisition and read errors
    SourceError {
        source_name: String,
        message: String,
    },

    /// Window lifecycle errors (creation, attachment)
    WindowError { message: String },

    /// Output and other I/O errors
    IoError { message: String },
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlError::ParseError { message, position } => {
                if let Some(pos) = position {
                    write!(f, "SQL parse error at position {}: {}", pos, message)
                } else {
                    write!(f, "SQL parse error: {}", message)
                }
            }
            SqlError::SchemaError { message, table } => {
                if let Some(t) = table {
                    write!(f, "Schema error for table '{}': {}", t, message)
                } else {
                    write!(f, "Schema error: {}", message)
                }
            }
            SqlError::ExecutionError { message, query } => {
                if let Some(q) = query {
                    write!(f, "Query execution error: {}\nSQL: {}", message, q)
                } else {
                    write!(f, "Query execution error: {}", message)
                }
            }
            SqlError::SourceError {
                source_name,
                message,
            } => {
                write!(f, "Source error for '{}': {}", source_name, message)
            }
            SqlError::WindowError { message } => write!(f, "Window error: {}", message),
            SqlError::IoError { message } => write!(f, "I/O error: {}", message),
        }
    }
}

impl std::error::Error for SqlError {}

impl SqlError {
    /// Create a parse error with an optional character position
    pub fn parse_error(message: impl Into<String>, position: Option<usize>) -> Self {
        SqlError::ParseError {
            message: message.into(),
            position,
        }
    }

    /// Create a schema/binding error
    pub fn schema_error(message: impl Into<String>, table: Option<String>) -> Self {
        SqlError::SchemaError {
            message: message.into(),
            table,
        }
    }

    /// Create an execution error, optionally carrying the compiled SQL
    pub fn execution_error(message: impl Into<String>, query: Option<String>) -> Self {
        SqlError::ExecutionError {
            message: message.into(),
            query,
        }
    }

    /// Create a source error
    pub fn source_error(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        SqlError::SourceError {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a window error
    pub fn window_error(message: impl Into<String>) -> Self {
        SqlError::WindowError {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io_error(message: impl Into<String>) -> Self {
        SqlError::IoError {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for SqlError {
    fn from(e: std::io::Error) -> Self {
        SqlError::IoError {
            message: e.to_string(),
        }
    }
}

/// Result type for SQL operations
pub type SqlResult<T> = Result<T, SqlError>;
