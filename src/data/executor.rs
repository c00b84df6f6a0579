use std::{
    error::Error,
    fmt::{Display, Formatter},
};

use axum::async_trait;

/// One result row, decoded to JSON by the backend connection.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A runtime value bound into a cached statement: the row id, limit, or
/// offset. Everything else is inlined at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Int(i64),
}

impl BindValue {
    /// Render as an escaped SQL literal.
    pub fn to_literal(&self) -> String {
        match self {
            BindValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            BindValue::Int(n) => n.to_string(),
        }
    }
}

/// Backend connection. `execute` takes a parameterized statement plus the
/// values for its `$n` markers and returns decoded rows.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, sql: &str, params: &[BindValue]) -> Result<Vec<Row>, ExecuteError>;

    /// Connectivity probe used by the health endpoint.
    async fn ping(&self) -> bool {
        self.execute("SELECT 1", &[]).await.is_ok()
    }
}

#[derive(Debug)]
pub struct ExecuteError(pub String);

impl Display for ExecuteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Query execution failed: {}", self.0)
    }
}

impl Error for ExecuteError {}
