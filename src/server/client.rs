use axum::async_trait;
use tokio_postgres::{types::Type, Client, NoTls, Row as PgRow};

use crate::data::{cache, BindValue, ExecuteError, Executor, Row};

/// Backend connection over the Postgres wire protocol.
pub struct PgExecutor {
    client: Client,
}

impl PgExecutor {
    /// Connect using a connection url and drive the connection task in the
    /// background.
    pub async fn connect(url: &str) -> Result<Self, ExecuteError> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|err| ExecuteError(err.to_string()))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!("connection error: {err}");
            }
        });

        Ok(Self { client })
    }
}

#[async_trait]
impl Executor for PgExecutor {
    async fn execute(&self, sql: &str, params: &[BindValue]) -> Result<Vec<Row>, ExecuteError> {
        // cached statements carry $n markers for the row id / limit /
        // offset; splice the runtime values in as escaped literals, the
        // same way the rest of the statement was rendered
        let sql = if params.is_empty() {
            sql.to_owned()
        } else {
            cache::bind(sql, params)
        };

        let rows = self
            .client
            .query(&sql, &[])
            .await
            .map_err(|err| ExecuteError(err.to_string()))?;

        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &PgRow) -> Row {
    let mut map = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(
            column.name().to_owned(),
            column_value(row, index, column.type_()),
        );
    }
    map
}

fn column_value(row: &PgRow, index: usize, ty: &Type) -> serde_json::Value {
    use serde_json::Value;

    if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(index)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)
            .ok()
            .flatten()
            .and_then(|v| serde_json::Number::from_f64(v as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<Value>>(index)
            .ok()
            .flatten()
            .unwrap_or(Value::Null)
    } else if let Ok(Some(text)) = row.try_get::<_, Option<String>>(index) {
        Value::String(text)
    } else {
        tracing::debug!(column_type = %ty, "unhandled column type decoded as null");
        Value::Null
    }
}
