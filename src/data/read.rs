use tracing::{info_span, Instrument};

use super::cache::{self, CacheOp, QueryCacheKey};
use super::executor::{BindValue, Row};
use super::params::{self, ReadParams};
use super::{aggregated_filters, DataError, QueryContext};
use crate::sql::ast::{
    Expr, Ident, ObjectName, Query, SelectItem, Statement, TableFactor, TableWithJoins, Value,
};
use crate::sql::query_builder::condition;
use crate::sql::{QueryBuilder, ROOT_ALIAS};

/// Read one row by primary key. The key value is planned as a placeholder
/// and only substituted at execution time, so the compiled statement can be
/// cached and replayed with any row id.
pub async fn single_query_read(
    ctx: &QueryContext<'_>,
    model_id: &str,
    view_id: Option<&str>,
    row_id: &str,
    params: &ReadParams,
) -> Result<Option<Row>, DataError> {
    let model = ctx.meta.get_model(model_id).await?;
    let view = match view_id {
        Some(id) => Some(ctx.meta.get_view(id).await?),
        None => None,
    };

    let primary_keys = model.primary_keys();
    if primary_keys.is_empty() {
        return Err(DataError::InvalidRequest(format!(
            "table {} has no primary key",
            model.title
        )));
    }
    let id_values = split_row_id(row_id);
    if id_values.len() != primary_keys.len() {
        return Err(DataError::InvalidRequest(format!(
            "row id {:?} does not match the table's {} primary key column(s)",
            row_id,
            primary_keys.len()
        )));
    }
    let bind_values: Vec<BindValue> = id_values.into_iter().map(BindValue::Text).collect();

    // ad hoc parameters always recompile; only parameterless reads reuse
    // the compiled statement
    let skip_cache = params.where_clause.is_some()
        || params.filter_arr.is_some()
        || params.fields.is_some()
        || params.nested.is_some();

    let cache_key = QueryCacheKey {
        model_id: model.id.clone(),
        view_id: view.as_ref().map(|v| v.id.clone()),
        model_version: model.version,
        op: CacheOp::Read,
    };

    if !skip_cache {
        if let Some(cached) = ctx.cache.get(&cache_key) {
            let rows = ctx
                .executor
                .execute(&cached, &bind_values)
                .instrument(info_span!("execute_query", cached = true))
                .await?;
            return Ok(rows.into_iter().next());
        }
    }

    // root subquery over the raw table: primary key placeholders plus the
    // aggregated filters
    let mut root = Query::new(vec![SelectItem::Wildcard]).from(vec![TableWithJoins {
        relation: TableFactor::Table {
            name: ObjectName(vec![Ident::quoted(&model.table_name)]),
            alias: None,
        },
        joins: vec![],
    }]);
    for (index, pk) in primary_keys.iter().enumerate() {
        root.and_predicate(Expr::BinaryOp {
            left: Box::new(Expr::CompoundIdentifier(vec![
                Ident::quoted(&model.table_name),
                Ident::quoted(&pk.column_name),
            ])),
            op: crate::sql::ast::BinaryOperator::Eq,
            right: Box::new(Expr::Value(Value::SingleQuotedString(cache::placeholder(
                index,
            )))),
        });
    }
    let filters = aggregated_filters(
        ctx,
        view.as_ref(),
        params.filter_arr.as_deref(),
        params.where_clause.as_deref(),
        None,
    )
    .await?;
    condition::apply_filters(&mut root, &filters, &model, &model.table_name, ctx.strict)?;

    let mut query = Query::new(vec![]).from(vec![TableWithJoins {
        relation: TableFactor::Derived {
            subquery: root.boxed(),
            alias: Some(Ident::quoted(ROOT_ALIAS)),
        },
        joins: vec![],
    }]);

    let mask = params::root_mask(params.fields.as_deref(), &model, view.as_ref());
    let mut builder = QueryBuilder::new(ctx.meta, &ctx.defaults, ctx.strict);
    builder
        .extract_columns(&mut query, &model, ROOT_ALIAS, &mask, params.nested.as_ref(), 0)
        .await?;
    query.set_limit(Value::Number("1".to_owned()));

    let sql = Statement(query).to_string();

    let rows = match cache::parameterize(&sql, primary_keys.len()) {
        Some(parameterized) => {
            if !skip_cache {
                ctx.cache.set(cache_key, parameterized.clone());
            }
            ctx.executor
                .execute(&parameterized, &bind_values)
                .instrument(info_span!("execute_query"))
                .await?
        }
        None => {
            // sentinel collided with user data; execute this one uncached
            let bound = cache::bind_sentinels(&sql, &bind_values);
            ctx.executor
                .execute(&bound, &[])
                .instrument(info_span!("execute_query"))
                .await?
        }
    };

    Ok(rows.into_iter().next())
}

/// Composite row ids join their parts with `___`; literal underscores are
/// escaped as `\_`.
fn split_row_id(row_id: &str) -> Vec<String> {
    row_id
        .split("___")
        .map(|part| part.replace("\\_", "_"))
        .collect()
}
