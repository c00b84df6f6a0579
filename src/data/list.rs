use std::time::{Duration, Instant};

use serde::Serialize;
use serde_with::skip_serializing_none;
use tracing::{info_span, Instrument};

use super::cache::{self, CacheOp, QueryCacheKey};
use super::executor::{BindValue, Row};
use super::params::{self, ListParams};
use super::{aggregated_filters, DataError, QueryContext};
use crate::meta::{Column, ColumnKind, Filter, Model, Sort};
use crate::sql::ast::{
    Expr, Function, FunctionArgExpr, Ident, ObjectName, OrderByExpr, Query, SelectItem,
    Statement, TableFactor, TableWithJoins, Value,
};
use crate::sql::query_builder::{condition, sorting, sql_function};
use crate::sql::{QueryBuilder, ROOT_ALIAS};

#[derive(Debug, Clone, Serialize)]
pub struct PagedResponse {
    pub list: Vec<Row>,
    pub page_info: PageInfo,
    pub stats: QueryStats,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    /// Absent when the count query was excluded or abandoned past its
    /// deadline
    pub total_rows: Option<i64>,
    pub limit: u64,
    pub offset: u64,
    pub is_first_page: bool,
    pub is_last_page: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryStats {
    pub db_query_time_ms: u64,
}

/// List rows through a view: one compiled statement for the page, a
/// structurally parallel count query raced against a deadline. Pagination
/// values are planned as placeholders so the compiled text can be replayed
/// with any window.
pub async fn single_query_list(
    ctx: &QueryContext<'_>,
    model_id: &str,
    view_id: Option<&str>,
    params: &ListParams,
    custom_conditions: Option<&[Filter]>,
) -> Result<PagedResponse, DataError> {
    let model = ctx.meta.get_model(model_id).await?;
    let view = match view_id {
        Some(id) => Some(ctx.meta.get_view(id).await?),
        None => None,
    };

    let limit = params::clamp_limit(params.limit, &ctx.defaults);
    let offset = params.offset.unwrap_or(0);
    let skip_cache = should_skip_cache(params) || custom_conditions.is_some();

    let list_key = QueryCacheKey {
        model_id: model.id.clone(),
        view_id: view.as_ref().map(|v| v.id.clone()),
        model_version: model.version,
        op: CacheOp::List,
    };
    let count_key = QueryCacheKey {
        op: CacheOp::Count,
        ..list_key.clone()
    };

    if !skip_cache {
        if let (Some(data_sql), Some(count_sql)) = (ctx.cache.get(&list_key), ctx.cache.get(&count_key))
        {
            return run(
                ctx,
                &data_sql,
                &[BindValue::Int(limit as i64), BindValue::Int(offset as i64)],
                Some(&count_sql),
                limit,
                offset,
                params.exclude_count,
            )
            .await;
        }
    }

    // root subquery over the raw table, carrying filters, ordering and the
    // pagination window; the count query shares the filter pipeline
    let table = &model.table_name;
    let mut root = Query::new(vec![SelectItem::Wildcard]).from(vec![TableWithJoins {
        relation: TableFactor::Table {
            name: ObjectName(vec![Ident::quoted(table)]),
            alias: None,
        },
        joins: vec![],
    }]);
    let mut count = Query::new(vec![SelectItem::ExprWithAlias {
        expr: count_expr(&model),
        alias: Ident::quoted("count"),
    }])
    .from(vec![TableWithJoins {
        relation: TableFactor::Table {
            name: ObjectName(vec![Ident::quoted(table)]),
            alias: None,
        },
        joins: vec![],
    }]);

    let filters = aggregated_filters(
        ctx,
        view.as_ref(),
        params.filter_arr.as_deref(),
        params.where_clause.as_deref(),
        custom_conditions,
    )
    .await?;
    condition::apply_filters(&mut root, &filters, &model, table, ctx.strict)?;
    condition::apply_filters(&mut count, &filters, &model, table, ctx.strict)?;

    if params.shuffle {
        root.push_order_by(OrderByExpr {
            expr: sql_function("random", vec![]),
            asc: None,
            nulls_first: None,
        });
    }

    // sort precedence: request sort string, then the structured sort list,
    // then the view's persisted sorts
    let sorts: Vec<Sort> = if let Some(sort) = params.sort.as_deref() {
        params::parse_sort_string(sort)
    } else if let Some(arr) = params.sort_arr.as_deref().filter(|arr| !arr.is_empty()) {
        arr.to_vec()
    } else if let Some(view) = view.as_ref() {
        ctx.meta.sorts(&view.id).await?
    } else {
        vec![]
    };

    sorting::apply_sorts(&mut root, &sorts, &model, table, ctx.strict)?;
    if let Some(order_column) = default_order(&model) {
        root.push_order_by(OrderByExpr {
            expr: Expr::CompoundIdentifier(vec![
                Ident::quoted(table),
                Ident::quoted(&order_column.column_name),
            ]),
            asc: Some(true),
            nulls_first: None,
        });
    }

    if skip_cache {
        root.set_limit(Value::Number(limit.to_string()));
        root.set_offset(Value::Number(offset.to_string()));
    } else {
        root.set_limit(Value::SingleQuotedString(cache::placeholder(0)));
        root.set_offset(Value::SingleQuotedString(cache::placeholder(1)));
    }

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

    // re-apply ordering on the outer query so the lateral joins cannot
    // disturb the page order
    sorting::apply_sorts(&mut query, &sorts, &model, ROOT_ALIAS, ctx.strict)?;
    if let Some(order_column) = default_order(&model) {
        query.push_order_by(OrderByExpr {
            expr: Expr::CompoundIdentifier(vec![
                Ident::quoted(ROOT_ALIAS),
                Ident::quoted(&order_column.column_name),
            ]),
            asc: Some(true),
            nulls_first: None,
        });
    }

    let data_sql = Statement(query).to_string();
    let count_sql = Statement(count).to_string();

    if skip_cache {
        return run(ctx, &data_sql, &[], Some(&count_sql), limit, offset, params.exclude_count)
            .await;
    }

    match cache::parameterize(&data_sql, 2) {
        Some(parameterized) => {
            ctx.cache.set(list_key, parameterized.clone());
            ctx.cache.set(count_key, count_sql.clone());
            run(
                ctx,
                &parameterized,
                &[BindValue::Int(limit as i64), BindValue::Int(offset as i64)],
                Some(&count_sql),
                limit,
                offset,
                params.exclude_count,
            )
            .await
        }
        None => {
            // sentinel collided with user data; execute uncached
            let bound = cache::bind_sentinels(
                &data_sql,
                &[BindValue::Int(limit as i64), BindValue::Int(offset as i64)],
            );
            run(ctx, &bound, &[], Some(&count_sql), limit, offset, params.exclude_count).await
        }
    }
}

/// Execute the page query and its count companion concurrently. The count
/// is best effort: past the configured deadline it is abandoned (the future
/// is dropped, not the backend query) and reported as unknown.
async fn run(
    ctx: &QueryContext<'_>,
    data_sql: &str,
    data_params: &[BindValue],
    count_sql: Option<&str>,
    limit: u64,
    offset: u64,
    exclude_count: bool,
) -> Result<PagedResponse, DataError> {
    let data_fut = async {
        let started = Instant::now();
        let rows = ctx
            .executor
            .execute(data_sql, data_params)
            .instrument(info_span!("execute_query"))
            .await?;
        Ok::<_, DataError>((rows, started.elapsed()))
    };

    let count_fut = async {
        if exclude_count {
            return Ok::<_, DataError>(None);
        }
        let Some(count_sql) = count_sql else {
            return Ok(None);
        };
        let deadline = Duration::from_millis(ctx.defaults.count_timeout_ms);
        match tokio::time::timeout(
            deadline,
            ctx.executor
                .execute(count_sql, &[])
                .instrument(info_span!("execute_count_query")),
        )
        .await
        {
            Ok(rows) => Ok(rows?.first().and_then(read_count)),
            Err(_elapsed) => {
                tracing::warn!(timeout_ms = ctx.defaults.count_timeout_ms, "count query abandoned");
                Ok(None)
            }
        }
    };

    let (data_res, count_res) = tokio::join!(data_fut, count_fut);
    let (rows, elapsed) = data_res?;
    let total_rows = count_res?;

    let is_last_page = total_rows.map(|total| offset + rows.len() as u64 >= total.max(0) as u64);
    Ok(PagedResponse {
        page_info: PageInfo {
            total_rows,
            limit,
            offset,
            is_first_page: offset == 0,
            is_last_page,
        },
        stats: QueryStats {
            db_query_time_ms: elapsed.as_millis() as u64,
        },
        list: rows,
    })
}

fn read_count(row: &Row) -> Option<i64> {
    match row.get("count") {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// Requests carrying any ad hoc parameter always recompile; only the plain
/// table/view read populates and reuses the compiled statement.
fn should_skip_cache(params: &ListParams) -> bool {
    params.where_clause.is_some()
        || params.filter_arr.as_deref().is_some_and(|arr| !arr.is_empty())
        || params.sort_arr.as_deref().is_some_and(|arr| !arr.is_empty())
        || params.sort.is_some()
        || params.fields.is_some()
        || params.nested.is_some()
        || params.shuffle
}

fn count_expr(model: &Model) -> Expr {
    let arg = match model.primary_key() {
        Some(pk) => FunctionArgExpr::Expr(Expr::CompoundIdentifier(vec![
            Ident::quoted(&model.table_name),
            Ident::quoted(&pk.column_name),
        ])),
        None => FunctionArgExpr::Wildcard,
    };
    Expr::Function(Function {
        name: ObjectName(vec![Ident::unquoted("count")]),
        args: vec![arg],
        distinct: false,
    })
}

/// Default ordering: the auto increment primary key when there is one,
/// otherwise the system created-time column, otherwise unordered.
fn default_order(model: &Model) -> Option<&Column> {
    if let Some(pk) = model.primary_key() {
        if pk.auto_increment {
            return Some(pk);
        }
    }
    model
        .columns
        .iter()
        .find(|c| c.system && matches!(c.kind, ColumnKind::CreatedTime) && !c.column_name.is_empty())
}
