pub mod cache;
pub mod executor;
pub mod list;
pub mod params;
pub mod read;
pub mod xwhere;

use std::{
    error::Error,
    fmt::{Display, Formatter},
};

pub use cache::{CacheOp, CompiledQueryCache, QueryCacheKey};
pub use executor::{BindValue, ExecuteError, Executor, Row};
pub use list::{single_query_list, PageInfo, PagedResponse, QueryStats};
pub use params::{ListParams, NestedParams, QueryDefaults, ReadParams};
pub use read::single_query_read;

use crate::meta::{MetaError, MetaStore};
use crate::sql::QueryBuilderError;

/// Everything an orchestrator needs for one request: the metadata store,
/// the backend connection, the process-wide compiled query cache, and the
/// query defaults.
pub struct QueryContext<'a> {
    pub meta: &'a dyn MetaStore,
    pub executor: &'a dyn Executor,
    pub cache: &'a CompiledQueryCache,
    pub defaults: QueryDefaults,
    /// Reject requests referencing unknown fields instead of silently
    /// dropping them from predicates and sorts
    pub strict: bool,
}

#[derive(Debug)]
pub enum DataError {
    Query(QueryBuilderError),
    Meta(MetaError),
    /// Backend execution failure; propagated unchanged to the caller
    Execute(ExecuteError),
    InvalidRequest(String),
}

impl Display for DataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::Query(err) => write!(f, "{}", err),
            DataError::Meta(err) => write!(f, "{}", err),
            DataError::Execute(err) => write!(f, "{}", err),
            DataError::InvalidRequest(message) => write!(f, "Invalid request: {}", message),
        }
    }
}

impl Error for DataError {}

impl From<QueryBuilderError> for DataError {
    fn from(err: QueryBuilderError) -> Self {
        DataError::Query(err)
    }
}

impl From<MetaError> for DataError {
    fn from(err: MetaError) -> Self {
        DataError::Meta(err)
    }
}

impl From<ExecuteError> for DataError {
    fn from(err: ExecuteError) -> Self {
        DataError::Execute(err)
    }
}

/// Combine the view's persisted root filters, caller-supplied custom
/// conditions, the structured ad hoc filter list, and the parsed
/// where-clause into one list of AND-ed groups.
pub(crate) async fn aggregated_filters(
    ctx: &QueryContext<'_>,
    view: Option<&crate::meta::View>,
    filter_arr: Option<&[crate::meta::Filter]>,
    where_clause: Option<&str>,
    custom_conditions: Option<&[crate::meta::Filter]>,
) -> Result<Vec<crate::meta::Filter>, DataError> {
    use crate::meta::Filter;

    let mut filters = Vec::new();
    if let Some(view) = view {
        let view_filters = ctx.meta.root_filters(&view.id).await?;
        if !view_filters.is_empty() {
            filters.push(Filter::and_group(view_filters));
        }
    }
    if let Some(custom) = custom_conditions {
        if !custom.is_empty() {
            filters.push(Filter::and_group(custom.to_vec()));
        }
    }
    if let Some(arr) = filter_arr {
        if !arr.is_empty() {
            filters.push(Filter::and_group(arr.to_vec()));
        }
    }
    if let Some(where_clause) = where_clause {
        match xwhere::parse_where(where_clause) {
            Ok(parsed) => {
                if !parsed.is_empty() {
                    filters.push(Filter::and_group(parsed));
                }
            }
            Err(err) => {
                if ctx.strict {
                    return Err(DataError::InvalidRequest(err.to_string()));
                }
            }
        }
    }
    Ok(filters)
}
