use axum::{extract::State, Json};
use axum_extra::extract::WithRejection;

use crate::data::{single_query_list, PagedResponse, QueryContext};
use crate::server::{api::ListRequest, AppState, ServerError};

#[axum_macros::debug_handler]
pub async fn post_list(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<ListRequest>, ServerError>,
) -> Result<Json<PagedResponse>, ServerError> {
    let ctx = QueryContext {
        meta: state.meta.as_ref(),
        executor: state.executor.as_ref(),
        cache: state.cache.as_ref(),
        defaults: state.defaults.clone(),
        strict: request.strict,
    };

    let response = single_query_list(
        &ctx,
        &request.table_id,
        request.view_id.as_deref(),
        &request.params,
        None,
    )
    .await?;

    Ok(Json(response))
}
