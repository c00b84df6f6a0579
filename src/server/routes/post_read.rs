use axum::{extract::State, Json};
use axum_extra::extract::WithRejection;

use crate::data::{single_query_read, QueryContext, Row};
use crate::server::{api::ReadRequest, AppState, ServerError};

#[axum_macros::debug_handler]
pub async fn post_read(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<ReadRequest>, ServerError>,
) -> Result<Json<Row>, ServerError> {
    let ctx = QueryContext {
        meta: state.meta.as_ref(),
        executor: state.executor.as_ref(),
        cache: state.cache.as_ref(),
        defaults: state.defaults.clone(),
        strict: request.strict,
    };

    let row = single_query_read(
        &ctx,
        &request.table_id,
        request.view_id.as_deref(),
        &request.row_id,
        &request.params,
    )
    .await?;

    row.map(Json).ok_or_else(|| {
        ServerError::NotFound(format!(
            "Row {} not found in table {}",
            request.row_id, request.table_id
        ))
    })
}
