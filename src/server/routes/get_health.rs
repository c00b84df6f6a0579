use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::server::AppState;

#[axum_macros::debug_handler]
pub async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    if state.executor.ping().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::GATEWAY_TIMEOUT
    }
}
