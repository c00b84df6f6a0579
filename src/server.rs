pub mod api;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

mod client;
mod config;
mod error;
mod routes;

pub use client::PgExecutor;
pub use config::Config;
pub use error::ServerError;

use crate::data::{CompiledQueryCache, Executor, QueryDefaults};
use crate::meta::StaticMetaStore;

use self::routes::*;

#[derive(Clone)]
pub struct AppState {
    pub meta: Arc<StaticMetaStore>,
    pub executor: Arc<dyn Executor>,
    pub cache: Arc<CompiledQueryCache>,
    pub defaults: QueryDefaults,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query/list", post(post_list))
        .route("/query/read", post(post_read))
        .route("/health", get(get_health))
        .with_state(state)
}
