use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::data::DataError;
use crate::meta::MetaError;
use crate::sql::QueryBuilderError;

use super::api::error_response::{ErrorResponse, ErrorResponseType};

pub enum ServerError {
    BadRequest(String),
    NotFound(String),
    UncaughtError(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponseType::InvalidRequest,
                message,
            ),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponseType::NotFound,
                message,
            ),
            Self::UncaughtError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponseType::UncaughtError,
                message,
            ),
        };
        (
            status,
            axum::Json(ErrorResponse {
                message,
                error_type,
            }),
        )
            .into_response()
    }
}

impl From<DataError> for ServerError {
    fn from(err: DataError) -> Self {
        match &err {
            DataError::InvalidRequest(_) => Self::BadRequest(err.to_string()),
            DataError::Meta(meta) => match meta {
                MetaError::ModelNotFound(_) | MetaError::ViewNotFound(_) => {
                    Self::NotFound(err.to_string())
                }
                _ => Self::BadRequest(err.to_string()),
            },
            DataError::Query(query) => match query {
                QueryBuilderError::UnknownField(..)
                | QueryBuilderError::UnknownNestedField(..)
                | QueryBuilderError::InvalidWhere(_) => Self::BadRequest(err.to_string()),
                _ => Self::UncaughtError(err.to_string()),
            },
            // backend failures surface unchanged
            DataError::Execute(_) => Self::UncaughtError(err.to_string()),
        }
    }
}

impl From<MetaError> for ServerError {
    fn from(err: MetaError) -> Self {
        ServerError::from(DataError::Meta(err))
    }
}

impl From<JsonRejection> for ServerError {
    fn from(err: JsonRejection) -> Self {
        Self::BadRequest(err.to_string())
    }
}
