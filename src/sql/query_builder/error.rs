use std::{
    error::Error,
    fmt::{Display, Formatter},
};

use crate::meta::MetaError;

#[derive(Debug)]
pub enum QueryBuilderError {
    Internal(String),
    Meta(MetaError),
    /// A filter or sort referenced a field that does not exist on the table;
    /// only raised when strict validation is requested
    UnknownField(String, String),
    /// Nested field selection referenced a column that does not exist
    UnknownNestedField(String, String),
    InvalidLookup(String),
    InvalidRollup(String),
    /// Formula expression that cannot be translated to SQL
    FormulaCompile(String),
    /// Malformed where-clause string; only raised under strict validation
    InvalidWhere(String),
}

impl Display for QueryBuilderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryBuilderError::Internal(message) => write!(f, "Internal error: {}", message),
            QueryBuilderError::Meta(err) => write!(f, "{}", err),
            QueryBuilderError::UnknownField(field, model) => {
                write!(f, "Unknown field \"{}\" on table {}", field, model)
            }
            QueryBuilderError::UnknownNestedField(field, model) => {
                write!(f, "Unknown nested field \"{}\" on table {}", field, model)
            }
            QueryBuilderError::InvalidLookup(column) => {
                write!(f, "Lookup column {} has no usable relation", column)
            }
            QueryBuilderError::InvalidRollup(column) => {
                write!(f, "Rollup column {} has no usable relation", column)
            }
            QueryBuilderError::FormulaCompile(message) => {
                write!(f, "Cannot compile formula: {}", message)
            }
            QueryBuilderError::InvalidWhere(message) => {
                write!(f, "Invalid where clause: {}", message)
            }
        }
    }
}

impl Error for QueryBuilderError {}

impl From<MetaError> for QueryBuilderError {
    fn from(err: MetaError) -> Self {
        QueryBuilderError::Meta(err)
    }
}
