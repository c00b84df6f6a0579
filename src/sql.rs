pub mod ast;
pub mod query_builder;

pub use query_builder::{
    FieldMask, Projected, QueryBuilder, QueryBuilderError, NESTED_LIMIT, ROOT_ALIAS,
};
