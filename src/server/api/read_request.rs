use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::data::ReadParams;

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    pub table_id: String,
    pub view_id: Option<String>,
    /// Primary key value; composite keys join their parts with `___`
    pub row_id: String,
    #[serde(default)]
    pub params: ReadParams,
    #[serde(default)]
    pub strict: bool,
}
