use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::data::ListParams;

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRequest {
    pub table_id: String,
    /// Read through a view; its persisted filters and sorts always apply
    pub view_id: Option<String>,
    #[serde(default)]
    pub params: ListParams,
    /// Reject parameters referencing unknown fields instead of dropping
    /// them
    #[serde(default)]
    pub strict: bool,
}
