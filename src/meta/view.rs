use serde::{Deserialize, Serialize};

use super::filter::Filter;
use super::sort::Sort;

/// An ordering/visibility projection over a table's columns, plus a filter
/// tree and sort list that apply to every read through the view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    pub model_id: String,
    /// Visible columns, in display order
    pub shown_column_ids: Vec<String>,
    /// Persisted root filters; combined as one AND group with any
    /// request-level filters
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sorts: Vec<Sort>,
}
