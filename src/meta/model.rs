use serde::{Deserialize, Serialize};

use super::column::Column;

/// A table: an ordered set of columns plus enough bookkeeping to identify
/// rows (primary keys, display value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub title: String,
    /// Name of the backing database table
    pub table_name: String,
    /// Bumped whenever the table shape changes; part of the compiled query
    /// cache scope key
    #[serde(default)]
    pub version: u32,
    pub columns: Vec<Column>,
}

impl Model {
    pub fn primary_keys(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// The display value column, falling back to the primary key.
    pub fn display_column(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.display_value)
            .or_else(|| self.primary_key())
    }

    pub fn column_by_id(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn column_by_title(&self, title: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.title == title)
    }

    /// Resolve a request-supplied field reference, which may be either a
    /// column id or a column title.
    pub fn column_by_ref(&self, field: &str) -> Option<&Column> {
        self.column_by_title(field).or_else(|| self.column_by_id(field))
    }
}
