use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::meta::{Model, Sort, SortDirection, View};
use crate::sql::FieldMask;

/// Window defaults and the count deadline, configurable per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDefaults {
    #[serde(default = "default_limit")]
    pub limit_default: u64,
    #[serde(default = "default_limit_min")]
    pub limit_min: u64,
    #[serde(default = "default_limit_max")]
    pub limit_max: u64,
    /// Wall-clock budget for the count query; past it the count is reported
    /// as unknown rather than blocking the page
    #[serde(default = "default_count_timeout")]
    pub count_timeout_ms: u64,
}

fn default_limit() -> u64 {
    25
}
fn default_limit_min() -> u64 {
    1
}
fn default_limit_max() -> u64 {
    1000
}
fn default_count_timeout() -> u64 {
    3000
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            limit_default: default_limit(),
            limit_min: default_limit_min(),
            limit_max: default_limit_max(),
            count_timeout_ms: default_count_timeout(),
        }
    }
}

/// Recognized options of a list request.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListParams {
    /// Where-clause string, e.g. `(Active,eq,true)~and(Amount,gt,10)`
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    /// Structured ad hoc filters, combined as one AND group with the view's
    /// persisted filters and the where-clause
    pub filter_arr: Option<Vec<crate::meta::Filter>>,
    /// Structured ad hoc sorts
    pub sort_arr: Option<Vec<Sort>>,
    /// Sort string: comma-separated column titles, `-` prefix for
    /// descending
    pub sort: Option<String>,
    /// Comma-separated column titles, or `*` for all visible columns
    pub fields: Option<String>,
    /// Per-relation options, keyed by the relation column's title
    pub nested: Option<IndexMap<String, NestedParams>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub exclude_count: bool,
}

/// Recognized options of a read-one request.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadParams {
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub filter_arr: Option<Vec<crate::meta::Filter>>,
    pub fields: Option<String>,
    pub nested: Option<IndexMap<String, NestedParams>>,
}

/// Options scoped to one relation column of a read:
/// `nested.<columnTitle>.{where,sort,fields,limit,offset}`.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NestedParams {
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub sort: Option<String>,
    pub fields: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Options for relations reached through this one
    pub nested: Option<IndexMap<String, NestedParams>>,
}

/// Clamp a requested page size between the configured bounds, falling back
/// to the default window.
pub fn clamp_limit(requested: Option<u64>, defaults: &QueryDefaults) -> u64 {
    let limit = match requested {
        Some(0) | None => defaults.limit_default,
        Some(limit) => limit,
    };
    limit.clamp(defaults.limit_min, defaults.limit_max)
}

/// Parse a sort string: comma-separated fields, `-` prefix for descending.
pub fn parse_sort_string(sort: &str) -> Vec<Sort> {
    sort.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != "-")
        .map(|part| match part.strip_prefix('-') {
            Some(field) => Sort {
                field: field.to_owned(),
                direction: SortDirection::Desc,
            },
            None => Sort {
                field: part.to_owned(),
                direction: SortDirection::Asc,
            },
        })
        .collect()
}

/// Build the root field mask for a read: the explicit field list when one
/// is present, every visible column otherwise. The primary key and display
/// value are always included so a row can be identified.
pub fn root_mask(fields: Option<&str>, model: &Model, view: Option<&View>) -> FieldMask {
    let mut titles: Vec<String> = Vec::new();

    match fields {
        Some(fields) if fields != "*" => {
            for part in fields.split(',').map(str::trim) {
                if let Some(column) = model.column_by_ref(part) {
                    titles.push(column.title.clone());
                }
            }
        }
        _ => match view {
            Some(view) => {
                for id in &view.shown_column_ids {
                    if let Some(column) = model.column_by_id(id) {
                        titles.push(column.title.clone());
                    }
                }
            }
            None => titles.extend(model.columns.iter().map(|c| c.title.clone())),
        },
    }

    for column in &model.columns {
        if (column.primary_key || column.display_value) && !titles.contains(&column.title) {
            titles.push(column.title.clone());
        }
    }

    FieldMask::from_titles(titles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_limit_between_bounds() {
        let defaults = QueryDefaults::default();
        assert_eq!(clamp_limit(None, &defaults), 25);
        assert_eq!(clamp_limit(Some(0), &defaults), 25);
        assert_eq!(clamp_limit(Some(5000), &defaults), 1000);
        assert_eq!(clamp_limit(Some(10), &defaults), 10);
    }

    #[test]
    fn parses_sort_strings() {
        let sorts = parse_sort_string("Title,-Amount");
        assert_eq!(sorts.len(), 2);
        assert_eq!(sorts[0].field, "Title");
        assert_eq!(sorts[0].direction, SortDirection::Asc);
        assert_eq!(sorts[1].field, "Amount");
        assert_eq!(sorts[1].direction, SortDirection::Desc);
    }
}
