use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A filter tree node: either a leaf comparison against one column, or a
/// group combining child filters with a logical operator. Groups nest
/// arbitrarily; leaves always resolve to exactly one column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Group {
        #[serde(default)]
        logical_op: LogicalOp,
        children: Vec<Filter>,
    },
    Leaf {
        /// Column id or title
        field: String,
        op: FilterOp,
        #[serde(default)]
        value: serde_json::Value,
    },
}

impl Filter {
    pub fn and_group(children: Vec<Filter>) -> Filter {
        Filter::Group {
            logical_op: LogicalOp::And,
            children,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogicalOp {
    #[default]
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    #[strum(serialize = "gte", serialize = "ge")]
    Gte,
    Lt,
    #[strum(serialize = "lte", serialize = "le")]
    Lte,
    Like,
    Nlike,
    In,
    Null,
    #[strum(serialize = "notnull")]
    #[serde(rename = "notnull")]
    NotNull,
    Empty,
    #[strum(serialize = "notempty")]
    #[serde(rename = "notempty")]
    NotEmpty,
    Checked,
    #[strum(serialize = "notchecked")]
    #[serde(rename = "notchecked")]
    NotChecked,
}
