use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use strum::{Display, EnumString};

/// One field of a table. Virtual columns (links, lookups, formulas, rollups)
/// have no backing storage column of their own; everything they need to
/// produce a value lives in their kind options.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Stable identifier, also used as the output key of the projected value
    pub id: String,
    /// Display title, used to address the column in request parameters
    pub title: String,
    /// Name of the backing table column. Empty for virtual columns.
    #[serde(default)]
    pub column_name: String,
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// Auto incrementing primary key
    #[serde(default)]
    pub auto_increment: bool,
    /// Whether this column is the display value of its table
    #[serde(default)]
    pub display_value: bool,
    pub kind: ColumnKind,
}

impl Column {
    /// Output key under which this column's value appears in a row object.
    pub fn output_key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnKind {
    Scalar { data_type: DataType },
    Link(LinkOptions),
    Lookup(LookupOptions),
    Formula(FormulaOptions),
    Rollup(RollupOptions),
    Links(LinksOptions),
    Barcode { value_column_id: Option<String> },
    QrCode { value_column_id: Option<String> },
    Attachment,
    CreatedTime,
    LastModifiedTime,
    CreatedBy,
    LastModifiedBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    /// Timestamp without time zone. Normalized to UTC at projection time.
    Timestamp,
    TimestampTz,
    Json,
    Uuid,
    /// Binary blob, projected through encode(.., 'base64')
    Binary,
    /// Binary blob, projected through encode(.., 'hex')
    BinaryHex,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelationKind {
    ManyToMany,
    BelongsTo,
    HasMany,
    OneToOne,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkOptions {
    pub relation: RelationKind,
    /// Table on the other side of the relation
    pub related_model_id: String,
    /// Column holding the foreign key
    pub child_column_id: String,
    /// Referenced column
    pub parent_column_id: String,
    /// Join table, for many to many relations
    pub mm_model_id: Option<String>,
    /// Join table column pointing at this table
    pub mm_child_column_id: Option<String>,
    /// Join table column pointing at the related table
    pub mm_parent_column_id: Option<String>,
    /// One to one relations where this table holds the foreign key behave
    /// like belongs to; otherwise like a has many capped at one row
    #[serde(default)]
    pub belongs_to: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupOptions {
    /// The link column this lookup rides on
    pub relation_column_id: String,
    /// The column on the related table to project
    pub lookup_column_id: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaOptions {
    pub expr: Option<FormulaExpr>,
    /// Set when the stored formula failed validation; invalid formulas are
    /// not projected at all
    #[serde(default)]
    pub invalid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupOptions {
    pub relation_column_id: String,
    /// The related column the aggregate is computed over
    pub rollup_column_id: String,
    pub function: RollupFunction,
}

/// Reverse-relation count column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksOptions {
    pub relation_column_id: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum RollupFunction {
    Count,
    Min,
    Max,
    Sum,
    Avg,
    CountDistinct,
    SumDistinct,
    AvgDistinct,
}

/// Parsed formula expression tree. Formula text parsing happens upstream;
/// the compiler only ever sees this form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormulaExpr {
    Literal {
        value: serde_json::Value,
    },
    ColumnRef {
        column_id: String,
    },
    BinaryOp {
        op: FormulaBinaryOp,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    Call {
        function: FormulaFunction,
        args: Vec<FormulaExpr>,
    },
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FormulaBinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Concat,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum FormulaFunction {
    Concat,
    Upper,
    Lower,
    Trim,
    Length,
    Round,
    Abs,
    Ceiling,
    Floor,
    If,
    Coalesce,
}
