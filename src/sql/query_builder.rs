use async_recursion::async_recursion;
use indexmap::IndexMap;

use super::ast::{
    BinaryOperator, Expr, Function, FunctionArgExpr, Ident, Join, JoinConstraint, JoinOperator,
    ObjectName, Query, SelectItem, TableFactor, TableWithJoins, Value,
};
use crate::data::params::{NestedParams, QueryDefaults};
use crate::data::{params, xwhere};
use crate::meta::{Column, ColumnKind, DataType, MetaStore, Model, Relation, RelationKind};

pub mod alias;
pub mod condition;
pub mod formula;
pub mod rollup;
pub mod sorting;
mod error;

use alias::AliasGenerator;
pub use error::QueryBuilderError;

/// Alias of the root table subquery every projection hangs off of.
pub const ROOT_ALIAS: &str = "__gq_root";

/// Upper bound on relation/lookup/formula hops. Past the limit the
/// projector fails closed: the column projects an error sentinel instead of
/// recursing further, so a metadata cycle cannot produce unbounded nesting.
pub const NESTED_LIMIT: usize = 10;

/// Projected when a many to many relation's join table cannot be resolved.
/// The rest of the row still returns.
pub const ERR_MM_TABLE_NOT_FOUND: &str = "ERR_MM_TABLE_NOT_FOUND";
/// Projected when the nesting limit is exceeded.
pub const ERR_NESTED_LIMIT: &str = "ERR_NESTED_LIMIT";
/// Projected when a formula cannot be compiled.
pub const ERR_FORMULA: &str = "ERR";
/// Projected for barcode/qr columns missing their value column.
pub const ERR_MISSING_VALUE_COLUMN: &str = "ERR!";

const UTC_TIMESTAMP_FORMAT: &str = "YYYY-MM-DD\"T\"HH24:MI:SS\"Z\"";

pub(crate) fn sql_function(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function(Function {
        name: ObjectName(vec![Ident::unquoted(name)]),
        args: args.into_iter().map(FunctionArgExpr::Expr).collect(),
        distinct: false,
    })
}

pub(crate) fn and_reducer(left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op: BinaryOperator::And,
        right: Box::new(right),
    }
}
pub(crate) fn or_reducer(left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op: BinaryOperator::Or,
        right: Box::new(right),
    }
}

/// Which columns of a table a read actually requested. The wildcard projects
/// only the primary key and display value, which keeps default nested reads
/// cheap while always returning enough to identify a row.
#[derive(Debug, Clone)]
pub enum FieldMask {
    All,
    /// Exactly the named columns (by title), each with its own nested mask
    Fields(IndexMap<String, FieldMask>),
}

impl FieldMask {
    pub fn from_titles<I>(titles: I) -> FieldMask
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        FieldMask::Fields(
            titles
                .into_iter()
                .map(|t| (t.into(), FieldMask::All))
                .collect(),
        )
    }

    pub fn includes(&self, column: &Column) -> bool {
        match self {
            FieldMask::All => column.primary_key || column.display_value,
            FieldMask::Fields(fields) => fields.contains_key(&column.title),
        }
    }

    pub fn child(&self, column: &Column) -> FieldMask {
        match self {
            FieldMask::All => FieldMask::All,
            FieldMask::Fields(fields) => fields
                .get(&column.title)
                .cloned()
                .unwrap_or(FieldMask::All),
        }
    }
}

/// Whether a projected value is an array (plural relation) or a scalar.
#[derive(Debug, Clone, Copy)]
pub struct Projected {
    pub is_array: bool,
}

impl Projected {
    fn scalar() -> Self {
        Self { is_array: false }
    }
    fn array() -> Self {
        Self { is_array: true }
    }
}

/// One compilation pass: projects requested columns onto a query rooted at
/// `ROOT_ALIAS`, opening correlated lateral joins for relational columns and
/// recursing into them. Holds no state beyond the pass.
pub struct QueryBuilder<'a> {
    meta: &'a dyn MetaStore,
    defaults: &'a QueryDefaults,
    strict: bool,
    aliases: AliasGenerator,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(meta: &'a dyn MetaStore, defaults: &'a QueryDefaults, strict: bool) -> Self {
        Self {
            meta,
            defaults,
            strict,
            aliases: AliasGenerator::new(),
        }
    }

    /// Project every column of `model` requested by `mask` onto `query`.
    #[async_recursion]
    pub async fn extract_columns(
        &mut self,
        query: &mut Query,
        model: &Model,
        alias: &str,
        mask: &FieldMask,
        nested: Option<&IndexMap<String, NestedParams>>,
        depth: usize,
    ) -> Result<(), QueryBuilderError> {
        for column in &model.columns {
            if !mask.includes(column) {
                continue;
            }
            let child_mask = mask.child(column);
            let params = nested.and_then(|n| n.get(&column.title));
            self.extract_column(query, model, column, alias, &child_mask, params, depth)
                .await?;
        }
        Ok(())
    }

    /// Project one column onto `query`, reporting whether the produced value
    /// is plural.
    #[async_recursion]
    pub async fn extract_column(
        &mut self,
        query: &mut Query,
        model: &Model,
        column: &Column,
        alias: &str,
        mask: &FieldMask,
        params: Option<&NestedParams>,
        depth: usize,
    ) -> Result<Projected, QueryBuilderError> {
        if depth > NESTED_LIMIT {
            self.select_literal(query, column, ERR_NESTED_LIMIT);
            return Ok(Projected::scalar());
        }

        match &column.kind {
            ColumnKind::Scalar { data_type } => {
                let expr = scalar_expr(alias, &column.column_name, *data_type);
                self.select_as(query, column, expr);
                Ok(Projected::scalar())
            }
            ColumnKind::Attachment => {
                let expr = sql_function(
                    "to_json",
                    vec![compound(alias, &column.column_name)],
                );
                self.select_as(query, column, expr);
                Ok(Projected::scalar())
            }
            ColumnKind::CreatedTime | ColumnKind::LastModifiedTime => {
                let column_name = storage_column_name(column, model);
                let expr = scalar_expr(alias, column_name, DataType::Timestamp);
                self.select_as(query, column, expr);
                Ok(Projected::scalar())
            }
            ColumnKind::CreatedBy | ColumnKind::LastModifiedBy => {
                let column_name = storage_column_name(column, model);
                self.select_as(query, column, compound(alias, column_name));
                Ok(Projected::scalar())
            }
            ColumnKind::Link(_) => {
                self.extract_link(query, column, alias, mask, params, depth)
                    .await
            }
            ColumnKind::Lookup(_) => {
                self.extract_lookup(query, model, column, alias, mask, params, depth)
                    .await
            }
            ColumnKind::Formula(options) => {
                if options.invalid {
                    // invalid formulas are not projected at all
                    return Ok(Projected::scalar());
                }
                let Some(expr) = options.expr.as_ref() else {
                    return Ok(Projected::scalar());
                };
                match formula::compile(expr, model, alias, depth) {
                    Ok(compiled) => self.select_as(query, column, compiled),
                    Err(err) => {
                        tracing::warn!(column = %column.id, error = %err, "formula failed to compile");
                        self.select_literal(query, column, ERR_FORMULA);
                    }
                }
                Ok(Projected::scalar())
            }
            ColumnKind::Rollup(options) => {
                let relation_column = model
                    .column_by_id(&options.relation_column_id)
                    .ok_or_else(|| QueryBuilderError::InvalidRollup(column.id.clone()))?;
                let relation = self.meta.relation_details(relation_column).await?;
                let target = relation
                    .related_model
                    .column_by_id(&options.rollup_column_id)
                    .ok_or_else(|| QueryBuilderError::InvalidRollup(column.id.clone()))?
                    .clone();
                let select = rollup::rollup_select(
                    &relation,
                    &target,
                    options.function,
                    alias,
                    &mut self.aliases,
                )?;
                self.select_as(query, column, select);
                Ok(Projected::scalar())
            }
            ColumnKind::Links(options) => {
                let relation_column = model
                    .column_by_id(&options.relation_column_id)
                    .ok_or_else(|| QueryBuilderError::InvalidRollup(column.id.clone()))?;
                let relation = self.meta.relation_details(relation_column).await?;
                let target = relation
                    .related_model
                    .primary_key()
                    .or_else(|| relation.related_model.columns.first())
                    .ok_or_else(|| QueryBuilderError::InvalidRollup(column.id.clone()))?
                    .clone();
                let select = rollup::rollup_select(
                    &relation,
                    &target,
                    crate::meta::RollupFunction::Count,
                    alias,
                    &mut self.aliases,
                )?;
                self.select_as(query, column, select);
                Ok(Projected::scalar())
            }
            ColumnKind::Barcode { value_column_id } | ColumnKind::QrCode { value_column_id } => {
                let value_column = value_column_id
                    .as_ref()
                    .and_then(|id| model.column_by_id(id));
                let Some(value_column) = value_column else {
                    self.select_literal(query, column, ERR_MISSING_VALUE_COLUMN);
                    return Ok(Projected::scalar());
                };
                // a view over the value column: same projection, this
                // column's identity
                let mut relabeled = value_column.clone();
                relabeled.id = column.id.clone();
                relabeled.title = column.title.clone();
                self.extract_column(query, model, &relabeled, alias, mask, params, depth + 1)
                    .await
            }
        }
    }

    async fn extract_link(
        &mut self,
        query: &mut Query,
        column: &Column,
        alias: &str,
        mask: &FieldMask,
        params: Option<&'_ NestedParams>,
        depth: usize,
    ) -> Result<Projected, QueryBuilderError> {
        let relation = self.meta.relation_details(column).await?;
        let plural = relation.is_plural();

        if relation.kind == RelationKind::ManyToMany && !mm_resolved(&relation) {
            self.select_literal(query, column, ERR_MM_TABLE_NOT_FOUND);
            return Ok(Projected::array());
        }

        let fields = self.relation_fields(&relation, mask)?;
        let (mut rel_query, rel_alias) = self.link_row_query(&relation, alias, true)?;

        // push the relation's own filters and, for plural relations, its
        // sorts and window down into the correlated subquery
        let filters = self.nested_filters(params, &relation.related_model)?;
        condition::apply_filters(
            &mut rel_query,
            &filters,
            &relation.related_model,
            &rel_alias,
            self.strict,
        )?;

        if plural {
            let sorts = params
                .and_then(|p| p.sort.as_deref())
                .map(params::parse_sort_string)
                .unwrap_or_default();
            sorting::apply_sorts(
                &mut rel_query,
                &sorts,
                &relation.related_model,
                &rel_alias,
                self.strict,
            )?;
            let limit = params::clamp_limit(params.and_then(|p| p.limit), self.defaults);
            let offset = params.and_then(|p| p.offset).unwrap_or(0);
            rel_query.set_limit(Value::Number(limit.to_string()));
            rel_query.set_offset(Value::Number(offset.to_string()));
        } else {
            rel_query.set_limit(Value::Number("1".to_owned()));
        }

        // project the requested fields of the related table in a fresh scope
        let proj_alias = self.aliases.next();
        let mut proj_query = Query::new(vec![]).from(vec![TableWithJoins {
            relation: TableFactor::Derived {
                subquery: rel_query.boxed(),
                alias: Some(Ident::quoted(&proj_alias)),
            },
            joins: vec![],
        }]);
        let field_mask = FieldMask::Fields(
            fields
                .iter()
                .map(|f| (f.title.clone(), mask.child(f)))
                .collect(),
        );
        self.extract_columns(
            &mut proj_query,
            &relation.related_model,
            &proj_alias,
            &field_mask,
            params.and_then(|p| p.nested.as_ref()),
            depth + 1,
        )
        .await?;

        // aggregate the sub-select into one JSON object (singular) or a
        // JSON array (plural, [] when empty)
        let shape_alias = self.aliases.next();
        let join_alias = self.aliases.next();
        let shaped = Query::new(vec![SelectItem::ExprWithAlias {
            expr: nested_row_json(&shape_alias, &fields, !plural),
            alias: Ident::quoted(&column.id),
        }])
        .from(vec![TableWithJoins {
            relation: TableFactor::Derived {
                subquery: proj_query.boxed(),
                alias: Some(Ident::quoted(&shape_alias)),
            },
            joins: vec![],
        }]);

        self.push_lateral(query, column, shaped, &join_alias);
        Ok(Projected { is_array: plural })
    }

    async fn extract_lookup(
        &mut self,
        query: &mut Query,
        model: &Model,
        column: &Column,
        alias: &str,
        mask: &FieldMask,
        params: Option<&'_ NestedParams>,
        depth: usize,
    ) -> Result<Projected, QueryBuilderError> {
        let options = match &column.kind {
            ColumnKind::Lookup(options) => options,
            _ => return Err(QueryBuilderError::InvalidLookup(column.id.clone())),
        };
        let relation_column = model
            .column_by_id(&options.relation_column_id)
            .ok_or_else(|| QueryBuilderError::InvalidLookup(column.id.clone()))?;
        let relation = self.meta.relation_details(relation_column).await?;
        let plural = relation.is_plural();

        if relation.kind == RelationKind::ManyToMany && !mm_resolved(&relation) {
            self.select_literal(query, column, ERR_MM_TABLE_NOT_FOUND);
            return Ok(Projected::array());
        }

        let lookup_column = relation
            .related_model
            .column_by_id(&options.lookup_column_id)
            .ok_or_else(|| QueryBuilderError::InvalidLookup(column.id.clone()))?
            .clone();

        // lookups fetch through all related rows: same correlated join as
        // the relation, no pagination
        let (mut rel_query, rel_alias) = self.link_row_query(&relation, alias, false)?;
        if !plural {
            rel_query.set_limit(Value::Number("1".to_owned()));
        }

        let nested = self
            .extract_column(
                &mut rel_query,
                &relation.related_model,
                &lookup_column,
                &rel_alias,
                mask,
                params,
                depth + 1,
            )
            .await?;

        let shape_alias = self.aliases.next();
        let join_alias = self.aliases.next();
        let lookup_value = compound(&shape_alias, &lookup_column.id);

        let shaped = if !plural {
            // scalar through a singular relation
            Query::new(vec![SelectItem::ExprWithAlias {
                expr: lookup_value,
                alias: Ident::quoted(&column.id),
            }])
        } else if nested.is_array {
            // lookup of a plural value through a plural relation: flatten
            // the per-row arrays before aggregating
            let flat_alias = self.aliases.next();
            let mut shaped = Query::new(vec![SelectItem::ExprWithAlias {
                expr: coalesce_json_array(sql_function(
                    "json_agg",
                    vec![Expr::Identifier(Ident::quoted(&flat_alias))],
                )),
                alias: Ident::quoted(&column.id),
            }]);
            shaped = shaped.from(vec![TableWithJoins {
                relation: TableFactor::Derived {
                    subquery: rel_query.boxed(),
                    alias: Some(Ident::quoted(&shape_alias)),
                },
                joins: vec![],
            }]);
            shaped.push_from(TableWithJoins {
                relation: TableFactor::TableFunction {
                    function: Function {
                        name: ObjectName(vec![Ident::unquoted("json_array_elements")]),
                        args: vec![FunctionArgExpr::Expr(lookup_value)],
                        distinct: false,
                    },
                    alias: Some(Ident::quoted(&flat_alias)),
                },
                joins: vec![],
            });
            self.push_lateral(query, column, shaped, &join_alias);
            return Ok(Projected { is_array: plural });
        } else {
            Query::new(vec![SelectItem::ExprWithAlias {
                expr: coalesce_json_array(sql_function("json_agg", vec![lookup_value])),
                alias: Ident::quoted(&column.id),
            }])
        };

        let shaped = shaped.from(vec![TableWithJoins {
            relation: TableFactor::Derived {
                subquery: rel_query.boxed(),
                alias: Some(Ident::quoted(&shape_alias)),
            },
            joins: vec![],
        }]);
        self.push_lateral(query, column, shaped, &join_alias);
        Ok(Projected { is_array: plural })
    }

    /// Build the correlated subquery fetching the rows on the other side of
    /// a relation, rooted at the related table and correlated to
    /// `root_alias` by the relation's foreign key equality. Many to many
    /// relations correlate through the join table first.
    fn link_row_query(
        &mut self,
        relation: &Relation,
        root_alias: &str,
        wildcard: bool,
    ) -> Result<(Query, String), QueryBuilderError> {
        let rel_alias = self.aliases.next();
        let related_table = TableFactor::Table {
            name: ObjectName(vec![Ident::quoted(&relation.related_model.table_name)]),
            alias: Some(Ident::quoted(&rel_alias)),
        };
        let projection = if wildcard {
            vec![SelectItem::QualifiedWildcard(ObjectName(vec![
                Ident::quoted(&rel_alias),
            ]))]
        } else {
            vec![]
        };

        let query = match relation.kind {
            RelationKind::ManyToMany => {
                let (mm_model, mm_child, mm_parent) = match (
                    &relation.mm_model,
                    &relation.mm_child_column,
                    &relation.mm_parent_column,
                ) {
                    (Some(model), Some(child), Some(parent)) => (model, child, parent),
                    _ => {
                        return Err(QueryBuilderError::Internal(
                            "many to many relation without a resolved join table".to_owned(),
                        ))
                    }
                };
                let mm_alias = self.aliases.next();
                let bridge_alias = self.aliases.next();

                let assoc = Query::new(vec![SelectItem::Wildcard])
                    .from(vec![TableWithJoins {
                        relation: TableFactor::Table {
                            name: ObjectName(vec![Ident::quoted(&mm_model.table_name)]),
                            alias: Some(Ident::quoted(&mm_alias)),
                        },
                        joins: vec![],
                    }])
                    .predicate(Some(column_equality(
                        &mm_alias,
                        &mm_child.column_name,
                        root_alias,
                        &relation.child_column.column_name,
                    )));

                Query::new(projection).from(vec![TableWithJoins {
                    relation: TableFactor::Derived {
                        subquery: assoc.boxed(),
                        alias: Some(Ident::quoted(&bridge_alias)),
                    },
                    joins: vec![Join {
                        relation: related_table,
                        join_operator: JoinOperator::LeftOuter(JoinConstraint::On(
                            column_equality(
                                &rel_alias,
                                &relation.parent_column.column_name,
                                &bridge_alias,
                                &mm_parent.column_name,
                            ),
                        )),
                    }],
                }])
            }
            RelationKind::HasMany => Query::new(projection)
                .from(vec![TableWithJoins {
                    relation: related_table,
                    joins: vec![],
                }])
                .predicate(Some(column_equality(
                    &rel_alias,
                    &relation.child_column.column_name,
                    root_alias,
                    &relation.parent_column.column_name,
                ))),
            RelationKind::BelongsTo => Query::new(projection)
                .from(vec![TableWithJoins {
                    relation: related_table,
                    joins: vec![],
                }])
                .predicate(Some(column_equality(
                    &rel_alias,
                    &relation.parent_column.column_name,
                    root_alias,
                    &relation.child_column.column_name,
                ))),
            RelationKind::OneToOne => {
                let (rel_col, root_col) = if relation.belongs_to {
                    (
                        &relation.parent_column.column_name,
                        &relation.child_column.column_name,
                    )
                } else {
                    (
                        &relation.child_column.column_name,
                        &relation.parent_column.column_name,
                    )
                };
                Query::new(projection)
                    .from(vec![TableWithJoins {
                        relation: related_table,
                        joins: vec![],
                    }])
                    .predicate(Some(column_equality(&rel_alias, rel_col, root_alias, root_col)))
            }
        };

        Ok((query, rel_alias))
    }

    /// Which columns of the related table to shape into the nested value:
    /// the caller's explicit selection when present, the primary key and
    /// display value otherwise.
    fn relation_fields(
        &self,
        relation: &Relation,
        mask: &FieldMask,
    ) -> Result<Vec<Column>, QueryBuilderError> {
        let related = &relation.related_model;

        if let FieldMask::Fields(map) = mask {
            let mut fields = Vec::new();
            for title in map.keys() {
                match related.column_by_ref(title) {
                    Some(column) => fields.push(column.clone()),
                    None => {
                        if self.strict {
                            return Err(QueryBuilderError::UnknownNestedField(
                                title.clone(),
                                related.title.clone(),
                            ));
                        }
                    }
                }
            }
            if !fields.is_empty() {
                return Ok(fields);
            }
        }

        let mut fields: Vec<Column> = Vec::new();
        if let Some(pk) = related.primary_key() {
            fields.push(pk.clone());
        }
        if let Some(display) = related.display_column() {
            if !fields.iter().any(|f| f.id == display.id) {
                fields.push(display.clone());
            }
        }
        if fields.is_empty() {
            if let Some(first) = related.columns.first() {
                fields.push(first.clone());
            }
        }
        Ok(fields)
    }

    fn nested_filters(
        &self,
        params: Option<&NestedParams>,
        model: &Model,
    ) -> Result<Vec<crate::meta::Filter>, QueryBuilderError> {
        let Some(where_clause) = params.and_then(|p| p.where_clause.as_deref()) else {
            return Ok(vec![]);
        };
        match xwhere::parse_where(where_clause) {
            Ok(filters) => Ok(filters),
            Err(err) => {
                if self.strict {
                    Err(QueryBuilderError::InvalidWhere(format!(
                        "nested filter on {}: {}",
                        model.title, err
                    )))
                } else {
                    Ok(vec![])
                }
            }
        }
    }

    fn push_lateral(&self, query: &mut Query, column: &Column, shaped: Query, join_alias: &str) {
        query.push_join(Join {
            relation: TableFactor::Derived {
                subquery: shaped.boxed(),
                alias: Some(Ident::quoted(join_alias)),
            },
            join_operator: JoinOperator::LeftOuterLateral(JoinConstraint::On(Expr::Value(
                Value::Boolean(true),
            ))),
        });
        query.push_select(SelectItem::ExprWithAlias {
            expr: compound(join_alias, &column.id),
            alias: Ident::quoted(&column.id),
        });
    }

    fn select_as(&self, query: &mut Query, column: &Column, expr: Expr) {
        query.push_select(SelectItem::ExprWithAlias {
            expr,
            alias: Ident::quoted(&column.id),
        });
    }

    fn select_literal(&self, query: &mut Query, column: &Column, literal: &str) {
        self.select_as(
            query,
            column,
            Expr::Value(Value::SingleQuotedString(literal.to_owned())),
        );
    }
}

fn mm_resolved(relation: &Relation) -> bool {
    relation.mm_model.is_some()
        && relation.mm_child_column.is_some()
        && relation.mm_parent_column.is_some()
}

fn compound(alias: &str, name: &str) -> Expr {
    Expr::CompoundIdentifier(vec![Ident::quoted(alias), Ident::quoted(name)])
}

fn column_equality(left_alias: &str, left_col: &str, right_alias: &str, right_col: &str) -> Expr {
    Expr::BinaryOp {
        left: Box::new(compound(left_alias, left_col)),
        op: BinaryOperator::Eq,
        right: Box::new(compound(right_alias, right_col)),
    }
}

/// Scalar projection special cases: binary blobs are decoded at the SQL
/// layer, naive timestamps are normalized from the session time zone to UTC
/// so the caller never sees an ambiguous timestamp, and types without a
/// stable JSON rendering are formatted or cast to text.
fn scalar_expr(alias: &str, column_name: &str, data_type: DataType) -> Expr {
    let col = compound(alias, column_name);
    match data_type {
        DataType::Timestamp => {
            let session_zone = sql_function(
                "current_setting",
                vec![Expr::Value(Value::SingleQuotedString("timezone".to_owned()))],
            );
            let normalized = Expr::AtTimeZone {
                timestamp: Box::new(Expr::AtTimeZone {
                    timestamp: Box::new(col),
                    zone: Box::new(session_zone),
                }),
                zone: Box::new(Expr::Value(Value::SingleQuotedString("UTC".to_owned()))),
            };
            to_char(Expr::Nested(Box::new(normalized)), UTC_TIMESTAMP_FORMAT)
        }
        DataType::TimestampTz => to_char(
            Expr::Nested(Box::new(Expr::AtTimeZone {
                timestamp: Box::new(col),
                zone: Box::new(Expr::Value(Value::SingleQuotedString("UTC".to_owned()))),
            })),
            UTC_TIMESTAMP_FORMAT,
        ),
        DataType::Date => to_char(col, "YYYY-MM-DD"),
        DataType::Binary => sql_function(
            "encode",
            vec![
                col,
                Expr::Value(Value::SingleQuotedString("base64".to_owned())),
            ],
        ),
        DataType::BinaryHex => sql_function(
            "encode",
            vec![col, Expr::Value(Value::SingleQuotedString("hex".to_owned()))],
        ),
        // no stable JSON rendering of their own
        DataType::Decimal | DataType::Uuid => Expr::Cast {
            expr: Box::new(col),
            data_type: "text",
        },
        _ => col,
    }
}

fn to_char(expr: Expr, format: &str) -> Expr {
    sql_function(
        "to_char",
        vec![
            expr,
            Expr::Value(Value::SingleQuotedString(format.to_owned())),
        ],
    )
}

/// Duplicated system columns share the storage column of the original; fall
/// back to the first system column of the same kind that has one.
fn storage_column_name<'c>(column: &'c Column, model: &'c Model) -> &'c str {
    if !column.column_name.is_empty() {
        return &column.column_name;
    }
    model
        .columns
        .iter()
        .find(|c| {
            c.system
                && !c.column_name.is_empty()
                && std::mem::discriminant(&c.kind) == std::mem::discriminant(&column.kind)
        })
        .map(|c| c.column_name.as_str())
        .unwrap_or(&column.column_name)
}

/// JSON shaping for nested rows: one object keyed by the requested fields
/// for singular relations, a null-safe array of such objects for plural
/// relations.
fn nested_row_json(alias: &str, fields: &[Column], singular: bool) -> Expr {
    let mut args = Vec::with_capacity(fields.len() * 2);
    for field in fields {
        args.push(Expr::Value(Value::SingleQuotedString(field.id.clone())));
        args.push(compound(alias, &field.id));
    }
    let object = sql_function("json_build_object", args);
    if singular {
        object
    } else {
        coalesce_json_array(sql_function("json_agg", vec![object]))
    }
}

fn coalesce_json_array(aggregated: Expr) -> Expr {
    sql_function(
        "coalesce",
        vec![
            aggregated,
            Expr::Cast {
                expr: Box::new(Expr::Value(Value::SingleQuotedString("[]".to_owned()))),
                data_type: "json",
            },
        ],
    )
}
