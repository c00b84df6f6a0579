use crate::meta::{Column, Relation, RelationKind, RollupFunction};
use crate::sql::ast::{
    BinaryOperator, Expr, Function, FunctionArgExpr, Ident, ObjectName, Query, SelectItem,
    TableFactor, TableWithJoins, Join, JoinConstraint, JoinOperator,
};

use super::{alias::AliasGenerator, QueryBuilderError};

/// Build the correlated aggregate subquery for a rollup or links column:
/// an aggregate over the relation's related rows, correlated to the root
/// row by the relation's foreign key equality.
pub fn rollup_select(
    relation: &Relation,
    target: &Column,
    function: RollupFunction,
    root_alias: &str,
    aliases: &mut AliasGenerator,
) -> Result<Expr, QueryBuilderError> {
    let related_alias = aliases.next();
    let target_col = Expr::CompoundIdentifier(vec![
        Ident::quoted(&related_alias),
        Ident::quoted(&target.column_name),
    ]);
    let projection = vec![SelectItem::UnnamedExpr(aggregate(function, target_col))];

    let query = match relation.kind {
        RelationKind::ManyToMany => {
            let (mm_model, mm_child, mm_parent) = match (
                &relation.mm_model,
                &relation.mm_child_column,
                &relation.mm_parent_column,
            ) {
                (Some(model), Some(child), Some(parent)) => (model, child, parent),
                _ => {
                    return Err(QueryBuilderError::InvalidRollup(target.id.clone()));
                }
            };
            let mm_alias = aliases.next();

            let join = Join {
                relation: TableFactor::Table {
                    name: ObjectName(vec![Ident::quoted(&relation.related_model.table_name)]),
                    alias: Some(Ident::quoted(&related_alias)),
                },
                join_operator: JoinOperator::LeftOuter(JoinConstraint::On(equality(
                    &related_alias,
                    &relation.parent_column.column_name,
                    &mm_alias,
                    &mm_parent.column_name,
                ))),
            };

            Query::new(projection)
                .from(vec![TableWithJoins {
                    relation: TableFactor::Table {
                        name: ObjectName(vec![Ident::quoted(&mm_model.table_name)]),
                        alias: Some(Ident::quoted(&mm_alias)),
                    },
                    joins: vec![join],
                }])
                .predicate(Some(equality(
                    &mm_alias,
                    &mm_child.column_name,
                    root_alias,
                    &relation.child_column.column_name,
                )))
        }
        RelationKind::HasMany => correlated_query(
            projection,
            relation,
            &related_alias,
            &relation.child_column.column_name,
            root_alias,
            &relation.parent_column.column_name,
        ),
        RelationKind::BelongsTo => correlated_query(
            projection,
            relation,
            &related_alias,
            &relation.parent_column.column_name,
            root_alias,
            &relation.child_column.column_name,
        ),
        RelationKind::OneToOne => {
            if relation.belongs_to {
                correlated_query(
                    projection,
                    relation,
                    &related_alias,
                    &relation.parent_column.column_name,
                    root_alias,
                    &relation.child_column.column_name,
                )
            } else {
                correlated_query(
                    projection,
                    relation,
                    &related_alias,
                    &relation.child_column.column_name,
                    root_alias,
                    &relation.parent_column.column_name,
                )
            }
        }
    };

    Ok(Expr::Subquery(query.boxed()))
}

fn correlated_query(
    projection: Vec<SelectItem>,
    relation: &Relation,
    related_alias: &str,
    related_column: &str,
    root_alias: &str,
    root_column: &str,
) -> Query {
    Query::new(projection)
        .from(vec![TableWithJoins {
            relation: TableFactor::Table {
                name: ObjectName(vec![Ident::quoted(&relation.related_model.table_name)]),
                alias: Some(Ident::quoted(related_alias)),
            },
            joins: vec![],
        }])
        .predicate(Some(equality(
            related_alias,
            related_column,
            root_alias,
            root_column,
        )))
}

fn equality(left_alias: &str, left_col: &str, right_alias: &str, right_col: &str) -> Expr {
    Expr::BinaryOp {
        left: Box::new(Expr::CompoundIdentifier(vec![
            Ident::quoted(left_alias),
            Ident::quoted(left_col),
        ])),
        op: BinaryOperator::Eq,
        right: Box::new(Expr::CompoundIdentifier(vec![
            Ident::quoted(right_alias),
            Ident::quoted(right_col),
        ])),
    }
}

fn aggregate(function: RollupFunction, column: Expr) -> Expr {
    let (name, distinct) = match function {
        RollupFunction::Count => ("count", false),
        RollupFunction::Min => ("min", false),
        RollupFunction::Max => ("max", false),
        RollupFunction::Sum => ("sum", false),
        RollupFunction::Avg => ("avg", false),
        RollupFunction::CountDistinct => ("count", true),
        RollupFunction::SumDistinct => ("sum", true),
        RollupFunction::AvgDistinct => ("avg", true),
    };
    Expr::Function(Function {
        name: ObjectName(vec![Ident::unquoted(name)]),
        args: vec![FunctionArgExpr::Expr(column)],
        distinct,
    })
}
