use crate::meta::{Column, ColumnKind, DataType, Filter, FilterOp, LogicalOp, Model};
use crate::sql::ast::{BinaryOperator, Expr, Ident, Query, UnaryOperator, Value};

use super::{and_reducer, or_reducer, QueryBuilderError};

/// Apply a filter list (an implicit AND group) to the query's predicate.
/// Unknown fields fail the request under strict validation and are dropped
/// from the predicate otherwise.
pub fn apply_filters(
    query: &mut Query,
    filters: &[Filter],
    model: &Model,
    alias: &str,
    strict: bool,
) -> Result<(), QueryBuilderError> {
    if let Some(expr) = filters_expr(filters, model, alias, strict)? {
        query.and_predicate(expr);
    }
    Ok(())
}

pub fn filters_expr(
    filters: &[Filter],
    model: &Model,
    alias: &str,
    strict: bool,
) -> Result<Option<Expr>, QueryBuilderError> {
    group_expr(LogicalOp::And, filters, model, alias, strict)
}

fn group_expr(
    op: LogicalOp,
    children: &[Filter],
    model: &Model,
    alias: &str,
    strict: bool,
) -> Result<Option<Expr>, QueryBuilderError> {
    let mut exprs = Vec::new();
    for child in children {
        if let Some(expr) = filter_expr(child, model, alias, strict)? {
            exprs.push(expr);
        }
    }

    let reducer = match op {
        LogicalOp::Or => or_reducer,
        LogicalOp::And | LogicalOp::Not => and_reducer,
    };
    let needs_nesting = exprs.len() > 1;
    let combined = exprs.into_iter().reduce(reducer).map(|expr| {
        if needs_nesting {
            Expr::Nested(Box::new(expr))
        } else {
            expr
        }
    });

    Ok(match op {
        LogicalOp::Not => combined.map(|expr| Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(Expr::Nested(Box::new(expr))),
        }),
        _ => combined,
    })
}

fn filter_expr(
    filter: &Filter,
    model: &Model,
    alias: &str,
    strict: bool,
) -> Result<Option<Expr>, QueryBuilderError> {
    let (field, op, value) = match filter {
        Filter::Group {
            logical_op,
            children,
        } => return group_expr(*logical_op, children, model, alias, strict),
        Filter::Leaf { field, op, value } => (field, op, value),
    };

    let column = match model.column_by_ref(field) {
        Some(column) if !column.column_name.is_empty() => column,
        _ => {
            // virtual columns (lookups, links, rollups) are filtered through
            // nested relation params, not root predicates
            if strict {
                return Err(QueryBuilderError::UnknownField(
                    field.clone(),
                    model.title.clone(),
                ));
            }
            return Ok(None);
        }
    };

    let col = Expr::CompoundIdentifier(vec![
        Ident::quoted(alias),
        Ident::quoted(&column.column_name),
    ]);

    let comparison = |op: BinaryOperator| Expr::BinaryOp {
        left: Box::new(col.clone()),
        op,
        right: Box::new(Expr::Value(literal(column, value))),
    };

    Ok(Some(match op {
        FilterOp::Eq => match value {
            serde_json::Value::Null => Expr::IsNull(Box::new(col)),
            _ => comparison(BinaryOperator::Eq),
        },
        FilterOp::Neq => match value {
            serde_json::Value::Null => Expr::IsNotNull(Box::new(col)),
            _ => comparison(BinaryOperator::NotEq),
        },
        FilterOp::Gt => comparison(BinaryOperator::Gt),
        FilterOp::Gte => comparison(BinaryOperator::GtEq),
        FilterOp::Lt => comparison(BinaryOperator::Lt),
        FilterOp::Lte => comparison(BinaryOperator::LtEq),
        FilterOp::Like => Expr::BinaryOp {
            left: Box::new(col),
            op: BinaryOperator::ILike,
            right: Box::new(Expr::Value(Value::SingleQuotedString(like_pattern(value)))),
        },
        FilterOp::Nlike => Expr::BinaryOp {
            left: Box::new(col),
            op: BinaryOperator::NotILike,
            right: Box::new(Expr::Value(Value::SingleQuotedString(like_pattern(value)))),
        },
        FilterOp::In => Expr::InList {
            expr: Box::new(col),
            list: in_list(column, value),
        },
        FilterOp::Null => Expr::IsNull(Box::new(col)),
        FilterOp::NotNull => Expr::IsNotNull(Box::new(col)),
        FilterOp::Empty => Expr::Nested(Box::new(or_reducer(
            Expr::IsNull(Box::new(col.clone())),
            Expr::BinaryOp {
                left: Box::new(col),
                op: BinaryOperator::Eq,
                right: Box::new(Expr::Value(Value::SingleQuotedString(String::new()))),
            },
        ))),
        FilterOp::NotEmpty => Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(Expr::Nested(Box::new(or_reducer(
                Expr::IsNull(Box::new(col.clone())),
                Expr::BinaryOp {
                    left: Box::new(col),
                    op: BinaryOperator::Eq,
                    right: Box::new(Expr::Value(Value::SingleQuotedString(String::new()))),
                },
            )))),
        },
        FilterOp::Checked => Expr::IsTrue(Box::new(col)),
        FilterOp::NotChecked => Expr::IsNotTrue(Box::new(col)),
    }))
}

fn like_pattern(value: &serde_json::Value) -> String {
    let raw = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if raw.contains('%') {
        raw
    } else {
        format!("%{raw}%")
    }
}

fn in_list(column: &Column, value: &serde_json::Value) -> Vec<Expr> {
    match value {
        serde_json::Value::Array(values) => values
            .iter()
            .map(|v| Expr::Value(literal(column, v)))
            .collect(),
        serde_json::Value::String(s) => s
            .split(',')
            .map(|part| Expr::Value(typed_literal(column, part)))
            .collect(),
        other => vec![Expr::Value(literal(column, other))],
    }
}

/// Convert a filter operand to a SQL literal, using the column's storage
/// type to decide how to interpret strings coming from the where-clause
/// grammar.
fn literal(column: &Column, value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Number(n) => Value::Number(n.to_string()),
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Null => Value::Null,
        serde_json::Value::String(s) => typed_literal(column, s),
        other => Value::SingleQuotedString(other.to_string()),
    }
}

fn typed_literal(column: &Column, raw: &str) -> Value {
    match storage_type(column) {
        Some(DataType::Integer) | Some(DataType::Decimal) if raw.parse::<f64>().is_ok() => {
            Value::Number(raw.to_owned())
        }
        Some(DataType::Boolean) => match raw {
            "true" | "1" => Value::Boolean(true),
            "false" | "0" => Value::Boolean(false),
            _ => Value::SingleQuotedString(raw.to_owned()),
        },
        _ => Value::SingleQuotedString(raw.to_owned()),
    }
}

fn storage_type(column: &Column) -> Option<DataType> {
    match &column.kind {
        ColumnKind::Scalar { data_type } => Some(*data_type),
        ColumnKind::CreatedTime | ColumnKind::LastModifiedTime => Some(DataType::Timestamp),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::FilterOp;
    use serde_json::json;

    fn test_model() -> Model {
        Model {
            id: "m1".to_owned(),
            title: "Orders".to_owned(),
            table_name: "orders".to_owned(),
            version: 0,
            columns: vec![
                Column {
                    id: "c1".to_owned(),
                    title: "Amount".to_owned(),
                    column_name: "amount".to_owned(),
                    system: false,
                    primary_key: false,
                    auto_increment: false,
                    display_value: false,
                    kind: ColumnKind::Scalar {
                        data_type: DataType::Integer,
                    },
                },
                Column {
                    id: "c2".to_owned(),
                    title: "Active".to_owned(),
                    column_name: "active".to_owned(),
                    system: false,
                    primary_key: false,
                    auto_increment: false,
                    display_value: false,
                    kind: ColumnKind::Scalar {
                        data_type: DataType::Boolean,
                    },
                },
            ],
        }
    }

    fn leaf(field: &str, op: FilterOp, value: serde_json::Value) -> Filter {
        Filter::Leaf {
            field: field.to_owned(),
            op,
            value,
        }
    }

    #[test]
    fn typed_equality_uses_storage_types() {
        let model = test_model();
        let expr = filters_expr(
            &[
                leaf("Amount", FilterOp::Gt, json!("10")),
                leaf("Active", FilterOp::Eq, json!("true")),
            ],
            &model,
            "t",
            true,
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            expr.to_string(),
            "(\"t\".\"amount\" > 10 AND \"t\".\"active\" = TRUE)"
        );
    }

    #[test]
    fn or_groups_nest() {
        let model = test_model();
        let expr = filters_expr(
            &[Filter::Group {
                logical_op: LogicalOp::Or,
                children: vec![
                    leaf("Amount", FilterOp::Lt, json!(5)),
                    leaf("Amount", FilterOp::Gt, json!(10)),
                ],
            }],
            &model,
            "t",
            true,
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            expr.to_string(),
            "(\"t\".\"amount\" < 5 OR \"t\".\"amount\" > 10)"
        );
    }

    #[test]
    fn unknown_field_is_dropped_unless_strict() {
        let model = test_model();
        let lenient = filters_expr(
            &[leaf("Nope", FilterOp::Eq, json!(1))],
            &model,
            "t",
            false,
        )
        .unwrap();
        assert!(lenient.is_none());

        let strict = filters_expr(&[leaf("Nope", FilterOp::Eq, json!(1))], &model, "t", true);
        assert!(matches!(
            strict,
            Err(QueryBuilderError::UnknownField(field, _)) if field == "Nope"
        ));
    }

    #[test]
    fn empty_check_is_null_safe() {
        let model = test_model();
        let expr = filters_expr(
            &[leaf("Amount", FilterOp::Empty, json!(null))],
            &model,
            "t",
            true,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            expr.to_string(),
            "(\"t\".\"amount\" IS NULL OR \"t\".\"amount\" = '')"
        );
    }
}
