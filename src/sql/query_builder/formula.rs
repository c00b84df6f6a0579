use crate::meta::{ColumnKind, FormulaExpr, Model};
use crate::meta::column::{FormulaBinaryOp, FormulaFunction};
use crate::sql::ast::{BinaryOperator, Expr, Ident, Value};

use super::{sql_function, QueryBuilderError, NESTED_LIMIT};

/// Compile a parsed formula tree into a scalar expression bound to
/// `alias`. Column references may point at other formula columns; the hop
/// count shares the projector's nesting limit.
pub fn compile(
    expr: &FormulaExpr,
    model: &Model,
    alias: &str,
    depth: usize,
) -> Result<Expr, QueryBuilderError> {
    if depth > NESTED_LIMIT {
        return Err(QueryBuilderError::FormulaCompile(
            "formula nesting exceeds limit".to_owned(),
        ));
    }

    Ok(match expr {
        FormulaExpr::Literal { value } => Expr::Value(literal(value)?),
        FormulaExpr::ColumnRef { column_id } => {
            let column = model.column_by_id(column_id).ok_or_else(|| {
                QueryBuilderError::FormulaCompile(format!("unknown column {column_id}"))
            })?;
            match &column.kind {
                ColumnKind::Formula(options) => {
                    if options.invalid {
                        return Err(QueryBuilderError::FormulaCompile(format!(
                            "column {column_id} holds an invalid formula"
                        )));
                    }
                    let nested = options.expr.as_ref().ok_or_else(|| {
                        QueryBuilderError::FormulaCompile(format!(
                            "column {column_id} has no formula expression"
                        ))
                    })?;
                    compile(nested, model, alias, depth + 1)?
                }
                _ if !column.column_name.is_empty() => Expr::CompoundIdentifier(vec![
                    Ident::quoted(alias),
                    Ident::quoted(&column.column_name),
                ]),
                _ => {
                    return Err(QueryBuilderError::FormulaCompile(format!(
                        "column {column_id} is not usable in a formula"
                    )))
                }
            }
        }
        FormulaExpr::BinaryOp { op, left, right } => {
            let left = compile(left, model, alias, depth + 1)?;
            let right = compile(right, model, alias, depth + 1)?;
            Expr::Nested(Box::new(Expr::BinaryOp {
                left: Box::new(left),
                op: binary_operator(*op),
                right: Box::new(right),
            }))
        }
        FormulaExpr::Call { function, args } => {
            let mut compiled = Vec::with_capacity(args.len());
            for arg in args {
                compiled.push(compile(arg, model, alias, depth + 1)?);
            }
            call(*function, compiled)?
        }
    })
}

fn binary_operator(op: FormulaBinaryOp) -> BinaryOperator {
    match op {
        FormulaBinaryOp::Add => BinaryOperator::Plus,
        FormulaBinaryOp::Subtract => BinaryOperator::Minus,
        FormulaBinaryOp::Multiply => BinaryOperator::Multiply,
        FormulaBinaryOp::Divide => BinaryOperator::Divide,
        FormulaBinaryOp::Concat => BinaryOperator::Concat,
        FormulaBinaryOp::Eq => BinaryOperator::Eq,
        FormulaBinaryOp::Neq => BinaryOperator::NotEq,
        FormulaBinaryOp::Gt => BinaryOperator::Gt,
        FormulaBinaryOp::Gte => BinaryOperator::GtEq,
        FormulaBinaryOp::Lt => BinaryOperator::Lt,
        FormulaBinaryOp::Lte => BinaryOperator::LtEq,
        FormulaBinaryOp::And => BinaryOperator::And,
        FormulaBinaryOp::Or => BinaryOperator::Or,
    }
}

fn call(function: FormulaFunction, args: Vec<Expr>) -> Result<Expr, QueryBuilderError> {
    let expect = |count: usize, args: &[Expr]| {
        if args.len() == count {
            Ok(())
        } else {
            Err(QueryBuilderError::FormulaCompile(format!(
                "{function} expects {count} arguments, got {}",
                args.len()
            )))
        }
    };

    Ok(match function {
        FormulaFunction::Concat | FormulaFunction::Coalesce => {
            sql_function(&function.to_string().to_lowercase(), args)
        }
        FormulaFunction::Upper
        | FormulaFunction::Lower
        | FormulaFunction::Trim
        | FormulaFunction::Length
        | FormulaFunction::Abs
        | FormulaFunction::Ceiling
        | FormulaFunction::Floor => {
            expect(1, &args)?;
            sql_function(&function.to_string().to_lowercase(), args)
        }
        FormulaFunction::Round => {
            if args.is_empty() || args.len() > 2 {
                return Err(QueryBuilderError::FormulaCompile(
                    "ROUND expects 1 or 2 arguments".to_owned(),
                ));
            }
            sql_function("round", args)
        }
        FormulaFunction::If => {
            if args.len() != 2 && args.len() != 3 {
                return Err(QueryBuilderError::FormulaCompile(
                    "IF expects 2 or 3 arguments".to_owned(),
                ));
            }
            let mut args = args.into_iter();
            let condition = Box::new(args.next().expect("arity checked"));
            let then = Box::new(args.next().expect("arity checked"));
            let otherwise = args.next().map(Box::new);
            Expr::Case {
                condition,
                then,
                otherwise,
            }
        }
    })
}

fn literal(value: &serde_json::Value) -> Result<Value, QueryBuilderError> {
    Ok(match value {
        serde_json::Value::Number(n) => Value::Number(n.to_string()),
        serde_json::Value::String(s) => Value::SingleQuotedString(s.clone()),
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Null => Value::Null,
        _ => {
            return Err(QueryBuilderError::FormulaCompile(
                "composite literals are not supported".to_owned(),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Column, DataType, FormulaOptions};
    use serde_json::json;

    fn scalar(id: &str, title: &str, name: &str, data_type: DataType) -> Column {
        Column {
            id: id.to_owned(),
            title: title.to_owned(),
            column_name: name.to_owned(),
            system: false,
            primary_key: false,
            auto_increment: false,
            display_value: false,
            kind: ColumnKind::Scalar { data_type },
        }
    }

    fn model() -> Model {
        Model {
            id: "m1".to_owned(),
            title: "Orders".to_owned(),
            table_name: "orders".to_owned(),
            version: 0,
            columns: vec![
                scalar("c1", "Amount", "amount", DataType::Integer),
                scalar("c2", "Title", "title", DataType::Text),
                Column {
                    id: "c3".to_owned(),
                    title: "Doubled".to_owned(),
                    column_name: String::new(),
                    system: false,
                    primary_key: false,
                    auto_increment: false,
                    display_value: false,
                    kind: ColumnKind::Formula(FormulaOptions {
                        expr: Some(FormulaExpr::BinaryOp {
                            op: FormulaBinaryOp::Multiply,
                            left: Box::new(FormulaExpr::ColumnRef {
                                column_id: "c1".to_owned(),
                            }),
                            right: Box::new(FormulaExpr::Literal { value: json!(2) }),
                        }),
                        invalid: false,
                    }),
                },
            ],
        }
    }

    #[test]
    fn compiles_arithmetic_over_columns() {
        let expr = FormulaExpr::BinaryOp {
            op: FormulaBinaryOp::Add,
            left: Box::new(FormulaExpr::ColumnRef {
                column_id: "c1".to_owned(),
            }),
            right: Box::new(FormulaExpr::Literal { value: json!(1) }),
        };
        let compiled = compile(&expr, &model(), "t", 0).unwrap();
        assert_eq!(compiled.to_string(), "(\"t\".\"amount\" + 1)");
    }

    #[test]
    fn inlines_referenced_formula_columns() {
        let expr = FormulaExpr::ColumnRef {
            column_id: "c3".to_owned(),
        };
        let compiled = compile(&expr, &model(), "t", 0).unwrap();
        assert_eq!(compiled.to_string(), "(\"t\".\"amount\" * 2)");
    }

    #[test]
    fn compiles_if_to_case() {
        let expr = FormulaExpr::Call {
            function: FormulaFunction::If,
            args: vec![
                FormulaExpr::BinaryOp {
                    op: FormulaBinaryOp::Gt,
                    left: Box::new(FormulaExpr::ColumnRef {
                        column_id: "c1".to_owned(),
                    }),
                    right: Box::new(FormulaExpr::Literal { value: json!(10) }),
                },
                FormulaExpr::Literal {
                    value: json!("big"),
                },
                FormulaExpr::Literal {
                    value: json!("small"),
                },
            ],
        };
        let compiled = compile(&expr, &model(), "t", 0).unwrap();
        assert_eq!(
            compiled.to_string(),
            "CASE WHEN (\"t\".\"amount\" > 10) THEN 'big' ELSE 'small' END"
        );
    }
}
