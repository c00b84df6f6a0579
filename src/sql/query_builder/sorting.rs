use crate::meta::{Model, Sort, SortDirection};
use crate::sql::ast::{Expr, Ident, OrderByExpr, Query};

use super::QueryBuilderError;

/// Append ORDER BY fragments for a sort list. Ascending sorts put nulls
/// last, descending sorts put them first, so missing values always trail.
pub fn apply_sorts(
    query: &mut Query,
    sorts: &[Sort],
    model: &Model,
    alias: &str,
    strict: bool,
) -> Result<(), QueryBuilderError> {
    for sort in sorts {
        let column = match model.column_by_ref(&sort.field) {
            Some(column) if !column.column_name.is_empty() => column,
            _ => {
                if strict {
                    return Err(QueryBuilderError::UnknownField(
                        sort.field.clone(),
                        model.title.clone(),
                    ));
                }
                continue;
            }
        };

        let asc = matches!(sort.direction, SortDirection::Asc);
        query.push_order_by(OrderByExpr {
            expr: Expr::CompoundIdentifier(vec![
                Ident::quoted(alias),
                Ident::quoted(&column.column_name),
            ]),
            asc: Some(asc),
            nulls_first: Some(!asc),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Column, ColumnKind, DataType};
    use crate::sql::ast::SelectItem;

    #[test]
    fn sorts_render_with_nulls_placement() {
        let model = Model {
            id: "m1".to_owned(),
            title: "Orders".to_owned(),
            table_name: "orders".to_owned(),
            version: 0,
            columns: vec![Column {
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
            }],
        };

        let mut query = Query::new(vec![SelectItem::Wildcard]);
        apply_sorts(
            &mut query,
            &[
                Sort {
                    field: "Amount".to_owned(),
                    direction: SortDirection::Desc,
                },
            ],
            &model,
            "t",
            true,
        )
        .unwrap();

        assert_eq!(
            query.to_string(),
            "SELECT * ORDER BY \"t\".\"amount\" DESC NULLS FIRST"
        );
    }
}
