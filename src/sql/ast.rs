use std::fmt;

pub struct Statement(pub Query);

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    projection: Vec<SelectItem>,
    from: Vec<TableWithJoins>,
    predicate: Option<Expr>,
    order_by: Vec<OrderByExpr>,
    limit: Option<Value>,
    offset: Option<Value>,
}

impl Query {
    pub fn new(projection: Vec<SelectItem>) -> Self {
        Self {
            projection,
            from: vec![],
            predicate: None,
            order_by: vec![],
            limit: None,
            offset: None,
        }
    }
    pub fn from(self, from: Vec<TableWithJoins>) -> Self {
        Self { from, ..self }
    }
    pub fn predicate(self, predicate: Option<Expr>) -> Self {
        Self { predicate, ..self }
    }
    pub fn order_by(self, order_by: Vec<OrderByExpr>) -> Self {
        Self { order_by, ..self }
    }
    pub fn limit(self, limit: Option<Value>) -> Self {
        Self { limit, ..self }
    }
    pub fn offset(self, offset: Option<Value>) -> Self {
        Self { offset, ..self }
    }
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    // in-place mutators used while projecting columns onto a query

    pub fn push_select(&mut self, item: SelectItem) {
        self.projection.push(item);
    }
    /// Attach a join to the last FROM element.
    pub fn push_join(&mut self, join: Join) {
        if let Some(table) = self.from.last_mut() {
            table.joins.push(join);
        }
    }
    /// Add another comma-separated FROM element.
    pub fn push_from(&mut self, table: TableWithJoins) {
        self.from.push(table);
    }
    pub fn and_predicate(&mut self, expr: Expr) {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => Expr::BinaryOp {
                left: Box::new(existing),
                op: BinaryOperator::And,
                right: Box::new(Expr::Nested(Box::new(expr))),
            },
            None => expr,
        });
    }
    pub fn push_order_by(&mut self, expr: OrderByExpr) {
        self.order_by.push(expr);
    }
    pub fn set_limit(&mut self, limit: Value) {
        self.limit = Some(limit);
    }
    pub fn set_offset(&mut self, offset: Value) {
        self.offset = Some(offset);
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.projection.is_empty() {
            write!(f, "SELECT NULL")?;
        } else {
            write!(f, "SELECT {}", display_separated(&self.projection, ", "))?;
        }
        if !self.from.is_empty() {
            write!(f, " FROM {}", display_separated(&self.from, ", "))?;
        }
        if let Some(predicate) = &self.predicate {
            write!(f, " WHERE {}", predicate)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", display_separated(&self.order_by, ", "))?;
        }
        if let Some(limit) = &self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = &self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub asc: Option<bool>,
    pub nulls_first: Option<bool>,
}

impl fmt::Display for OrderByExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        match self.asc {
            Some(true) => write!(f, " ASC")?,
            Some(false) => write!(f, " DESC")?,
            None => (),
        }
        match self.nulls_first {
            Some(true) => write!(f, " NULLS FIRST")?,
            Some(false) => write!(f, " NULLS LAST")?,
            None => (),
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum SelectItem {
    UnnamedExpr(Expr),
    ExprWithAlias { expr: Expr, alias: Ident },
    QualifiedWildcard(ObjectName),
    Wildcard,
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::UnnamedExpr(expr) => write!(f, "{}", expr),
            SelectItem::ExprWithAlias { expr, alias } => write!(f, "{} AS {}", expr, alias),
            SelectItem::QualifiedWildcard(name) => write!(f, "{}.*", name),
            SelectItem::Wildcard => write!(f, "*"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableWithJoins {
    pub relation: TableFactor,
    pub joins: Vec<Join>,
}

impl fmt::Display for TableWithJoins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relation)?;
        for join in &self.joins {
            write!(f, " {}", join)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Join {
    pub relation: TableFactor,
    pub join_operator: JoinOperator,
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn suffix(constraint: &'_ JoinConstraint) -> impl fmt::Display + '_ {
            struct Suffix<'a>(&'a JoinConstraint);
            impl<'a> fmt::Display for Suffix<'a> {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    match self.0 {
                        JoinConstraint::On(expr) => write!(f, " ON {expr}"),
                        JoinConstraint::None => Ok(()),
                    }
                }
            }
            Suffix(constraint)
        }
        match &self.join_operator {
            JoinOperator::Inner(constraint) => {
                write!(f, "JOIN {}{}", self.relation, suffix(constraint))
            }
            JoinOperator::LeftOuter(constraint) => {
                write!(f, "LEFT JOIN {}{}", self.relation, suffix(constraint))
            }
            JoinOperator::LeftOuterLateral(constraint) => write!(
                f,
                "LEFT OUTER JOIN LATERAL {}{}",
                self.relation,
                suffix(constraint)
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub enum JoinOperator {
    Inner(JoinConstraint),
    LeftOuter(JoinConstraint),
    /// Lateral join: the right-hand subquery may reference columns of the
    /// left-hand side, enabling per-row correlated aggregation
    LeftOuterLateral(JoinConstraint),
}

#[derive(Debug, Clone)]
pub enum JoinConstraint {
    On(Expr),
    None,
}

#[derive(Debug, Clone)]
pub enum TableFactor {
    Table {
        name: ObjectName,
        alias: Option<Ident>,
    },
    Derived {
        subquery: Box<Query>,
        alias: Option<Ident>,
    },
    /// Set-returning function in FROM position, e.g. json_array_elements
    TableFunction {
        function: Function,
        alias: Option<Ident>,
    },
}

impl fmt::Display for TableFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFactor::Table { name, alias } => {
                write!(f, "{}", name)?;
                if let Some(alias) = alias {
                    write!(f, " AS {}", alias)?;
                }
            }
            TableFactor::Derived { subquery, alias } => {
                write!(f, "({})", subquery)?;
                if let Some(alias) = alias {
                    write!(f, " AS {}", alias)?;
                }
            }
            TableFactor::TableFunction { function, alias } => {
                write!(f, "{}", function)?;
                if let Some(alias) = alias {
                    write!(f, " AS {}", alias)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ObjectName(pub Vec<Ident>);

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", display_separated(&self.0, "."))
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Identifier(Ident),
    CompoundIdentifier(Vec<Ident>),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    Nested(Box<Expr>),
    Value(Value),
    Function(Function),
    IsTrue(Box<Expr>),
    IsNotTrue(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        data_type: &'static str,
    },
    /// Correlated scalar subquery
    Subquery(Box<Query>),
    /// `<timestamp> AT TIME ZONE <zone>`
    AtTimeZone {
        timestamp: Box<Expr>,
        zone: Box<Expr>,
    },
    Case {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier(ident) => write!(f, "{}", ident),
            Expr::CompoundIdentifier(idents) => write!(f, "{}", display_separated(idents, ".")),
            Expr::BinaryOp { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Expr::UnaryOp { op, expr } => write!(f, "{} {}", op, expr),
            Expr::Nested(expr) => write!(f, "({})", expr),
            Expr::Value(value) => write!(f, "{}", value),
            Expr::Function(function) => write!(f, "{}", function),
            Expr::IsTrue(expr) => write!(f, "{expr} IS TRUE"),
            Expr::IsNotTrue(expr) => write!(f, "{expr} IS NOT TRUE"),
            Expr::IsNull(expr) => write!(f, "{expr} IS NULL"),
            Expr::IsNotNull(expr) => write!(f, "{expr} IS NOT NULL"),
            Expr::InList { expr, list } => {
                write!(f, "{} IN ({})", expr, display_separated(list, ", "))
            }
            Expr::Cast { expr, data_type } => write!(f, "{}::{}", expr, data_type),
            Expr::Subquery(query) => write!(f, "({})", query),
            Expr::AtTimeZone { timestamp, zone } => {
                write!(f, "{} AT TIME ZONE {}", timestamp, zone)
            }
            Expr::Case {
                condition,
                then,
                otherwise,
            } => {
                write!(f, "CASE WHEN {} THEN {}", condition, then)?;
                if let Some(otherwise) = otherwise {
                    write!(f, " ELSE {}", otherwise)?;
                }
                write!(f, " END")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: ObjectName,
    pub args: Vec<FunctionArgExpr>,
    pub distinct: bool,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}{})",
            self.name,
            if self.distinct { "DISTINCT " } else { "" },
            display_separated(&self.args, ", ")
        )
    }
}

#[derive(Debug, Clone)]
pub enum FunctionArgExpr {
    Expr(Expr),
    /// An unqualified `*`
    Wildcard,
}

impl fmt::Display for FunctionArgExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionArgExpr::Expr(expr) => write!(f, "{}", expr),
            FunctionArgExpr::Wildcard => write!(f, "*"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum UnaryOperator {
    Not,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Not => write!(f, "NOT"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BinaryOperator {
    Gt,
    Lt,
    GtEq,
    LtEq,
    Eq,
    NotEq,
    And,
    Or,
    ILike,
    NotILike,
    /// String concatenation
    Concat,
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOperator::Gt => write!(f, ">"),
            BinaryOperator::Lt => write!(f, "<"),
            BinaryOperator::GtEq => write!(f, ">="),
            BinaryOperator::LtEq => write!(f, "<="),
            BinaryOperator::Eq => write!(f, "="),
            BinaryOperator::NotEq => write!(f, "!="),
            BinaryOperator::And => write!(f, "AND"),
            BinaryOperator::Or => write!(f, "OR"),
            BinaryOperator::ILike => write!(f, "ILIKE"),
            BinaryOperator::NotILike => write!(f, "NOT ILIKE"),
            BinaryOperator::Concat => write!(f, "||"),
            BinaryOperator::Plus => write!(f, "+"),
            BinaryOperator::Minus => write!(f, "-"),
            BinaryOperator::Multiply => write!(f, "*"),
            BinaryOperator::Divide => write!(f, "/"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Number(String),
    SingleQuotedString(String),
    Boolean(bool),
    Null,
    /// Emitted verbatim; used for already-substituted parameter markers
    Placeholder(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::SingleQuotedString(s) => {
                // standard-conforming string literal: double embedded quotes
                let escaped_value = s.replace('\'', "''");
                write!(f, "'{}'", escaped_value)
            }
            Value::Boolean(b) => {
                if *b {
                    write!(f, "TRUE")
                } else {
                    write!(f, "FALSE")
                }
            }
            Value::Null => write!(f, "NULL"),
            Value::Placeholder(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ident {
    value: String,
    quoted: bool,
}

impl Ident {
    pub fn quoted<S: Into<String>>(value: S) -> Self {
        Self {
            value: value.into(),
            quoted: true,
        }
    }
    pub fn unquoted<S: Into<String>>(value: S) -> Self {
        Self {
            value: value.into(),
            quoted: false,
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.quoted {
            write!(f, "\"{}\"", self.value.replace('"', "\"\""))
        } else {
            write!(f, "{}", self.value)
        }
    }
}

pub struct DisplaySeparated<'a, T>
where
    T: fmt::Display,
{
    slice: &'a [T],
    separator: &'static str,
}

fn display_separated<'a, T>(slice: &'a [T], separator: &'static str) -> DisplaySeparated<'a, T>
where
    T: fmt::Display,
{
    DisplaySeparated { slice, separator }
}

impl<'a, T> fmt::Display for DisplaySeparated<'a, T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for t in self.slice {
            if first {
                first = false;
            } else {
                write!(f, "{}", self.separator)?;
            }
            write!(f, "{}", t)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: &str, column: &str) -> Expr {
        Expr::CompoundIdentifier(vec![Ident::quoted(table), Ident::quoted(column)])
    }

    #[test]
    fn renders_lateral_join() {
        let subquery = Query::new(vec![SelectItem::Wildcard])
            .from(vec![TableWithJoins {
                relation: TableFactor::Table {
                    name: ObjectName(vec![Ident::quoted("tags")]),
                    alias: Some(Ident::quoted("t")),
                },
                joins: vec![],
            }])
            .boxed();
        let mut query = Query::new(vec![SelectItem::Wildcard]).from(vec![TableWithJoins {
            relation: TableFactor::Table {
                name: ObjectName(vec![Ident::quoted("orders")]),
                alias: Some(Ident::quoted("o")),
            },
            joins: vec![],
        }]);
        query.push_join(Join {
            relation: TableFactor::Derived {
                subquery,
                alias: Some(Ident::quoted("rel")),
            },
            join_operator: JoinOperator::LeftOuterLateral(JoinConstraint::On(Expr::Value(
                Value::Boolean(true),
            ))),
        });

        assert_eq!(
            query.to_string(),
            "SELECT * FROM \"orders\" AS \"o\" LEFT OUTER JOIN LATERAL \
             (SELECT * FROM \"tags\" AS \"t\") AS \"rel\" ON TRUE"
        );
    }

    #[test]
    fn renders_predicates_and_pagination() {
        let mut query = Query::new(vec![SelectItem::UnnamedExpr(col("o", "id"))]).from(vec![
            TableWithJoins {
                relation: TableFactor::Table {
                    name: ObjectName(vec![Ident::quoted("orders")]),
                    alias: Some(Ident::quoted("o")),
                },
                joins: vec![],
            },
        ]);
        query.and_predicate(Expr::BinaryOp {
            left: Box::new(col("o", "active")),
            op: BinaryOperator::Eq,
            right: Box::new(Expr::Value(Value::Boolean(true))),
        });
        query.and_predicate(Expr::IsNotNull(Box::new(col("o", "name"))));
        query.set_limit(Value::Number("25".to_owned()));
        query.set_offset(Value::Number("0".to_owned()));

        assert_eq!(
            query.to_string(),
            "SELECT \"o\".\"id\" FROM \"orders\" AS \"o\" \
             WHERE \"o\".\"active\" = TRUE AND (\"o\".\"name\" IS NOT NULL) \
             LIMIT 25 OFFSET 0"
        );
    }

    #[test]
    fn escapes_string_literals_and_idents() {
        let literal = Expr::Value(Value::SingleQuotedString("it's".to_owned()));
        assert_eq!(literal.to_string(), "'it''s'");
        assert_eq!(Ident::quoted("we\"ird").to_string(), "\"we\"\"ird\"");
    }

    #[test]
    fn renders_cast_and_subquery() {
        let empty_array = Expr::Cast {
            expr: Box::new(Expr::Value(Value::SingleQuotedString("[]".to_owned()))),
            data_type: "json",
        };
        assert_eq!(empty_array.to_string(), "'[]'::json");
    }
}
