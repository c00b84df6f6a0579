use std::{
    error::Error,
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::meta::{Filter, FilterOp, LogicalOp};

/// Parse a where-clause string into a filter tree.
///
/// The grammar is the compact comparison syntax used in request query
/// strings: `(field,op[,value])` leaves combined with `~and` / `~or`, with
/// `~not` prefixing a parenthesized group and groups nesting arbitrarily,
/// e.g. `(Active,eq,true)~and((Amount,gt,10)~or(Vip,eq,true))`.
pub fn parse_where(input: &str) -> Result<Vec<Filter>, WhereParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }
    where_grammar::root(trimmed)
        .map(|filter| vec![filter])
        .map_err(|err| WhereParseError(format!("{input:?}: {err}")))
}

#[derive(Debug)]
pub struct WhereParseError(String);

impl Display for WhereParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed where clause {}", self.0)
    }
}

impl Error for WhereParseError {}

peg::parser! {
    grammar where_grammar() for str {
        pub rule root() -> Filter
            = _ f:expr() _ { f }

        rule expr() -> Filter
            = head:term() tail:(_ c:connective() _ t:term() { (c, t) })* {
                fold_terms(head, tail)
            }

        rule connective() -> LogicalOp
            = "~and" { LogicalOp::And }
            / "~or" { LogicalOp::Or }

        rule term() -> Filter
            = "~not" _ g:paren() {
                Filter::Group { logical_op: LogicalOp::Not, children: vec![g] }
            }
            / paren()

        rule paren() -> Filter
            = "(" _ e:expr() _ ")" { e }
            / "(" l:leaf() ")" { l }

        rule leaf() -> Filter
            = field:field() "," op:op_name() value:("," v:value() { v })? {?
                let op = FilterOp::from_str(op).or(Err("comparison operator"))?;
                Ok(Filter::Leaf {
                    field: field.trim().to_owned(),
                    op,
                    value: match value {
                        Some(v) => serde_json::Value::String(v.to_owned()),
                        None => serde_json::Value::Null,
                    },
                })
            }

        rule field() -> &'input str
            = $([^ ',' | '(' | ')']+)

        rule op_name() -> &'input str
            = $(['a'..='z' | 'A'..='Z']+)

        rule value() -> &'input str
            = $([^ ')']*)

        rule _() = quiet!{[' ' | '\t']*}
    }
}

fn fold_terms(head: Filter, tail: Vec<(LogicalOp, Filter)>) -> Filter {
    let mut current = head;
    for (op, next) in tail {
        current = Filter::Group {
            logical_op: op,
            children: vec![current, next],
        };
    }
    current
}
