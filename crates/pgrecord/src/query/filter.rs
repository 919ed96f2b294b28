//! Filter expressions for WHERE/AND/OR.

use crate::error::FilterError;
use crate::value::Value;
use std::fmt;

/// Comparison operator of one filter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    /// Membership; the argument must be a non-empty list.
    In,
    NotIn,
    /// Inclusive range; the argument must be a two-element list.
    Between,
    NotBetween,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Like => "LIKE",
            FilterOp::In => "IN",
            FilterOp::NotIn => "NOT IN",
            FilterOp::Between => "BETWEEN",
            FilterOp::NotBetween => "NOT BETWEEN",
        }
    }

    fn is_set(&self) -> bool {
        matches!(self, FilterOp::In | FilterOp::NotIn)
    }

    fn is_range(&self) -> bool {
        matches!(self, FilterOp::Between | FilterOp::NotBetween)
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render `column op <placeholders>`, pushing the bound values onto `args`.
///
/// Placeholders continue from `args.len() + 1`. Nothing is pushed when the
/// argument is rejected.
pub(crate) fn render(
    column: &str,
    op: FilterOp,
    arg: Value,
    args: &mut Vec<Value>,
) -> Result<String, FilterError> {
    let placeholders = if op.is_set() {
        let items = into_items(column, op, arg)?;
        if items.is_empty() {
            return Err(FilterError::EmptySequence {
                column: column.to_string(),
                op: op.as_str(),
            });
        }
        let rendered: Vec<String> = items.into_iter().map(|item| bind(args, item)).collect();
        format!("({})", rendered.join(","))
    } else if op.is_range() {
        let items = into_items(column, op, arg)?;
        let [low, high]: [Value; 2] =
            items
                .try_into()
                .map_err(|items: Vec<Value>| FilterError::IncompleteRange {
                    column: column.to_string(),
                    op: op.as_str(),
                    got: items.len(),
                })?;
        let low = bind(args, low);
        let high = bind(args, high);
        format!("{low} AND {high}")
    } else {
        bind(args, arg)
    };

    Ok(format!("{column} {op} {placeholders}"))
}

fn into_items(column: &str, op: FilterOp, arg: Value) -> Result<Vec<Value>, FilterError> {
    match arg {
        Value::List(items) => Ok(items),
        _ => Err(FilterError::NotASequence {
            column: column.to_string(),
            op: op.as_str(),
        }),
    }
}

fn bind(args: &mut Vec<Value>, value: Value) -> String {
    args.push(value);
    format!("${}", args.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_operators_bind_one_value() {
        let mut args = vec![Value::from(1)];
        let sql = render("age", FilterOp::Gte, 18.into(), &mut args).unwrap();
        assert_eq!(sql, "age >= $2");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn rejected_argument_binds_nothing() {
        let mut args = Vec::new();
        let err =
            render("id", FilterOp::In, Value::list(Vec::<i64>::new()), &mut args).unwrap_err();
        assert!(matches!(err, FilterError::EmptySequence { .. }));
        assert!(args.is_empty());
    }
}
