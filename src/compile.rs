use datafusion_common::ScalarValue;

use crate::{
    error::{CatalogError, Result},
    expr::{CmpOp, Expr},
    filter::{Filter, FilterValue, NormalizedFilters, Operator},
};

/// Compile normalized filters into an in-memory [`Expr`].
///
/// Returns `Ok(None)` when there is nothing to filter. Each AND-group becomes
/// an [`Expr::And`] and the groups are combined with [`Expr::Or`]. An empty
/// AND-group is always true, so a disjunction containing one matches every
/// row.
///
/// Column existence is not checked here; evaluation reports unknown columns.
///
/// # Example
/// ```
/// use lakecat::{Filter, compile_expression};
///
/// let expr = compile_expression(&vec![vec![Filter::eq("a", 1i64)]])
///     .unwrap()
///     .unwrap();
/// assert_eq!(expr.to_string(), "a = Int64(1)");
/// ```
pub fn compile_expression(filters: &NormalizedFilters) -> Result<Option<Expr>> {
    if filters.is_empty() {
        return Ok(None);
    }

    let mut groups = filters
        .iter()
        .map(|group| compile_conjunction(group))
        .collect::<Result<Vec<_>>>()?;

    if groups.len() == 1 {
        return Ok(groups.pop());
    }
    Ok(Some(Expr::or(groups)))
}

fn compile_conjunction(filters: &[Filter]) -> Result<Expr> {
    if filters.is_empty() {
        return Ok(Expr::True);
    }

    let mut parts = filters
        .iter()
        .map(compile_filter)
        .collect::<Result<Vec<_>>>()?;

    if parts.len() == 1 {
        return Ok(parts.remove(0));
    }
    Ok(Expr::and(parts))
}

/// Compile one filter into an expression.
pub fn compile_filter(filter: &Filter) -> Result<Expr> {
    let column = filter.column();

    let expr = match filter.operator() {
        Operator::Eq => cmp(filter, CmpOp::Eq)?,
        Operator::NotEq => cmp(filter, CmpOp::NotEq)?,
        Operator::Lt => cmp(filter, CmpOp::Lt)?,
        Operator::LtEq => cmp(filter, CmpOp::LtEq)?,
        Operator::Gt => cmp(filter, CmpOp::Gt)?,
        Operator::GtEq => cmp(filter, CmpOp::GtEq)?,
        Operator::In => Expr::in_list(column, filter.value().values().to_vec()),
        Operator::NotIn => Expr::not_in_list(column, filter.value().values().to_vec()),
        Operator::Contains => match filter.value() {
            FilterValue::Scalar(
                ScalarValue::Utf8(Some(pattern))
                | ScalarValue::LargeUtf8(Some(pattern))
                | ScalarValue::Utf8View(Some(pattern)),
            ) => Expr::contains(column, pattern.clone()),
            other => {
                return Err(CatalogError::invalid_value(
                    column,
                    format!("contains expects a string value, got {}", other),
                ));
            }
        },
        Operator::Includes => match filter.value() {
            FilterValue::Scalar(value) => Expr::list_contains(column, value.clone()),
            FilterValue::List(_) => {
                return Err(CatalogError::invalid_value(
                    column,
                    "includes expects a single value",
                ));
            }
        },
        Operator::IncludesAny => Expr::or(list_contains_each(column, filter.value())),
        Operator::IncludesAll => Expr::and(list_contains_each(column, filter.value())),
    };

    Ok(expr)
}

fn cmp(filter: &Filter, op: CmpOp) -> Result<Expr> {
    let value = filter.value().as_scalar().ok_or_else(|| {
        CatalogError::invalid_value(
            filter.column(),
            format!("operator '{}' expects a single value", filter.operator()),
        )
    })?;
    Ok(Expr::cmp(filter.column(), op, value.clone()))
}

fn list_contains_each(column: &str, value: &FilterValue) -> Vec<Expr> {
    value
        .values()
        .iter()
        .map(|v| Expr::list_contains(column, v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filters_compile_to_none() {
        assert!(compile_expression(&vec![]).unwrap().is_none());
    }

    #[test]
    fn test_single_filter_is_not_wrapped() {
        let expr = compile_expression(&vec![vec![Filter::gt("value", 3i64)]])
            .unwrap()
            .unwrap();
        assert_eq!(expr, Expr::gt("value", ScalarValue::Int64(Some(3))));
    }

    #[test]
    fn test_groups_combine_with_or() {
        let filters = vec![
            vec![Filter::eq("a", 1i64), Filter::lt("b", 2i64)],
            vec![Filter::not_eq("c", "x")],
        ];
        let expr = compile_expression(&filters).unwrap().unwrap();
        assert_eq!(
            expr,
            Expr::or(vec![
                Expr::and(vec![
                    Expr::eq("a", ScalarValue::Int64(Some(1))),
                    Expr::cmp("b", CmpOp::Lt, ScalarValue::Int64(Some(2))),
                ]),
                Expr::cmp("c", CmpOp::NotEq, ScalarValue::from("x")),
            ])
        );
    }

    #[test]
    fn test_empty_group_is_true() {
        let filters = vec![vec![], vec![Filter::eq("a", 1i64)]];
        let expr = compile_expression(&filters).unwrap().unwrap();
        assert_eq!(
            expr,
            Expr::or(vec![Expr::True, Expr::eq("a", ScalarValue::Int64(Some(1)))])
        );
        assert_eq!(compile_expression(&vec![vec![]]).unwrap(), Some(Expr::True));
    }

    #[test]
    fn test_membership_operators() {
        let expr = compile_filter(&Filter::in_list("id", [1i64, 2])).unwrap();
        assert_eq!(
            expr,
            Expr::in_list(
                "id",
                vec![ScalarValue::Int64(Some(1)), ScalarValue::Int64(Some(2))]
            )
        );

        // Scalar value for `in` acts as a one-element list
        let filter = Filter::new("id", Operator::In, FilterValue::scalar(7i64));
        assert_eq!(
            compile_filter(&filter).unwrap(),
            Expr::in_list("id", vec![ScalarValue::Int64(Some(7))])
        );

        let expr = compile_filter(&Filter::not_in_list("id", [3i64])).unwrap();
        assert_eq!(
            expr,
            Expr::not_in_list("id", vec![ScalarValue::Int64(Some(3))])
        );
    }

    #[test]
    fn test_list_operators() {
        assert_eq!(
            compile_filter(&Filter::includes("tags", "a")).unwrap(),
            Expr::list_contains("tags", ScalarValue::from("a"))
        );
        assert_eq!(
            compile_filter(&Filter::includes_any("tags", ["a", "b"])).unwrap(),
            Expr::or(vec![
                Expr::list_contains("tags", ScalarValue::from("a")),
                Expr::list_contains("tags", ScalarValue::from("b")),
            ])
        );
        assert_eq!(
            compile_filter(&Filter::includes_all("tags", ["a", "b"])).unwrap(),
            Expr::and(vec![
                Expr::list_contains("tags", ScalarValue::from("a")),
                Expr::list_contains("tags", ScalarValue::from("b")),
            ])
        );
    }

    #[test]
    fn test_contains_requires_string() {
        assert_eq!(
            compile_filter(&Filter::contains("name", "jo")).unwrap(),
            Expr::contains("name", "jo")
        );

        let filter = Filter::new("name", Operator::Contains, FilterValue::scalar(5i64));
        let err = compile_filter(&filter).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidValue { ref column, .. } if column == "name"));
    }

    #[test]
    fn test_comparison_rejects_list_value() {
        let filter = Filter::new("id", Operator::Gt, FilterValue::list([1i64, 2]));
        assert!(matches!(
            compile_filter(&filter),
            Err(CatalogError::InvalidValue { .. })
        ));
    }
}
