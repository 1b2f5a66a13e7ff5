//! Translation of normalized filters into SQL predicate strings.

use arrow_schema::{DataType, Schema};
use datafusion_common::ScalarValue;

use crate::{
    error::{CatalogError, Result},
    filter::{Filter, FilterValue, NormalizedFilters, Operator, is_temporal, scalar_to_string},
};

/// SQL flavour of the engine that receives the predicate.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SqlDialect {
    /// DataFusion SQL, as accepted by Delta Lake query builders.
    #[default]
    DataFusion,
    ClickHouse,
}

impl SqlDialect {
    fn array_contains(&self) -> &'static str {
        match self {
            SqlDialect::DataFusion => "array_contains",
            SqlDialect::ClickHouse => "has",
        }
    }
}

/// Compile normalized filters into a DataFusion SQL predicate.
///
/// Empty filters compile to `"true"`. Each AND-group is parenthesized and the
/// groups are joined with `or`.
///
/// # Example
/// ```
/// use arrow_schema::{DataType, Field, Schema};
/// use lakecat::{Filter, compile_predicate};
///
/// let schema = Schema::new(vec![
///     Field::new("s", DataType::Utf8, true),
///     Field::new("x", DataType::Int64, true),
/// ]);
/// let filters = vec![vec![Filter::eq("s", "a'b"), Filter::in_list("x", [1i64])]];
/// assert_eq!(
///     compile_predicate(&schema, &filters).unwrap(),
///     "((s = 'a''b') and (x in (1)))"
/// );
/// ```
pub fn compile_predicate(schema: &Schema, filters: &NormalizedFilters) -> Result<String> {
    compile_predicate_with_dialect(schema, filters, SqlDialect::DataFusion)
}

pub fn compile_predicate_with_dialect(
    schema: &Schema,
    filters: &NormalizedFilters,
    dialect: SqlDialect,
) -> Result<String> {
    if filters.is_empty() {
        return Ok("true".to_string());
    }

    let conjunctions = filters
        .iter()
        .map(|group| conjunction_to_sql(schema, group, dialect))
        .collect::<Result<Vec<_>>>()?;
    Ok(conjunctions.join(" or "))
}

/// Compile one AND-group. An empty group is `"true"`.
pub fn conjunction_to_sql(
    schema: &Schema,
    filters: &[Filter],
    dialect: SqlDialect,
) -> Result<String> {
    if filters.is_empty() {
        return Ok("true".to_string());
    }

    let exprs = filters
        .iter()
        .map(|f| filter_to_sql(schema, f, dialect))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", exprs.join(" and ")))
}

/// Compile a single filter.
///
/// # Errors
///
/// - [`CatalogError::InvalidColumn`] if the column is not in `schema`
/// - [`CatalogError::InvalidOperator`] if an `includes*` operator targets a non-list column
/// - [`CatalogError::InvalidValue`] if `contains` is given a non-string value
pub fn filter_to_sql(schema: &Schema, filter: &Filter, dialect: SqlDialect) -> Result<String> {
    let column = filter.column();
    let field = schema
        .field_with_name(column)
        .map_err(|_| CatalogError::InvalidColumn {
            column: column.to_string(),
        })?;
    let column_type = field.data_type();

    match filter.operator() {
        Operator::In | Operator::NotIn => {
            // Always a parenthesized list, even for a single value.
            let value_str = list_to_sql(filter.value().values(), column_type);
            Ok(format!("({} {} {})", column, filter.operator(), value_str))
        }
        op @ (Operator::Eq
        | Operator::NotEq
        | Operator::Lt
        | Operator::LtEq
        | Operator::Gt
        | Operator::GtEq) => {
            let value_str = value_to_sql(filter.value(), column_type);
            Ok(format!("({} {} {})", column, op, value_str))
        }
        Operator::Contains => {
            let pattern = string_value(filter)?;
            Ok(format!("({} like '%{}%')", column, escape_sql_string(pattern)))
        }
        op @ (Operator::Includes | Operator::IncludesAny | Operator::IncludesAll) => {
            let element_type = list_element_type(column_type).ok_or_else(|| {
                CatalogError::invalid_operator(
                    op.as_str(),
                    format!("column '{}' of type {} is not a list", column, column_type),
                )
            })?;

            let values = match (op, filter.value()) {
                (Operator::Includes, FilterValue::Scalar(value)) => std::slice::from_ref(value),
                (Operator::Includes, FilterValue::List(_)) => {
                    return Err(CatalogError::invalid_value(
                        column,
                        "'includes' expects a single value",
                    ));
                }
                (_, value) => value.values(),
            };

            let include_exprs = values
                .iter()
                .map(|value| {
                    format!(
                        "{}({}, {})",
                        dialect.array_contains(),
                        column,
                        scalar_to_sql(value, element_type)
                    )
                })
                .collect::<Vec<_>>();
            let join_operator = if op == Operator::IncludesAny {
                " or "
            } else {
                " and "
            };
            Ok(format!("({})", include_exprs.join(join_operator)))
        }
    }
}

fn string_value(filter: &Filter) -> Result<&str> {
    match filter.value() {
        FilterValue::Scalar(
            ScalarValue::Utf8(Some(v))
            | ScalarValue::LargeUtf8(Some(v))
            | ScalarValue::Utf8View(Some(v)),
        ) => Ok(v),
        other => Err(CatalogError::invalid_value(
            filter.column(),
            format!("'contains' expects a string, got {}", other),
        )),
    }
}

fn list_element_type(data_type: &DataType) -> Option<&DataType> {
    match data_type {
        DataType::List(field) | DataType::LargeList(field) | DataType::FixedSizeList(field, _) => {
            Some(field.data_type())
        }
        _ => None,
    }
}

fn is_string_type(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View)
}

fn value_to_sql(value: &FilterValue, value_type: &DataType) -> String {
    match value {
        FilterValue::Scalar(value) => scalar_to_sql(value, value_type),
        FilterValue::List(values) => list_to_sql(values, value_type),
    }
}

fn list_to_sql(values: &[ScalarValue], value_type: &DataType) -> String {
    let elements = values
        .iter()
        .map(|v| scalar_to_sql(v, value_type))
        .collect::<Vec<_>>();
    format!("({})", elements.join(", "))
}

/// Render a scalar for a column of `value_type`. String and temporal columns are
/// quoted; no casting is performed.
fn scalar_to_sql(value: &ScalarValue, value_type: &DataType) -> String {
    let value_str = scalar_to_string(value);
    if is_string_type(value_type) || is_temporal(value_type) {
        format!("'{}'", escape_sql_string(&value_str))
    } else {
        value_str
    }
}

/// Escape a string literal for SQL by doubling single quotes.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::{Field, TimeUnit};

    use super::*;

    fn test_schema() -> Schema {
        Schema::new(vec![
            Field::new("str_col", DataType::Utf8, true),
            Field::new("int_col", DataType::Int64, true),
            Field::new("ratio", DataType::Float64, true),
            Field::new("day", DataType::Date32, true),
            Field::new("ts", DataType::Timestamp(TimeUnit::Microsecond, None), true),
            Field::new(
                "list_col",
                DataType::List(Arc::new(Field::new_list_field(DataType::Int64, true))),
                true,
            ),
            Field::new(
                "list_str_col",
                DataType::LargeList(Arc::new(Field::new_list_field(DataType::Utf8, true))),
                true,
            ),
        ])
    }

    fn sql(filter: Filter) -> String {
        filter_to_sql(&test_schema(), &filter, SqlDialect::DataFusion).unwrap()
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(sql(Filter::eq("int_col", 123i64)), "(int_col = 123)");
        // Non-string columns are rendered without quotes, whatever the value type
        assert_eq!(sql(Filter::eq("int_col", "123")), "(int_col = 123)");
        assert_eq!(sql(Filter::lt_eq("int_col", 7i64)), "(int_col <= 7)");
        assert_eq!(sql(Filter::not_eq("str_col", "x")), "(str_col != 'x')");
    }

    #[test]
    fn test_float_and_temporal_values() {
        assert_eq!(sql(Filter::eq("ratio", 1.0f64)), "(ratio = 1.0)");
        assert_eq!(
            sql(Filter::eq("day", ScalarValue::Date32(Some(19723)))),
            "(day = '2024-01-01')"
        );
        assert_eq!(
            sql(Filter::gt_eq(
                "ts",
                ScalarValue::TimestampMicrosecond(Some(1_700_000_000_000_000), None)
            )),
            "(ts >= '2023-11-14 22:13:20')"
        );
        // A string value against a timestamp column is quoted as-is
        assert_eq!(
            sql(Filter::lt("ts", "2024-01-01 00:00:00")),
            "(ts < '2024-01-01 00:00:00')"
        );
    }

    #[test]
    fn test_in_lists() {
        // A single element list has no trailing comma
        assert_eq!(sql(Filter::in_list("int_col", [1i64])), "(int_col in (1))");
        assert_eq!(sql(Filter::in_list("int_col", [1i64, 2])), "(int_col in (1, 2))");
        assert_eq!(
            sql(Filter::not_in_list("int_col", [1i64, 2])),
            "(int_col not in (1, 2))"
        );
        assert_eq!(sql(Filter::in_list("str_col", ["val1"])), "(str_col in ('val1'))");
        assert_eq!(
            sql(Filter::in_list("str_col", ["val1", "val2"])),
            "(str_col in ('val1', 'val2'))"
        );
        // A scalar value for `in` still renders as a list
        assert_eq!(
            sql(Filter::new("int_col", Operator::In, FilterValue::scalar(5i64))),
            "(int_col in (5))"
        );
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(sql(Filter::eq("str_col", "x")), "(str_col = 'x')");
        assert_eq!(sql(Filter::eq("str_col", "a'b")), "(str_col = 'a''b')");
        assert_eq!(sql(Filter::contains("str_col", "x'")), "(str_col like '%x''%')");
    }

    #[test]
    fn test_list_columns() {
        assert_eq!(
            sql(Filter::includes("list_col", 1i64)),
            "(array_contains(list_col, 1))"
        );
        assert_eq!(
            sql(Filter::includes("list_str_col", "x")),
            "(array_contains(list_str_col, 'x'))"
        );
        assert_eq!(
            sql(Filter::includes_all("list_col", [1i64, 2, 3])),
            "(array_contains(list_col, 1) and array_contains(list_col, 2) and array_contains(list_col, 3))"
        );
        assert_eq!(
            sql(Filter::includes_any("list_col", [1i64, 2, 3])),
            "(array_contains(list_col, 1) or array_contains(list_col, 2) or array_contains(list_col, 3))"
        );
    }

    #[test]
    fn test_clickhouse_dialect_uses_has() {
        let filter = Filter::includes_any("list_col", [1i64, 2]);
        assert_eq!(
            filter_to_sql(&test_schema(), &filter, SqlDialect::ClickHouse).unwrap(),
            "(has(list_col, 1) or has(list_col, 2))"
        );
    }

    #[test]
    fn test_invalid_column() {
        let err = filter_to_sql(
            &test_schema(),
            &Filter::eq("invalid_col", 0i64),
            SqlDialect::DataFusion,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Invalid column name invalid_col"));
    }

    #[test]
    fn test_includes_on_scalar_column_is_invalid_operator() {
        let err = filter_to_sql(
            &test_schema(),
            &Filter::includes("int_col", 1i64),
            SqlDialect::DataFusion,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidOperator { .. }));
    }

    #[test]
    fn test_contains_requires_string() {
        let filter = Filter::new("str_col", Operator::Contains, FilterValue::scalar(1i64));
        let err = filter_to_sql(&test_schema(), &filter, SqlDialect::DataFusion).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidValue { .. }));
    }

    #[test]
    fn test_predicates() {
        let schema = test_schema();
        assert_eq!(compile_predicate(&schema, &vec![]).unwrap(), "true");
        assert_eq!(compile_predicate(&schema, &vec![vec![]]).unwrap(), "true");
        assert_eq!(
            compile_predicate(&schema, &vec![vec![Filter::eq("str_col", "x")]]).unwrap(),
            "((str_col = 'x'))"
        );
        assert_eq!(
            compile_predicate(
                &schema,
                &vec![vec![Filter::eq("str_col", "x"), Filter::eq("int_col", 123i64)]]
            )
            .unwrap(),
            "((str_col = 'x') and (int_col = 123))"
        );
        assert_eq!(
            compile_predicate(
                &schema,
                &vec![
                    vec![Filter::eq("str_col", "x")],
                    vec![Filter::eq("int_col", 123i64), Filter::lt("int_col", 456i64)],
                ]
            )
            .unwrap(),
            "((str_col = 'x')) or ((int_col = 123) and (int_col < 456))"
        );
    }
}
