//! Filter model: operators, values and normalization into disjunctive normal form.

use std::{fmt, str::FromStr};

use arrow_cast::display::{ArrayFormatter, FormatOptions};
use arrow_schema::DataType;
use datafusion_common::ScalarValue;

use crate::error::CatalogError;

/// Comparison operator of a [`Filter`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    /// Substring match on a string column
    Contains,
    /// List column contains the value
    Includes,
    /// List column contains at least one of the values
    IncludesAny,
    /// List column contains every value
    IncludesAll,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Contains => "contains",
            Operator::Includes => "includes",
            Operator::IncludesAny => "includes any",
            Operator::IncludesAll => "includes all",
        }
    }

    /// Whether the operator renders as a plain binary SQL comparison.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::NotEq
                | Operator::Lt
                | Operator::LtEq
                | Operator::Gt
                | Operator::GtEq
                | Operator::In
                | Operator::NotIn
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "=" => Operator::Eq,
            "!=" => Operator::NotEq,
            "<" => Operator::Lt,
            "<=" => Operator::LtEq,
            ">" => Operator::Gt,
            ">=" => Operator::GtEq,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "contains" => Operator::Contains,
            "includes" => Operator::Includes,
            "includes any" => Operator::IncludesAny,
            "includes all" => Operator::IncludesAll,
            other => {
                return Err(CatalogError::invalid_operator(other, "unknown operator"));
            }
        };
        Ok(op)
    }
}

/// Right-hand side of a [`Filter`].
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Scalar(ScalarValue),
    List(Vec<ScalarValue>),
}

impl FilterValue {
    pub fn scalar(value: impl Into<ScalarValue>) -> Self {
        FilterValue::Scalar(value.into())
    }

    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            FilterValue::Scalar(value) => Some(value),
            FilterValue::List(_) => None,
        }
    }

    /// Values as a slice; a scalar is a one-element list.
    pub fn values(&self) -> &[ScalarValue] {
        match self {
            FilterValue::Scalar(value) => std::slice::from_ref(value),
            FilterValue::List(values) => values,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Scalar(value) => f.write_str(&scalar_to_string(value)),
            FilterValue::List(values) => {
                write!(f, "(")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    f.write_str(&scalar_to_string(v))?;
                }
                write!(f, ")")
            }
        }
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMP_TZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// Render a scalar the way it appears in paths and SQL text, without quoting.
///
/// Floats always carry a decimal point (`1.0`). Dates render as `2024-01-01`
/// and timestamps as `2024-01-01 00:00:00`, with the offset appended when the
/// timestamp has a time zone.
pub(crate) fn scalar_to_string(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Utf8(Some(v))
        | ScalarValue::LargeUtf8(Some(v))
        | ScalarValue::Utf8View(Some(v)) => v.clone(),
        ScalarValue::Float32(Some(v)) => format!("{:?}", v),
        ScalarValue::Float64(Some(v)) => format!("{:?}", v),
        other if !other.is_null() && is_temporal(&other.data_type()) => {
            format_temporal(other).unwrap_or_else(|| other.to_string())
        }
        other => other.to_string(),
    }
}

/// Date, time and timestamp types, which render as text.
pub(crate) fn is_temporal(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Date32
            | DataType::Date64
            | DataType::Time32(_)
            | DataType::Time64(_)
            | DataType::Timestamp(_, _)
    )
}

fn format_temporal(value: &ScalarValue) -> Option<String> {
    let array = value.to_array().ok()?;
    let options = FormatOptions::new()
        .with_timestamp_format(Some(TIMESTAMP_FORMAT))
        .with_timestamp_tz_format(Some(TIMESTAMP_TZ_FORMAT));
    let formatter = ArrayFormatter::try_new(array.as_ref(), &options).ok()?;
    Some(formatter.value(0).to_string())
}

/// A single `(column, operator, value)` condition.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    column: String,
    operator: Operator,
    value: FilterValue,
}

impl Filter {
    pub fn new(column: impl Into<String>, operator: Operator, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    /// Build a filter from an operator string such as `"not in"`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidOperator`] for unknown operator strings.
    pub fn try_new(
        column: impl Into<String>,
        operator: &str,
        value: FilterValue,
    ) -> Result<Self, CatalogError> {
        Ok(Self::new(column, operator.parse()?, value))
    }

    fn scalar(
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<ScalarValue>,
    ) -> Self {
        Self::new(column, operator, FilterValue::scalar(value))
    }

    fn list<I, V>(column: impl Into<String>, operator: Operator, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Self::new(column, operator, FilterValue::list(values))
    }

    pub fn eq(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(column, Operator::Eq, value)
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(column, Operator::NotEq, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(column, Operator::Lt, value)
    }

    pub fn lt_eq(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(column, Operator::LtEq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(column, Operator::Gt, value)
    }

    pub fn gt_eq(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(column, Operator::GtEq, value)
    }

    pub fn in_list<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Self::list(column, Operator::In, values)
    }

    pub fn not_in_list<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Self::list(column, Operator::NotIn, values)
    }

    pub fn contains(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::scalar(column, Operator::Contains, ScalarValue::Utf8(Some(pattern.into())))
    }

    pub fn includes(column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::scalar(column, Operator::Includes, value)
    }

    pub fn includes_any<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Self::list(column, Operator::IncludesAny, values)
    }

    pub fn includes_all<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Self::list(column, Operator::IncludesAll, values)
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &FilterValue {
        &self.value
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.operator, self.value)
    }
}

/// Disjunction (outer) of conjunctions (inner) of filters.
pub type NormalizedFilters = Vec<Vec<Filter>>;

/// Filters as supplied by callers: either one AND-group or an OR of AND-groups.
#[derive(Clone, Debug, PartialEq)]
pub enum InputFilters {
    Conjunction(Vec<Filter>),
    Disjunction(Vec<Vec<Filter>>),
}

impl InputFilters {
    pub fn is_empty(&self) -> bool {
        match self {
            InputFilters::Conjunction(filters) => filters.is_empty(),
            InputFilters::Disjunction(groups) => groups.is_empty(),
        }
    }
}

impl From<Filter> for InputFilters {
    fn from(filter: Filter) -> Self {
        InputFilters::Conjunction(vec![filter])
    }
}

impl From<Vec<Filter>> for InputFilters {
    fn from(filters: Vec<Filter>) -> Self {
        InputFilters::Conjunction(filters)
    }
}

impl From<Vec<Vec<Filter>>> for InputFilters {
    fn from(groups: Vec<Vec<Filter>>) -> Self {
        InputFilters::Disjunction(groups)
    }
}

/// Normalize caller filters into a list of AND-groups that are OR-ed together.
///
/// `None` and empty input both normalize to `[]`, which means "no filtering",
/// not "reject every row". Column and operator validity is not checked here.
pub fn normalize_filters(filters: Option<InputFilters>) -> NormalizedFilters {
    match filters {
        None => Vec::new(),
        Some(filters) if filters.is_empty() => Vec::new(),
        Some(InputFilters::Conjunction(filters)) => vec![filters],
        Some(InputFilters::Disjunction(groups)) => groups,
    }
}
