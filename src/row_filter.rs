//! Row-level evaluation of compiled [`Expr`] trees against Arrow batches.
//!
//! Literals are cast to the type of the column they are compared with, so a
//! filter written as `Int64` matches an `Int32` column. AND/OR use Kleene
//! logic; rows whose predicate evaluates to null are dropped.

use arrow_arith::boolean as arith_boolean;
use arrow_array::{
    Array, ArrayRef, BooleanArray, GenericListArray, LargeStringArray, OffsetSizeTrait,
    RecordBatch, StringArray, StringViewArray,
};
use arrow_ord::cmp as ord_cmp;
use arrow_schema::{ArrowError, DataType};
use arrow_select::filter::filter_record_batch;
use datafusion_common::ScalarValue;

use crate::{
    error::{CatalogError, Result},
    expr::{CmpOp, Expr},
};

/// Evaluates an [`Expr`] against record batches.
#[derive(Clone, Debug)]
pub struct RowFilter {
    expr: Expr,
}

impl RowFilter {
    /// Create a new row filter from an expression
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    ///
    /// use arrow_array::{Int64Array, RecordBatch};
    /// use arrow_schema::{DataType, Field, Schema};
    /// use lakecat::{Filter, RowFilter, compile_expression};
    ///
    /// let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
    /// let batch =
    ///     RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))]).unwrap();
    ///
    /// let expr = compile_expression(&vec![vec![Filter::gt("id", 1i64)]])
    ///     .unwrap()
    ///     .unwrap();
    /// let filtered = RowFilter::new(expr).apply_filter(batch).unwrap();
    /// assert_eq!(filtered.num_rows(), 2);
    /// ```
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate the filter against a batch and return a boolean mask
    pub fn filter_batch(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        evaluate_expr(&self.expr, batch)
    }

    /// Evaluate and apply the filter, returning only matching rows
    pub fn apply_filter(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let mask = self.filter_batch(&batch)?;
        Ok(filter_record_batch(&batch, &mask)?)
    }
}

fn evaluate_expr(expr: &Expr, batch: &RecordBatch) -> Result<BooleanArray> {
    match expr {
        Expr::True => Ok(BooleanArray::from(vec![true; batch.num_rows()])),
        Expr::Cmp { column, op, value } => evaluate_cmp(batch, column, *op, value),
        Expr::InList {
            column,
            values,
            negated,
        } => {
            let result = evaluate_in_list(batch, column, values)?;
            if *negated {
                Ok(arith_boolean::not(&result)?)
            } else {
                Ok(result)
            }
        }
        Expr::Contains { column, pattern } => evaluate_contains(batch, column, pattern),
        Expr::ListContains { column, value } => evaluate_list_contains(batch, column, value),
        Expr::And(exprs) => evaluate_and(batch, exprs),
        Expr::Or(exprs) => evaluate_or(batch, exprs),
    }
}

fn column<'a>(batch: &'a RecordBatch, column: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(column)
        .ok_or_else(|| CatalogError::InvalidColumn {
            column: column.to_string(),
        })
}

/// Cast a literal to `data_type` as a one-row array usable as an Arrow `Datum`.
fn literal(value: &ScalarValue, data_type: &DataType) -> Result<ArrayRef> {
    let value = if value.data_type() == *data_type {
        value.clone()
    } else {
        value.cast_to(data_type)?
    };
    Ok(value.to_array_of_size(1)?)
}

fn evaluate_cmp(
    batch: &RecordBatch,
    column_name: &str,
    op: CmpOp,
    value: &ScalarValue,
) -> Result<BooleanArray> {
    use ord_cmp::{eq, gt, gt_eq, lt, lt_eq, neq};

    let array = column(batch, column_name)?;
    let scalar = arrow_array::Scalar::new(literal(value, array.data_type())?);

    let result = match op {
        CmpOp::Eq => eq(array, &scalar)?,
        CmpOp::NotEq => neq(array, &scalar)?,
        CmpOp::Lt => lt(array, &scalar)?,
        CmpOp::LtEq => lt_eq(array, &scalar)?,
        CmpOp::Gt => gt(array, &scalar)?,
        CmpOp::GtEq => gt_eq(array, &scalar)?,
    };

    Ok(result)
}

fn evaluate_in_list(
    batch: &RecordBatch,
    column_name: &str,
    values: &[ScalarValue],
) -> Result<BooleanArray> {
    let array = column(batch, column_name)?;
    let mut result = BooleanArray::from(vec![false; batch.num_rows()]);

    for value in values {
        let scalar = arrow_array::Scalar::new(literal(value, array.data_type())?);
        let matches = ord_cmp::eq(array, &scalar)?;
        result = arith_boolean::or_kleene(&result, &matches)?;
    }

    Ok(result)
}

fn evaluate_contains(
    batch: &RecordBatch,
    column_name: &str,
    pattern: &str,
) -> Result<BooleanArray> {
    let array = column(batch, column_name)?;

    if let Some(string_array) = array.as_any().downcast_ref::<StringArray>() {
        return Ok(string_array
            .iter()
            .map(|opt_str| opt_str.map(|s| s.contains(pattern)))
            .collect());
    }

    if let Some(string_array) = array.as_any().downcast_ref::<LargeStringArray>() {
        return Ok(string_array
            .iter()
            .map(|opt_str| opt_str.map(|s| s.contains(pattern)))
            .collect());
    }

    if let Some(string_array) = array.as_any().downcast_ref::<StringViewArray>() {
        return Ok(string_array
            .iter()
            .map(|opt_str| opt_str.map(|s| s.contains(pattern)))
            .collect());
    }

    Err(ArrowError::CastError(format!("Column '{}' is not a string", column_name)).into())
}

fn evaluate_list_contains(
    batch: &RecordBatch,
    column_name: &str,
    value: &ScalarValue,
) -> Result<BooleanArray> {
    let array = column(batch, column_name)?;

    if let Some(list) = array.as_any().downcast_ref::<GenericListArray<i32>>() {
        return list_contains(list, value);
    }

    if let Some(list) = array.as_any().downcast_ref::<GenericListArray<i64>>() {
        return list_contains(list, value);
    }

    Err(ArrowError::CastError(format!("Column '{}' is not a list", column_name)).into())
}

fn list_contains<O: OffsetSizeTrait>(
    list: &GenericListArray<O>,
    value: &ScalarValue,
) -> Result<BooleanArray> {
    let needle = arrow_array::Scalar::new(literal(value, &list.value_type())?);

    list.iter()
        .map(|row| {
            row.map(|values| {
                let matches = ord_cmp::eq(&values, &needle)?;
                Ok::<_, CatalogError>(matches.true_count() > 0)
            })
            .transpose()
        })
        .collect()
}

fn evaluate_and(batch: &RecordBatch, exprs: &[Expr]) -> Result<BooleanArray> {
    let mut result = BooleanArray::from(vec![true; batch.num_rows()]);

    for expr in exprs {
        let expr_result = evaluate_expr(expr, batch)?;
        result = arith_boolean::and_kleene(&result, &expr_result)?;
    }

    Ok(result)
}

fn evaluate_or(batch: &RecordBatch, exprs: &[Expr]) -> Result<BooleanArray> {
    let mut result = BooleanArray::from(vec![false; batch.num_rows()]);

    for expr in exprs {
        let expr_result = evaluate_expr(expr, batch)?;
        result = arith_boolean::or_kleene(&result, &expr_result)?;
    }

    Ok(result)
}
