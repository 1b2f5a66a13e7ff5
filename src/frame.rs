//! Materialized query results and the post-processing shared by all table
//! backends.

use std::{collections::HashSet, sync::Arc};

use arrow::compute::sort_to_indices;
use arrow_array::{ArrayRef, RecordBatch, RecordBatchOptions, UInt32Array, new_null_array};
use arrow_cast::cast;
use arrow_row::{RowConverter, SortField};
use arrow_schema::{Field, Schema, SchemaRef};
use arrow_select::{concat::concat_batches, take::take_record_batch};

use crate::{
    error::{CatalogError, Result},
    expr::Expr,
    row_filter::RowFilter,
};

/// Result of a table query: a schema and the record batches that carry it.
///
/// Every batch shares [`Frame::schema`]. A frame with no rows still carries
/// the full column set.
#[derive(Clone, Debug)]
pub struct Frame {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Frame {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    /// A frame with no rows.
    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(schema, Vec::new())
    }

    /// Build a frame whose batches are conformed to `schema`.
    pub fn conformed(schema: &Schema, batches: &[RecordBatch]) -> Result<Self> {
        let target = conformed_schema(schema, None);
        let batches = batches
            .iter()
            .map(|batch| conform_batch(batch, schema, None))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(target, batches))
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields().iter().map(|f| f.name().as_str()).collect()
    }

    /// Concatenate all batches into one.
    pub fn concat(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }

    /// Keep only the rows for which `expr` is true.
    pub fn filter(self, expr: &Expr) -> Result<Self> {
        let filter = RowFilter::new(expr.clone());
        let batches = self
            .batches
            .into_iter()
            .map(|batch| filter.apply_filter(batch))
            .filter(|batch| !matches!(batch, Ok(b) if b.num_rows() == 0))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(self.schema, batches))
    }

    /// Project to `columns`, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidColumn`] for a column not in the frame.
    pub fn select(self, columns: &[String]) -> Result<Self> {
        let indices = columns
            .iter()
            .map(|c| {
                self.schema
                    .index_of(c)
                    .map_err(|_| CatalogError::InvalidColumn { column: c.clone() })
            })
            .collect::<Result<Vec<_>>>()?;

        let schema = Arc::new(self.schema.project(&indices)?);
        let batches = self
            .batches
            .iter()
            .map(|batch| batch.project(&indices))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(schema, batches))
    }

    /// All rows as one batch, ordered by `column` ascending with nulls first.
    pub fn sorted_by(&self, column: &str) -> Result<RecordBatch> {
        let batch = self.concat()?;
        let array = batch
            .column_by_name(column)
            .ok_or_else(|| CatalogError::InvalidColumn {
                column: column.to_string(),
            })?;
        let indices = sort_to_indices(array, None, None)?;
        Ok(take_record_batch(&batch, &indices)?)
    }

    /// Drop rows that repeat an earlier row on `subset`.
    ///
    /// Stable: the first occurrence is kept and row order is preserved. An
    /// empty `subset` leaves the frame unchanged.
    pub fn unique(self, subset: &[String]) -> Result<Self> {
        if subset.is_empty() || self.batches.is_empty() {
            return Ok(self);
        }

        let indices = subset
            .iter()
            .map(|c| {
                self.schema
                    .index_of(c)
                    .map_err(|_| CatalogError::InvalidColumn { column: c.clone() })
            })
            .collect::<Result<Vec<_>>>()?;

        let converter = RowConverter::new(
            indices
                .iter()
                .map(|i| SortField::new(self.schema.field(*i).data_type().clone()))
                .collect(),
        )?;

        // Scoped to this call; nothing is interned across queries
        let mut seen = HashSet::new();
        let mut batches = Vec::with_capacity(self.batches.len());

        for batch in &self.batches {
            let keys: Vec<ArrayRef> = indices
                .iter()
                .map(|i| batch.column(*i).clone())
                .collect();
            let rows = converter.convert_columns(&keys)?;

            let keep: Vec<u32> = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| seen.insert(row.owned()))
                .map(|(i, _)| i as u32)
                .collect();

            if keep.len() == batch.num_rows() {
                batches.push(batch.clone());
            } else if !keep.is_empty() {
                batches.push(take_record_batch(batch, &UInt32Array::from(keep))?);
            }
        }

        Ok(Self::new(self.schema, batches))
    }
}

/// The declared schema restricted to `columns` (declared order), with every
/// field nullable.
pub fn conformed_schema(schema: &Schema, columns: Option<&[String]>) -> SchemaRef {
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .filter(|f| columns.is_none_or(|cols| cols.iter().any(|c| c == f.name())))
        .map(|f| f.as_ref().clone().with_nullable(true))
        .collect();
    Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()))
}

/// Conform a batch read from storage to the declared `schema`.
///
/// Declared columns missing from the batch are added as nulls, present ones are
/// cast to the declared type, and columns outside the declared schema are
/// dropped. With `columns`, only those declared columns are kept.
pub fn conform_batch(
    batch: &RecordBatch,
    schema: &Schema,
    columns: Option<&[String]>,
) -> Result<RecordBatch> {
    let target = conformed_schema(schema, columns);
    let num_rows = batch.num_rows();

    let arrays = target
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(array) if array.data_type() == field.data_type() => Ok(array.clone()),
            Some(array) => Ok(cast(array, field.data_type())?),
            None => Ok(new_null_array(field.data_type(), num_rows)),
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(target, arrays, &options)?)
}
