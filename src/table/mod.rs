//! Table backends sharing one query contract.

use std::collections::BTreeMap;

use arrow_array::RecordBatch;
use arrow_schema::Schema;
use futures_util::future::BoxFuture;
use tracing::warn;

use crate::{
    error::{CatalogError, Result},
    filter::{InputFilters, NormalizedFilters},
    frame::{Frame, conform_batch, conformed_schema},
    options::StorageOptions,
    roapi::RoapiTable,
};

pub mod clickhouse;
pub mod delta;
pub mod function;
pub mod metadata;
pub mod parquet;

use metadata::{TableMetadata, TableSchema};

/// Arguments of a single table query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryRequest {
    pub filters: Option<InputFilters>,
    pub columns: Option<Vec<String>>,
    pub storage: StorageOptions,
    /// Raw SQL predicate for tables that [support it](Table::supports_sql_filter).
    ///
    /// It is ANDed with the compiled filters, not used instead of them; leave
    /// `filters` unset to apply the predicate alone.
    pub sql_predicate: Option<String>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(mut self, filters: impl Into<InputFilters>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_storage(mut self, storage: StorageOptions) -> Self {
        self.storage = storage;
        self
    }

    /// Add a raw SQL predicate. Any filters still apply: the statement
    /// filters on `(<filters>) and (<predicate>)`.
    pub fn with_sql_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.sql_predicate = Some(predicate.into());
        self
    }

    /// Requested columns, treating an empty list as "all columns".
    pub fn requested_columns(&self) -> Option<&[String]> {
        self.columns.as_deref().filter(|c| !c.is_empty())
    }
}

/// A queryable table.
///
/// Implementations are immutable after construction; a query never mutates
/// the table, so tables can be shared across tasks behind an `Arc`.
pub trait Table: Send + Sync {
    fn name(&self) -> &str;

    fn metadata(&self) -> &TableMetadata;

    /// Column and partition descriptors used by catalog exporters.
    fn table_schema(&self) -> BoxFuture<'_, Result<TableSchema>>;

    fn query(&self, request: QueryRequest) -> BoxFuture<'_, Result<Frame>>;

    /// Whether the table accepts a raw SQL predicate.
    fn supports_sql_filter(&self) -> bool {
        false
    }

    /// ROAPI config serving this table as `name`, or `None` when the table
    /// cannot or should not be served.
    fn roapi_table(&self, name: &str) -> Result<Option<RoapiTable>> {
        warn!("{}: Only parquet and deltalake tables are supported for roapi export", name);
        Ok(None)
    }
}

/// A statement sent to a SQL engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqlRequest {
    /// Name the statement uses to refer to the table.
    pub table_name: String,
    /// Location of the table, as understood by the engine.
    pub table_uri: String,
    pub sql: String,
    /// Connection options in engine-specific key/value form.
    pub options: BTreeMap<String, String>,
}

/// SQL engine executing statements built by [`delta::DeltaTable`] and
/// [`clickhouse::ClickHouseTable`].
pub trait SqlBackend: Send + Sync {
    fn execute(&self, request: SqlRequest) -> BoxFuture<'_, Result<Vec<RecordBatch>>>;
}

/// Fail with [`CatalogError::InvalidColumn`] on the first filter column absent
/// from `schema`.
pub(crate) fn validate_filter_columns(schema: &Schema, filters: &NormalizedFilters) -> Result<()> {
    filters
        .iter()
        .flatten()
        .try_for_each(|f| validate_column(schema, f.column()))
}

pub(crate) fn validate_column(schema: &Schema, column: &str) -> Result<()> {
    if schema.column_with_name(column).is_none() {
        return Err(CatalogError::InvalidColumn {
            column: column.to_string(),
        });
    }
    Ok(())
}

/// Columns to read from storage: the requested ones plus `unique_columns`, in
/// declared order. `None` reads everything.
pub(crate) fn columns_to_read(
    schema: &Schema,
    requested: Option<&[String]>,
    unique_columns: &[String],
) -> Option<Vec<String>> {
    let requested = requested?;
    Some(
        schema
            .fields()
            .iter()
            .map(|f| f.name())
            .filter(|name| requested.contains(*name) || unique_columns.contains(*name))
            .cloned()
            .collect(),
    )
}

/// Drop duplicate rows by `unique_columns`, then project to `requested`.
pub(crate) fn finish(
    frame: Frame,
    unique_columns: &[String],
    requested: Option<&[String]>,
) -> Result<Frame> {
    let frame = frame.unique(unique_columns)?;
    match requested {
        Some(columns) => frame.select(columns),
        None => Ok(frame),
    }
}

/// Shape the batches returned by a SQL engine into the declared schema.
///
/// An engine that returns no batches at all yields an empty frame carrying
/// every declared column.
pub(crate) fn frame_from_sql(
    schema: &Schema,
    batches: Vec<RecordBatch>,
    read_columns: Option<&[String]>,
) -> Result<Frame> {
    if batches.is_empty() {
        return Ok(Frame::empty(conformed_schema(schema, None)));
    }

    let target = conformed_schema(schema, read_columns);
    let batches = batches
        .iter()
        .map(|batch| conform_batch(batch, schema, read_columns))
        .collect::<Result<Vec<_>>>()?;
    Ok(Frame::new(target, batches))
}

/// Quote an identifier with `quote`, doubling embedded quote characters.
pub(crate) fn quote_identifier(name: &str, quote: char) -> String {
    let escaped = name.replace(quote, &format!("{quote}{quote}"));
    format!("{quote}{escaped}{quote}")
}
