//! Tables backed by an async function.

use std::{fmt, sync::Arc};

use futures_util::{FutureExt, future::BoxFuture};

use super::{
    QueryRequest, Table,
    metadata::{TableMetadata, TableSchema, TableType},
};
use crate::{error::Result, frame::Frame};

/// The function behind a [`FunctionTable`].
pub type TableFn = Arc<dyn Fn(QueryRequest) -> BoxFuture<'static, Result<Frame>> + Send + Sync>;

/// A table whose rows are produced by calling a function with each request.
///
/// Filters and columns are handed to the function untouched. The schema is
/// discovered by calling the function with the documentation filters and
/// columns from the table metadata.
///
/// # Example
/// ```
/// use std::sync::Arc;
///
/// use arrow_schema::{DataType, Field, Schema};
/// use futures_util::FutureExt;
/// use lakecat::{Frame, FunctionTable, QueryRequest, Table};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, true)]));
/// let table = FunctionTable::new("numbers", move |_request| {
///     let schema = schema.clone();
///     async move { Ok(Frame::empty(schema)) }.boxed()
/// });
///
/// let frame = table.query(QueryRequest::new()).await.unwrap();
/// assert_eq!(frame.column_names(), vec!["x"]);
/// # }
/// ```
#[derive(Clone)]
pub struct FunctionTable {
    name: String,
    function: TableFn,
    stats_columns: Vec<String>,
    metadata: TableMetadata,
}

impl FunctionTable {
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(QueryRequest) -> BoxFuture<'static, Result<Frame>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            function: Arc::new(function),
            stats_columns: Vec::new(),
            metadata: TableMetadata::new(TableType::Function),
        }
    }

    pub fn with_stats_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stats_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: TableMetadata) -> Self {
        self.metadata = TableMetadata {
            table_type: TableType::Function,
            ..metadata
        };
        self
    }

    /// The request used for schema discovery.
    fn docs_request(&self) -> QueryRequest {
        let mut request = QueryRequest::new().with_filters(self.metadata.docs_filters.clone());
        request.columns = self.metadata.docs_columns.clone();
        request
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl Table for FunctionTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    fn table_schema(&self) -> BoxFuture<'_, Result<TableSchema>> {
        async move {
            let frame = (self.function)(self.docs_request()).await?;
            Ok(TableSchema::from_arrow(frame.schema(), &self.stats_columns)
                .with_partitions(self.metadata.docs_partitions()))
        }
        .boxed()
    }

    fn query(&self, request: QueryRequest) -> BoxFuture<'_, Result<Frame>> {
        (self.function)(request)
    }
}
