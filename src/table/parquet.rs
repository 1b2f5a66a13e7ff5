//! Tables stored as Parquet files under a partitioned object-store prefix.

use std::sync::Arc;

use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{Field, Schema, SchemaRef};
use datafusion_common::ScalarValue;
use futures_util::{FutureExt, future::BoxFuture};
use object_store::{ObjectStore, path::Path};
use tokio::task::JoinSet;
use tracing::debug;

use super::{
    QueryRequest, Table, finish,
    metadata::{TableMetadata, TableSchema, TableType},
    validate_column, validate_filter_columns,
};
use crate::{
    compile::compile_expression,
    error::Result,
    filter::{Filter, normalize_filters},
    frame::{Frame, conform_batch, conformed_schema},
    options::ReadOptions,
    partition::{
        Partition, PartitionPrefix, PartitioningScheme, build_file_fragment, build_prefix,
    },
    roapi::{self, RoapiTable},
    storage,
};

/// Default file name used by [`ParquetTable::build_file_fragment`].
pub const DEFAULT_FILE_NAME: &str = "df.parquet";

/// A table made of Parquet files under `uri`, optionally partitioned by
/// directory.
///
/// Filters that pin leading partitions to one value are turned into a listing
/// prefix; every other filter is evaluated on the decoded rows. Partition
/// columns that are not stored in the files are reconstructed from the object
/// path.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
///
/// use arrow_schema::{DataType, Field, Schema};
/// use lakecat::{Filter, Partition, ParquetTable, PartitioningScheme, QueryRequest, Table};
///
/// # async fn run() -> lakecat::Result<()> {
/// let schema = Arc::new(Schema::new(vec![
///     Field::new("implant_id", DataType::Int64, false),
///     Field::new("date", DataType::Utf8, false),
///     Field::new("value", DataType::Int64, false),
/// ]));
/// let table = ParquetTable::new("spikes", "s3://bucket/spikes", schema).with_partitioning(
///     vec![
///         Partition::new("implant_id", DataType::Int64),
///         Partition::new("date", DataType::Utf8),
///     ],
///     PartitioningScheme::Hive,
/// );
///
/// let frame = table
///     .query(QueryRequest::new().with_filters(vec![Filter::eq("implant_id", 5956i64)]))
///     .await?;
/// println!("{} rows", frame.num_rows());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ParquetTable {
    name: String,
    uri: String,
    schema: SchemaRef,
    partitions: Vec<Partition>,
    scheme: PartitioningScheme,
    unique_columns: Vec<String>,
    stats_columns: Vec<String>,
    file_name: String,
    read_options: ReadOptions,
    metadata: TableMetadata,
}

impl ParquetTable {
    pub fn new(name: impl Into<String>, uri: impl Into<String>, schema: SchemaRef) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            schema,
            partitions: Vec::new(),
            scheme: PartitioningScheme::default(),
            unique_columns: Vec::new(),
            stats_columns: Vec::new(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            read_options: ReadOptions::from_env(),
            metadata: TableMetadata::new(TableType::Parquet),
        }
    }

    /// Declare the partition levels, outermost first.
    ///
    /// Partition columns missing from the declared schema are appended to it.
    pub fn with_partitioning(
        mut self,
        partitions: Vec<Partition>,
        scheme: PartitioningScheme,
    ) -> Self {
        let missing: Vec<Field> = partitions
            .iter()
            .filter(|p| self.schema.column_with_name(p.column()).is_none())
            .map(|p| Field::new(p.column(), p.data_type().clone(), true))
            .collect();
        if !missing.is_empty() {
            let mut fields: Vec<Field> = self
                .schema
                .fields()
                .iter()
                .map(|f| f.as_ref().clone())
                .collect();
            fields.extend(missing);
            self.schema = Arc::new(Schema::new_with_metadata(
                fields,
                self.schema.metadata().clone(),
            ));
        }

        self.partitions = partitions;
        self.scheme = scheme;
        self
    }

    pub fn with_unique_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stats_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stats_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn with_read_options(mut self, options: ReadOptions) -> Self {
        self.read_options = options;
        self
    }

    pub fn with_metadata(mut self, metadata: TableMetadata) -> Self {
        self.metadata = TableMetadata {
            table_type: TableType::Parquet,
            ..metadata
        };
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn scheme(&self) -> PartitioningScheme {
        self.scheme
    }

    /// Listing prefix and residual filters for `filters`.
    pub fn build_prefix(&self, filters: &[Vec<Filter>]) -> PartitionPrefix {
        build_prefix(&self.uri, &self.partitions, filters, self.scheme, true)
    }

    /// Path of the single data file selected by `filters`, relative to the
    /// table root.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnresolvedPartitions`](crate::CatalogError::UnresolvedPartitions)
    /// when the filters do not pin every partition.
    pub fn build_file_fragment(&self, filters: Vec<Filter>) -> Result<String> {
        let filters = normalize_filters(Some(filters.into()));
        build_file_fragment(&self.partitions, &filters, self.scheme, &self.file_name)
    }

    async fn run_query(&self, request: QueryRequest) -> Result<Frame> {
        let filters = normalize_filters(request.filters.clone());
        validate_filter_columns(&self.schema, &filters)?;
        if let Some(columns) = request.requested_columns() {
            for column in columns {
                validate_column(&self.schema, column)?;
            }
        }

        let prefix = build_prefix(&self.uri, &self.partitions, &filters, self.scheme, true);
        debug!(
            "Table '{}': listing prefix '{}', {} partitions applied",
            self.name,
            prefix.uri,
            prefix.applied_filters.len()
        );

        let (store, base) = storage::resolve_store(&self.uri, &request.storage)?;
        let files = if storage::is_parquet_file(&self.uri) {
            vec![base.clone()]
        } else {
            let (_, listing) = storage::resolve_store(&prefix.uri, &request.storage)?;
            storage::list_parquet_files(store.as_ref(), &listing).await?
        };

        let mut batches = Vec::new();
        for (path, file_batches) in self.fetch_all(store, files).await? {
            for batch in file_batches {
                let batch = self.attach_partitions(batch, &path, &base, &prefix.applied_filters)?;
                batches.push(conform_batch(&batch, &self.schema, None)?);
            }
        }

        let mut frame = Frame::new(conformed_schema(&self.schema, None), batches);
        if let Some(expr) = compile_expression(&prefix.remaining_filters)? {
            frame = frame.filter(&expr)?;
        }

        finish(frame, &self.unique_columns, request.requested_columns())
    }

    /// Fetch and decode every file on its own task.
    ///
    /// Results come back in `files` order; the first failure fails the query.
    async fn fetch_all(
        &self,
        store: Arc<dyn ObjectStore>,
        files: Vec<Path>,
    ) -> Result<Vec<(Path, Vec<RecordBatch>)>> {
        debug!("Table '{}': fetching {} files", self.name, files.len());

        let mut tasks = JoinSet::new();
        for (index, path) in files.into_iter().enumerate() {
            let store = Arc::clone(&store);
            let options = self.read_options.clone();
            tasks.spawn(async move {
                let bytes = storage::fetch_with_retry(store.as_ref(), &path, &options).await?;
                let batches = storage::decode_parquet(bytes)?;
                Ok::<_, crate::CatalogError>((index, path, batches))
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(joined??);
        }
        results.sort_by_key(|(index, _, _)| *index);

        Ok(results
            .into_iter()
            .map(|(_, path, batches)| (path, batches))
            .collect())
    }

    /// Add partition columns the file does not store itself.
    ///
    /// Values pinned by the listing prefix come from the applied filters; the
    /// others are parsed from the object path relative to the table root.
    fn attach_partitions(
        &self,
        batch: RecordBatch,
        path: &Path,
        base: &Path,
        applied: &[Filter],
    ) -> Result<RecordBatch> {
        let schema = batch.schema();
        let missing: Vec<(usize, &Partition)> = self
            .partitions
            .iter()
            .enumerate()
            .filter(|(_, p)| schema.column_with_name(p.column()).is_none())
            .collect();
        if missing.is_empty() {
            return Ok(batch);
        }

        let segments = partition_segments(path, base);
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

        for (position, partition) in missing {
            let value = match applied.iter().find(|f| f.column() == partition.column()) {
                Some(filter) => match filter.value().as_scalar() {
                    Some(value) => value.cast_to(partition.data_type())?,
                    None => ScalarValue::try_from(partition.data_type())?,
                },
                None => match self.segment_value(&segments, position, partition) {
                    Some(raw) => ScalarValue::try_from_string(raw, partition.data_type())?,
                    None => ScalarValue::try_from(partition.data_type())?,
                },
            };

            fields.push(Field::new(partition.column(), partition.data_type().clone(), true));
            columns.push(value.to_array_of_size(batch.num_rows())?);
        }

        Ok(RecordBatch::try_new(
            Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
            columns,
        )?)
    }

    fn segment_value(
        &self,
        segments: &[String],
        position: usize,
        partition: &Partition,
    ) -> Option<String> {
        match self.scheme {
            PartitioningScheme::Directory => segments.get(position).cloned(),
            PartitioningScheme::Hive => segments.iter().find_map(|segment| {
                let (key, value) = segment.split_once('=')?;
                (key == partition.column()).then(|| value.to_string())
            }),
        }
    }
}

/// Directory segments of `path` below `base`, without the file name.
fn partition_segments(path: &Path, base: &Path) -> Vec<String> {
    let Some(parts) = path.prefix_match(base) else {
        return Vec::new();
    };
    let mut segments: Vec<String> = parts.map(|p| p.as_ref().to_string()).collect();
    segments.pop();
    segments
}

impl Table for ParquetTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    fn table_schema(&self) -> BoxFuture<'_, Result<TableSchema>> {
        async move {
            let partition_columns: Vec<String> = self
                .partitions
                .iter()
                .map(|p| p.column().to_string())
                .chain(self.stats_columns.iter().cloned())
                .collect();
            Ok(TableSchema::from_arrow(&self.schema, &partition_columns)
                .with_partitions(self.metadata.docs_partitions()))
        }
        .boxed()
    }

    fn query(&self, request: QueryRequest) -> BoxFuture<'_, Result<Frame>> {
        self.run_query(request).boxed()
    }

    fn roapi_table(&self, name: &str) -> Result<Option<RoapiTable>> {
        roapi::parquet_table(name, self)
    }
}
