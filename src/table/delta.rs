//! Delta Lake tables queried through a SQL engine.

use std::sync::Arc;

use arrow_schema::SchemaRef;
use futures_util::{FutureExt, future::BoxFuture};
use tracing::debug;

use super::{
    QueryRequest, SqlBackend, SqlRequest, Table, columns_to_read, finish, frame_from_sql,
    metadata::{TableMetadata, TableSchema, TableType},
    quote_identifier, validate_column,
};
use crate::{
    error::Result,
    filter::normalize_filters,
    frame::Frame,
    options::StorageOptions,
    roapi::{self, RoapiTable},
    sql::compile_predicate,
};

/// Request timeout used when the caller does not set one.
pub const DEFAULT_TIMEOUT: &str = "150s";

/// Local file cache for Delta log and data files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeltaCacheOptions {
    /// Directory holding cached files; may be shared by every table.
    pub file_cache_path: String,
    /// How long a cached `_last_checkpoint` stays valid, e.g. `"30m"`.
    pub file_cache_last_checkpoint_valid_duration: Option<String>,
}

impl DeltaCacheOptions {
    pub fn new(file_cache_path: impl Into<String>) -> Self {
        Self {
            file_cache_path: file_cache_path.into(),
            file_cache_last_checkpoint_valid_duration: None,
        }
    }

    pub fn with_last_checkpoint_valid_duration(mut self, duration: impl Into<String>) -> Self {
        self.file_cache_last_checkpoint_valid_duration = Some(duration.into());
        self
    }

    /// Apply the cache settings to `options`. A leading `~` in the cache path
    /// is expanded from `HOME`.
    pub fn apply(&self, options: StorageOptions) -> StorageOptions {
        let path = match (self.file_cache_path.strip_prefix('~'), std::env::var("HOME")) {
            (Some(rest), Ok(home)) => format!("{}{}", home, rest),
            _ => self.file_cache_path.clone(),
        };

        let options = options.with_option("file_cache_path", path);
        match &self.file_cache_last_checkpoint_valid_duration {
            Some(duration) => {
                options.with_option("file_cache_last_checkpoint_valid_duration", duration.clone())
            }
            None => options,
        }
    }
}

/// A Delta Lake table with a declared schema.
///
/// Filters compile to a DataFusion SQL predicate; the declared schema, not the
/// physical one in the Delta log, decides column names and types of results.
pub struct DeltaTable {
    name: String,
    uri: String,
    schema: SchemaRef,
    unique_columns: Vec<String>,
    stats_columns: Vec<String>,
    partition_columns: Vec<String>,
    cache: Option<DeltaCacheOptions>,
    backend: Arc<dyn SqlBackend>,
    metadata: TableMetadata,
}

impl DeltaTable {
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        schema: SchemaRef,
        backend: Arc<dyn SqlBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            schema,
            unique_columns: Vec::new(),
            stats_columns: Vec::new(),
            partition_columns: Vec::new(),
            cache: None,
            backend,
            metadata: TableMetadata::new(TableType::DeltaLake),
        }
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

    /// Columns the Delta table is partitioned by, reported in its schema.
    pub fn with_partition_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cache(mut self, cache: DeltaCacheOptions) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metadata(mut self, metadata: TableMetadata) -> Self {
        self.metadata = TableMetadata {
            table_type: TableType::DeltaLake,
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

    /// Build the statement for `request`.
    ///
    /// The raw SQL predicate narrows the compiled filters rather than replacing
    /// them: with both set the clause is `WHERE (<filters>) and (<predicate>)`.
    /// Without either there is no `WHERE` clause.
    pub fn build_query(&self, request: &QueryRequest) -> Result<String> {
        let filters = normalize_filters(request.filters.clone());
        let compiled = if filters.is_empty() {
            None
        } else {
            Some(compile_predicate(&self.schema, &filters)?)
        };

        let predicate = match (compiled, request.sql_predicate.as_deref()) {
            (Some(compiled), Some(raw)) => Some(format!("({}) and ({})", compiled, raw)),
            (Some(compiled), None) => Some(compiled),
            (None, Some(raw)) => Some(raw.to_string()),
            (None, None) => None,
        };

        let select = match self.read_columns(request)? {
            Some(columns) if !columns.is_empty() => columns
                .iter()
                .map(|c| quote_identifier(c, '"'))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "*".to_string(),
        };

        let mut sql = format!("SELECT {} FROM {}", select, quote_identifier(&self.name, '"'));
        if let Some(predicate) = predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        Ok(sql)
    }

    fn read_columns(&self, request: &QueryRequest) -> Result<Option<Vec<String>>> {
        let requested = request.requested_columns();
        if let Some(columns) = requested {
            for column in columns {
                validate_column(&self.schema, column)?;
            }
        }
        Ok(columns_to_read(&self.schema, requested, &self.unique_columns))
    }

    fn storage_options(&self, storage: &StorageOptions) -> StorageOptions {
        let mut options = storage.clone();
        if options.timeout.is_none() {
            options.timeout = Some(DEFAULT_TIMEOUT.to_string());
        }
        match &self.cache {
            Some(cache) => cache.apply(options),
            None => options,
        }
    }

    async fn run_query(&self, request: QueryRequest) -> Result<Frame> {
        let sql = self.build_query(&request)?;
        let read_columns = self.read_columns(&request)?;
        debug!("Table '{}': {}", self.name, sql);

        let batches = self
            .backend
            .execute(SqlRequest {
                table_name: self.name.clone(),
                table_uri: self.uri.clone(),
                sql,
                options: self.storage_options(&request.storage).to_map(),
            })
            .await?;

        let frame = frame_from_sql(&self.schema, batches, read_columns.as_deref())?;
        finish(frame, &self.unique_columns, request.requested_columns())
    }
}

impl Table for DeltaTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    fn table_schema(&self) -> BoxFuture<'_, Result<TableSchema>> {
        async move {
            let partitions = self
                .partition_columns
                .iter()
                .filter_map(|column| {
                    let field = self.schema.field_with_name(column).ok()?;
                    let documented = self
                        .metadata
                        .docs_partitions()
                        .into_iter()
                        .find(|p| &p.column_name == column);
                    Some(super::metadata::TablePartition {
                        column_name: column.clone(),
                        type_annotation: field.data_type().to_string(),
                        value: documented.map(|p| p.value).unwrap_or_default(),
                    })
                })
                .collect();

            let stats: Vec<String> = self
                .partition_columns
                .iter()
                .chain(&self.stats_columns)
                .cloned()
                .collect();
            Ok(TableSchema::from_arrow(&self.schema, &stats).with_partitions(partitions))
        }
        .boxed()
    }

    fn query(&self, request: QueryRequest) -> BoxFuture<'_, Result<Frame>> {
        self.run_query(request).boxed()
    }

    fn supports_sql_filter(&self) -> bool {
        true
    }

    fn roapi_table(&self, name: &str) -> Result<Option<RoapiTable>> {
        roapi::delta_table(name, self)
    }
}
