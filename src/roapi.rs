//! Table configs for serving a catalog through ROAPI.
//!
//! [`export_roapi_tables`] produces the entries of the `tables` key of a ROAPI
//! configuration file. Only Hive-partitioned Parquet tables and Delta Lake
//! tables can be served; other tables are skipped with a warning.

use arrow_schema::DataType;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    catalog::Catalog,
    error::{CatalogError, Result},
    filter::{Filter, FilterValue},
    partition::PartitioningScheme,
    table::{
        Table,
        delta::DeltaTable,
        metadata::{RoapiOptions, TableMetadata},
        parquet::ParquetTable,
    },
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoapiFormat {
    Parquet,
    Delta,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RoapiTableOption {
    pub format: RoapiFormat,
    pub use_memory_table: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RoapiPartitionColumn {
    pub name: String,
    pub data_type: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct RoapiReloadInterval {
    pub secs: u64,
    pub nanos: u32,
}

/// One entry of a ROAPI `tables` list.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RoapiTable {
    pub name: String,
    pub uri: String,
    pub option: RoapiTableOption,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_columns: Option<Vec<RoapiPartitionColumn>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_from_files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_interval: Option<RoapiReloadInterval>,
}

impl RoapiTable {
    fn new(name: &str, uri: &str, format: RoapiFormat, options: &RoapiOptions) -> Self {
        Self {
            name: options.override_name.as_deref().unwrap_or(name).to_string(),
            uri: uri.to_string(),
            option: RoapiTableOption {
                format,
                use_memory_table: options.use_memory_table,
            },
            partition_columns: None,
            schema_from_files: None,
            reload_interval: None,
        }
    }

    fn with_reload_interval(mut self, options: &RoapiOptions) -> Self {
        self.reload_interval = options
            .reload_interval_seconds
            .map(|secs| RoapiReloadInterval { secs, nanos: 0 });
        self
    }
}

fn options_or(metadata: &TableMetadata, default: fn() -> RoapiOptions) -> RoapiOptions {
    metadata.roapi_options.clone().unwrap_or_else(default)
}

/// Config for a Parquet table served under `name`.
///
/// Without documentation filters the table root is served as is. Otherwise
/// every filter becomes a partition column, and the file those filters select
/// is used to infer the schema.
pub(crate) fn parquet_table(name: &str, table: &ParquetTable) -> Result<Option<RoapiTable>> {
    let options = options_or(table.metadata(), RoapiOptions::new);
    if options.disable {
        return Ok(None);
    }

    if table.scheme() != PartitioningScheme::Hive {
        warn!(
            "{}: Only hive-partitioned parquet tables are supported by roapi",
            table.name()
        );
        return Ok(None);
    }

    let filters = &table.metadata().docs_filters;
    let config = RoapiTable::new(name, table.uri(), RoapiFormat::Parquet, &options);
    if filters.is_empty() {
        return Ok(Some(config));
    }

    let partition_columns = filters
        .iter()
        .map(|f| {
            Ok(RoapiPartitionColumn {
                name: f.column().to_string(),
                data_type: partition_data_type(f)?.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let schema_file = table.build_file_fragment(filters.clone())?;

    Ok(Some(
        RoapiTable {
            partition_columns: Some(partition_columns),
            schema_from_files: Some(vec![schema_file]),
            ..config
        }
        .with_reload_interval(&options),
    ))
}

/// Config for a Delta Lake table served under `name`.
pub(crate) fn delta_table(name: &str, table: &DeltaTable) -> Result<Option<RoapiTable>> {
    let options = options_or(table.metadata(), RoapiOptions::delta);
    if options.disable {
        return Ok(None);
    }

    Ok(Some(
        RoapiTable::new(name, table.uri(), RoapiFormat::Delta, &options)
            .with_reload_interval(&options),
    ))
}

/// ROAPI type of the partition column documented by `filter`.
///
/// Columns named `date` hold `YYYY-MM-DD` values and are served as `Date32`.
fn partition_data_type(filter: &Filter) -> Result<&'static str> {
    if filter.column() == "date" {
        return Ok("Date32");
    }

    let FilterValue::Scalar(value) = filter.value() else {
        return Err(CatalogError::Unsupported(format!(
            "list value for roapi partition column '{}'",
            filter.column()
        )));
    };

    match value.data_type() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Ok("Int64"),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Ok("Utf8"),
        DataType::Boolean => Ok("Boolean"),
        DataType::Float32 | DataType::Float64 => Ok("Float64"),
        DataType::Date32 => Ok("Date32"),
        other => Err(CatalogError::Unsupported(format!(
            "type {} for roapi partition column '{}'",
            other,
            filter.column()
        ))),
    }
}

/// Config entries for every exportable table of `catalog`, deprecated ones
/// included.
///
/// Tables are named `<database>_<table>` unless their [`RoapiOptions`] set an
/// override name.
///
/// # Errors
///
/// Returns [`CatalogError::Unsupported`] when a documentation filter has a
/// type ROAPI cannot partition on, and
/// [`CatalogError::UnresolvedPartitions`] when the documentation filters of a
/// Parquet table do not select a single file.
pub fn export_roapi_tables(catalog: &Catalog) -> Result<Vec<RoapiTable>> {
    let mut tables = Vec::new();
    for db_name in catalog.database_names() {
        let database = catalog.db(&db_name)?;
        for (_, table) in database.tables(true) {
            let name = format!("{}_{}", db_name, table.name());
            if let Some(config) = table.roapi_table(&name)? {
                tables.push(config);
            }
        }
    }
    debug!("Exported {} roapi tables", tables.len());
    Ok(tables)
}
