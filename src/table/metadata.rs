use std::fmt;

use arrow_schema::Schema;
use datafusion_common::ScalarValue;
use serde::Serialize;
use serde_json::Value;

use crate::filter::{Filter, FilterValue, scalar_to_string};

/// Storage backend of a table, as reported in documentation exports.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum TableType {
    #[serde(rename = "PARQUET")]
    Parquet,
    #[serde(rename = "DELTA_LAKE")]
    DeltaLake,
    #[serde(rename = "CLICKHOUSE")]
    ClickHouse,
    #[serde(rename = "FUNCTION")]
    Function,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::Parquet => "PARQUET",
            TableType::DeltaLake => "DELTA_LAKE",
            TableType::ClickHouse => "CLICKHOUSE",
            TableType::Function => "FUNCTION",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a table is exposed when exporting ROAPI table configs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoapiOptions {
    pub use_memory_table: bool,
    /// Leave the table out of the export
    pub disable: bool,
    /// Served name, replacing `<database>_<table>`
    pub override_name: Option<String>,
    pub reload_interval_seconds: Option<u64>,
}

impl RoapiOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for Delta Lake tables, which reload every 60 seconds.
    pub fn delta() -> Self {
        Self {
            reload_interval_seconds: Some(60),
            ..Self::default()
        }
    }

    pub fn with_memory_table(mut self, use_memory_table: bool) -> Self {
        self.use_memory_table = use_memory_table;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disable = true;
        self
    }

    pub fn with_override_name(mut self, name: impl Into<String>) -> Self {
        self.override_name = Some(name.into());
        self
    }

    pub fn with_reload_interval_seconds(mut self, seconds: u64) -> Self {
        self.reload_interval_seconds = Some(seconds);
        self
    }
}

/// Documentation attached to a table.
///
/// None of these fields affect query results. `docs_filters` and
/// `docs_columns` describe a representative query used when rendering the
/// table schema.
#[derive(Clone, Debug, PartialEq)]
pub struct TableMetadata {
    pub table_type: TableType,
    pub description: String,
    pub docs_filters: Vec<Filter>,
    pub docs_columns: Option<Vec<String>>,
    pub latency_info: Option<String>,
    pub example_notebook: Option<String>,
    pub data_input: Option<String>,
    pub is_deprecated: bool,
    /// Export settings for ROAPI; `None` uses the per-format defaults
    pub roapi_options: Option<RoapiOptions>,
}

impl TableMetadata {
    pub fn new(table_type: TableType) -> Self {
        Self {
            table_type,
            description: String::new(),
            docs_filters: Vec::new(),
            docs_columns: None,
            latency_info: None,
            example_notebook: None,
            data_input: None,
            is_deprecated: false,
            roapi_options: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_docs_filters(mut self, filters: Vec<Filter>) -> Self {
        self.docs_filters = filters;
        self
    }

    pub fn with_docs_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.docs_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_latency_info(mut self, value: impl Into<String>) -> Self {
        self.latency_info = Some(value.into());
        self
    }

    pub fn with_example_notebook(mut self, value: impl Into<String>) -> Self {
        self.example_notebook = Some(value.into());
        self
    }

    pub fn with_data_input(mut self, value: impl Into<String>) -> Self {
        self.data_input = Some(value.into());
        self
    }

    pub fn deprecated(mut self, is_deprecated: bool) -> Self {
        self.is_deprecated = is_deprecated;
        self
    }

    pub fn with_roapi_options(mut self, options: RoapiOptions) -> Self {
        self.roapi_options = Some(options);
        self
    }

    /// One [`TablePartition`] per documentation filter.
    pub fn docs_partitions(&self) -> Vec<TablePartition> {
        self.docs_filters.iter().map(TablePartition::from_filter).collect()
    }
}

/// A partition or documented filter value, as shown in a table schema.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TablePartition {
    pub column_name: String,
    pub type_annotation: String,
    pub value: Value,
}

impl TablePartition {
    pub fn from_filter(filter: &Filter) -> Self {
        let (type_annotation, value) = match filter.value() {
            FilterValue::Scalar(v) => (v.data_type().to_string(), scalar_to_json(v)),
            FilterValue::List(values) => (
                "List".to_string(),
                Value::Array(values.iter().map(scalar_to_json).collect()),
            ),
        };
        Self {
            column_name: filter.column().to_string(),
            type_annotation,
            value,
        }
    }
}

/// A column descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub has_stats: bool,
    pub readonly: bool,
    pub filter_only: bool,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            has_stats: false,
            readonly: false,
            filter_only: false,
        }
    }

    pub fn with_stats(mut self, has_stats: bool) -> Self {
        self.has_stats = has_stats;
        self
    }
}

/// Partitions and columns of a table, as consumed by catalog exporters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TableSchema {
    pub partitions: Vec<TablePartition>,
    pub columns: Vec<TableColumn>,
}

impl TableSchema {
    /// Describe every field of `schema`; `has_stats` is set for `stats_columns`.
    pub fn from_arrow(schema: &Schema, stats_columns: &[String]) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| {
                TableColumn::new(f.name(), f.data_type().to_string())
                    .with_stats(stats_columns.contains(f.name()))
            })
            .collect();
        Self {
            partitions: Vec::new(),
            columns,
        }
    }

    pub fn with_partitions(mut self, partitions: Vec<TablePartition>) -> Self {
        self.partitions = partitions;
        self
    }
}

fn scalar_to_json(value: &ScalarValue) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match value {
        ScalarValue::Boolean(Some(v)) => Value::from(*v),
        ScalarValue::Int8(Some(v)) => Value::from(*v),
        ScalarValue::Int16(Some(v)) => Value::from(*v),
        ScalarValue::Int32(Some(v)) => Value::from(*v),
        ScalarValue::Int64(Some(v)) => Value::from(*v),
        ScalarValue::UInt8(Some(v)) => Value::from(*v),
        ScalarValue::UInt16(Some(v)) => Value::from(*v),
        ScalarValue::UInt32(Some(v)) => Value::from(*v),
        ScalarValue::UInt64(Some(v)) => Value::from(*v),
        ScalarValue::Float32(Some(v)) => Value::from(*v),
        ScalarValue::Float64(Some(v)) => Value::from(*v),
        other => Value::String(scalar_to_string(other)),
    }
}
