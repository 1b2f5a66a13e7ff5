//! Table catalog with partition-aware filter pushdown.
//!
//! Filters are given in disjunctive normal form and compiled three ways: into
//! an object-store listing prefix, into a SQL predicate, and into an
//! expression evaluated on Arrow record batches.

pub mod catalog;
pub mod compile;
pub mod error;
pub mod export;
pub mod expr;
pub mod filter;
pub mod frame;
pub mod options;
pub mod partition;
pub mod roapi;
pub mod row_filter;
pub mod sql;
pub mod storage;
pub mod table;

pub use catalog::{Catalog, Database};
pub use compile::{compile_expression, compile_filter};
pub use error::{CatalogError, Result};
pub use export::export_catalogs;
pub use expr::{CmpOp, Expr};
pub use filter::{
    Filter, FilterValue, InputFilters, NormalizedFilters, Operator, normalize_filters,
};
pub use frame::Frame;
pub use options::{ReadOptions, StorageOptions};
pub use partition::{
    Partition, PartitionPrefix, PartitioningScheme, build_file_fragment, build_prefix,
};
pub use roapi::{RoapiTable, export_roapi_tables};
pub use row_filter::RowFilter;
pub use sql::{SqlDialect, compile_predicate, compile_predicate_with_dialect};
pub use table::{
    QueryRequest, SqlBackend, SqlRequest, Table,
    clickhouse::{ClickHouseConfig, ClickHouseTable},
    delta::{DeltaCacheOptions, DeltaTable},
    function::FunctionTable,
    metadata::{
        RoapiOptions, TableColumn, TableMetadata, TablePartition, TableSchema, TableType,
    },
    parquet::ParquetTable,
};
