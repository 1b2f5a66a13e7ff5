use arrow_schema::ArrowError;
use datafusion_common::DataFusionError;
use parquet::errors::ParquetError;
use thiserror::Error;

/// Errors raised while compiling filters or querying tables.
///
/// Compilation errors ([`CatalogError::InvalidColumn`],
/// [`CatalogError::InvalidOperator`], [`CatalogError::InvalidValue`]) are raised
/// synchronously before any backend is contacted. Backend errors are propagated
/// unchanged.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A filter references a column that is not part of the declared schema
    #[error("Invalid column name {column}")]
    InvalidColumn {
        /// Name of the column that was not found
        column: String,
    },

    /// The operator cannot be parsed or cannot be applied to the target column
    #[error("Invalid operator '{operator}': {detail}")]
    InvalidOperator {
        /// The operator symbol as supplied by the caller
        operator: String,
        /// Why the operator was rejected
        detail: String,
    },

    /// The filter value has the wrong shape or type for its operator
    #[error("Invalid value for column '{column}': {detail}")]
    InvalidValue {
        /// Column the filter applies to
        column: String,
        /// Why the value was rejected
        detail: String,
    },

    /// Filters did not pin every partition down to a single path
    #[error("Not enough partitions specified, missing: [{}]", missing.join(", "))]
    UnresolvedPartitions {
        /// Partition columns left unresolved, in declared order
        missing: Vec<String>,
    },

    /// A database has no table with this name
    #[error("Table '{name}' not found. Available tables: [{}]", available.join(", "))]
    TableNotFound {
        /// The requested table name
        name: String,
        /// Non-deprecated tables of the database, sorted
        available: Vec<String>,
    },

    /// The catalog has no database with this name
    #[error("Database '{name}' not found. Available databases: [{}]", available.join(", "))]
    DatabaseNotFound {
        /// The requested database name
        name: String,
        /// Databases registered in the catalog, sorted
        available: Vec<String>,
    },

    /// A table URI could not be resolved to an object store
    #[error("Invalid table uri '{uri}'")]
    InvalidUri { uri: String },

    /// The table cannot be expressed in the requested export format
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Building or casting Arrow data failed
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Reading a Parquet file failed
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Listing or fetching objects failed
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Scalar conversion or casting failed
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    /// Catalog export could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A file read task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Failure reported by a SQL backend
    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CatalogError {
    pub(crate) fn invalid_value(column: impl Into<String>, detail: impl Into<String>) -> Self {
        CatalogError::InvalidValue {
            column: column.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid_operator(operator: impl Into<String>, detail: impl Into<String>) -> Self {
        CatalogError::InvalidOperator {
            operator: operator.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
