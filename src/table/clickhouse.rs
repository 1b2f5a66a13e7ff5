//! Tables served by a ClickHouse server.

use std::{collections::BTreeMap, sync::Arc};

use arrow_schema::SchemaRef;
use futures_util::{FutureExt, future::BoxFuture};
use tracing::{debug, warn};

use super::{
    QueryRequest, SqlBackend, SqlRequest, Table, columns_to_read, finish, frame_from_sql,
    metadata::{TableMetadata, TableSchema, TableType},
    quote_identifier,
};
use crate::{
    error::Result,
    filter::normalize_filters,
    frame::Frame,
    sql::{SqlDialect, compile_predicate_with_dialect},
};

/// Connection settings for a ClickHouse server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub secure: bool,
    pub verify: bool,
    /// Server settings sent along with every statement.
    pub settings: BTreeMap<String, String>,
}

impl ClickHouseConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 8443,
            username: None,
            password: None,
            database: "default".to_string(),
            secure: true,
            verify: true,
            settings: BTreeMap::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Connection URI. Credentials are included only when both the username
    /// and the password are set and non-empty.
    pub fn uri(&self) -> String {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => format!(
                "clickhouse://{}:{}@{}:{}/{}",
                user, password, self.host, self.port, self.database
            ),
            _ => format!("clickhouse://{}:{}/{}", self.host, self.port, self.database),
        }
    }

    fn options(&self) -> BTreeMap<String, String> {
        let mut options = self.settings.clone();
        options.insert("secure".to_string(), self.secure.to_string());
        options.insert("verify".to_string(), self.verify.to_string());
        options
    }
}

/// A ClickHouse table with a declared schema.
pub struct ClickHouseTable {
    name: String,
    schema: SchemaRef,
    config: ClickHouseConfig,
    unique_columns: Vec<String>,
    stats_columns: Vec<String>,
    backend: Arc<dyn SqlBackend>,
    metadata: TableMetadata,
}

impl ClickHouseTable {
    pub fn new(
        name: impl Into<String>,
        schema: SchemaRef,
        config: ClickHouseConfig,
        backend: Arc<dyn SqlBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            config,
            unique_columns: Vec::new(),
            stats_columns: Vec::new(),
            backend,
            metadata: TableMetadata::new(TableType::ClickHouse),
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

    pub fn with_metadata(mut self, metadata: TableMetadata) -> Self {
        self.metadata = TableMetadata {
            table_type: TableType::ClickHouse,
            ..metadata
        };
        self
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn uri(&self) -> String {
        self.config.uri()
    }

    /// Requested columns that exist in the declared schema.
    ///
    /// Unknown columns are dropped with a warning; `None` when nothing was
    /// requested or nothing valid is left.
    fn valid_columns(&self, request: &QueryRequest) -> Option<Vec<String>> {
        let requested = request.requested_columns()?;
        let (valid, dropped): (Vec<String>, Vec<String>) = requested
            .iter()
            .cloned()
            .partition(|c| self.schema.column_with_name(c).is_some());

        if !dropped.is_empty() {
            warn!("Table '{}': ignoring unknown columns {:?}", self.name, dropped);
        }
        if valid.is_empty() {
            warn!(
                "No valid columns provided for table '{}', selecting all columns",
                self.name
            );
            return None;
        }
        Some(valid)
    }

    /// Build the statement for `request`.
    pub fn build_query(&self, request: &QueryRequest) -> Result<String> {
        self.statement(request, self.valid_columns(request).as_deref())
    }

    fn statement(&self, request: &QueryRequest, valid: Option<&[String]>) -> Result<String> {
        let select = match columns_to_read(&self.schema, valid, &self.unique_columns) {
            Some(columns) => columns
                .iter()
                .map(|c| quote_identifier(c, '`'))
                .collect::<Vec<_>>()
                .join(", "),
            None => "*".to_string(),
        };

        let mut sql = format!(
            "SELECT {} FROM {}.{}",
            select,
            quote_identifier(&self.config.database, '`'),
            quote_identifier(&self.name, '`')
        );

        let filters = normalize_filters(request.filters.clone());
        if !filters.is_empty() {
            let predicate =
                compile_predicate_with_dialect(&self.schema, &filters, SqlDialect::ClickHouse)?;
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        Ok(sql)
    }

    async fn run_query(&self, request: QueryRequest) -> Result<Frame> {
        let valid = self.valid_columns(&request);
        let sql = self.statement(&request, valid.as_deref())?;
        debug!("Table '{}': {}", self.name, sql);

        let read_columns = columns_to_read(&self.schema, valid.as_deref(), &self.unique_columns);

        let batches = self
            .backend
            .execute(SqlRequest {
                table_name: self.name.clone(),
                table_uri: self.config.uri(),
                sql,
                options: self.config.options(),
            })
            .await?;

        let frame = frame_from_sql(&self.schema, batches, read_columns.as_deref())?;
        finish(frame, &self.unique_columns, valid.as_deref())
    }
}

impl Table for ClickHouseTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    fn table_schema(&self) -> BoxFuture<'_, Result<TableSchema>> {
        // Partitions are not exposed for ClickHouse tables
        async move { Ok(TableSchema::from_arrow(&self.schema, &self.stats_columns)) }.boxed()
    }

    fn query(&self, request: QueryRequest) -> BoxFuture<'_, Result<Frame>> {
        self.run_query(request).boxed()
    }
}
