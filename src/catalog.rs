//! Named databases of tables.

use std::{collections::BTreeMap, sync::Arc};

use tracing::warn;

use crate::{
    error::{CatalogError, Result},
    frame::Frame,
    options::StorageOptions,
    table::{QueryRequest, Table},
};

/// A set of tables addressed by name.
///
/// A database obtained through [`Catalog::db`] carries the catalog's global
/// storage options and merges them into every request; fields set on the
/// request take precedence.
#[derive(Clone, Default)]
pub struct Database {
    tables: BTreeMap<String, Arc<dyn Table>>,
    global_options: Option<StorageOptions>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `table` under its own name.
    pub fn with_table(mut self, table: impl Table + 'static) -> Self {
        let table: Arc<dyn Table> = Arc::new(table);
        self.tables.insert(table.name().to_string(), table);
        self
    }

    /// Register `table` under `name`, replacing any table already there.
    pub fn register(&mut self, name: impl Into<String>, table: Arc<dyn Table>) {
        self.tables.insert(name.into(), table);
    }

    /// Table names in sorted order. Deprecated tables are listed only with
    /// `show_deprecated`.
    pub fn table_names(&self, show_deprecated: bool) -> Vec<String> {
        self.tables(show_deprecated)
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn tables(&self, show_deprecated: bool) -> Vec<(&str, &Arc<dyn Table>)> {
        self.tables
            .iter()
            .filter(|(_, table)| show_deprecated || !table.metadata().is_deprecated)
            .map(|(name, table)| (name.as_str(), table))
            .collect()
    }

    /// Look up a table, deprecated or not.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::TableNotFound`] listing the available tables.
    pub fn table(&self, name: &str) -> Result<&Arc<dyn Table>> {
        self.tables
            .get(name)
            .ok_or_else(|| CatalogError::TableNotFound {
                name: name.to_string(),
                available: self.table_names(false),
            })
    }

    /// Query the table registered under `name`.
    pub async fn query(&self, name: &str, mut request: QueryRequest) -> Result<Frame> {
        let table = self.table(name)?;
        if table.metadata().is_deprecated {
            warn!("The table '{}' is deprecated", name);
        }

        if let Some(global) = &self.global_options {
            request.storage = request.storage.merged_with(global);
        }
        table.query(request).await
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A set of databases addressed by name.
#[derive(Clone, Default)]
pub struct Catalog {
    databases: BTreeMap<String, Database>,
    global_options: Option<StorageOptions>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, name: impl Into<String>, database: Database) -> Self {
        self.databases.insert(name.into(), database);
        self
    }

    /// Storage options applied to every query issued through this catalog.
    pub fn set_global_options(&mut self, options: StorageOptions) {
        self.global_options = Some(options);
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    /// Look up a database.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DatabaseNotFound`] listing the available
    /// databases.
    pub fn db(&self, name: &str) -> Result<Database> {
        let database = self
            .databases
            .get(name)
            .ok_or_else(|| CatalogError::DatabaseNotFound {
                name: name.to_string(),
                available: self.database_names(),
            })?;

        let mut database = database.clone();
        if let Some(global) = &self.global_options {
            database.global_options = Some(match &database.global_options {
                Some(own) => own.merged_with(global),
                None => global.clone(),
            });
        }
        Ok(database)
    }
}
