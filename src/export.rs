//! JSON export of catalogs for documentation sites.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    catalog::{Catalog, Database},
    error::Result,
    table::{
        Table,
        metadata::{TableColumn, TablePartition, TableType},
    },
};

#[derive(Debug, Serialize)]
struct ExportedTable<'a> {
    name: &'a str,
    description: &'a str,
    partitions: Vec<TablePartition>,
    columns: Vec<TableColumn>,
    selected_columns: Option<&'a [String]>,
    supports_sql_filter: bool,
    table_type: TableType,
    latency_info: Option<&'a str>,
    example_notebook: Option<&'a str>,
    data_input: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ExportedDatabase<'a> {
    name: &'a str,
    tables: Vec<ExportedTable<'a>>,
}

#[derive(Debug, Serialize)]
struct ExportedCatalog<'a> {
    name: &'a str,
    databases: Vec<ExportedDatabase<'a>>,
}

#[derive(Debug, Serialize)]
struct Export<'a> {
    catalogs: Vec<ExportedCatalog<'a>>,
}

async fn export_table<'a>(name: &'a str, table: &'a dyn Table) -> Result<ExportedTable<'a>> {
    let metadata = table.metadata();
    let schema = table.table_schema().await?;

    Ok(ExportedTable {
        name,
        description: &metadata.description,
        partitions: schema.partitions,
        columns: schema.columns,
        selected_columns: metadata.docs_columns.as_deref(),
        supports_sql_filter: table.supports_sql_filter(),
        table_type: metadata.table_type,
        latency_info: metadata.latency_info.as_deref(),
        example_notebook: metadata.example_notebook.as_deref(),
        data_input: metadata.data_input.as_deref(),
    })
}

async fn export_database<'a>(
    name: &'a str,
    database: &'a Database,
) -> Result<ExportedDatabase<'a>> {
    let mut tables = Vec::new();
    for (table_name, table) in database.tables(false) {
        tables.push(export_table(table_name, table.as_ref()).await?);
    }
    debug!("Exported {} tables from database '{}'", tables.len(), name);
    Ok(ExportedDatabase { name, tables })
}

/// Describe every catalog as JSON.
///
/// Output shape:
/// `{"catalogs": [{"name", "databases": [{"name", "tables": [...]}]}]}`.
/// Tables are sorted by name and deprecated tables are left out. Only
/// [`Table::metadata`] and [`Table::table_schema`] are consulted.
pub async fn export_catalogs(catalogs: &[(&str, &Catalog)]) -> Result<Value> {
    // Databases are materialized up front so exported entries can borrow them
    let mut resolved = Vec::with_capacity(catalogs.len());
    for (name, catalog) in catalogs {
        let databases = catalog
            .database_names()
            .into_iter()
            .map(|db_name| catalog.db(&db_name).map(|db| (db_name, db)))
            .collect::<Result<Vec<_>>>()?;
        resolved.push((*name, databases));
    }

    let mut exported = Vec::with_capacity(resolved.len());
    for (name, databases) in &resolved {
        let mut entries = Vec::with_capacity(databases.len());
        for (db_name, database) in databases {
            entries.push(export_database(db_name, database).await?);
        }
        exported.push(ExportedCatalog {
            name: *name,
            databases: entries,
        });
    }

    Ok(serde_json::to_value(Export { catalogs: exported })?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema};
    use futures_util::FutureExt;
    use serde_json::json;

    use super::*;
    use crate::{
        filter::Filter,
        frame::Frame,
        table::{QueryRequest, function::FunctionTable, metadata::TableMetadata},
    };

    fn table(name: &str, deprecated: bool) -> FunctionTable {
        FunctionTable::new(name, |_request: QueryRequest| {
            let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, true)]));
            async move { Ok(Frame::empty(schema)) }.boxed()
        })
        .with_metadata(
            TableMetadata::new(TableType::Function)
                .with_description(format!("{} table", name))
                .with_docs_filters(vec![Filter::eq("x", 1i64)])
                .with_latency_info("seconds")
                .deprecated(deprecated),
        )
    }

    #[tokio::test]
    async fn test_export_shape() {
        let db = Database::new()
            .with_table(table("b", false))
            .with_table(table("a", false))
            .with_table(table("old", true));
        let catalog = Catalog::new().with_database("neuro", db);

        let value = export_catalogs(&[("main", &catalog)]).await.unwrap();
        assert_eq!(
            value,
            json!({
                "catalogs": [{
                    "name": "main",
                    "databases": [{
                        "name": "neuro",
                        "tables": [
                            {
                                "name": "a",
                                "description": "a table",
                                "partitions": [
                                    {"column_name": "x", "type_annotation": "Int64", "value": 1}
                                ],
                                "columns": [{
                                    "name": "x",
                                    "type": "Int64",
                                    "has_stats": false,
                                    "readonly": false,
                                    "filter_only": false
                                }],
                                "selected_columns": null,
                                "supports_sql_filter": false,
                                "table_type": "FUNCTION",
                                "latency_info": "seconds",
                                "example_notebook": null,
                                "data_input": null
                            },
                            {
                                "name": "b",
                                "description": "b table",
                                "partitions": [
                                    {"column_name": "x", "type_annotation": "Int64", "value": 1}
                                ],
                                "columns": [{
                                    "name": "x",
                                    "type": "Int64",
                                    "has_stats": false,
                                    "readonly": false,
                                    "filter_only": false
                                }],
                                "selected_columns": null,
                                "supports_sql_filter": false,
                                "table_type": "FUNCTION",
                                "latency_info": "seconds",
                                "example_notebook": null,
                                "data_input": null
                            }
                        ]
                    }]
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_export_empty() {
        let value = export_catalogs(&[]).await.unwrap();
        assert_eq!(value, json!({"catalogs": []}));
    }
}
