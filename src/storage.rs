//! Object-store access for path-based tables.

use std::sync::Arc;

use arrow_array::RecordBatch;
use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::{ObjectStore, parse_url_opts, path::Path};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{CatalogError, Result},
    options::{ReadOptions, StorageOptions},
};

/// Returns true if `uri` carries a scheme such as `s3://` or `file://`.
pub fn is_object_store_uri(uri: &str) -> bool {
    uri.contains("://")
}

/// Returns true if `uri` names a single Parquet object rather than a prefix.
pub fn is_parquet_file(uri: &str) -> bool {
    !uri.ends_with('/') && uri.ends_with(".parquet")
}

/// Parse a table URI into a URL. Scheme-less URIs are local paths.
pub fn parse_uri(uri: &str) -> Result<Url> {
    let invalid = || CatalogError::InvalidUri {
        uri: uri.to_string(),
    };

    if is_object_store_uri(uri) {
        return Url::parse(uri).map_err(|_| invalid());
    }

    let path = std::path::absolute(uri).map_err(|_| invalid())?;
    Url::from_file_path(path).map_err(|_| invalid())
}

/// Resolve the object store serving `uri` and the path of `uri` within it.
pub fn resolve_store(uri: &str, options: &StorageOptions) -> Result<(Arc<dyn ObjectStore>, Path)> {
    let url = parse_uri(uri)?;
    let (store, path) = parse_url_opts(&url, options.to_map())?;
    Ok((Arc::from(store), path))
}

/// List the Parquet objects below `prefix`, sorted by path.
///
/// Listing is segment based, so `table/4` never matches `table/45/...`.
pub async fn list_parquet_files(store: &dyn ObjectStore, prefix: &Path) -> Result<Vec<Path>> {
    let mut files: Vec<Path> = store
        .list(Some(prefix))
        .map_ok(|meta| meta.location)
        .try_filter(|location| std::future::ready(location.extension() == Some("parquet")))
        .try_collect()
        .await?;
    files.sort();

    debug!("Listed {} parquet files under '{}'", files.len(), prefix);
    Ok(files)
}

/// Fetch an object, retrying transient failures.
///
/// Missing objects are reported immediately; other errors are retried up to
/// [`ReadOptions::retry_count`] attempts in total.
pub async fn fetch_with_retry(
    store: &dyn ObjectStore,
    path: &Path,
    options: &ReadOptions,
) -> Result<Bytes> {
    let mut attempt = 1;
    loop {
        match fetch_once(store, path).await {
            Ok(bytes) => return Ok(bytes),
            Err(err @ object_store::Error::NotFound { .. }) => return Err(err.into()),
            Err(err) if attempt < options.retry_count() => {
                warn!(
                    "Fetching '{}' failed (attempt {}/{}): {}",
                    path,
                    attempt,
                    options.retry_count(),
                    err
                );
                tokio::time::sleep(options.retry_backoff()).await;
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn fetch_once(store: &dyn ObjectStore, path: &Path) -> object_store::Result<Bytes> {
    store.get(path).await?.bytes().await
}

/// Decode a whole Parquet file held in memory.
pub fn decode_parquet(bytes: Bytes) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
    Ok(reader.collect::<std::result::Result<Vec<_>, _>>()?)
}
