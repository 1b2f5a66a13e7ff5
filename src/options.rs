use std::{collections::BTreeMap, time::Duration};

/// Environment variable overriding [`ReadOptions::retry_count`].
pub const READ_RETRY_COUNT_ENV: &str = "LAKECAT_READ_RETRY_COUNT";
/// Environment variable overriding [`ReadOptions::retry_backoff`], in milliseconds.
pub const READ_RETRY_BACKOFF_MS_ENV: &str = "LAKECAT_READ_RETRY_BACKOFF_MS";

const DEFAULT_RETRY_COUNT: usize = 10;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Options controlling how data files are fetched
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadOptions {
    retry_count: usize,
    retry_backoff: Duration,
}

impl ReadOptions {
    /// Create a new builder for ReadOptions
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use lakecat::ReadOptions;
    ///
    /// let options = ReadOptions::builder()
    ///     .retry_count(3)
    ///     .retry_backoff(Duration::from_millis(10))
    ///     .build();
    /// assert_eq!(options.retry_count(), 3);
    /// ```
    pub fn builder() -> ReadOptionsBuilder {
        ReadOptionsBuilder::default()
    }

    /// Defaults with overrides from `LAKECAT_READ_RETRY_COUNT` and
    /// `LAKECAT_READ_RETRY_BACKOFF_MS`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut builder = Self::builder();
        if let Some(v) = std::env::var(READ_RETRY_COUNT_ENV)
            .ok()
            .and_then(|x| x.parse::<usize>().ok())
        {
            builder = builder.retry_count(v);
        }
        if let Some(v) = std::env::var(READ_RETRY_BACKOFF_MS_ENV)
            .ok()
            .and_then(|x| x.parse::<u64>().ok())
        {
            builder = builder.retry_backoff(Duration::from_millis(v));
        }
        builder.build()
    }

    /// Maximum number of attempts per file
    pub fn retry_count(&self) -> usize {
        self.retry_count
    }

    /// Delay between two attempts on the same file
    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Builder for ReadOptions
#[derive(Clone, Debug, Default)]
pub struct ReadOptionsBuilder {
    retry_count: Option<usize>,
    retry_backoff: Option<Duration>,
}

impl ReadOptionsBuilder {
    /// Number of attempts per file (default: 10, minimum: 1)
    pub fn retry_count(mut self, value: usize) -> Self {
        self.retry_count = Some(value);
        self
    }

    /// Delay between attempts (default: 50ms)
    pub fn retry_backoff(mut self, value: Duration) -> Self {
        self.retry_backoff = Some(value);
        self
    }

    /// Build the ReadOptions
    pub fn build(self) -> ReadOptions {
        ReadOptions {
            retry_count: self.retry_count.unwrap_or(DEFAULT_RETRY_COUNT).max(1),
            retry_backoff: self.retry_backoff.unwrap_or(DEFAULT_RETRY_BACKOFF),
        }
    }
}

/// Credentials and connection settings passed to the object store or SQL
/// backend with each query.
///
/// Unset fields are omitted when rendered with [`StorageOptions::to_map`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageOptions {
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub region: Option<String>,
    /// Request timeout, e.g. `"150s"`
    pub timeout: Option<String>,
    pub allow_http: Option<bool>,
    /// Additional backend-specific key/value pairs, passed through verbatim
    pub extra: BTreeMap<String, String>,
}

impl StorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint_url(mut self, value: impl Into<String>) -> Self {
        self.endpoint_url = Some(value.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_session_token(mut self, value: impl Into<String>) -> Self {
        self.session_token = Some(value.into());
        self
    }

    pub fn with_region(mut self, value: impl Into<String>) -> Self {
        self.region = Some(value.into());
        self
    }

    pub fn with_timeout(mut self, value: impl Into<String>) -> Self {
        self.timeout = Some(value.into());
        self
    }

    pub fn with_allow_http(mut self, value: bool) -> Self {
        self.allow_http = Some(value);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.to_map().is_empty()
    }

    /// Fill every field unset in `self` from `defaults`.
    ///
    /// Fields already set on `self` win; `extra` entries are merged key by key.
    pub fn merged_with(&self, defaults: &StorageOptions) -> StorageOptions {
        let mut extra = defaults.extra.clone();
        extra.extend(self.extra.clone());

        StorageOptions {
            endpoint_url: self.endpoint_url.clone().or_else(|| defaults.endpoint_url.clone()),
            access_key_id: self
                .access_key_id
                .clone()
                .or_else(|| defaults.access_key_id.clone()),
            secret_access_key: self
                .secret_access_key
                .clone()
                .or_else(|| defaults.secret_access_key.clone()),
            session_token: self
                .session_token
                .clone()
                .or_else(|| defaults.session_token.clone()),
            region: self.region.clone().or_else(|| defaults.region.clone()),
            timeout: self.timeout.clone().or_else(|| defaults.timeout.clone()),
            allow_http: self.allow_http.or(defaults.allow_http),
            extra,
        }
    }

    /// Render as `object_store` configuration keys.
    ///
    /// Empty values are dropped so that an unset credential never overrides
    /// the store's own environment lookup.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let fields = [
            ("aws_endpoint", &self.endpoint_url),
            ("aws_access_key_id", &self.access_key_id),
            ("aws_secret_access_key", &self.secret_access_key),
            ("aws_session_token", &self.session_token),
            ("aws_region", &self.region),
            ("timeout", &self.timeout),
        ];
        for (key, value) in fields {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                out.insert(key.to_string(), v.to_string());
            }
        }
        if let Some(v) = self.allow_http {
            out.insert("allow_http".to_string(), v.to_string());
        }
        for (k, v) in &self.extra {
            if !v.is_empty() {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_options_defaults() {
        let options = ReadOptions::default();
        assert_eq!(options.retry_count(), 10);
        assert_eq!(options.retry_backoff(), Duration::from_millis(50));
        assert_eq!(ReadOptions::builder().build(), options);
    }

    #[test]
    fn test_retry_count_is_at_least_one() {
        let options = ReadOptions::builder().retry_count(0).build();
        assert_eq!(options.retry_count(), 1);
    }

    #[test]
    fn test_storage_options_render_object_store_keys() {
        let options = StorageOptions::new()
            .with_endpoint_url("http://localhost:9000")
            .with_credentials("key", "")
            .with_allow_http(true)
            .with_option("aws_virtual_hosted_style_request", "false");

        let map = options.to_map();
        assert_eq!(map.get("aws_endpoint").unwrap(), "http://localhost:9000");
        assert_eq!(map.get("aws_access_key_id").unwrap(), "key");
        assert!(!map.contains_key("aws_secret_access_key"));
        assert_eq!(map.get("allow_http").unwrap(), "true");
        assert_eq!(map.get("aws_virtual_hosted_style_request").unwrap(), "false");
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_merged_with_prefers_request_values() {
        let global = StorageOptions::new()
            .with_region("us-east-1")
            .with_timeout("150s")
            .with_option("a", "global")
            .with_option("b", "global");
        let request = StorageOptions::new().with_region("eu-west-1").with_option("a", "request");

        let merged = request.merged_with(&global);
        assert_eq!(merged.region.as_deref(), Some("eu-west-1"));
        assert_eq!(merged.timeout.as_deref(), Some("150s"));
        assert_eq!(merged.extra.get("a").unwrap(), "request");
        assert_eq!(merged.extra.get("b").unwrap(), "global");
    }

    #[test]
    fn test_empty_storage_options() {
        assert!(StorageOptions::default().is_empty());
        assert!(StorageOptions::new().with_region("").is_empty());
    }
}
