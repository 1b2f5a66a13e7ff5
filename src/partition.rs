//! Partition-prefix compilation.
//!
//! Object stores list keys by prefix, so a scan over a partitioned table is
//! much cheaper when the listing starts below the table root. Given the
//! ordered partition columns of a table and a set of normalized filters,
//! [`build_prefix`] extends the table URI with every leading partition that all
//! AND-groups pin to the same literal value, and returns whatever could not be
//! encoded in the path as residual filters.

use arrow_schema::DataType;
use datafusion_common::ScalarValue;

use crate::{
    error::{CatalogError, Result},
    filter::{Filter, NormalizedFilters, Operator, scalar_to_string},
};

/// One partition level of a table's directory layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    column: String,
    data_type: DataType,
}

impl Partition {
    pub fn new(column: impl Into<String>, data_type: DataType) -> Self {
        Self {
            column: column.into(),
            data_type,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }
}

/// How partition values are encoded in object paths.
///
/// - `Directory`: `s3://bucket/5956/2024-03-24`
/// - `Hive`: `s3://bucket/implant_id=5956/date=2024-03-24`
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PartitioningScheme {
    #[default]
    Directory,
    Hive,
}

impl PartitioningScheme {
    /// Path segment encoding `value` for `partition`.
    pub fn segment(&self, partition: &Partition, value: &str) -> String {
        match self {
            PartitioningScheme::Directory => value.to_string(),
            PartitioningScheme::Hive => format!("{}={}", partition.column, value),
        }
    }
}

/// Output of [`build_prefix`].
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionPrefix {
    /// Listing prefix; ends with `/` whenever filters were considered.
    pub uri: String,
    /// Partitions whose value is not encoded in `uri`, in declared order.
    pub remaining_partitions: Vec<Partition>,
    /// Filters still to be evaluated against the data.
    pub remaining_filters: NormalizedFilters,
    /// Equality filters encoded in `uri`, in partition order.
    pub applied_filters: Vec<Filter>,
}

/// Return the single `=` filter on `partition` in `filters`.
///
/// Returns `None` when there is no filter on the column, more than one, or one
/// that is not a scalar equality.
pub fn exactly_one_equality_filter<'a>(
    partition: &Partition,
    filters: &'a [Filter],
) -> Option<&'a Filter> {
    equality_pin(partition, filters).map(|(filter, _)| filter)
}

fn equality_pin<'a>(
    partition: &Partition,
    filters: &'a [Filter],
) -> Option<(&'a Filter, &'a ScalarValue)> {
    let mut found = None;

    for f in filters.iter().filter(|f| f.column() == partition.column) {
        if found.is_some() || f.operator() != Operator::Eq {
            return None;
        }
        found = Some((f, f.value().as_scalar()?));
    }

    found
}

/// Join a path segment onto `base` without doubling or dropping separators.
///
/// An empty `segment` yields `base` with a trailing `/`; an empty `base`
/// yields `segment` unchanged.
pub fn join_path(base: &str, segment: &str) -> String {
    if base.is_empty() || base.ends_with('/') {
        format!("{}{}", base, segment)
    } else {
        format!("{}/{}", base, segment)
    }
}

/// Build the longest listing prefix that every AND-group agrees on.
///
/// Partitions are visited in declared order. The walk stops at the first
/// partition for which some group has no single `=` filter, or for which
/// groups pin different values. Every pinned partition is removed from the
/// remaining partitions, its filter is removed from every group and recorded
/// in `applied_filters`.
///
/// The returned URI always ends with `/` once filters were considered, so that
/// partition `4` never matches sibling `45` during a prefix listing.
///
/// # Example
/// ```
/// use arrow_schema::DataType;
/// use lakecat::{Filter, Partition, PartitioningScheme, build_prefix};
///
/// let partitions = vec![
///     Partition::new("imp", DataType::Int64),
///     Partition::new("date", DataType::Utf8),
/// ];
/// let filters = vec![vec![Filter::eq("imp", 1i64), Filter::eq("date", "2023-01-01")]];
/// let prefix = build_prefix(
///     "s3://bucket/table",
///     &partitions,
///     &filters,
///     PartitioningScheme::Hive,
///     true,
/// );
/// assert_eq!(prefix.uri, "s3://bucket/table/imp=1/date=2023-01-01/");
/// assert!(prefix.remaining_partitions.is_empty());
/// assert_eq!(prefix.remaining_filters, vec![Vec::<Filter>::new()]);
/// ```
pub fn build_prefix(
    base_uri: &str,
    partitions: &[Partition],
    filters: &[Vec<Filter>],
    scheme: PartitioningScheme,
    include_base_uri: bool,
) -> PartitionPrefix {
    let mut uri = if include_base_uri {
        base_uri.to_string()
    } else {
        String::new()
    };

    if filters.is_empty() || partitions.is_empty() {
        return PartitionPrefix {
            uri,
            remaining_partitions: partitions.to_vec(),
            remaining_filters: filters.to_vec(),
            applied_filters: Vec::new(),
        };
    }

    let mut remaining_partitions = partitions.to_vec();
    let mut remaining_filters: NormalizedFilters = filters.to_vec();
    let mut applied_filters = Vec::new();

    for partition in partitions {
        let pins = remaining_filters
            .iter()
            .map(|group| equality_pin(partition, group))
            .collect::<Option<Vec<_>>>();

        // Some group has zero or several filters on this partition, or a non-equality one
        let Some(pins) = pins else {
            break;
        };

        let (pin, value) = pins[0];
        if pins.iter().any(|(p, _)| *p != pin) {
            break;
        }

        let pin = pin.clone();
        let value = scalar_to_string(value);
        uri = join_path(&uri, &scheme.segment(partition, &value));

        remaining_partitions.retain(|p| p != partition);
        for group in remaining_filters.iter_mut() {
            if let Some(pos) = group.iter().position(|f| *f == pin) {
                group.remove(pos);
            }
        }
        applied_filters.push(pin);
    }

    uri = join_path(&uri, "");

    PartitionPrefix {
        uri,
        remaining_partitions,
        remaining_filters,
        applied_filters,
    }
}

/// Build the relative path of a single data file.
///
/// The filters must pin every partition; otherwise
/// [`CatalogError::UnresolvedPartitions`] names the partitions left open.
pub fn build_file_fragment(
    partitions: &[Partition],
    filters: &[Vec<Filter>],
    scheme: PartitioningScheme,
    file_name: &str,
) -> Result<String> {
    let prefix = build_prefix("", partitions, filters, scheme, false);
    if !prefix.remaining_partitions.is_empty() {
        return Err(CatalogError::UnresolvedPartitions {
            missing: prefix
                .remaining_partitions
                .iter()
                .map(|p| p.column.clone())
                .collect(),
        });
    }

    Ok(join_path(&prefix.uri, file_name))
}
