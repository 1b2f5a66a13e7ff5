use std::{fs::File, path::Path, sync::Arc};

use arrow_array::{Array, Int64Array, ListArray, RecordBatch, StringArray, types::Int64Type};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use datafusion_common::ScalarValue;
use lakecat::{
    CatalogError, Filter, ParquetTable, Partition, PartitioningScheme, QueryRequest, ReadOptions,
    Table,
};
use parquet::arrow::ArrowWriter;

fn write_parquet(path: &Path, batch: &RecordBatch) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
}

fn values_batch(values: &[i64]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("value", DataType::Int64, false)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))]).unwrap()
}

fn int_column(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
    batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .iter()
        .collect()
}

fn str_column(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap()
        .iter()
        .map(|v| v.map(str::to_string))
        .collect()
}

fn value_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("value", DataType::Int64, false)]))
}

fn partitions() -> Vec<Partition> {
    vec![
        Partition::new("implant_id", DataType::Int64),
        Partition::new("date", DataType::Utf8),
    ]
}

/// Hive layout:
///
/// ```text
/// implant_id=1/date=2023-01-01 -> [10, 11]
/// implant_id=1/date=2023-01-02 -> [12]
/// implant_id=2/date=2023-01-01 -> [20]
/// implant_id=2/date=2023-01-02 -> [21]
/// ```
fn hive_table(root: &Path) -> ParquetTable {
    let files: [(i64, &str, &[i64]); 4] = [
        (1, "2023-01-01", &[10, 11]),
        (1, "2023-01-02", &[12]),
        (2, "2023-01-01", &[20]),
        (2, "2023-01-02", &[21]),
    ];
    for (implant_id, date, values) in files {
        let path = root
            .join(format!("implant_id={}", implant_id))
            .join(format!("date={}", date))
            .join("part-0.parquet");
        write_parquet(&path, &values_batch(values));
    }

    ParquetTable::new("spikes", root.to_str().unwrap(), value_schema())
        .with_partitioning(partitions(), PartitioningScheme::Hive)
        .with_read_options(ReadOptions::builder().retry_count(1).build())
}

#[tokio::test]
async fn unpartitioned_table_applies_residual_filters() {
    let dir = tempfile::tempdir().unwrap();
    let schema = Arc::new(Schema::new(vec![
        Field::new("implant_id", DataType::Int64, false),
        Field::new("value", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])),
            Arc::new(Int64Array::from(vec![10, 20, 30])),
        ],
    )
    .unwrap();
    write_parquet(&dir.path().join("data.parquet"), &batch);

    let table = ParquetTable::new("values", dir.path().to_str().unwrap(), schema);
    let frame = table
        .query(QueryRequest::new().with_filters(Filter::gt_eq("value", 20i64)))
        .await
        .unwrap();

    let batch = frame.sorted_by("value").unwrap();
    assert_eq!(int_column(&batch, "implant_id"), vec![Some(2), Some(3)]);
    assert_eq!(int_column(&batch, "value"), vec![Some(20), Some(30)]);
}

#[tokio::test]
async fn single_file_uri_is_read_directly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("only.parquet");
    write_parquet(&path, &values_batch(&[1, 2, 3]));

    let table = ParquetTable::new("only", path.to_str().unwrap(), value_schema());
    let frame = table.query(QueryRequest::new()).await.unwrap();
    assert_eq!(frame.num_rows(), 3);
}

#[tokio::test]
async fn hive_or_of_pins_returns_union() {
    let dir = tempfile::tempdir().unwrap();
    let table = hive_table(dir.path());

    let filters = vec![
        vec![Filter::eq("implant_id", 1i64)],
        vec![Filter::eq("date", "2023-01-01")],
    ];
    let frame = table
        .query(QueryRequest::new().with_filters(filters))
        .await
        .unwrap();

    let batch = frame.sorted_by("value").unwrap();
    assert_eq!(
        int_column(&batch, "value"),
        vec![Some(10), Some(11), Some(12), Some(20)]
    );
    assert_eq!(
        int_column(&batch, "implant_id"),
        vec![Some(1), Some(1), Some(1), Some(2)]
    );
    assert_eq!(
        str_column(&batch, "date"),
        vec![
            Some("2023-01-01".to_string()),
            Some("2023-01-01".to_string()),
            Some("2023-01-02".to_string()),
            Some("2023-01-01".to_string()),
        ]
    );
}

#[tokio::test]
async fn hive_pins_narrow_the_listing() {
    let dir = tempfile::tempdir().unwrap();
    let table = hive_table(dir.path());

    let prefix = table.build_prefix(&[vec![
        Filter::eq("implant_id", 2i64),
        Filter::gt("value", 0i64),
    ]]);
    assert!(prefix.uri.ends_with("/implant_id=2/"));
    assert_eq!(prefix.remaining_filters, vec![vec![Filter::gt("value", 0i64)]]);

    let frame = table
        .query(
            QueryRequest::new()
                .with_filters(vec![Filter::eq("implant_id", 2i64), Filter::gt("value", 20i64)])
                .with_columns(["date", "value"]),
        )
        .await
        .unwrap();

    assert_eq!(frame.column_names(), vec!["date", "value"]);
    let batch = frame.concat().unwrap();
    assert_eq!(int_column(&batch, "value"), vec![Some(21)]);
    assert_eq!(str_column(&batch, "date"), vec![Some("2023-01-02".to_string())]);
}

#[tokio::test]
async fn missing_partition_keeps_declared_columns() {
    let dir = tempfile::tempdir().unwrap();
    let table = hive_table(dir.path());

    let frame = table
        .query(QueryRequest::new().with_filters(vec![
            Filter::eq("implant_id", 99i64),
            Filter::eq("date", "2023-01-01"),
        ]))
        .await
        .unwrap();

    assert_eq!(frame.num_rows(), 0);
    assert_eq!(frame.column_names(), vec!["value", "implant_id", "date"]);
}

#[tokio::test]
async fn directory_scheme_parses_partition_values_by_position() {
    let dir = tempfile::tempdir().unwrap();
    write_parquet(
        &dir.path().join("5956").join("2024-03-24").join("df.parquet"),
        &values_batch(&[1, 2]),
    );
    write_parquet(
        &dir.path().join("5956").join("2024-03-25").join("df.parquet"),
        &values_batch(&[3]),
    );
    write_parquet(
        &dir.path().join("59561").join("2024-03-24").join("df.parquet"),
        &values_batch(&[4]),
    );

    let table = ParquetTable::new("spikes", dir.path().to_str().unwrap(), value_schema())
        .with_partitioning(partitions(), PartitioningScheme::Directory);
    assert_eq!(
        table
            .build_file_fragment(vec![
                Filter::eq("implant_id", 5956i64),
                Filter::eq("date", "2024-03-24"),
            ])
            .unwrap(),
        "5956/2024-03-24/df.parquet"
    );

    let frame = table
        .query(QueryRequest::new().with_filters(Filter::eq("implant_id", 5956i64)))
        .await
        .unwrap();

    // `5956` must not pick up the sibling `59561`
    let batch = frame.sorted_by("value").unwrap();
    assert_eq!(int_column(&batch, "value"), vec![Some(1), Some(2), Some(3)]);
    assert_eq!(
        int_column(&batch, "implant_id"),
        vec![Some(5956), Some(5956), Some(5956)]
    );
    assert_eq!(
        str_column(&batch, "date"),
        vec![
            Some("2024-03-24".to_string()),
            Some("2024-03-24".to_string()),
            Some("2024-03-25".to_string()),
        ]
    );
}

fn scalar_column(batch: &RecordBatch, name: &str) -> Vec<ScalarValue> {
    let column = batch.column_by_name(name).unwrap();
    (0..column.len())
        .map(|row| ScalarValue::try_from_array(column, row).unwrap())
        .collect()
}

/// Hive layout with typed partitions:
///
/// ```text
/// day=2024-01-01/ratio=1.5/flag=true  -> [1]
/// day=2024-01-01/ratio=1.5/flag=false -> [2]
/// day=2024-01-02/ratio=2.0/flag=true  -> [3]
/// ```
#[tokio::test]
async fn typed_hive_partitions_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    for (day, ratio, flag, value) in [
        ("2024-01-01", "1.5", "true", 1i64),
        ("2024-01-01", "1.5", "false", 2),
        ("2024-01-02", "2.0", "true", 3),
    ] {
        let path = dir
            .path()
            .join(format!("day={}", day))
            .join(format!("ratio={}", ratio))
            .join(format!("flag={}", flag))
            .join("part-0.parquet");
        write_parquet(&path, &values_batch(&[value]));
    }

    let table = ParquetTable::new("typed", dir.path().to_str().unwrap(), value_schema())
        .with_partitioning(
            vec![
                Partition::new("day", DataType::Date32),
                Partition::new("ratio", DataType::Float64),
                Partition::new("flag", DataType::Boolean),
            ],
            PartitioningScheme::Hive,
        );

    let filters = vec![
        Filter::eq("day", ScalarValue::Date32(Some(19723))),
        Filter::eq("ratio", 1.5f64),
    ];
    let prefix = table.build_prefix(&[filters.clone()]);
    assert!(prefix.uri.ends_with("/day=2024-01-01/ratio=1.5/"));

    let frame = table
        .query(QueryRequest::new().with_filters(filters))
        .await
        .unwrap();
    let batch = frame.sorted_by("value").unwrap();
    assert_eq!(int_column(&batch, "value"), vec![Some(1), Some(2)]);
    assert_eq!(
        scalar_column(&batch, "day"),
        vec![ScalarValue::Date32(Some(19723)); 2]
    );
    assert_eq!(
        scalar_column(&batch, "ratio"),
        vec![ScalarValue::Float64(Some(1.5)); 2]
    );
    assert_eq!(
        scalar_column(&batch, "flag"),
        vec![ScalarValue::Boolean(Some(true)), ScalarValue::Boolean(Some(false))]
    );

    // Without filters every value is parsed from the path
    let frame = table.query(QueryRequest::new()).await.unwrap();
    let batch = frame.sorted_by("value").unwrap();
    assert_eq!(
        scalar_column(&batch, "day"),
        vec![
            ScalarValue::Date32(Some(19723)),
            ScalarValue::Date32(Some(19723)),
            ScalarValue::Date32(Some(19724)),
        ]
    );
    assert_eq!(
        scalar_column(&batch, "ratio"),
        vec![
            ScalarValue::Float64(Some(1.5)),
            ScalarValue::Float64(Some(1.5)),
            ScalarValue::Float64(Some(2.0)),
        ]
    );
    assert_eq!(
        scalar_column(&batch, "flag"),
        vec![
            ScalarValue::Boolean(Some(true)),
            ScalarValue::Boolean(Some(false)),
            ScalarValue::Boolean(Some(true)),
        ]
    );
}

#[tokio::test]
async fn list_columns_support_includes() {
    let dir = tempfile::tempdir().unwrap();
    let tags_type = DataType::List(Arc::new(Field::new_list_field(DataType::Int64, true)));
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("tags", tags_type, true),
    ]));
    let tags = ListArray::from_iter_primitive::<Int64Type, _, _>(vec![
        Some(vec![Some(1), Some(2)]),
        Some(vec![Some(3)]),
        None,
        Some(vec![Some(2), Some(3)]),
    ]);
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(Int64Array::from(vec![1, 2, 3, 4])), Arc::new(tags)],
    )
    .unwrap();
    write_parquet(&dir.path().join("tags.parquet"), &batch);

    let table = ParquetTable::new("tagged", dir.path().to_str().unwrap(), schema);

    let frame = table
        .query(QueryRequest::new().with_filters(Filter::includes("tags", 2i64)))
        .await
        .unwrap();
    assert_eq!(int_column(&frame.sorted_by("id").unwrap(), "id"), vec![Some(1), Some(4)]);

    let frame = table
        .query(QueryRequest::new().with_filters(Filter::includes_all("tags", [2i64, 3])))
        .await
        .unwrap();
    assert_eq!(int_column(&frame.sorted_by("id").unwrap(), "id"), vec![Some(4)]);

    let frame = table
        .query(QueryRequest::new().with_filters(Filter::includes_any("tags", [1i64, 3])))
        .await
        .unwrap();
    assert_eq!(
        int_column(&frame.sorted_by("id").unwrap(), "id"),
        vec![Some(1), Some(2), Some(4)]
    );
}

#[tokio::test]
async fn unique_columns_collapse_duplicates_before_projection() {
    let dir = tempfile::tempdir().unwrap();
    let schema = Arc::new(Schema::new(vec![
        Field::new("uniq", DataType::Utf8, false),
        Field::new("value", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec!["a", "b", "a", "c", "b"])),
            Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])),
        ],
    )
    .unwrap();
    write_parquet(&dir.path().join("dups.parquet"), &batch);

    let table = ParquetTable::new("dups", dir.path().to_str().unwrap(), schema)
        .with_unique_columns(["uniq"]);
    let frame = table
        .query(QueryRequest::new().with_columns(["value"]))
        .await
        .unwrap();

    assert_eq!(frame.column_names(), vec!["value"]);
    let batch = frame.concat().unwrap();
    assert_eq!(batch.column(0).len(), 3);
    assert_eq!(int_column(&batch, "value"), vec![Some(1), Some(2), Some(4)]);
}

#[tokio::test]
async fn invalid_requests_fail_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let table = hive_table(dir.path());

    let err = table
        .query(QueryRequest::new().with_columns(["nope"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidColumn { ref column } if column == "nope"));

    let err = table
        .query(QueryRequest::new().with_filters(Filter::contains("value", "x")))
        .await
        .unwrap_err();
    // Accepted by the compiler, rejected when evaluated against an integer column
    assert!(matches!(err, CatalogError::Arrow(_)));
}
