#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier, Once};
use std::thread;

use polystore::query::{Filter, Op, TagFilter};
use polystore::storage::{
    ColumnDataView, DataView, ExecutorConfig, LocalExecutor, RowDataView, SeriesMeta,
    StorageEngine,
};
use polystore::types::{DataType, KeyRange, PolyError, Result, Tags, Value, MAX_KEY};
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("polystore=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn sample_view() -> Result<DataView> {
    let columns = vec![
        SeriesMeta::new("root.d1.temp", DataType::Double).with_tags(tags(&[("host", "a")])),
        SeriesMeta::new("root.d1.count", DataType::Long).with_tags(tags(&[("host", "b")])),
    ];
    let rows = (1..=10)
        .map(|k| {
            let temp = Some(Value::Double(k as f64 / 2.0));
            let count = (k % 2 == 0).then_some(Value::Long(k));
            (k, vec![temp, count])
        })
        .collect();
    Ok(RowDataView::from_rows(columns, rows)?.into())
}

fn open(dir: &Path) -> Result<LocalExecutor> {
    init_tracing();
    LocalExecutor::open(&ExecutorConfig::new(dir))
}

#[test]
fn equal_managed_and_dummy_roots_are_rejected() {
    let tmp = tempdir().unwrap();
    let config = ExecutorConfig::new(tmp.path())
        .dummy_dir(tmp.path())
        .has_data(true)
        .read_only(false);
    assert!(matches!(
        LocalExecutor::open(&config),
        Err(PolyError::Config(_))
    ));
}

#[test]
fn equal_roots_are_detected_after_canonicalisation() {
    let tmp = tempdir().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    let config = ExecutorConfig::new(tmp.path().join("data").join("..").join("data"))
        .dummy_dir(&data)
        .has_data(true);
    assert!(matches!(
        LocalExecutor::open(&config),
        Err(PolyError::Config(_))
    ));
}

#[test]
fn history_mode_requires_dummy_dir() {
    let tmp = tempdir().unwrap();
    let config = ExecutorConfig::new(tmp.path()).has_data(true);
    assert!(matches!(
        LocalExecutor::open(&config),
        Err(PolyError::Config(_))
    ));
}

#[test]
fn config_from_engine_params() -> Result<()> {
    let tmp = tempdir().unwrap();
    let params: HashMap<String, String> = [(
        "dir".to_string(),
        tmp.path().join("managed").display().to_string(),
    )]
    .into_iter()
    .collect();
    let exec = LocalExecutor::open(&ExecutorConfig::from_params(&params, false, false)?)?;
    assert!(exec.root().is_some_and(Path::is_dir));
    assert_eq!(exec.dummy_root(), None);
    Ok(())
}

#[test]
fn project_pushes_key_ranges_and_applies_filter() -> Result<()> {
    let tmp = tempdir().unwrap();
    let exec = open(tmp.path())?;
    exec.insert(&sample_view()?, "unit0")?;

    let filter = Filter::And(vec![
        Filter::key(Op::Ge, 3),
        Filter::key(Op::Lt, 8),
        Filter::value("root.d1.count", Op::Gt, 4i64),
    ]);
    let paths = vec!["root.d1.temp".to_string(), "root.d1.count".to_string()];
    let rows: Vec<_> = exec
        .project(&paths, None, Some(&filter), "unit0", false)?
        .collect();
    let keys: Vec<i64> = rows.iter().map(|r| r.key).collect();
    assert_eq!(keys, vec![6]);
    assert_eq!(rows[0].get("root.d1.temp"), Some(&Value::Double(3.0)));
    assert_eq!(rows[0].get("root.d1.count"), Some(&Value::Long(6)));
    Ok(())
}

#[test]
fn contradictory_key_filter_returns_empty_stream() -> Result<()> {
    let tmp = tempdir().unwrap();
    let exec = open(tmp.path())?;
    exec.insert(&sample_view()?, "unit0")?;
    let filter = Filter::And(vec![Filter::key(Op::Lt, 2), Filter::key(Op::Gt, 5)]);
    let stream = exec.project(&["*".to_string()], None, Some(&filter), "unit0", false)?;
    assert!(stream.header().fields.is_empty());
    assert_eq!(stream.count(), 0);
    Ok(())
}

#[test]
fn tag_filter_restricts_projected_series() -> Result<()> {
    let tmp = tempdir().unwrap();
    let exec = open(tmp.path())?;
    exec.insert(&sample_view()?, "unit0")?;
    let filter = TagFilter::base("host", "b");
    let stream = exec.project(&["root.d1.*".to_string()], Some(&filter), None, "unit0", false)?;
    let names: Vec<&str> = stream
        .header()
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names, vec!["root.d1.count"]);
    assert_eq!(stream.count(), 5);
    Ok(())
}

#[test]
fn units_are_isolated() -> Result<()> {
    let tmp = tempdir().unwrap();
    let exec = open(tmp.path())?;
    exec.insert(&sample_view()?, "unit0")?;
    let rows = exec.project(&["*".to_string()], None, None, "unit1", false)?;
    assert_eq!(rows.count(), 0);
    Ok(())
}

#[test]
fn row_and_column_views_persist_the_same_records() -> Result<()> {
    let tmp = tempdir().unwrap();
    let exec = open(tmp.path())?;
    let columns = vec![
        SeriesMeta::new("root.a", DataType::Long),
        SeriesMeta::new("root.b", DataType::Boolean),
    ];
    let row_view = RowDataView::from_rows(
        columns.clone(),
        vec![
            (1, vec![Some(Value::Long(1)), None]),
            (5, vec![Some(Value::Long(5)), Some(Value::Boolean(true))]),
            (9, vec![None, Some(Value::Boolean(false))]),
        ],
    )?;
    let column_view = ColumnDataView::from_columns(
        columns,
        vec![1, 5, 9],
        vec![
            vec![Some(Value::Long(1)), Some(Value::Long(5)), None],
            vec![None, Some(Value::Boolean(true)), Some(Value::Boolean(false))],
        ],
    )?;
    exec.insert(&row_view.into(), "rows")?;
    exec.insert(&column_view.into(), "cols")?;

    let paths = vec!["*".to_string()];
    let from_rows: Vec<_> = exec.project(&paths, None, None, "rows", false)?.collect();
    let from_cols: Vec<_> = exec.project(&paths, None, None, "cols", false)?.collect();
    assert_eq!(from_rows.len(), 3);
    for (a, b) in from_rows.iter().zip(&from_cols) {
        assert_eq!(a.key, b.key);
        assert_eq!(a.values, b.values);
    }
    Ok(())
}

#[test]
fn dummy_project_with_tag_filter_is_empty() -> Result<()> {
    let tmp = tempdir().unwrap();
    let history = tmp.path().join("history");
    fs::create_dir_all(history.join("root")).unwrap();
    fs::write(history.join("root").join("raw"), b"payload").unwrap();
    init_tracing();
    let exec = LocalExecutor::open(
        &ExecutorConfig::new(tmp.path().join("managed"))
            .dummy_dir(&history)
            .has_data(true),
    )?;

    let tag_filter = TagFilter::base("host", "a");
    let rows = exec.project(&["*".to_string()], Some(&tag_filter), None, "u", true)?;
    assert_eq!(rows.count(), 0);

    let rows: Vec<_> = exec.project(&["root.raw".to_string()], None, None, "u", true)?.collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("root.raw"), Some(&Value::from("payload")));
    Ok(())
}

#[test]
fn history_files_are_chunked_by_config() -> Result<()> {
    let tmp = tempdir().unwrap();
    let history = tmp.path().join("history");
    fs::create_dir_all(&history).unwrap();
    fs::write(history.join("blob"), vec![7u8; 10]).unwrap();
    let exec = LocalExecutor::open(
        &ExecutorConfig::default()
            .dummy_dir(&history)
            .has_data(true)
            .read_only(true)
            .chunk_size(4),
    )?;
    assert_eq!(exec.root(), None);
    let rows: Vec<_> = exec.project(&["blob".to_string()], None, None, "u", true)?.collect();
    let keys: Vec<i64> = rows.iter().map(|r| r.key).collect();
    assert_eq!(keys, vec![0, 1, 2]);
    assert_eq!(rows[2].get("blob"), Some(&Value::Binary(vec![7, 7])));
    Ok(())
}

#[test]
fn schema_lists_managed_and_history_columns() -> Result<()> {
    let tmp = tempdir().unwrap();
    let history = tmp.path().join("archive");
    fs::create_dir_all(history.join("old")).unwrap();
    fs::write(history.join("old").join("s1"), b"x").unwrap();
    let exec = LocalExecutor::open(
        &ExecutorConfig::new(tmp.path().join("managed"))
            .dummy_dir(&history)
            .has_data(true),
    )?;
    exec.insert(&sample_view()?, "unit0")?;

    let schema = exec.schema_of("unit0")?;
    assert_eq!(schema.len(), 3);
    let count = schema.iter().find(|c| c.path == "root.d1.count").unwrap();
    assert_eq!(count.data_type, DataType::Long);
    assert_eq!(count.tags, tags(&[("host", "b")]));
    assert!(!count.is_dummy);
    let old = schema.iter().find(|c| c.path == "old.s1").unwrap();
    assert_eq!(old.data_type, DataType::Binary);
    assert!(old.tags.is_empty());
    assert!(old.is_dummy);
    Ok(())
}

#[test]
fn schema_reports_files_without_metadata() -> Result<()> {
    let tmp = tempdir().unwrap();
    let exec = open(tmp.path())?;
    exec.insert(&sample_view()?, "unit0")?;
    let stray = exec.root().unwrap().join("unit0").join("root").join("stray");
    fs::write(stray, b"not a series").unwrap();
    assert!(matches!(
        exec.schema_of("unit0"),
        Err(PolyError::SchemaInconsistency(_))
    ));
    Ok(())
}

#[test]
fn boundary_uses_prefix_or_history_tree() -> Result<()> {
    let tmp = tempdir().unwrap();
    let history = tmp.path().join("hist");
    fs::create_dir_all(history.join("a")).unwrap();
    fs::create_dir_all(history.join("z")).unwrap();
    fs::write(history.join("a").join("first"), b"1").unwrap();
    fs::write(history.join("z").join("last"), b"2").unwrap();
    let exec = LocalExecutor::open(
        &ExecutorConfig::new(tmp.path().join("managed"))
            .dummy_dir(&history)
            .has_data(true),
    )?;

    let (columns, keys) = exec.boundary_of(Some("root.sg"))?;
    assert_eq!(columns.start.as_deref(), Some("root.sg"));
    assert_eq!(columns.end.as_deref(), Some("root.sg"));
    assert_eq!((keys.start, keys.end), (0, i64::MAX));

    let (columns, keys) = exec.boundary_of(None)?;
    assert_eq!(columns.start.as_deref(), Some("a.first"));
    assert_eq!(columns.end.as_deref(), Some("z.last"));
    assert_eq!(columns.schema_prefix.as_deref(), Some("hist"));
    assert_eq!((keys.start, keys.end), (0, i64::MAX));
    Ok(())
}

#[test]
fn largest_storable_key_is_readable_and_trimmable() -> Result<()> {
    let tmp = tempdir().unwrap();
    let exec = open(tmp.path())?;
    let columns = || vec![SeriesMeta::new("root.edge", DataType::Long)];

    let reserved = RowDataView::from_rows(columns(), vec![(i64::MAX, vec![Some(Value::Long(0))])]);
    assert!(matches!(reserved, Err(PolyError::InvalidDataView(_))));

    let view = RowDataView::from_rows(
        columns(),
        vec![
            (i64::MIN, vec![Some(Value::Long(0))]),
            (1, vec![Some(Value::Long(1))]),
            (MAX_KEY, vec![Some(Value::Long(2))]),
        ],
    )?;
    exec.insert(&view.into(), "u")?;

    let paths = vec!["root.edge".to_string()];
    let all: Vec<i64> = exec.project(&paths, None, None, "u", false)?.map(|r| r.key).collect();
    assert_eq!(all, vec![i64::MIN, 1, MAX_KEY]);
    let top = Filter::key(Op::Eq, MAX_KEY);
    let hit: Vec<i64> = exec.project(&paths, None, Some(&top), "u", false)?.map(|r| r.key).collect();
    assert_eq!(hit, vec![MAX_KEY]);
    let (_, interval) = exec.boundary_of(Some("root"))?;
    assert!(MAX_KEY < interval.end);

    exec.delete(&paths, &[KeyRange::full()], None, "u")?;
    assert_eq!(exec.project(&paths, None, None, "u", false)?.count(), 0);
    Ok(())
}

#[test]
fn boundary_discovery_without_history_is_a_config_error() -> Result<()> {
    let tmp = tempdir().unwrap();
    let exec = open(tmp.path())?;
    assert!(matches!(exec.boundary_of(Some("")), Err(PolyError::Config(_))));
    Ok(())
}

#[test]
fn close_is_idempotent_and_final() -> Result<()> {
    let tmp = tempdir().unwrap();
    let exec = open(tmp.path())?;
    exec.close()?;
    exec.close()?;
    assert!(matches!(
        exec.insert(&sample_view()?, "unit0"),
        Err(PolyError::Closed)
    ));
    Ok(())
}

#[test]
fn concurrent_readers_and_writers_share_a_unit() -> Result<()> {
    let tmp = tempdir().unwrap();
    let exec = Arc::new(open(tmp.path())?);
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let exec = Arc::clone(&exec);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<()> {
                barrier.wait();
                let columns = vec![SeriesMeta::new("root.shared", DataType::Long)];
                for i in 0..10i64 {
                    let key = t * 100 + i;
                    let view =
                        RowDataView::from_rows(columns.clone(), vec![(key, vec![Some(Value::Long(key))])])?;
                    exec.insert(&view.into(), "u")?;
                    exec.project(&["root.shared".to_string()], None, None, "u", false)?
                        .for_each(drop);
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap()?;
    }
    let rows = exec.project(&["root.shared".to_string()], None, None, "u", false)?;
    assert_eq!(rows.count(), 80);

    exec.delete(&["*".to_string()], &[], None, "u")?;
    let locks = exec.locks().snapshot();
    assert_eq!((locks.units, locks.files), (0, 0));
    Ok(())
}
