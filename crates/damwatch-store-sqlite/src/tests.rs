//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{NaiveDate, TimeZone, Utc};
use damwatch_core::{
  analysis::{AnalysisRow, AnalysisValue},
  resource::{Batch, Dam, DamResources, Metric, Reading},
  store::{AnalysisStore, ResourceStore},
  window::{Scope, Window, aggregate},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

fn reading(date: NaiveDate, storage_volume: f64) -> Reading {
  Reading {
    date,
    storage_volume: Some(storage_volume),
    percentage_full: Some(50.0),
    storage_inflow: Some(1.0),
    storage_release: None,
  }
}

fn batch(dams: Vec<DamResources>) -> Batch {
  Batch {
    retrieved_at: Utc.with_ymd_and_hms(2024, 6, 2, 6, 0, 0).unwrap(),
    dams,
  }
}

fn dam_resources(dam_id: &str, resources: Vec<Reading>) -> DamResources {
  DamResources {
    dam_id: dam_id.into(),
    dam_name: format!("Dam {dam_id}"),
    resources,
  }
}

// ─── Dams ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_list_dams() {
  let s = store().await;
  s.add_dam(Dam { dam_id: "212205".into(), dam_name: "Burrendong".into() })
    .await
    .unwrap();
  s.add_dam(Dam { dam_id: "203042".into(), dam_name: "Toonumbar".into() })
    .await
    .unwrap();

  let dams = s.list_dams().await.unwrap();
  let ids: Vec<&str> = dams.iter().map(|d| d.dam_id.as_str()).collect();
  assert_eq!(ids, vec!["203042", "212205"]);
}

#[tokio::test]
async fn re_adding_a_dam_renames_it() {
  let s = store().await;
  s.add_dam(Dam { dam_id: "203042".into(), dam_name: "Old".into() })
    .await
    .unwrap();
  s.add_dam(Dam { dam_id: "203042".into(), dam_name: "Toonumbar Dam".into() })
    .await
    .unwrap();

  let dams = s.list_dams().await.unwrap();
  assert_eq!(dams.len(), 1);
  assert_eq!(dams[0].dam_name, "Toonumbar Dam");
}

// ─── Reconcile ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn reconcile_writes_snapshot_and_history() {
  let s = store().await;
  let b = batch(vec![
    dam_resources("203042", vec![reading(date(2024, 6, 1), 8.0)]),
    dam_resources("212205", vec![reading(date(2024, 6, 1), 900.0)]),
  ]);

  let counts = s.reconcile(&b).await.unwrap();
  assert_eq!(counts.snapshot_written, 2);
  assert_eq!(counts.history_upserted, 2);

  let snapshot = s.recent_snapshot(10).await.unwrap();
  assert_eq!(snapshot.len(), 2);
  assert!(snapshot.iter().any(|r| r.dam_name == "Dam 212205"));

  let history = s.history_since(None, date(2000, 1, 1)).await.unwrap();
  assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn snapshot_holds_only_the_latest_batch() {
  let s = store().await;
  s.reconcile(&batch(vec![dam_resources(
    "203042",
    vec![reading(date(2024, 6, 1), 8.0), reading(date(2024, 6, 2), 8.1)],
  )]))
  .await
  .unwrap();
  s.reconcile(&batch(vec![dam_resources(
    "203042",
    vec![reading(date(2024, 6, 3), 8.2)],
  )]))
  .await
  .unwrap();

  let snapshot = s.recent_snapshot(10).await.unwrap();
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot[0].record.date, date(2024, 6, 3));

  // History keeps everything.
  let history = s.history_since(Some("203042"), date(2024, 1, 1)).await.unwrap();
  assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn history_upsert_is_idempotent() {
  let s = store().await;
  let b = batch(vec![dam_resources(
    "203042",
    vec![reading(date(2024, 6, 1), 8.0), reading(date(2024, 6, 2), 8.1)],
  )]);

  s.reconcile(&b).await.unwrap();
  let once = s.history_since(None, date(2000, 1, 1)).await.unwrap();
  s.reconcile(&b).await.unwrap();
  let twice = s.history_since(None, date(2000, 1, 1)).await.unwrap();

  assert_eq!(once, twice);
  assert_eq!(s.recent_snapshot(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_key_in_batch_keeps_the_later_values() {
  let s = store().await;
  let b = batch(vec![dam_resources(
    "203042",
    vec![reading(date(2024, 6, 1), 8.0), reading(date(2024, 6, 1), 9.5)],
  )]);

  s.reconcile(&b).await.unwrap();

  let history = s.history_since(Some("203042"), date(2024, 6, 1)).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].storage_volume, Some(9.5));
}

#[tokio::test]
async fn later_batch_overwrites_history_metrics() {
  let s = store().await;
  s.reconcile(&batch(vec![dam_resources("203042", vec![reading(date(2024, 6, 1), 8.0)])]))
    .await
    .unwrap();
  s.reconcile(&batch(vec![dam_resources(
    "203042",
    vec![Reading {
      date:            date(2024, 6, 1),
      storage_volume:  Some(7.0),
      percentage_full: None,
      storage_inflow:  None,
      storage_release: Some(0.3),
    }],
  )]))
  .await
  .unwrap();

  let history = s.history_since(None, date(2024, 1, 1)).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].storage_volume, Some(7.0));
  assert_eq!(history[0].percentage_full, None);
  assert_eq!(history[0].storage_release, Some(0.3));
}

#[tokio::test]
async fn empty_batch_clears_the_snapshot() {
  let s = store().await;
  s.reconcile(&batch(vec![dam_resources("203042", vec![reading(date(2024, 6, 1), 8.0)])]))
    .await
    .unwrap();

  let counts = s.reconcile(&batch(vec![])).await.unwrap();
  assert_eq!(counts.snapshot_written, 0);
  assert!(s.recent_snapshot(10).await.unwrap().is_empty());
  assert_eq!(s.recent_history(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_reconcile_leaves_both_tables_untouched() {
  let s = store().await;
  let first = batch(vec![dam_resources(
    "203042",
    vec![reading(date(2024, 6, 1), 8.0), reading(date(2024, 6, 2), 8.1)],
  )]);
  s.reconcile(&first).await.unwrap();

  s.conn_for_tests()
    .call(|conn| {
      conn.execute_batch(
        "CREATE TRIGGER reject_dam_9 BEFORE INSERT ON dam_resources
         WHEN NEW.dam_id = '9'
         BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let second = batch(vec![
    dam_resources("212205", vec![reading(date(2024, 6, 3), 900.0)]),
    dam_resources("9", vec![reading(date(2024, 6, 3), 1.0)]),
  ]);
  assert!(matches!(s.reconcile(&second).await, Err(Error::Database(_))));

  let snapshot = s.recent_snapshot(10).await.unwrap();
  assert_eq!(snapshot.len(), 2);
  assert!(snapshot.iter().all(|r| r.record.dam_id == "203042"));

  let history = s.history_since(None, date(2000, 1, 1)).await.unwrap();
  assert_eq!(history.len(), 2);
  assert!(history.iter().all(|r| r.dam_id == "203042"));
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_since_filters_by_date_and_dam() {
  let s = store().await;
  s.reconcile(&batch(vec![
    dam_resources(
      "203042",
      vec![reading(date(2019, 1, 1), 1.0), reading(date(2024, 1, 1), 2.0)],
    ),
    dam_resources("212205", vec![reading(date(2024, 1, 1), 3.0)]),
  ]))
  .await
  .unwrap();

  let recent = s.history_since(None, date(2020, 1, 1)).await.unwrap();
  assert_eq!(recent.len(), 2);

  let one_dam = s.history_since(Some("203042"), date(2000, 1, 1)).await.unwrap();
  assert_eq!(one_dam.len(), 2);
  assert!(one_dam.iter().all(|r| r.dam_id == "203042"));
  assert!(one_dam[0].date < one_dam[1].date);
}

#[tokio::test]
async fn recent_history_is_newest_first_and_limited() {
  let s = store().await;
  s.reconcile(&batch(vec![dam_resources(
    "203042",
    (1..=5).map(|d| reading(date(2024, 6, d), d as f64)).collect(),
  )]))
  .await
  .unwrap();

  let recent = s.recent_history(3).await.unwrap();
  let dates: Vec<NaiveDate> = recent.iter().map(|r| r.date).collect();
  assert_eq!(dates, vec![date(2024, 6, 5), date(2024, 6, 4), date(2024, 6, 3)]);
}

// ─── Analysis ────────────────────────────────────────────────────────────────

fn analysis_row(scope: Scope, as_of: NaiveDate, storage_volume: f64) -> AnalysisRow {
  let series = vec![damwatch_core::resource::ResourceRecord {
    dam_id:          "203042".into(),
    date:            as_of,
    storage_volume:  Some(storage_volume),
    percentage_full: None,
    storage_inflow:  None,
    storage_release: None,
  }];
  let agg = aggregate(&series, &Window::STANDARD, as_of);
  AnalysisRow::from_aggregates(scope, &agg, &Window::STANDARD)
}

#[tokio::test]
async fn analysis_upsert_overwrites_rather_than_duplicates() {
  let s = store().await;
  let as_of = date(2024, 12, 1);
  let dam = Scope::dam("203042");

  s.write_analysis(&analysis_row(dam.clone(), as_of, 80.0)).await.unwrap();
  s.write_analysis(&analysis_row(dam.clone(), as_of, 95.0)).await.unwrap();

  let row = s.get_analysis(&dam, as_of).await.unwrap().unwrap();
  assert_eq!(row.value(Window::TWELVE_MONTHS, Metric::StorageVolume), Some(95.0));
  assert_eq!(row.value(Window::TWELVE_MONTHS, Metric::PercentageFull), None);

  let count: i64 = s
    .conn_for_tests()
    .call(|conn| {
      Ok(conn.query_row("SELECT COUNT(*) FROM specific_dam_analysis", [], |r| r.get(0))?)
    })
    .await
    .unwrap();
  assert_eq!(count, 1);
}

#[tokio::test]
async fn overall_and_specific_rows_are_separate() {
  let s = store().await;
  let as_of = date(2024, 12, 1);

  s.write_analysis(&analysis_row(Scope::All, as_of, 500.0)).await.unwrap();
  s.write_analysis(&analysis_row(Scope::dam("203042"), as_of, 80.0))
    .await
    .unwrap();

  let overall = s.get_analysis(&Scope::All, as_of).await.unwrap().unwrap();
  assert_eq!(overall.value(Window::FIVE_YEARS, Metric::StorageVolume), Some(500.0));
  assert_eq!(overall.scope, Scope::All);

  assert!(
    s.get_analysis(&Scope::dam("212205"), as_of)
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn partial_rows_leave_other_columns_untouched() {
  let s = store().await;
  let as_of = date(2024, 12, 1);
  let dam = Scope::dam("203042");

  s.write_analysis(&analysis_row(dam.clone(), as_of, 80.0)).await.unwrap();
  s.write_analysis(&AnalysisRow {
    scope:         dam.clone(),
    analysis_date: as_of,
    values:        vec![AnalysisValue {
      window: Window::TWELVE_MONTHS,
      metric: Metric::StorageVolume,
      value:  Some(70.0),
    }],
  })
  .await
  .unwrap();

  let row = s.get_analysis(&dam, as_of).await.unwrap().unwrap();
  assert_eq!(row.value(Window::TWELVE_MONTHS, Metric::StorageVolume), Some(70.0));
  assert_eq!(row.value(Window::TWENTY_YEARS, Metric::StorageVolume), Some(80.0));
}

#[tokio::test]
async fn non_standard_window_is_rejected() {
  let s = store().await;
  let odd = Window { label: "30 days", column_suffix: "30_days", span_days: 30 };
  let row = AnalysisRow {
    scope:         Scope::All,
    analysis_date: date(2024, 12, 1),
    values:        vec![AnalysisValue {
      window: odd,
      metric: Metric::StorageVolume,
      value:  Some(1.0),
    }],
  };

  let err = s.write_analysis(&row).await.unwrap_err();
  assert!(matches!(err, Error::UnknownAnalysisColumn(c) if c == "avg_storage_volume_30_days"));
}
