//! [`SqliteStore`], the SQLite implementation of [`ResourceStore`] and
//! [`AnalysisStore`].

use std::{path::Path, time::Duration};

use chrono::NaiveDate;
use rusqlite::{OptionalExtension as _, types::Value};

use damwatch_core::{
  analysis::AnalysisRow,
  resource::{Batch, Dam, ResourceRecord},
  store::{AnalysisStore, ReconcileCounts, ResourceStore, SnapshotRow},
  window::Scope,
};

use crate::{
  Result,
  encode::{
    RawAnalysisRow, RawRecord, RawSnapshotRow, analysis_columns, check_analysis_values,
    encode_date,
  },
  schema::{OVERALL_ANALYSIS_TABLE, SCHEMA, SPECIFIC_ANALYSIS_TABLE},
};

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECORD_COLUMNS: &str =
  "dam_id, date, storage_volume, percentage_full, storage_inflow, storage_release";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A damwatch store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  #[cfg(test)]
  pub(crate) fn conn_for_tests(&self) -> &tokio_rusqlite::Connection { &self.conn }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a `SELECT` over resource-record columns and decode the rows.
  async fn query_records(
    &self,
    sql: &'static str,
    params: Vec<Value>,
  ) -> Result<Vec<ResourceRecord>> {
    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| {
            RawRecord::from_row(row, 0)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }
}

/// Table, key columns and key values an analysis row is stored under.
fn analysis_key(scope: &Scope, analysis_date: NaiveDate) -> (&'static str, Vec<&'static str>, Vec<Value>) {
  let date = Value::Text(encode_date(analysis_date));
  match scope {
    Scope::Dam(dam_id) => (
      SPECIFIC_ANALYSIS_TABLE,
      vec!["dam_id", "analysis_date"],
      vec![Value::Text(dam_id.clone()), date],
    ),
    Scope::All => (OVERALL_ANALYSIS_TABLE, vec!["analysis_date"], vec![date]),
  }
}

// ─── ResourceStore impl ──────────────────────────────────────────────────────

impl ResourceStore for SqliteStore {
  type Error = crate::Error;

  // ── Dams ──────────────────────────────────────────────────────────────────

  async fn add_dam(&self, dam: Dam) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO dams (dam_id, dam_name) VALUES (?1, ?2)
           ON CONFLICT (dam_id) DO UPDATE SET dam_name = excluded.dam_name",
          rusqlite::params![dam.dam_id, dam.dam_name],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_dams(&self) -> Result<Vec<Dam>> {
    let dams = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT dam_id, dam_name FROM dams ORDER BY dam_id")?;
        let rows = stmt
          .query_map([], |row| {
            Ok(Dam {
              dam_id:   row.get(0)?,
              dam_name: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(dams)
  }

  // ── Reconcile ─────────────────────────────────────────────────────────────

  /// Truncate-and-insert the snapshot and upsert the history inside a single
  /// transaction. Readers never observe an empty or half-written snapshot,
  /// and a failure in either phase leaves both tables as they were.
  async fn reconcile(&self, batch: &Batch) -> Result<ReconcileCounts> {
    let rows: Vec<(String, RawRecord)> = batch
      .dams
      .iter()
      .flat_map(|dam| {
        dam
          .records()
          .map(move |record| (dam.dam_name.clone(), RawRecord::from_record(&record)))
      })
      .collect();

    let counts = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM latest_data", [])?;

        let mut counts = ReconcileCounts::default();
        {
          let mut insert = tx.prepare(
            "INSERT INTO latest_data (
               dam_id, dam_name, date,
               storage_volume, percentage_full, storage_inflow, storage_release
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          )?;
          for (dam_name, r) in &rows {
            counts.snapshot_written += insert.execute(rusqlite::params![
              r.dam_id,
              dam_name,
              r.date,
              r.storage_volume,
              r.percentage_full,
              r.storage_inflow,
              r.storage_release,
            ])?;
          }

          let mut upsert = tx.prepare(
            "INSERT INTO dam_resources (
               dam_id, date,
               storage_volume, percentage_full, storage_inflow, storage_release
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (dam_id, date) DO UPDATE SET
               storage_volume  = excluded.storage_volume,
               percentage_full = excluded.percentage_full,
               storage_inflow  = excluded.storage_inflow,
               storage_release = excluded.storage_release",
          )?;
          for (_, r) in &rows {
            counts.history_upserted += upsert.execute(rusqlite::params![
              r.dam_id,
              r.date,
              r.storage_volume,
              r.percentage_full,
              r.storage_inflow,
              r.storage_release,
            ])?;
          }
        }

        tx.commit()?;
        Ok(counts)
      })
      .await?;

    Ok(counts)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn history_since(
    &self,
    dam_id: Option<&str>,
    since:  NaiveDate,
  ) -> Result<Vec<ResourceRecord>> {
    let dam_param = dam_id.map_or(Value::Null, |id| Value::Text(id.to_owned()));
    self
      .query_records(
        "SELECT dam_id, date, storage_volume, percentage_full, storage_inflow, storage_release
         FROM dam_resources
         WHERE date >= ?1 AND (?2 IS NULL OR dam_id = ?2)
         ORDER BY dam_id, date",
        vec![Value::Text(encode_date(since)), dam_param],
      )
      .await
  }

  async fn recent_history(&self, limit: usize) -> Result<Vec<ResourceRecord>> {
    self
      .query_records(
        "SELECT dam_id, date, storage_volume, percentage_full, storage_inflow, storage_release
         FROM dam_resources
         ORDER BY date DESC, dam_id
         LIMIT ?1",
        vec![Value::Integer(limit as i64)],
      )
      .await
  }

  async fn recent_snapshot(&self, limit: usize) -> Result<Vec<SnapshotRow>> {
    let limit = limit as i64;
    let raws: Vec<RawSnapshotRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT dam_name, {RECORD_COLUMNS}
           FROM latest_data
           ORDER BY date DESC, id
           LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit], |row| {
            Ok(RawSnapshotRow {
              dam_name: row.get(0)?,
              record:   RawRecord::from_row(row, 1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshotRow::into_snapshot_row).collect()
  }
}

// ─── AnalysisStore impl ──────────────────────────────────────────────────────

impl AnalysisStore for SqliteStore {
  type Error = crate::Error;

  async fn write_analysis(&self, row: &AnalysisRow) -> Result<()> {
    let columns = check_analysis_values(&row.values)?;
    let (table, key_columns, mut params) = analysis_key(&row.scope, row.analysis_date);
    params.extend(row.values.iter().map(|v| v.value.map_or(Value::Null, Value::Real)));

    let all_columns: Vec<&str> = key_columns
      .iter()
      .copied()
      .chain(columns.iter().map(String::as_str))
      .collect();
    let placeholders: Vec<String> =
      (1..=all_columns.len()).map(|i| format!("?{i}")).collect();
    let on_conflict = if columns.is_empty() {
      "DO NOTHING".to_owned()
    } else {
      let updates: Vec<String> =
        columns.iter().map(|c| format!("{c} = excluded.{c}")).collect();
      format!("DO UPDATE SET {}", updates.join(", "))
    };

    let sql = format!(
      "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({}) {on_conflict}",
      all_columns.join(", "),
      placeholders.join(", "),
      key_columns.join(", "),
    );

    self
      .conn
      .call(move |conn| {
        conn.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_analysis(
    &self,
    scope:         &Scope,
    analysis_date: NaiveDate,
  ) -> Result<Option<AnalysisRow>> {
    let (table, key_columns, params) = analysis_key(scope, analysis_date);
    let value_columns: Vec<String> =
      analysis_columns().into_iter().map(|(_, _, c)| c).collect();
    let width = value_columns.len();
    let conditions: Vec<String> = key_columns
      .iter()
      .enumerate()
      .map(|(i, c)| format!("{c} = ?{}", i + 1))
      .collect();

    let sql = format!(
      "SELECT analysis_date, {} FROM {table} WHERE {}",
      value_columns.join(", "),
      conditions.join(" AND "),
    );

    let raw: Option<RawAnalysisRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params_from_iter(params), |row| {
              let values = (1..=width)
                .map(|i| row.get::<_, Option<f64>>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
              Ok(RawAnalysisRow { analysis_date: row.get(0)?, values })
            })
            .optional()?,
        )
      })
      .await?;

    raw.map(|r| r.into_analysis_row(scope.clone())).transpose()
  }
}
