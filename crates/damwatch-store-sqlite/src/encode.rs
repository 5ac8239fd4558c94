//! Encoding and decoding helpers between domain types and the plain
//! representations stored in SQLite columns.
//!
//! Dates are stored as `YYYY-MM-DD` text so lexical order matches date order.
//! Metrics are nullable `REAL`.

use chrono::NaiveDate;
use damwatch_core::{
  analysis::{AnalysisRow, AnalysisValue, column_name},
  resource::{Metric, ResourceRecord},
  store::SnapshotRow,
  window::{Scope, Window},
};

use crate::{Error, Result};

// ─── NaiveDate ───────────────────────────────────────────────────────────────

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn encode_date(date: NaiveDate) -> String { date.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Analysis columns ────────────────────────────────────────────────────────

/// Every `(window, metric)` pair the analysis tables have a column for, in
/// column order.
pub fn analysis_columns() -> Vec<(Window, Metric, String)> {
  Window::STANDARD
    .into_iter()
    .flat_map(|window| {
      Metric::ALL
        .into_iter()
        .map(move |metric| (window, metric, column_name(metric, window)))
    })
    .collect()
}

/// Reject values the analysis tables cannot hold before any SQL is built.
pub fn check_analysis_values(values: &[AnalysisValue]) -> Result<Vec<String>> {
  values
    .iter()
    .map(|v| {
      if Window::STANDARD.contains(&v.window) {
        Ok(v.column())
      } else {
        Err(Error::UnknownAnalysisColumn(v.column()))
      }
    })
    .collect()
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Owned column values for one resource record, ready to bind.
#[derive(Clone)]
pub struct RawRecord {
  pub dam_id:          String,
  pub date:            String,
  pub storage_volume:  Option<f64>,
  pub percentage_full: Option<f64>,
  pub storage_inflow:  Option<f64>,
  pub storage_release: Option<f64>,
}

impl RawRecord {
  pub fn from_record(record: &ResourceRecord) -> Self {
    Self {
      dam_id:          record.dam_id.clone(),
      date:            encode_date(record.date),
      storage_volume:  record.storage_volume,
      percentage_full: record.percentage_full,
      storage_inflow:  record.storage_inflow,
      storage_release: record.storage_release,
    }
  }

  /// Read the six record columns starting at `offset`.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      dam_id:          row.get(offset)?,
      date:            row.get(offset + 1)?,
      storage_volume:  row.get(offset + 2)?,
      percentage_full: row.get(offset + 3)?,
      storage_inflow:  row.get(offset + 4)?,
      storage_release: row.get(offset + 5)?,
    })
  }

  pub fn into_record(self) -> Result<ResourceRecord> {
    Ok(ResourceRecord {
      date:            decode_date(&self.date)?,
      dam_id:          self.dam_id,
      storage_volume:  self.storage_volume,
      percentage_full: self.percentage_full,
      storage_inflow:  self.storage_inflow,
      storage_release: self.storage_release,
    })
  }
}

/// Raw strings read directly from a `latest_data` row.
pub struct RawSnapshotRow {
  pub dam_name: String,
  pub record:   RawRecord,
}

impl RawSnapshotRow {
  pub fn into_snapshot_row(self) -> Result<SnapshotRow> {
    Ok(SnapshotRow {
      dam_name: self.dam_name,
      record:   self.record.into_record()?,
    })
  }
}

/// Analysis values read back in [`analysis_columns`] order.
pub struct RawAnalysisRow {
  pub analysis_date: String,
  pub values:        Vec<Option<f64>>,
}

impl RawAnalysisRow {
  pub fn into_analysis_row(self, scope: Scope) -> Result<AnalysisRow> {
    let values = analysis_columns()
      .into_iter()
      .zip(self.values)
      .map(|((window, metric, _), value)| AnalysisValue { window, metric, value })
      .collect();

    Ok(AnalysisRow {
      scope,
      analysis_date: decode_date(&self.analysis_date)?,
      values,
    })
  }
}
