//! The `ResourceStore` and `AnalysisStore` traits.
//!
//! Implemented by relational backends (e.g. `damwatch-store-sqlite`). The job
//! layer depends on these abstractions, not on any concrete backend.

use std::future::Future;

use chrono::NaiveDate;

use crate::{
  analysis::AnalysisRow,
  resource::{Batch, Dam, ResourceRecord},
  window::Scope,
};

// ─── Result types ────────────────────────────────────────────────────────────

/// Rows touched by one [`ResourceStore::reconcile`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
  pub snapshot_written: usize,
  pub history_upserted: usize,
}

/// A row of the snapshot ("latest") table.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
  pub dam_name: String,
  pub record:   ResourceRecord,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Dam registry, snapshot table and history table.
///
/// Callers serialise pipeline runs; no backend is required to support
/// concurrent reconciles against the same tables.
pub trait ResourceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Dams ──────────────────────────────────────────────────────────────

  /// Register a dam, or rename it if the id is already known.
  fn add_dam(&self, dam: Dam) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_dams(&self) -> impl Future<Output = Result<Vec<Dam>, Self::Error>> + Send + '_;

  // ── Reconcile ─────────────────────────────────────────────────────────

  /// Apply one batch to both sinks.
  ///
  /// The snapshot table is replaced by exactly the batch's records and every
  /// record is upserted into the history table on `(dam_id, date)`,
  /// overwriting the metric columns on collision. Re-applying the same batch
  /// leaves the history table unchanged.
  fn reconcile<'a>(
    &'a self,
    batch: &'a Batch,
  ) -> impl Future<Output = Result<ReconcileCounts, Self::Error>> + Send + 'a;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// History records with `date >= since`, for one dam or (`None`) all dams.
  fn history_since<'a>(
    &'a self,
    dam_id: Option<&'a str>,
    since: NaiveDate,
  ) -> impl Future<Output = Result<Vec<ResourceRecord>, Self::Error>> + Send + 'a;

  /// The `limit` most recent history rows, newest first.
  fn recent_history(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ResourceRecord>, Self::Error>> + Send + '_;

  /// The `limit` most recent snapshot rows, newest first.
  fn recent_snapshot(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<SnapshotRow>, Self::Error>> + Send + '_;
}

/// Per-dam and rollup analysis tables.
pub trait AnalysisStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Upsert `row` on `(scope, analysis_date)`. Only the columns present in
  /// `row.values` are overwritten on collision. Never retried here.
  fn write_analysis<'a>(
    &'a self,
    row: &'a AnalysisRow,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Read back the row for `(scope, analysis_date)`, if any.
  fn get_analysis<'a>(
    &'a self,
    scope: &'a Scope,
    analysis_date: NaiveDate,
  ) -> impl Future<Output = Result<Option<AnalysisRow>, Self::Error>> + Send + 'a;
}
