//! The batch jobs: collect, load, analyze.
//!
//! Every job runs inside its own `job` span carrying a fresh `run_id`, is
//! bounded by the configured job timeout, and ends in a [`JobReport`]. A
//! failure is reported, never panicked or swallowed; table writes already
//! committed by a failed job are not rolled back.

use std::{fmt, future::Future, time::Duration};

use chrono::{NaiveDate, Utc};
use damwatch_core::{
  analysis::AnalysisRow,
  resource::{Batch, Dam, ResourceRecord},
  staging::BlobStore,
  store::{AnalysisStore, ResourceStore, SnapshotRow},
  window::{Scope, Window, aggregate},
};
use damwatch_fetch::{Collection, Collector, ResourceApi};
use tracing::{Instrument as _, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::{staging_err, store_err},
};

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
  Collect,
  Load,
  Analyze,
}

impl fmt::Display for Job {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Job::Collect => "collect",
      Job::Load => "load",
      Job::Analyze => "analyze",
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
  Succeeded,
  /// Completed, but not every dam or reading made it through.
  SucceededWithWarnings,
  Failed,
}

impl fmt::Display for JobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      JobStatus::Succeeded => "succeeded",
      JobStatus::SucceededWithWarnings => "succeeded_with_warnings",
      JobStatus::Failed => "failed",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
  pub job:     Job,
  pub status:  JobStatus,
  pub summary: String,
}

impl JobReport {
  pub fn is_failure(&self) -> bool { self.status == JobStatus::Failed }
}

impl fmt::Display for JobReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}: {}", self.job, self.status, self.summary)
  }
}

/// Status and summary of a job that ran to completion.
struct Outcome {
  status:  JobStatus,
  summary: String,
}

impl Outcome {
  fn succeeded(summary: impl Into<String>) -> Self {
    Self { status: JobStatus::Succeeded, summary: summary.into() }
  }

  fn warned(summary: impl Into<String>) -> Self {
    Self { status: JobStatus::SucceededWithWarnings, summary: summary.into() }
  }
}

/// Where the analysis job reads its series from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisSource {
  /// The `dam_resources` history table.
  #[default]
  History,
  /// The currently staged batch.
  Staging,
}

/// Most recent rows of both resource tables.
#[derive(Debug, Clone)]
pub struct Verification {
  pub snapshot: Vec<SnapshotRow>,
  pub history:  Vec<ResourceRecord>,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// The stores every job works against, plus job-wide settings.
///
/// Callers serialise job invocations; two pipelines must not run against the
/// same tables at once.
pub struct Pipeline<S, B> {
  store:         S,
  staging:       B,
  staging_key:   String,
  job_timeout:   Duration,
  analysis_dams: Option<Vec<String>>,
}

impl<S, B> Pipeline<S, B>
where
  S: ResourceStore + AnalysisStore,
  B: BlobStore,
{
  pub fn new(store: S, staging: B, staging_key: impl Into<String>) -> Self {
    Self {
      store,
      staging,
      staging_key: staging_key.into(),
      job_timeout: Duration::from_secs(900),
      analysis_dams: None,
    }
  }

  pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
    self.job_timeout = timeout;
    self
  }

  /// Write per-dam analysis rows for exactly `dam_ids`; a listed dam with no
  /// records gets null averages. The overall row still pools every dam.
  pub fn with_analysis_dams(mut self, dam_ids: Option<Vec<String>>) -> Self {
    self.analysis_dams = dam_ids;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  // ── Jobs ──────────────────────────────────────────────────────────────────

  /// Fetch every registered dam and stage the batch.
  pub async fn collect<A: ResourceApi>(&self, collector: &Collector<A>) -> JobReport {
    self.run(Job::Collect, self.try_collect(collector)).await
  }

  /// Apply the staged batch to the snapshot and history tables.
  pub async fn load(&self) -> JobReport { self.run(Job::Load, self.try_load()).await }

  /// Aggregate the standard windows as of `as_of` and upsert the analysis
  /// rows.
  pub async fn analyze(&self, source: AnalysisSource, as_of: NaiveDate) -> JobReport {
    self.run(Job::Analyze, self.try_analyze(source, as_of)).await
  }

  /// Collect, load and analyze in sequence, stopping at the first failure.
  pub async fn run_all<A: ResourceApi>(
    &self,
    collector: &Collector<A>,
    as_of: NaiveDate,
  ) -> Vec<JobReport> {
    let mut reports = Vec::with_capacity(3);

    let collected = self.collect(collector).await;
    let failed = collected.is_failure();
    reports.push(collected);
    if failed {
      return reports;
    }

    let loaded = self.load().await;
    let failed = loaded.is_failure();
    reports.push(loaded);
    if failed {
      return reports;
    }

    reports.push(self.analyze(AnalysisSource::History, as_of).await);
    reports
  }

  // ── Registry and verification ─────────────────────────────────────────────

  pub async fn add_dam(&self, dam: Dam) -> Result<()> {
    info!(dam_id = %dam.dam_id, dam_name = %dam.dam_name, "registering dam");
    self.store.add_dam(dam).await.map_err(store_err)
  }

  pub async fn list_dams(&self) -> Result<Vec<Dam>> {
    self.store.list_dams().await.map_err(store_err)
  }

  pub async fn verify(&self, limit: usize) -> Result<Verification> {
    Ok(Verification {
      snapshot: self.store.recent_snapshot(limit).await.map_err(store_err)?,
      history:  self.store.recent_history(limit).await.map_err(store_err)?,
    })
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  async fn run(&self, job: Job, work: impl Future<Output = Result<Outcome>>) -> JobReport {
    let run_id = Uuid::new_v4();
    let span = info_span!("job", name = %job, %run_id);

    async move {
      info!("job started");
      let result = match tokio::time::timeout(self.job_timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
          job:     job.to_string(),
          timeout: self.job_timeout,
        }),
      };

      let report = match result {
        Ok(Outcome { status, summary }) => JobReport { job, status, summary },
        Err(e) => {
          error!(error = %e, "job failed");
          JobReport { job, status: JobStatus::Failed, summary: e.to_string() }
        }
      };
      info!(status = %report.status, summary = %report.summary, "job finished");
      report
    }
    .instrument(span)
    .await
  }

  async fn try_collect<A: ResourceApi>(&self, collector: &Collector<A>) -> Result<Outcome> {
    let dams = self.store.list_dams().await.map_err(store_err)?;
    if dams.is_empty() {
      info!("no dams to process");
      return Ok(Outcome::succeeded("no dams to process"));
    }

    let Collection { batch, report } = collector.collect(&dams, Utc::now()).await;
    if report.fetched == 0 {
      // Staging an empty batch would empty the snapshot on the next load.
      return Err(Error::NothingFetched { total: report.total });
    }

    let bytes = batch.to_staging_json()?;
    let size = bytes.len();
    self
      .staging
      .put(&self.staging_key, bytes)
      .await
      .map_err(staging_err)?;
    info!(
      key = %self.staging_key,
      dams = batch.dams.len(),
      records = batch.record_count(),
      bytes = size,
      "staged batch"
    );

    let mut summary = format!(
      "fetched {}/{} dams, {} records staged",
      report.fetched, report.total, report.records
    );
    if !report.not_available.is_empty() {
      summary.push_str(&format!("; not available: {}", report.not_available.join(", ")));
    }
    if !report.failed.is_empty() {
      let failed: Vec<&str> = report.failed.iter().map(|f| f.dam_id.as_str()).collect();
      summary.push_str(&format!("; failed: {}", failed.join(", ")));
    }
    if report.rejected_readings > 0 {
      summary.push_str(&format!("; {} malformed readings skipped", report.rejected_readings));
    }

    if report.is_complete() && report.rejected_readings == 0 {
      Ok(Outcome::succeeded(summary))
    } else {
      Ok(Outcome::warned(summary))
    }
  }

  async fn staged_batch(&self) -> Result<Batch> {
    let blob = self
      .staging
      .get(&self.staging_key)
      .await
      .map_err(staging_err)?
      .ok_or_else(|| Error::StagedBatchMissing { key: self.staging_key.clone() })?;
    Ok(Batch::from_staging_json(&blob.bytes, blob.stored_at)?)
  }

  async fn try_load(&self) -> Result<Outcome> {
    let batch = self.staged_batch().await?;
    info!(
      dams = batch.dams.len(),
      records = batch.record_count(),
      retrieved_at = %batch.retrieved_at,
      "loading staged batch"
    );

    let counts = self.store.reconcile(&batch).await.map_err(store_err)?;
    info!(table = "latest_data", rows = counts.snapshot_written, "snapshot replaced");
    info!(table = "dam_resources", rows = counts.history_upserted, "history upserted");

    Ok(Outcome::succeeded(format!(
      "{} dams, {} records: latest_data {} rows, dam_resources {} rows",
      batch.dams.len(),
      batch.record_count(),
      counts.snapshot_written,
      counts.history_upserted,
    )))
  }

  async fn try_analyze(&self, source: AnalysisSource, as_of: NaiveDate) -> Result<Outcome> {
    let windows = Window::STANDARD;
    let series = match source {
      AnalysisSource::History => {
        let since = windows
          .iter()
          .map(|w| w.start(as_of))
          .min()
          .unwrap_or(as_of);
        self.store.history_since(None, since).await.map_err(store_err)?
      }
      AnalysisSource::Staging => self.staged_batch().await?.unique_records(),
    };
    info!(?source, %as_of, records = series.len(), "aggregating series");

    let aggregates = aggregate(&series, &windows, as_of);

    let mut scopes: Vec<Scope> = match &self.analysis_dams {
      Some(dam_ids) => dam_ids.iter().map(Scope::dam).collect(),
      None => aggregates.scopes().filter(|s| **s != Scope::All).cloned().collect(),
    };
    scopes.push(Scope::All);

    let mut dams_written = 0;
    let mut missing = Vec::new();
    for scope in &scopes {
      if let Some(dam_id) = scope.dam_id()
        && !aggregates.scopes().any(|s| s == scope)
      {
        warn!(dam_id, "requested dam has no records; writing null averages");
        missing.push(dam_id.to_owned());
      }

      for window in windows {
        info!(
          scope = %scope,
          window = %window,
          records = aggregates.record_count(scope, window),
          "window records"
        );
      }

      let row = AnalysisRow::from_aggregates(scope.clone(), &aggregates, &windows);
      self.store.write_analysis(&row).await.map_err(|e| {
        error!(scope = %scope, analysis_date = %as_of, "analysis write failed");
        store_err(e)
      })?;
      if *scope != Scope::All {
        dams_written += 1;
      }
    }

    let summary = format!(
      "analysis as of {as_of}: {dams_written} dams plus overall from {} records",
      series.len()
    );
    if series.is_empty() {
      warn!("no records fell inside any window");
      Ok(Outcome::warned(summary))
    } else if !missing.is_empty() {
      Ok(Outcome::warned(format!("{summary}; no records for {}", missing.join(", "))))
    } else {
      Ok(Outcome::succeeded(summary))
    }
  }
}
