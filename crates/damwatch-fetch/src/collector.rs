//! Fan-out over the dam registry.
//!
//! A failure for one dam is recorded in the [`CollectReport`] and never
//! aborts the batch.

use chrono::{DateTime, Utc};
use damwatch_core::resource::{Batch, Dam};
use futures::{StreamExt as _, stream};
use tracing::{info, warn};

use crate::{
  client::ResourceApi,
  fetcher::{FetchOutcome, Fetcher},
};

/// A dam whose fetch failed, with the rendered error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDam {
  pub dam_id: String,
  pub reason: String,
}

/// What happened to each dam during one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
  /// Registry entries considered, including skipped ones.
  pub total:             usize,
  pub fetched:           usize,
  pub records:           usize,
  pub rejected_readings: usize,
  pub skipped:           Vec<String>,
  pub not_available:     Vec<String>,
  pub failed:            Vec<FailedDam>,
}

impl CollectReport {
  /// Every registered dam was fetched.
  pub fn is_complete(&self) -> bool { self.fetched == self.total }
}

#[derive(Debug, Clone)]
pub struct Collection {
  pub batch:  Batch,
  pub report: CollectReport,
}

pub struct Collector<A> {
  fetcher:     Fetcher<A>,
  concurrency: usize,
}

impl<A: ResourceApi> Collector<A> {
  /// `concurrency` is clamped to at least one in-flight fetch.
  pub fn new(fetcher: Fetcher<A>, concurrency: usize) -> Self {
    Self { fetcher, concurrency: concurrency.max(1) }
  }

  pub fn fetcher(&self) -> &Fetcher<A> { &self.fetcher }

  /// Fetch every dam in `dams` and assemble one batch, in registry order.
  pub async fn collect(&self, dams: &[Dam], retrieved_at: DateTime<Utc>) -> Collection {
    let mut report = CollectReport { total: dams.len(), ..Default::default() };
    let mut batch = Batch::new(retrieved_at);

    let mut targets = Vec::with_capacity(dams.len());
    for dam in dams {
      if dam.dam_id.trim().is_empty() {
        warn!(dam_name = %dam.dam_name, "registry entry has no dam id, skipping");
        report.skipped.push(dam.dam_name.clone());
      } else {
        targets.push(dam);
      }
    }

    let outcomes: Vec<_> = stream::iter(targets)
      .map(|dam| async move { (dam, self.fetcher.fetch(&dam.dam_id).await) })
      .buffered(self.concurrency)
      .collect()
      .await;

    for (dam, outcome) in outcomes {
      match outcome {
        Ok(FetchOutcome::Fetched(screened)) => {
          let mut resources = screened.resources;
          if resources.dam_name.is_empty() {
            resources.dam_name = dam.dam_name.clone();
          }
          info!(
            dam_id = %dam.dam_id,
            readings = resources.resources.len(),
            rejected = screened.rejected.len(),
            "fetched dam"
          );
          report.fetched += 1;
          report.records += resources.resources.len();
          report.rejected_readings += screened.rejected.len();
          batch.dams.push(resources);
        }
        Ok(FetchOutcome::NotAvailable) => report.not_available.push(dam.dam_id.clone()),
        Err(e) => {
          warn!(dam_id = %dam.dam_id, error = %e, "dam failed, continuing");
          report.failed.push(FailedDam { dam_id: dam.dam_id.clone(), reason: e.to_string() });
        }
      }
    }

    if !report.is_complete() {
      warn!(
        fetched = report.fetched,
        total = report.total,
        "fetched fewer dams than are registered"
      );
    }
    info!(dams = report.fetched, records = report.records, "collection finished");

    Collection { batch, report }
  }
}
