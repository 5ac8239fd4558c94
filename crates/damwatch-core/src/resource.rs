//! Resource records (one storage observation per dam per day) and the
//! batch that carries them from the collector to the store.
//!
//! Upstream payloads are screened here, at the boundary: a reading that is
//! missing its date or carries a non-numeric metric is rejected on its own and
//! reported back to the caller, and never travels further into the pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

// ─── Dam ─────────────────────────────────────────────────────────────────────

/// A monitored dam. Reference data, registered out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dam {
  pub dam_id:   String,
  pub dam_name: String,
}

// ─── Metric ──────────────────────────────────────────────────────────────────

/// The four storage metrics carried by every resource reading.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
  StorageVolume,
  PercentageFull,
  StorageInflow,
  StorageRelease,
}

impl Metric {
  pub const ALL: [Metric; 4] = [
    Metric::StorageVolume,
    Metric::PercentageFull,
    Metric::StorageInflow,
    Metric::StorageRelease,
  ];

  /// Column (and JSON field) name of the metric.
  pub fn column(self) -> &'static str {
    match self {
      Metric::StorageVolume => "storage_volume",
      Metric::PercentageFull => "percentage_full",
      Metric::StorageInflow => "storage_inflow",
      Metric::StorageRelease => "storage_release",
    }
  }
}

// ─── Readings ────────────────────────────────────────────────────────────────

/// One observation as carried in the upstream and staging payloads.
///
/// Metrics are nullable; a reading with no date is rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
  #[serde(deserialize_with = "deserialize_observation_date")]
  pub date:            NaiveDate,
  #[serde(default)]
  pub storage_volume:  Option<f64>,
  #[serde(default)]
  pub percentage_full: Option<f64>,
  #[serde(default)]
  pub storage_inflow:  Option<f64>,
  #[serde(default)]
  pub storage_release: Option<f64>,
}

/// All readings reported for one dam in one fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamResources {
  #[serde(
    rename = "entity_id",
    alias = "dam_id",
    deserialize_with = "deserialize_dam_id"
  )]
  pub dam_id:    String,
  #[serde(rename = "entity_name", alias = "dam_name", default)]
  pub dam_name:  String,
  #[serde(default)]
  pub resources: Vec<Reading>,
}

impl DamResources {
  /// Flatten into resource records keyed by `(dam_id, date)`.
  pub fn records(&self) -> impl Iterator<Item = ResourceRecord> + '_ {
    self
      .resources
      .iter()
      .map(|r| ResourceRecord::from_reading(&self.dam_id, r))
  }
}

/// A reading that failed screening, with the position it held upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedReading {
  pub index:  usize,
  pub reason: String,
}

/// Outcome of screening one upstream response.
#[derive(Debug, Clone)]
pub struct Screened {
  pub resources: DamResources,
  pub rejected:  Vec<RejectedReading>,
}

#[derive(Deserialize)]
struct RawEnvelope {
  #[serde(default)]
  dams: Vec<RawDamResources>,
}

#[derive(Deserialize)]
struct RawDamResources {
  #[serde(alias = "entity_id", deserialize_with = "deserialize_dam_id")]
  dam_id:    String,
  #[serde(alias = "entity_name", default)]
  dam_name:  Option<String>,
  #[serde(default)]
  resources: Vec<serde_json::Value>,
}

/// Screen the body of a `resources/latest` response for `dam_id`.
///
/// The body is `{ "dams": [ { dam_id, dam_name, resources: [...] } ] }`.
/// Entries for other dams are ignored; entries for `dam_id` are merged.
/// Malformed readings are dropped into [`Screened::rejected`]; a malformed
/// envelope or a response with no entry for `dam_id` is an
/// [`Error::DataIntegrity`].
pub fn screen_latest_response(body: &str, dam_id: &str) -> Result<Screened> {
  let envelope: RawEnvelope = serde_json::from_str(body).map_err(|e| {
    Error::DataIntegrity(format!("malformed response for dam {dam_id}: {e}"))
  })?;

  let mut matched = envelope
    .dams
    .into_iter()
    .filter(|d| d.dam_id == dam_id)
    .peekable();

  if matched.peek().is_none() {
    return Err(Error::DataIntegrity(format!(
      "response contains no entry for dam {dam_id}"
    )));
  }

  let mut dam_name = None;
  let mut resources = Vec::new();
  let mut rejected = Vec::new();
  let mut index = 0;

  for entry in matched {
    if dam_name.is_none() {
      dam_name = entry.dam_name;
    }
    for value in entry.resources {
      match serde_json::from_value::<Reading>(value) {
        Ok(reading) => resources.push(reading),
        Err(e) => rejected.push(RejectedReading { index, reason: e.to_string() }),
      }
      index += 1;
    }
  }

  Ok(Screened {
    resources: DamResources {
      dam_id: dam_id.to_owned(),
      dam_name: dam_name.unwrap_or_default(),
      resources,
    },
    rejected,
  })
}

// ─── Resource record ─────────────────────────────────────────────────────────

/// A single observation with its natural key `(dam_id, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
  pub dam_id:          String,
  pub date:            NaiveDate,
  pub storage_volume:  Option<f64>,
  pub percentage_full: Option<f64>,
  pub storage_inflow:  Option<f64>,
  pub storage_release: Option<f64>,
}

impl ResourceRecord {
  pub fn from_reading(dam_id: &str, reading: &Reading) -> Self {
    Self {
      dam_id:          dam_id.to_owned(),
      date:            reading.date,
      storage_volume:  reading.storage_volume,
      percentage_full: reading.percentage_full,
      storage_inflow:  reading.storage_inflow,
      storage_release: reading.storage_release,
    }
  }

  pub fn metric(&self, metric: Metric) -> Option<f64> {
    match metric {
      Metric::StorageVolume => self.storage_volume,
      Metric::PercentageFull => self.percentage_full,
      Metric::StorageInflow => self.storage_inflow,
      Metric::StorageRelease => self.storage_release,
    }
  }
}

// ─── Batch ───────────────────────────────────────────────────────────────────

/// One collector run's worth of fetched resources.
///
/// The staging payload is the JSON array of [`DamResources`]; the retrieval
/// timestamp travels alongside it as blob metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
  pub retrieved_at: DateTime<Utc>,
  pub dams:         Vec<DamResources>,
}

impl Batch {
  pub fn new(retrieved_at: DateTime<Utc>) -> Self {
    Self { retrieved_at, dams: Vec::new() }
  }

  /// Every record in the batch, in batch order.
  pub fn records(&self) -> impl Iterator<Item = ResourceRecord> + '_ {
    self.dams.iter().flat_map(DamResources::records)
  }

  /// One record per `(dam_id, date)`, the last in batch order winning, as
  /// the history table would hold them after a reconcile.
  pub fn unique_records(&self) -> Vec<ResourceRecord> {
    let mut by_key = BTreeMap::new();
    for record in self.records() {
      by_key.insert((record.dam_id.clone(), record.date), record);
    }
    by_key.into_values().collect()
  }

  pub fn record_count(&self) -> usize {
    self.dams.iter().map(|d| d.resources.len()).sum()
  }

  pub fn to_staging_json(&self) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&self.dams)?)
  }

  pub fn from_staging_json(bytes: &[u8], retrieved_at: DateTime<Utc>) -> Result<Self> {
    let dams = serde_json::from_slice(bytes)?;
    Ok(Self { retrieved_at, dams })
  }
}

// ─── Serde helpers ───────────────────────────────────────────────────────────

/// Parse `YYYY-MM-DD`, or the date part of an ISO 8601 datetime.
pub fn parse_observation_date(s: &str) -> Result<NaiveDate> {
  let (date_part, rest) = s.split_at_checked(10).unwrap_or((s, ""));
  if !(rest.is_empty() || rest.starts_with(['T', ' '])) {
    return Err(Error::DateParse(s.to_owned()));
  }
  NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
    .map_err(|_| Error::DateParse(s.to_owned()))
}

fn deserialize_observation_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = String::deserialize(deserializer)?;
  parse_observation_date(&raw).map_err(serde::de::Error::custom)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DamIdRepr {
  Text(String),
  Number(i64),
}

fn deserialize_dam_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(match DamIdRepr::deserialize(deserializer)? {
    DamIdRepr::Text(s) => s,
    DamIdRepr::Number(n) => n.to_string(),
  })
}
