//! Pipeline configuration, read from an optional TOML file layered under
//! `DAMWATCH_*` environment variables.
//!
//! Nested keys use `__` in the environment, e.g. `DAMWATCH_API__API_KEY` or
//! `DAMWATCH_RETRY__MAX_ATTEMPTS`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use damwatch_fetch::{ApiConfig, RetryPolicy};
use serde::Deserialize;

use crate::{Error, Result};

// ─── Sections ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
  pub dir: PathBuf,
  pub key: String,
}

impl Default for StagingConfig {
  fn default() -> Self {
    Self {
      dir: PathBuf::from("staging"),
      key: "dam_resources.json".to_owned(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
  /// Upper bound on in-flight upstream requests.
  pub concurrency: usize,
}

impl Default for CollectConfig {
  fn default() -> Self { Self { concurrency: 1 } }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
  /// Dams to write per-dam rows for. Every dam in the series when unset.
  pub dam_ids: Option<Vec<String>>,
}

// ─── PipelineConfig ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub store_path:       PathBuf,
  pub staging:          StagingConfig,
  pub api:              ApiConfig,
  pub retry:            RetryPolicy,
  pub collect:          CollectConfig,
  pub job_timeout_secs: u64,
  pub analysis:         AnalysisConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      store_path:       PathBuf::from("damwatch.db"),
      staging:          StagingConfig::default(),
      api:              ApiConfig::default(),
      retry:            RetryPolicy::default(),
      collect:          CollectConfig::default(),
      job_timeout_secs: 900,
      analysis:         AnalysisConfig::default(),
    }
  }
}

impl PipelineConfig {
  /// Read `path` (if it exists) and overlay the environment.
  pub fn load(path: &Path) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("DAMWATCH")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("analysis.dam_ids"),
      )
      .build()?;

    let mut config: Self = settings.try_deserialize()?;
    config.store_path = expand_tilde(&config.store_path);
    config.staging.dir = expand_tilde(&config.staging.dir);
    Ok(config)
  }

  pub fn job_timeout(&self) -> Duration { Duration::from_secs(self.job_timeout_secs) }

  /// Settings every job needs.
  pub fn validate(&self) -> Result<()> {
    let mut missing = Vec::new();
    if self.store_path.as_os_str().is_empty() {
      missing.push("store_path");
    }
    if self.staging.key.trim().is_empty() {
      missing.push("staging.key");
    }
    if self.job_timeout_secs == 0 {
      missing.push("job_timeout_secs (must be positive)");
    }
    report_missing(missing)
  }

  /// Settings a collect run needs, checked before any network or store
  /// access.
  pub fn validate_for_collect(&self) -> Result<()> {
    self.validate()?;
    let mut missing = self.api.missing_credentials();
    if self.api.base_url.trim().is_empty() {
      missing.push("api.base_url");
    }
    report_missing(missing)
  }
}

fn report_missing(missing: Vec<&str>) -> Result<()> {
  if missing.is_empty() {
    Ok(())
  } else {
    Err(Error::Configuration(format!(
      "missing or invalid settings: {}",
      missing.join(", ")
    )))
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
