//! Error type for pipeline jobs.

use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// A required setting is missing or unreadable. Raised before any side
  /// effect.
  #[error("configuration error: {0}")]
  Configuration(String),

  #[error("staging error: {0}")]
  Staging(#[source] BoxError),

  #[error("no batch staged under {key:?}")]
  StagedBatchMissing { key: String },

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  /// Every registered dam failed; the previous staged batch is kept.
  #[error("none of the {total} registered dams could be fetched")]
  NothingFetched { total: usize },

  #[error(transparent)]
  Fetch(#[from] damwatch_fetch::Error),

  #[error(transparent)]
  Core(#[from] damwatch_core::Error),

  #[error("{job} job exceeded its {timeout:?} timeout")]
  Timeout { job: String, timeout: Duration },
}

impl From<config::ConfigError> for Error {
  fn from(e: config::ConfigError) -> Self { Error::Configuration(e.to_string()) }
}

pub(crate) fn store_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Store(Box::new(e))
}

pub(crate) fn staging_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Staging(Box::new(e))
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
