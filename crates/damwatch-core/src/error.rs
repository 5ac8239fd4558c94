//! Error types for `damwatch-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A fetched or staged payload is missing a field the pipeline relies on.
  #[error("data integrity error: {0}")]
  DataIntegrity(String),

  #[error("invalid observation date: {0:?}")]
  DateParse(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
