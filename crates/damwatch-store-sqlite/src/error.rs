//! Error type for `damwatch-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] damwatch_core::Error),

  /// The database could not be reached, or a statement failed. Any
  /// transaction in flight has been rolled back.
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date parse error: {0}")]
  DateParse(String),

  /// An analysis value targets a column the analysis tables do not have.
  #[error("unknown analysis column: {0}")]
  UnknownAnalysisColumn(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
