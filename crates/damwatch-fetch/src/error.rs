//! Error type for `damwatch-fetch`.

use reqwest::StatusCode;
use thiserror::Error;

/// A failure below the HTTP status level (connect, TLS, timeout, body read).
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// The upstream kept answering "no data" or "rate limited" until the
  /// retry budget ran out.
  #[error("dam {dam_id}: upstream still empty or throttled after {attempts} attempts")]
  TransientUpstream { dam_id: String, attempts: u32 },

  /// The upstream answered with a status that is never worth retrying.
  #[error("dam {dam_id}: upstream answered {status}")]
  TerminalUpstream { dam_id: String, status: StatusCode },

  #[error("dam {dam_id}: transport failed after {attempts} attempts: {source}")]
  Transport {
    dam_id:   String,
    attempts: u32,
    #[source]
    source:   TransportError,
  },

  /// A 200 response whose body could not be screened.
  #[error("dam {dam_id}: {source}")]
  Decode {
    dam_id: String,
    #[source]
    source: damwatch_core::Error,
  },

  #[error("access token request failed: {0}")]
  Auth(String),

  #[error("http client error: {0}")]
  Client(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
