//! The staging sink: a key-value blob store holding the latest batch.

use std::future::Future;

use chrono::{DateTime, Utc};

/// Bytes read back from the staging sink, with the time they were written.
#[derive(Debug, Clone)]
pub struct StagedBlob {
  pub bytes:     Vec<u8>,
  pub stored_at: DateTime<Utc>,
}

/// A reliable key-value blob store. Writes to an existing key overwrite it.
pub trait BlobStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn put<'a>(
    &'a self,
    key: &'a str,
    bytes: Vec<u8>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Returns `None` if nothing has been staged under `key`.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<StagedBlob>, Self::Error>> + Send + 'a;
}
