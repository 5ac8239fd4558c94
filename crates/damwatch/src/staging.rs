//! Filesystem staging sink.
//!
//! Each key is one file directly under the staging directory:
//! ```text
//! {dir}/
//!   dam_resources.json
//! ```
//! Writes go to a sibling temp file and are renamed into place, so a reader
//! sees either the previous blob or the new one.

use std::{
  io,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use damwatch_core::staging::{BlobStore, StagedBlob};
use tokio::fs;
use tracing::debug;

pub struct FsBlobStore {
  dir: PathBuf,
}

impl FsBlobStore {
  pub fn new(dir: impl AsRef<Path>) -> Self { Self { dir: dir.as_ref().to_path_buf() } }

  pub fn dir(&self) -> &Path { &self.dir }

  fn path_for_key(&self, key: &str) -> io::Result<PathBuf> {
    let valid = !key.is_empty()
      && key != "."
      && key != ".."
      && !key.contains(['/', '\\'])
      && !key.ends_with(".tmp");
    if valid {
      Ok(self.dir.join(key))
    } else {
      Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("invalid staging key {key:?}"),
      ))
    }
  }
}

impl BlobStore for FsBlobStore {
  type Error = io::Error;

  async fn put(&self, key: &str, bytes: Vec<u8>) -> io::Result<()> {
    let path = self.path_for_key(key)?;
    fs::create_dir_all(&self.dir).await?;

    let temp_path = self.dir.join(format!("{key}.tmp"));
    fs::write(&temp_path, &bytes).await?;
    fs::rename(&temp_path, &path).await?;

    debug!(path = %path.display(), size = bytes.len(), "staged blob");
    Ok(())
  }

  async fn get(&self, key: &str) -> io::Result<Option<StagedBlob>> {
    let path = self.path_for_key(key)?;
    let bytes = match fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e),
    };
    let stored_at: DateTime<Utc> = fs::metadata(&path).await?.modified()?.into();

    Ok(Some(StagedBlob { bytes, stored_at }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn put_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::new(dir.path().join("staging"));

    store.put("batch.json", b"[]".to_vec()).await.unwrap();
    let blob = store.get("batch.json").await.unwrap().unwrap();

    assert_eq!(blob.bytes, b"[]");
    assert!(blob.stored_at <= Utc::now());
  }

  #[tokio::test]
  async fn later_writes_replace_earlier_ones() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::new(dir.path());

    store.put("batch.json", b"first".to_vec()).await.unwrap();
    store.put("batch.json", b"second".to_vec()).await.unwrap();

    let blob = store.get("batch.json").await.unwrap().unwrap();
    assert_eq!(blob.bytes, b"second");
    assert!(!dir.path().join("batch.json.tmp").exists());
  }

  #[tokio::test]
  async fn missing_key_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::new(dir.path());
    assert!(store.get("batch.json").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn keys_cannot_escape_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::new(dir.path());

    let err = store.put("../elsewhere.json", b"[]".to_vec()).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    assert!(store.get("..").await.is_err());
  }
}
