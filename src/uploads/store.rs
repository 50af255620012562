//! On-disk storage for uploaded files.
//!
//! Each upload is written to `{upload_dir}/{uuid}.{ext}`. Bytes are streamed
//! into a hidden `.part` file first and renamed into place once complete, so
//! a stored path either does not exist or holds the whole file.

use futures_util::{Stream, StreamExt};
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Longest extension carried over from the client's file name.
const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload exceeds maximum size of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Failed to read upload body: {0}")]
    Body(String),
}

/// A file that has been fully written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Client-supplied file name
    pub filename: String,
    /// Stored location, `{upload_dir}/{generated name}`
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    upload_dir: String,
    max_bytes: u64,
}

impl BlobStore {
    pub fn new(upload_dir: impl Into<String>, max_bytes: u64) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_bytes,
        }
    }

    pub fn upload_dir(&self) -> &str {
        &self.upload_dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Stream `body` to a freshly named file and return where it landed.
    pub async fn put<S, B, E>(&self, original_name: &str, body: S) -> Result<StoredBlob, StoreError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let stored_name = unique_name(original_name);
        let final_path = Path::new(&self.upload_dir).join(&stored_name);
        let part_path = Path::new(&self.upload_dir).join(format!(".{}.part", stored_name));

        let size = self.write_and_commit(&part_path, &final_path, body).await?;

        let path = format!("{}/{}", self.upload_dir.trim_end_matches('/'), stored_name);
        tracing::debug!(
            filename = %original_name,
            path = %path,
            size,
            "Stored upload"
        );
        Ok(StoredBlob {
            filename: original_name.to_string(),
            path,
            size,
        })
    }

    /// Write the body to `part_path` and rename it to `final_path`. On any
    /// failure the partial file is removed.
    async fn write_and_commit<S, B, E>(
        &self,
        part_path: &Path,
        final_path: &Path,
        body: S,
    ) -> Result<u64, StoreError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let result = async {
            let size = self.write_part(part_path, body).await?;
            tokio::fs::rename(part_path, final_path).await?;
            Ok::<_, StoreError>(size)
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(part_path).await;
        }
        result
    }

    async fn write_part<S, B, E>(&self, part_path: &Path, body: S) -> Result<u64, StoreError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut body = std::pin::pin!(body);
        let mut file = tokio::fs::File::create(part_path).await?;
        let mut size: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StoreError::Body(e.to_string()))?;
            let bytes = chunk.as_ref();
            size += bytes.len() as u64;
            if size > self.max_bytes {
                return Err(StoreError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            file.write_all(bytes).await?;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(size)
    }
}

/// Generate a collision-resistant stored name that keeps the original
/// extension (ASCII alphanumerics only).
pub fn unique_name(original_name: &str) -> String {
    let id = Uuid::new_v4().simple();
    match extension(original_name) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

fn extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LEN)
        .collect();
    (!ext.is_empty()).then_some(ext)
}
