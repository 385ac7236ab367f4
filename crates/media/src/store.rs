use std::path::PathBuf;

use {async_trait::async_trait, tracing::debug};

use crate::{Error, Result, mime::extension_for};

/// Where a media buffer ended up after being persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub path: PathBuf,
    /// Content type recorded by the store, when it differs from or refines
    /// the one passed in.
    pub content_type: Option<String>,
}

/// Persistent media storage. `bucket` groups files by direction
/// (e.g. `inbound`). A store may decline a buffer by returning `Ok(None)`.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn save_buffer(
        &self,
        bytes: &[u8],
        content_type: &str,
        bucket: &str,
        max_bytes: usize,
    ) -> Result<Option<StoredMedia>>;
}

/// Stores media under `<root>/<bucket>/<uuid>.<ext>`.
#[derive(Debug, Clone)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn save_buffer(
        &self,
        bytes: &[u8],
        content_type: &str,
        bucket: &str,
        max_bytes: usize,
    ) -> Result<Option<StoredMedia>> {
        if bytes.len() > max_bytes {
            return Err(Error::TooLarge {
                size: bytes.len(),
                max_bytes,
            });
        }
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket.contains("..") {
            return Err(Error::invalid_input(format!("invalid media bucket: {bucket}")));
        }

        let dir = self.root.join(bucket);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::external(format!("create {}", dir.display()), e))?;

        let path = dir.join(format!(
            "{}.{}",
            uuid::Uuid::new_v4(),
            extension_for(content_type)
        ));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::external(format!("write {}", path.display()), e))?;

        debug!(path = %path.display(), size = bytes.len(), content_type, "saved media");
        Ok(Some(StoredMedia {
            path,
            content_type: None,
        }))
    }
}
