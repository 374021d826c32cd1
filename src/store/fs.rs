//! Filesystem store: one JSON file per message.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::StoreAdapter;
use crate::error::HyvError;
use crate::types::Message;
use crate::util::id::generate_id;

/// Durable store writing each message to `{dir}/{id}.json`.
///
/// Directories are created on first write. Nothing is ever evicted.
///
/// ```no_run
/// use hyv::store::{FsStore, StoreAdapter};
/// use hyv::types::Message;
///
/// # async fn example() -> hyv::error::Result<()> {
/// let store = FsStore::new("out/messages");
/// let id = store.set(&Message::new().with("question", "hi")).await?;
/// let message = store.get(&id).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `id`.
    pub fn path_for(&self, id: &str) -> Result<PathBuf, HyvError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(HyvError::InvalidArgument(format!(
                "`{id}` is not a valid message id"
            )));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl StoreAdapter for FsStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn set(&self, message: &Message) -> Result<String, HyvError> {
        let id = generate_id();
        let path = self.path_for(&id)?;
        let body = serde_json::to_vec(message)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, body).await?;

        debug!(path = %path.display(), "stored message");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Message, HyvError> {
        let path = self.path_for(id)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(HyvError::NotFound(id.to_string()))
            }
            Err(err) => return Err(HyvError::retrieval(id, err)),
        };
        serde_json::from_slice(&raw).map_err(|err| HyvError::retrieval(id, err))
    }
}
