//! Message stores.
//!
//! Every store hands out a fresh identifier on `set` and never mutates a
//! stored message in place. `get` fails with [`HyvError::NotFound`] when
//! nothing is stored under the id.

pub mod fs;
pub mod memory;
#[cfg(feature = "weaviate")]
pub mod weaviate;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HyvError;
use crate::types::Message;

pub use fs::FsStore;
pub use memory::MemoryStore;
#[cfg(feature = "weaviate")]
pub use weaviate::{WeaviateCollection, WeaviateStore};

/// Core trait implemented by all message stores.
///
/// A store may be shared by many agents and concurrent pipelines.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Store name for diagnostics (e.g., "memory", "fs").
    fn name(&self) -> &str;

    /// Persist a message and return its new identifier.
    async fn set(&self, message: &Message) -> Result<String, HyvError>;

    /// Retrieve the message stored under `id`.
    async fn get(&self, id: &str) -> Result<Message, HyvError>;
}

#[async_trait]
impl<S: StoreAdapter + ?Sized> StoreAdapter for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn set(&self, message: &Message) -> Result<String, HyvError> {
        (**self).set(message).await
    }

    async fn get(&self, id: &str) -> Result<Message, HyvError> {
        (**self).get(id).await
    }
}
