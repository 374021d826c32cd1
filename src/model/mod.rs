//! Model adapters: anything that turns an input message into an output message.

#[cfg(feature = "stable-diffusion")]
pub mod automatic1111;
#[cfg(feature = "openai")]
pub mod dall_e;
#[cfg(feature = "openai")]
pub mod gpt;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HyvError;
use crate::types::Message;

#[cfg(feature = "stable-diffusion")]
pub use automatic1111::{Automatic1111ModelAdapter, Automatic1111Options};
#[cfg(feature = "openai")]
pub use dall_e::{DallEModelAdapter, DallEOptions, ImageSize};
#[cfg(feature = "openai")]
pub use gpt::{GptModelAdapter, GptOptions};

/// Core trait implemented by all model backends.
///
/// The agent calls `assign` exactly once per pipeline step. Retries, rate
/// limiting and request timeouts are the adapter's business.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn assign(&self, task: Message) -> Result<Message, HyvError>;
}

#[async_trait]
impl<M: ModelAdapter + ?Sized> ModelAdapter for Box<M> {
    async fn assign(&self, task: Message) -> Result<Message, HyvError> {
        (**self).assign(task).await
    }
}

#[async_trait]
impl<M: ModelAdapter + ?Sized> ModelAdapter for Arc<M> {
    async fn assign(&self, task: Message) -> Result<Message, HyvError> {
        (**self).assign(task).await
    }
}

type AssignFn =
    dyn Fn(Message) -> Pin<Box<dyn Future<Output = Result<Message, HyvError>> + Send>> + Send + Sync;

/// Closure-based model adapter, handy for local transforms and tests.
///
/// ```
/// use hyv::model::{FnModelAdapter, ModelAdapter};
/// use hyv::types::Message;
///
/// let shout = FnModelAdapter::new(|task: Message| async move {
///     let question = task.get_str("question").unwrap_or_default().to_uppercase();
///     Ok(Message::new().with("answer", question))
/// });
/// ```
pub struct FnModelAdapter {
    handler: Arc<AssignFn>,
}

impl FnModelAdapter {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Message, HyvError>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |task| Box::pin(handler(task))),
        }
    }
}

#[async_trait]
impl ModelAdapter for FnModelAdapter {
    async fn assign(&self, task: Message) -> Result<Message, HyvError> {
        (self.handler)(task).await
    }
}

impl std::fmt::Debug for FnModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnModelAdapter").finish_non_exhaustive()
    }
}
