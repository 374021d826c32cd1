//! Hook callbacks around a model call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::HyvError;
use crate::types::Message;

/// Async transform applied to a message before or after the model call.
pub type MessageHookFn = Arc<
    dyn Fn(Message) -> Pin<Box<dyn Future<Output = Result<Message, HyvError>> + Send>>
        + Send
        + Sync,
>;

/// Async callback run after the result was stored. Receives the stored id
/// and the stored message and returns the id to report.
pub type FinallyHookFn = Arc<
    dyn Fn(String, Message) -> Pin<Box<dyn Future<Output = Result<String, HyvError>> + Send>>
        + Send
        + Sync,
>;

pub(crate) fn message_hook<F, Fut>(hook: F) -> MessageHookFn
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message, HyvError>> + Send + 'static,
{
    Arc::new(move |message| Box::pin(hook(message)))
}

pub(crate) fn finally_hook<F, Fut>(hook: F) -> FinallyHookFn
where
    F: Fn(String, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, HyvError>> + Send + 'static,
{
    Arc::new(move |id, message| Box::pin(hook(id, message)))
}

pub(crate) fn identity() -> MessageHookFn {
    message_hook(|message| async move { Ok(message) })
}

pub(crate) fn identity_finally() -> FinallyHookFn {
    finally_hook(|id, _| async move { Ok(id) })
}
