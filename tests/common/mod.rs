//! Shared test helpers: scripted model adapters and an instrumented store.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use hyv::error::HyvError;
use hyv::model::ModelAdapter;
use hyv::store::{MemoryStore, StoreAdapter};
use hyv::types::Message;

/// Answers `{question}` with `{answer: QUESTION}`.
pub struct ShoutModel;

#[async_trait]
impl ModelAdapter for ShoutModel {
    async fn assign(&self, task: Message) -> Result<Message, HyvError> {
        let question = task.get_str("question").unwrap_or_default();
        Ok(Message::new().with("answer", question.to_uppercase()))
    }
}

/// Returns its input unchanged and remembers every task it saw.
#[derive(Clone, Default)]
pub struct RecordingModel {
    seen: Arc<Mutex<Vec<Message>>>,
}

impl RecordingModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<Message> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelAdapter for RecordingModel {
    async fn assign(&self, task: Message) -> Result<Message, HyvError> {
        self.seen.lock().unwrap().push(task.clone());
        Ok(task)
    }
}

/// Always fails with a provider error.
pub struct FailingModel;

#[async_trait]
impl ModelAdapter for FailingModel {
    async fn assign(&self, _task: Message) -> Result<Message, HyvError> {
        Err(HyvError::Provider {
            provider: "mock".to_string(),
            message: "model rejected the task".to_string(),
        })
    }
}

/// Returns a fixed message regardless of input.
pub struct FixedModel(pub Message);

#[async_trait]
impl ModelAdapter for FixedModel {
    async fn assign(&self, _task: Message) -> Result<Message, HyvError> {
        Ok(self.0.clone())
    }
}

/// Memory store that counts `set` and `get` calls.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    sets: AtomicUsize,
    gets: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreAdapter for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn set(&self, message: &Message) -> Result<String, HyvError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(message).await
    }

    async fn get(&self, id: &str) -> Result<Message, HyvError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }
}
