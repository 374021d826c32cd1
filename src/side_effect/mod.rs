//! Side effects: out-of-band work keyed by an output field name.
//!
//! After an agent's `after` hook, every field of the output message whose
//! name has a registered side effect triggers that side effect with the
//! field's value. Side effects cannot change the message.

pub mod file_writer;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HyvError;

pub use file_writer::{FileEncoding, FileWriter};

/// A handler run when its field appears in an agent's output.
#[async_trait]
pub trait SideEffect: Send + Sync {
    /// Name of the field this side effect reacts to.
    fn prop(&self) -> &str;

    /// Handle the field's value. The result only signals failure.
    async fn run(&self, value: Value) -> Result<(), HyvError>;
}

/// What an agent does when a side effect fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SideEffectPolicy {
    /// Log the failure and continue the pipeline.
    #[default]
    Isolate,
    /// Abort the pipeline step before anything is persisted.
    Propagate,
}

type SideEffectFn =
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<(), HyvError>> + Send>> + Send + Sync;

/// Closure-based side effect.
pub struct FnSideEffect {
    prop: String,
    handler: Arc<SideEffectFn>,
}

impl FnSideEffect {
    pub fn new<F, Fut>(prop: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HyvError>> + Send + 'static,
    {
        Self {
            prop: prop.into(),
            handler: Arc::new(move |value| Box::pin(handler(value))),
        }
    }
}

#[async_trait]
impl SideEffect for FnSideEffect {
    fn prop(&self) -> &str {
        &self.prop
    }

    async fn run(&self, value: Value) -> Result<(), HyvError> {
        (self.handler)(value).await
    }
}

impl std::fmt::Debug for FnSideEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSideEffect")
            .field("prop", &self.prop)
            .finish_non_exhaustive()
    }
}

/// Dispatch table from field name to side effect.
///
/// The first side effect registered for a field wins; later registrations
/// for the same field are ignored.
#[derive(Clone, Default)]
pub struct SideEffects {
    effects: Vec<Arc<dyn SideEffect>>,
    by_prop: HashMap<String, usize>,
}

impl SideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a side effect. Returns `false` if its field was already taken.
    pub fn register(&mut self, effect: Arc<dyn SideEffect>) -> bool {
        let prop = effect.prop().to_string();
        if self.by_prop.contains_key(&prop) {
            tracing::debug!(prop = %prop, "side effect already registered for field, ignoring");
            return false;
        }
        self.by_prop.insert(prop, self.effects.len());
        self.effects.push(effect);
        true
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, effect: impl SideEffect + 'static) -> Self {
        self.register(Arc::new(effect));
        self
    }

    pub fn find(&self, prop: &str) -> Option<&Arc<dyn SideEffect>> {
        self.by_prop.get(prop).map(|&i| &self.effects[i])
    }

    /// Registered field names, in registration order.
    pub fn props(&self) -> impl Iterator<Item = &str> {
        self.effects.iter().map(|e| e.prop())
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl FromIterator<Arc<dyn SideEffect>> for SideEffects {
    fn from_iter<I: IntoIterator<Item = Arc<dyn SideEffect>>>(iter: I) -> Self {
        let mut table = Self::new();
        for effect in iter {
            table.register(effect);
        }
        table
    }
}

impl std::fmt::Debug for SideEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.props()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(prop: &str, counter: Arc<AtomicUsize>) -> FnSideEffect {
        FnSideEffect::new(prop, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn first_registration_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut table = SideEffects::new();
        assert!(table.register(Arc::new(counting("files", first.clone()))));
        assert!(!table.register(Arc::new(counting("files", second.clone()))));

        table.find("files").unwrap().run(Value::Null).await.unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn lookup_and_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let table = SideEffects::new()
            .with(counting("b", counter.clone()))
            .with(counting("a", counter));

        assert!(table.find("a").is_some());
        assert!(table.find("c").is_none());
        assert_eq!(table.props().collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(format!("{table:?}"), r#"["b", "a"]"#);
    }
}
