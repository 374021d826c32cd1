//! Core Agent struct.

use std::future::Future;
use std::sync::Arc;

use strum::{Display, EnumString};
use tracing::{info, warn};

use super::hooks::{self, FinallyHookFn, MessageHookFn};
use crate::error::HyvError;
use crate::model::ModelAdapter;
use crate::side_effect::{SideEffect, SideEffectPolicy, SideEffects};
use crate::store::{MemoryStore, StoreAdapter};
use crate::types::{Message, StoredMessage};

/// How much an agent reports about its own work.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Silent,
    /// Side-effect activity and the output of each step.
    Normal,
    /// Every intermediate message and the stored id.
    Debug,
}

impl Verbosity {
    /// Map a numeric level (0, 1, 2+) to a verbosity.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Silent,
            1 => Self::Normal,
            _ => Self::Debug,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }
}

/// A single pipeline stage.
///
/// `assign` runs, in order: the `before` hook, the model, the `after` hook,
/// side effects for matching output fields, `store.set`, and the `finally`
/// hook. The first failure aborts the remaining steps and is returned as is;
/// nothing is stored if the model, a hook or a propagated side effect fails.
///
/// Each agent owns a default [`MemoryStore`] for standalone use. Pipelines
/// run every step of a chain over a single store, so agents chained with
/// [`sequence`](crate::pipeline::sequence) see each other's results without
/// being configured with the same store.
pub struct Agent {
    model: Box<dyn ModelAdapter>,
    store: Arc<dyn StoreAdapter>,
    side_effects: SideEffects,
    before: MessageHookFn,
    after: MessageHookFn,
    finally: FinallyHookFn,
    verbosity: Verbosity,
    side_effect_policy: SideEffectPolicy,
}

impl Agent {
    /// Create an agent with a fresh in-memory store and identity hooks.
    pub fn new(model: impl ModelAdapter + 'static) -> Self {
        Self {
            model: Box::new(model),
            store: Arc::new(MemoryStore::new()),
            side_effects: SideEffects::new(),
            before: hooks::identity(),
            after: hooks::identity(),
            finally: hooks::identity_finally(),
            verbosity: Verbosity::Silent,
            side_effect_policy: SideEffectPolicy::default(),
        }
    }

    pub fn with_store(mut self, store: impl StoreAdapter + 'static) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Use a store that other agents hold as well.
    pub fn with_shared_store(mut self, store: Arc<dyn StoreAdapter>) -> Self {
        self.store = store;
        self
    }

    pub fn with_side_effects(mut self, side_effects: SideEffects) -> Self {
        self.side_effects = side_effects;
        self
    }

    /// Register one more side effect. Ignored if its field is already taken.
    pub fn with_side_effect(mut self, effect: impl SideEffect + 'static) -> Self {
        self.side_effects.register(Arc::new(effect));
        self
    }

    pub fn with_before<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Message, HyvError>> + Send + 'static,
    {
        self.set_before(hook);
        self
    }

    pub fn with_after<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Message, HyvError>> + Send + 'static,
    {
        self.set_after(hook);
        self
    }

    pub fn with_finally<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(String, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, HyvError>> + Send + 'static,
    {
        self.set_finally(hook);
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_side_effect_policy(mut self, policy: SideEffectPolicy) -> Self {
        self.side_effect_policy = policy;
        self
    }

    pub fn model(&self) -> &dyn ModelAdapter {
        self.model.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn StoreAdapter> {
        &self.store
    }

    pub fn side_effects(&self) -> &SideEffects {
        &self.side_effects
    }

    pub fn find_side_effect(&self, prop: &str) -> Option<&Arc<dyn SideEffect>> {
        self.side_effects.find(prop)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn side_effect_policy(&self) -> SideEffectPolicy {
        self.side_effect_policy
    }

    pub fn set_side_effects(&mut self, side_effects: SideEffects) {
        self.side_effects = side_effects;
    }

    pub fn set_before<F, Fut>(&mut self, hook: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Message, HyvError>> + Send + 'static,
    {
        self.before = hooks::message_hook(hook);
    }

    pub fn set_after<F, Fut>(&mut self, hook: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Message, HyvError>> + Send + 'static,
    {
        self.after = hooks::message_hook(hook);
    }

    pub fn set_finally<F, Fut>(&mut self, hook: F)
    where
        F: Fn(String, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, HyvError>> + Send + 'static,
    {
        self.finally = hooks::finally_hook(hook);
    }

    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.verbosity = verbosity;
    }

    pub fn set_side_effect_policy(&mut self, policy: SideEffectPolicy) {
        self.side_effect_policy = policy;
    }

    /// Run one full step on `message` and return the stored result.
    pub async fn assign(&self, message: Message) -> Result<StoredMessage, HyvError> {
        self.assign_in(self.store.as_ref(), message).await
    }

    /// Like [`assign`](Self::assign), but persists into `store` instead of
    /// this agent's own store.
    pub async fn assign_in(
        &self,
        store: &dyn StoreAdapter,
        message: Message,
    ) -> Result<StoredMessage, HyvError> {
        self.trace("input", &message);
        let prepared = (self.before)(message).await?;
        self.trace("prepared", &prepared);

        let output = self.model.assign(prepared).await?;
        self.trace("model output", &output);

        let message = (self.after)(output).await?;
        if self.verbosity >= Verbosity::Normal {
            info!(output = %message, "agent output");
        }

        self.dispatch_side_effects(&message).await?;

        let id = store.set(&message).await?;
        if self.verbosity >= Verbosity::Debug {
            info!(id = %id, store = store.name(), "stored");
        }

        let id = (self.finally)(id, message.clone()).await?;
        Ok(StoredMessage { id, message })
    }

    /// Load `id` from this agent's store, run a step on it, and return the
    /// id of the new result.
    pub async fn run(&self, id: &str) -> Result<String, HyvError> {
        self.run_in(self.store.as_ref(), id).await
    }

    /// Like [`run`](Self::run), reading the input from and writing the
    /// result to `store`.
    pub async fn run_in(&self, store: &dyn StoreAdapter, id: &str) -> Result<String, HyvError> {
        let message = store.get(id).await?;
        Ok(self.assign_in(store, message).await?.id)
    }

    async fn dispatch_side_effects(&self, message: &Message) -> Result<(), HyvError> {
        for (prop, value) in message.iter() {
            let Some(effect) = self.side_effects.find(prop) else {
                continue;
            };
            if self.verbosity >= Verbosity::Normal {
                info!("Using side effect on: {prop}");
            }

            let Err(err) = effect.run(value.clone()).await else {
                continue;
            };
            match self.side_effect_policy {
                SideEffectPolicy::Isolate => {
                    warn!(prop = %prop, error = %err, "side effect failed, continuing");
                }
                SideEffectPolicy::Propagate => {
                    return Err(match err {
                        err @ HyvError::SideEffect { .. } => err,
                        other => HyvError::side_effect(prop.clone(), other.to_string()),
                    });
                }
            }
        }
        Ok(())
    }

    fn trace(&self, stage: &str, message: &Message) {
        if self.verbosity >= Verbosity::Debug {
            info!(stage, payload = %message, "agent step");
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("store", &self.store.name())
            .field("side_effects", &self.side_effects)
            .field("verbosity", &self.verbosity)
            .field("side_effect_policy", &self.side_effect_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FnModelAdapter;

    fn echo() -> FnModelAdapter {
        FnModelAdapter::new(|task| async move { Ok(task) })
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(Verbosity::from_level(0), Verbosity::Silent);
        assert_eq!(Verbosity::from_level(1), Verbosity::Normal);
        assert_eq!(Verbosity::from_level(7), Verbosity::Debug);
        assert_eq!(Verbosity::Debug.level(), 2);
        assert_eq!("normal".parse::<Verbosity>().unwrap(), Verbosity::Normal);
        assert_eq!(Verbosity::Silent.to_string(), "silent");
    }

    #[tokio::test]
    async fn defaults_are_identity() {
        let agent = Agent::new(echo());
        let input = Message::new().with("question", "hi");

        let stored = agent.assign(input.clone()).await.unwrap();

        assert_eq!(stored.message, input);
        assert_eq!(agent.store().get(&stored.id).await.unwrap(), input);
        assert_eq!(agent.store().name(), "memory");
        assert!(agent.side_effects().is_empty());
    }

    #[tokio::test]
    async fn agents_do_not_share_default_stores() {
        let a = Agent::new(echo());
        let b = Agent::new(echo());

        let stored = a.assign(Message::new().with("x", 1)).await.unwrap();

        assert!(b.store().get(&stored.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn finally_hook_replaces_id() {
        let agent = Agent::new(echo()).with_finally(|id, _| async move { Ok(format!("{id}!")) });

        let stored = agent.assign(Message::new()).await.unwrap();

        assert!(stored.id.ends_with('!'));
    }
}
