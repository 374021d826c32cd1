//! Linear pipelines of agents.
//!
//! A chain runs over one store: every step reads its input from it and
//! writes its result to it. `sequence` and `sprint` use the first agent's
//! store; the `_in` variants take the store explicitly.
//!
//! ```no_run
//! use hyv::prelude::*;
//! use hyv::model::FnModelAdapter;
//!
//! # async fn demo() -> hyv::error::Result<()> {
//! let shout = Agent::new(FnModelAdapter::new(|task: Message| async move {
//!     let answer = task.get_str("question").unwrap_or_default().to_uppercase();
//!     Ok(Message::new().with("answer", answer))
//! }));
//! let agents = [shout];
//!
//! let id = sequence(Message::new().with("question", "hi"), &agents).await?;
//! assert_eq!(get_result(&agents[0], &id).await?.get_str("answer"), Some("HI"));
//! # Ok(())
//! # }
//! ```

use tracing::debug;

use crate::agent::Agent;
use crate::error::HyvError;
use crate::store::StoreAdapter;
use crate::types::Message;

/// Store `message` in the first agent's store and run every agent in turn
/// over that store.
///
/// Returns the id of the last agent's result. An empty chain is rejected.
pub async fn sequence(message: Message, agents: &[Agent]) -> Result<String, HyvError> {
    let first = agents.first().ok_or_else(|| {
        HyvError::InvalidArgument("sequence needs at least one agent".to_string())
    })?;
    sequence_in(first.store().as_ref(), message, agents).await
}

/// Store `message` in `store` and run every agent in turn over it.
///
/// With no agents, the id of the stored input is returned.
pub async fn sequence_in(
    store: &dyn StoreAdapter,
    message: Message,
    agents: &[Agent],
) -> Result<String, HyvError> {
    let id = store.set(&message).await?;
    debug!(id = %id, store = store.name(), agents = agents.len(), "pipeline input stored");
    sprint_in(store, &id, agents).await
}

/// Run every agent in turn over the first agent's store, starting from an
/// already stored message. An empty chain returns `id`.
pub async fn sprint(id: &str, agents: &[Agent]) -> Result<String, HyvError> {
    match agents.first() {
        Some(first) => sprint_in(first.store().as_ref(), id, agents).await,
        None => Ok(id.to_string()),
    }
}

/// Run every agent in turn over `store`, starting from `id`.
///
/// Strictly sequential: the first failure aborts the chain and is returned.
pub async fn sprint_in(
    store: &dyn StoreAdapter,
    id: &str,
    agents: &[Agent],
) -> Result<String, HyvError> {
    let mut current = id.to_string();
    for (step, agent) in agents.iter().enumerate() {
        current = agent.run_in(store, &current).await?;
        debug!(step, id = %current, "pipeline step done");
    }
    Ok(current)
}

/// Fetch a result through `agent`'s store, e.g. the first agent of a chain.
pub async fn get_result(agent: &Agent, id: &str) -> Result<Message, HyvError> {
    agent.store().get(id).await
}
