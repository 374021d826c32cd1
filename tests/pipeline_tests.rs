//! Tests for chaining agents by message id.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{CountingStore, FailingModel, RecordingModel, ShoutModel};
use hyv::agent::Agent;
use hyv::error::HyvError;
use hyv::pipeline::{get_result, sequence, sequence_in, sprint, sprint_in};
use hyv::store::{MemoryStore, StoreAdapter};
use hyv::types::Message;

fn shared() -> Arc<dyn StoreAdapter> {
    Arc::new(MemoryStore::new())
}

#[tokio::test]
async fn next_agent_receives_previous_after_hook_output() {
    let store = shared();
    let second = RecordingModel::new();
    let agents = [
        Agent::new(ShoutModel)
            .with_shared_store(store.clone())
            .with_after(|message| async move { Ok(message.with("reviewed", true)) }),
        Agent::new(second.clone()).with_shared_store(store.clone()),
    ];

    let id = sequence(Message::new().with("question", "hi"), &agents)
        .await
        .unwrap();

    let expected = Message::new().with("answer", "HI").with("reviewed", true);
    assert_eq!(second.seen(), vec![expected.clone()]);
    assert_eq!(store.get(&id).await.unwrap(), expected);
}

#[tokio::test]
async fn sequence_uses_first_agents_store() {
    let store = CountingStore::new();
    let agents = [Agent::new(ShoutModel).with_store(store.clone())];

    let id = sequence(Message::new().with("question", "a"), &agents)
        .await
        .unwrap();

    // input and output
    assert_eq!(store.sets(), 2);
    assert_eq!(
        get_result(&agents[0], &id).await.unwrap(),
        Message::new().with("answer", "A")
    );
}

#[tokio::test]
async fn sequence_rejects_empty_chain() {
    let err = sequence(Message::new(), &[]).await.unwrap_err();
    assert!(matches!(err, HyvError::InvalidArgument(_)));
}

#[tokio::test]
async fn sequence_in_with_no_agents_returns_stored_input() {
    let store = MemoryStore::new();
    let input = Message::new().with("question", "kept");

    let id = sequence_in(&store, input.clone(), &[]).await.unwrap();

    assert_eq!(store.get(&id).await.unwrap(), input);
}

#[tokio::test]
async fn sprint_continues_from_existing_id() {
    let store = shared();
    let start = store
        .set(&Message::new().with("question", "again"))
        .await
        .unwrap();
    let agents = [Agent::new(ShoutModel).with_shared_store(store.clone())];

    let id = sprint(&start, &agents).await.unwrap();

    assert_ne!(id, start);
    assert_eq!(
        store.get(&id).await.unwrap(),
        Message::new().with("answer", "AGAIN")
    );
    assert_eq!(sprint(&start, &[]).await.unwrap(), start);
}

#[tokio::test]
async fn failure_aborts_the_rest_of_the_chain() {
    let store = CountingStore::new();
    let last = RecordingModel::new();
    let agents = [
        Agent::new(FailingModel).with_store(store.clone()),
        Agent::new(last.clone()).with_store(store.clone()),
    ];

    let err = sequence(Message::new(), &agents).await.unwrap_err();

    assert!(matches!(err, HyvError::Provider { .. }));
    assert!(last.seen().is_empty());
    // only the input was stored
    assert_eq!(store.sets(), 1);
}

#[tokio::test]
async fn default_agents_chain_without_configuring_a_store() {
    let second = RecordingModel::new();
    let agents = [Agent::new(ShoutModel), Agent::new(second.clone())];

    let id = sequence(Message::new().with("question", "x"), &agents)
        .await
        .unwrap();

    assert_eq!(second.seen(), vec![Message::new().with("answer", "X")]);
    assert_eq!(
        get_result(&agents[0], &id).await.unwrap(),
        Message::new().with("answer", "X")
    );
}

#[tokio::test]
async fn chain_runs_over_one_store_only() {
    let chain_store = CountingStore::new();
    let own_store = CountingStore::new();
    let agents = [
        Agent::new(ShoutModel),
        Agent::new(RecordingModel::new()).with_store(own_store.clone()),
    ];

    let id = sequence_in(chain_store.as_ref(), Message::new().with("question", "y"), &agents)
        .await
        .unwrap();

    // input plus one result per agent
    assert_eq!(chain_store.sets(), 3);
    assert_eq!(chain_store.gets(), 2);
    assert_eq!(own_store.sets() + own_store.gets(), 0);
    assert_eq!(
        chain_store.get(&id).await.unwrap(),
        Message::new().with("answer", "Y")
    );
}

#[tokio::test]
async fn sprint_in_uses_the_given_store() {
    let store = MemoryStore::new();
    let start = store
        .set(&Message::new().with("question", "z"))
        .await
        .unwrap();
    let agents = [Agent::new(ShoutModel)];

    let id = sprint_in(&store, &start, &agents).await.unwrap();

    assert_eq!(
        store.get(&id).await.unwrap(),
        Message::new().with("answer", "Z")
    );
    assert!(agents[0].store().get(&id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn parallel_assigns_share_one_store() {
    let store = shared();
    let agent = Agent::new(ShoutModel).with_shared_store(store.clone());

    let results = futures::future::try_join_all(
        ["a", "b", "c"].map(|q| agent.assign(Message::new().with("question", q))),
    )
    .await
    .unwrap();

    for (stored, expected) in results.iter().zip(["A", "B", "C"]) {
        assert_eq!(
            store.get(&stored.id).await.unwrap().get_str("answer"),
            Some(expected)
        );
    }
}
