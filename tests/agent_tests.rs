//! Tests for a single agent step: hooks, side effects, persistence.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{CountingStore, FailingModel, FixedModel, RecordingModel, ShoutModel};
use hyv::agent::{Agent, Verbosity};
use hyv::error::HyvError;
use hyv::side_effect::{FnSideEffect, SideEffectPolicy, SideEffects};
use hyv::store::StoreAdapter;
use hyv::types::Message;

fn counting_effect(prop: &str, calls: Arc<AtomicUsize>) -> FnSideEffect {
    FnSideEffect::new(prop, move |_| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

fn failing_effect(prop: &str) -> FnSideEffect {
    FnSideEffect::new(prop, |_| async {
        Err(HyvError::InvalidState("disk full".to_string()))
    })
}

#[tokio::test]
async fn echo_question_is_answered_and_stored() {
    let agent = Agent::new(ShoutModel);

    let stored = agent
        .assign(Message::new().with("question", "hi"))
        .await
        .unwrap();

    assert_eq!(stored.message, Message::new().with("answer", "HI"));
    let fetched = agent.store().get(&stored.id).await.unwrap();
    assert_eq!(fetched, stored.message);
}

#[tokio::test]
async fn hooks_run_in_order_around_the_model() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let model = RecordingModel::new();

    let before_order = order.clone();
    let after_order = order.clone();
    let finally_order = order.clone();
    let agent = Agent::new(model.clone())
        .with_before(move |message| {
            before_order.lock().unwrap().push("before");
            async move { Ok(message.with("prepared", true)) }
        })
        .with_after(move |message| {
            after_order.lock().unwrap().push("after");
            async move { Ok(message.with("checked", true)) }
        })
        .with_finally(move |id, message| {
            finally_order.lock().unwrap().push("finally");
            async move {
                assert_eq!(message.get("checked"), Some(&json!(true)));
                Ok(id)
            }
        });

    let stored = agent.assign(Message::new().with("q", 1)).await.unwrap();

    assert_eq!(*order.lock().unwrap(), ["before", "after", "finally"]);
    assert_eq!(
        model.seen(),
        vec![Message::new().with("q", 1).with("prepared", true)]
    );
    assert_eq!(
        stored.message,
        Message::new()
            .with("q", 1)
            .with("prepared", true)
            .with("checked", true)
    );
}

#[tokio::test]
async fn side_effect_fires_once_when_field_present() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = Agent::new(FixedModel(
        Message::new().with("files", json!([{"path": "a.txt", "content": "A"}])),
    ))
    .with_side_effect(counting_effect("files", calls.clone()));

    agent.assign(Message::new()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn side_effects_fire_in_field_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let recorder = |prop: &'static str| {
        let order = order.clone();
        FnSideEffect::new(prop, move |_| {
            order.lock().unwrap().push(prop);
            async { Ok(()) }
        })
    };
    let agent = Agent::new(FixedModel(
        Message::new().with("second", 2).with("first", 1),
    ))
    .with_side_effect(recorder("first"))
    .with_side_effect(recorder("second"));

    agent.assign(Message::new()).await.unwrap();

    assert_eq!(*order.lock().unwrap(), ["second", "first"]);
}

#[tokio::test]
async fn side_effect_receives_field_value() {
    let received = Arc::new(Mutex::new(Value::Null));
    let sink = received.clone();
    let agent = Agent::new(FixedModel(Message::new().with("answer", "42"))).with_side_effect(
        FnSideEffect::new("answer", move |value| {
            *sink.lock().unwrap() = value;
            async { Ok(()) }
        }),
    );

    agent.assign(Message::new()).await.unwrap();

    assert_eq!(*received.lock().unwrap(), json!("42"));
}

#[tokio::test]
async fn side_effect_never_fires_when_field_absent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = Agent::new(ShoutModel).with_side_effect(counting_effect("files", calls.clone()));

    agent
        .assign(Message::new().with("question", "hi"))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn isolated_side_effect_failure_still_persists() {
    let store = CountingStore::new();
    let agent = Agent::new(FixedModel(Message::new().with("files", json!([]))))
        .with_store(store.clone())
        .with_side_effect(failing_effect("files"));
    assert_eq!(agent.side_effect_policy(), SideEffectPolicy::Isolate);

    let stored = agent.assign(Message::new()).await.unwrap();

    assert_eq!(store.sets(), 1);
    assert_eq!(store.get(&stored.id).await.unwrap(), stored.message);
}

#[tokio::test]
async fn propagated_side_effect_failure_persists_nothing() {
    let store = CountingStore::new();
    let agent = Agent::new(FixedModel(Message::new().with("files", json!([]))))
        .with_store(store.clone())
        .with_side_effect(failing_effect("files"))
        .with_side_effect_policy(SideEffectPolicy::Propagate);

    let err = agent.assign(Message::new()).await.unwrap_err();

    match err {
        HyvError::SideEffect { prop, message } => {
            assert_eq!(prop, "files");
            assert!(message.contains("disk full"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.sets(), 0);
}

#[tokio::test]
async fn model_failure_propagates_and_store_is_untouched() {
    let store = CountingStore::new();
    let after_calls = Arc::new(AtomicUsize::new(0));
    let after_counter = after_calls.clone();
    let agent = Agent::new(FailingModel)
        .with_store(store.clone())
        .with_after(move |message| {
            after_counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(message) }
        });

    let err = agent.assign(Message::new()).await.unwrap_err();

    assert!(matches!(err, HyvError::Provider { ref provider, .. } if provider == "mock"));
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.sets(), 0);
}

#[tokio::test]
async fn before_hook_failure_skips_model() {
    let model = RecordingModel::new();
    let store = CountingStore::new();
    let agent = Agent::new(model.clone())
        .with_store(store.clone())
        .with_before(|_| async { Err(HyvError::hook("before", "missing field")) });

    let err = agent.assign(Message::new()).await.unwrap_err();

    assert!(matches!(err, HyvError::Hook { .. }));
    assert!(model.seen().is_empty());
    assert_eq!(store.sets(), 0);
}

#[tokio::test]
async fn finally_failure_surfaces_after_persisting() {
    let store = CountingStore::new();
    let agent = Agent::new(ShoutModel)
        .with_store(store.clone())
        .with_finally(|_, _| async { Err(HyvError::hook("finally", "notify failed")) });

    let err = agent.assign(Message::new()).await.unwrap_err();

    assert!(matches!(err, HyvError::Hook { ref hook, .. } if hook == "finally"));
    assert_eq!(store.sets(), 1);
}

#[tokio::test]
async fn run_loads_input_by_id() {
    let store = CountingStore::new();
    let agent = Agent::new(ShoutModel).with_store(store.clone());
    let input_id = store
        .set(&Message::new().with("question", "loud"))
        .await
        .unwrap();

    let output_id = agent.run(&input_id).await.unwrap();

    assert_ne!(output_id, input_id);
    assert_eq!(
        store.get(&output_id).await.unwrap(),
        Message::new().with("answer", "LOUD")
    );
}

#[tokio::test]
async fn run_with_unknown_id_is_not_found() {
    let agent = Agent::new(ShoutModel);

    let err = agent.run("missing").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "No message stored with ID missing");
}

#[tokio::test]
async fn setters_replace_configuration() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut agent = Agent::new(ShoutModel);

    agent.set_side_effects(SideEffects::new().with(counting_effect("answer", calls.clone())));
    agent.set_after(|message| async move { Ok(message.with("after", 1)) });
    agent.set_verbosity(Verbosity::from_level(2));
    agent.set_side_effect_policy(SideEffectPolicy::Propagate);

    let stored = agent
        .assign(Message::new().with("question", "x"))
        .await
        .unwrap();

    assert_eq!(stored.message.get("after"), Some(&json!(1)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(agent.find_side_effect("answer").is_some());
    assert_eq!(agent.verbosity(), Verbosity::Debug);
}
