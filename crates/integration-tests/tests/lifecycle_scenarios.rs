//! End-to-end lifecycle scenarios over the in-memory ports.

mod common;

use common::{identity_trigger, Engine};
use conthesis_core::application::constants::PROCESS_BUDGET;
use conthesis_core::application::TimeBudget;
use conthesis_core::domain::{ActionProperty, DataFormat, Meta, PropertySource, Status};
use conthesis_core::error::EngineError;
use conthesis_core::port::{JobLock, KvStore};
use serde_json::{json, Value};

#[tokio::test]
async fn literal_action_dispatches_and_succeeds() {
    let engine = Engine::new();

    engine
        .manager
        .register(identity_trigger("j1"))
        .await
        .unwrap();

    assert_eq!(engine.state_of("j1").await.as_deref(), Some("RUNNING"));
    assert_eq!(engine.store.state_set(Status::Running), ["j1"]);

    let sent = engine.bus.messages_for("conthesis.action.identity");
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].reply.as_deref(),
        Some("conthesis.actions.responses.j1")
    );
    let body: Value = serde_json::from_slice(&sent[0].payload).unwrap();
    assert_eq!(body, json!({"x": "hello"}));

    let resumed = engine
        .manager
        .resume("j1", json!({"x": "hello"}))
        .await
        .unwrap();
    assert!(resumed);
    assert_eq!(engine.state_of("j1").await.as_deref(), Some("SUCCESS"));
    assert!(engine.store.state_set(Status::Running).is_empty());
    assert_eq!(engine.store.state_set(Status::Success), ["j1"]);
}

#[tokio::test]
async fn job_without_trigger_is_revoked() {
    let engine = Engine::new();

    engine.manager.process("j2", None, true).await.unwrap();

    assert_eq!(engine.state_of("j2").await.as_deref(), Some("REVOKED"));
    assert_eq!(engine.bus.publish_count(), 0);
    assert_eq!(engine.store.state_set(Status::Revoked), ["j2"]);
}

#[tokio::test]
async fn executor_error_expires_the_job() {
    let engine = Engine::new();
    engine
        .manager
        .register(identity_trigger("j3"))
        .await
        .unwrap();
    assert_eq!(engine.state_of("j3").await.as_deref(), Some("RUNNING"));

    // Executor replied "error"; only internal callers exercise this path.
    let mut session = engine.open_session("j3").await;
    let budget = TimeBudget::starting_now(PROCESS_BUDGET);
    session
        .processor()
        .resume_and_process(&budget, "error", &Value::Null)
        .await
        .unwrap();
    session.finish().await.unwrap();

    assert_eq!(engine.state_of("j3").await.as_deref(), Some("FAILURE"));
    // Exactly one dispatch happened: the retry state never re-enqueues.
    assert_eq!(engine.bus.messages_for("conthesis.action.identity").len(), 1);
}

#[tokio::test]
async fn running_job_times_out_to_failure() {
    let engine = Engine::new();
    engine
        .manager
        .register(identity_trigger("j4"))
        .await
        .unwrap();
    assert_eq!(engine.state_of("j4").await.as_deref(), Some("RUNNING"));

    engine.time.advance(31);
    engine
        .manager
        .process("j4", Some(Status::Running), true)
        .await
        .unwrap();

    assert_eq!(engine.state_of("j4").await.as_deref(), Some("FAILURE"));
    assert!(engine.store.state_set(Status::Running).is_empty());
    assert_eq!(engine.store.state_set(Status::Failure), ["j4"]);
}

#[tokio::test]
async fn non_blocking_process_fails_while_lock_is_held() {
    let engine = Engine::new();
    engine
        .manager
        .register(identity_trigger("j5"))
        .await
        .unwrap();

    let mut holder = engine.store.lock("j5");
    assert!(holder.acquire(false).await.unwrap());

    let contended = engine.manager.process("j5", None, false).await;
    assert!(matches!(contended, Err(EngineError::UnableToAcquireLock)));

    holder.release().await.unwrap();
    engine.manager.process("j5", None, false).await.unwrap();
}

#[tokio::test]
async fn concurrent_non_blocking_passes_never_both_fail() {
    let engine = Engine::new();
    engine
        .manager
        .register(identity_trigger("j5"))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        engine.manager.process("j5", None, false),
        engine.manager.process("j5", None, false),
    );

    for result in [&first, &second] {
        match result {
            Ok(()) | Err(EngineError::UnableToAcquireLock) => {}
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }
    assert!(
        first.is_ok() || second.is_ok(),
        "at least one pass must win the lock"
    );
}

#[tokio::test]
async fn freeze_pins_links_and_materialises_stable_paths() {
    let engine = Engine::new();

    // A self-resolving path is fetched now.
    engine.entities.put_json("/a", &json!("contents"));
    let props = vec![ActionProperty::path("p", "/a", DataFormat::Json)];
    let frozen = engine
        .service
        .freeze_properties(&props, &Meta::new())
        .await
        .unwrap();
    assert_eq!(
        frozen[0].source,
        PropertySource::Literal {
            value: json!("contents")
        }
    );

    // A link elsewhere is pinned but stays late-bound.
    engine.entities.link("/a", "/b");
    let frozen = engine
        .service
        .freeze_properties(&props, &Meta::new())
        .await
        .unwrap();
    assert_eq!(
        frozen[0].source,
        PropertySource::Path {
            value: "/b".to_string(),
            data_format: DataFormat::Json,
        }
    );
}

#[tokio::test]
async fn terminal_states_are_never_left() {
    let engine = Engine::new();
    engine
        .manager
        .register(identity_trigger("j6"))
        .await
        .unwrap();
    engine
        .manager
        .resume("j6", json!({"x": "hello"}))
        .await
        .unwrap();
    assert_eq!(engine.state_of("j6").await.as_deref(), Some("SUCCESS"));

    // Further passes and replies are inert.
    engine.manager.process("j6", None, true).await.unwrap();
    let resumed = engine.manager.resume("j6", json!({})).await.unwrap();
    assert!(!resumed);
    assert_eq!(engine.state_of("j6").await.as_deref(), Some("SUCCESS"));
    assert_eq!(engine.store.state_set(Status::Success), ["j6"]);
}

#[tokio::test]
async fn registering_twice_does_not_redispatch() {
    let engine = Engine::new();
    engine
        .manager
        .register(identity_trigger("j7"))
        .await
        .unwrap();
    engine
        .manager
        .register(identity_trigger("j7"))
        .await
        .unwrap();

    assert_eq!(engine.state_of("j7").await.as_deref(), Some("RUNNING"));
    assert_eq!(engine.bus.messages_for("conthesis.action.identity").len(), 1);
}

#[tokio::test]
async fn meta_fields_parameterize_the_dispatch() {
    let engine = Engine::new();
    let trigger = conthesis_core::domain::ActionTrigger {
        jid: "j8".to_string(),
        meta: Meta::from([("tenant".to_string(), json!("acme"))]),
        action_source: conthesis_core::domain::ActionSource::Literal,
        action: json!({
            "kind": "report",
            "properties": [
                {"name": "who", "kind": "META_FIELD", "value": "tenant"},
                {"name": "missing", "kind": "META_FIELD", "value": "absent"},
            ],
        }),
    };

    engine.manager.register(trigger).await.unwrap();

    let sent = engine.bus.messages_for("conthesis.action.report");
    assert_eq!(sent.len(), 1);
    let body: Value = serde_json::from_slice(&sent[0].payload).unwrap();
    assert_eq!(body, json!({"who": "acme", "missing": null}));
}
