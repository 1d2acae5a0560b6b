//! Integration tests for the request lifecycle
//!
//! Drives requests end to end through the before, done and fail chains and
//! checks the terminal snapshot of each path.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use hookline_runtime::{
    Adapter, AdapterContext, AdapterFuture, BeforeContext, DoneContext, EventKind, FailContext, Hook, NormalizeError, RawRequest,
    RequestDescriptor, RequestStatus, adapter_fn, create,
};
use hookline_testing::{EventRecorder, Outcome, ScriptedAdapter, init_tracing};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

fn add(amount: u32) -> Hook<hookline_runtime::BeforeContext<u32, String>> {
    Hook::new(move |ctx: BeforeContext<u32, String>| {
        ctx.next(ctx.payload() + amount);
    })
}

/// Resolves with the payload it saw, rendered as a string.
struct Echo;

impl Adapter for Echo {
    type Payload = u32;
    type Output = String;

    fn call(&self, ctx: AdapterContext<u32, String>) -> AdapterFuture {
        Box::pin(async move {
            ctx.resolve(ctx.payload().to_string());
            Ok(())
        })
    }

    fn create_state(&self) -> Option<String> {
        Some("initial".to_string())
    }

    fn convert(&self, payload: u32) -> u32 {
        payload * 100
    }
}

// ============================================================================
// Terminal States
// ============================================================================

#[tokio::test]
async fn test_resolve_reaches_success() {
    init_tracing();
    let client = create(adapter_fn(|ctx: AdapterContext<Value, String>| async move {
        ctx.resolve("ok".to_string());
        Ok(())
    }));

    let snapshot = client
        .issue(RawRequest::new().payload(json!({"a": 1})))
        .unwrap()
        .await
        .unwrap();

    assert!(snapshot.success);
    assert!(!snapshot.pending);
    assert!(!snapshot.cancelled);
    assert_eq!(snapshot.payload, json!({"a": 1}));
    assert_eq!(snapshot.result.as_deref(), Some("ok"));
    assert_eq!(snapshot.status(), RequestStatus::Success);
}

#[tokio::test]
async fn test_reject_reaches_failed() {
    let client = create(adapter_fn(|ctx: AdapterContext<Value, String>| async move {
        ctx.reject("bad".to_string());
        Ok(())
    }));

    let handle = client.issue(RawRequest::new().payload(json!({"a": 1}))).unwrap();
    let snapshot = handle.completion().await.unwrap();

    assert!(!snapshot.success);
    assert!(!snapshot.pending);
    assert!(!snapshot.cancelled);
    assert_eq!(snapshot.result.as_deref(), Some("bad"));
    assert_eq!(handle.status(), RequestStatus::Failed);
}

#[tokio::test]
async fn test_handle_fields_track_the_state() {
    let handle = create(ScriptedAdapter::resolving("ok".to_string()))
        .prepare(RawRequest::new().payload(5_u32).meta(json!({"trace": "t-1"})))
        .unwrap();

    assert!(handle.pending());
    assert!(!handle.is_started());
    assert_eq!(handle.payload(), 5);
    assert_eq!(handle.result(), None);
    assert_eq!(handle.meta(), json!({"trace": "t-1"}));

    handle.start();
    handle.completion().await.unwrap();

    assert!(handle.success());
    assert!(!handle.pending());
    assert!(!handle.cancelled());
    assert_eq!(handle.result().as_deref(), Some("ok"));
    assert_eq!(handle.snapshot().meta, json!({"trace": "t-1"}));
}

// ============================================================================
// Before Chain
// ============================================================================

#[tokio::test]
async fn test_empty_hooks_pass_payload_unchanged() {
    let adapter = ScriptedAdapter::<u32, String>::resolving("ok".to_string());
    let handle = create(adapter.clone())
        .issue(RawRequest::new().payload(42))
        .unwrap();

    let snapshot = handle.completion().await.unwrap();

    assert_eq!(adapter.payloads(), vec![42]);
    assert_eq!(snapshot.payload, 42);
}

#[tokio::test]
async fn test_before_hooks_run_in_order() {
    let adapter = ScriptedAdapter::<u32, String>::resolving("ok".to_string());
    let request = RawRequest::new()
        .payload(1)
        .before(add(1))
        .before(Hook::new(|ctx: BeforeContext<u32, String>| {
            ctx.next(ctx.payload() * 10);
        }))
        .before(add(3));

    let snapshot = create(adapter.clone()).issue(request).unwrap().await.unwrap();

    assert_eq!(adapter.payloads(), vec![23]);
    assert_eq!(snapshot.payload, 23);
}

#[tokio::test]
async fn test_n_before_hooks_emit_n_payload_changes_before_terminal() {
    for n in 0..5_u32 {
        let mut request = RawRequest::new().payload(0);
        for _ in 0..n {
            request = request.before(add(1));
        }

        let handle = create(ScriptedAdapter::resolving("ok".to_string()))
            .prepare(request)
            .unwrap();
        let recorder = EventRecorder::attach(&handle);
        handle.start();
        handle.completion().await.unwrap();

        let kinds = recorder.kinds();
        let terminal = kinds
            .iter()
            .position(|k| *k == EventKind::Done)
            .expect("done is emitted");
        let before_terminal = kinds[..terminal]
            .iter()
            .filter(|k| **k == EventKind::PayloadChanged)
            .count();

        assert_eq!(before_terminal, n as usize);
        assert_eq!(recorder.count(&EventKind::PayloadChanged), n as usize);
        assert_eq!(handle.payload(), n);
    }
}

#[tokio::test]
async fn test_async_before_hook() {
    let request = RawRequest::new()
        .payload(2_u32)
        .before(Hook::spawn(|ctx: hookline_runtime::BeforeContext<u32, String>| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let doubled = ctx.payload() * 2;
            ctx.next(doubled);
        }));

    let snapshot = create(Echo).issue(request).unwrap().await.unwrap();

    assert_eq!(snapshot.payload, 4);
    assert_eq!(snapshot.result.as_deref(), Some("400"));
}

#[tokio::test]
async fn test_second_continue_is_ignored() {
    let adapter = ScriptedAdapter::<u32, String>::resolving("ok".to_string());
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&outcomes);

    let request = RawRequest::new().payload(1).before(Hook::new(move |ctx: BeforeContext<u32, String>| {
        let first = ctx.next(2);
        let second = ctx.next(3);
        seen.lock().unwrap().push((first, second));
    }));

    let handle = create(adapter.clone()).prepare(request).unwrap();
    let recorder = EventRecorder::attach(&handle);
    handle.start();
    handle.completion().await.unwrap();

    assert_eq!(*outcomes.lock().unwrap(), vec![(true, false)]);
    assert_eq!(adapter.payloads(), vec![2]);
    assert_eq!(recorder.count(&EventKind::PayloadChanged), 1);
}

#[tokio::test]
async fn test_before_hook_sees_meta() {
    let request = RawRequest::new()
        .payload(1_u32)
        .meta(json!({"tenant": 9}))
        .before(Hook::new(|ctx: BeforeContext<u32, String>| {
            let tenant = ctx.meta()["tenant"].as_u64().unwrap_or(0);
            ctx.next(u32::try_from(tenant).unwrap_or(0));
        }));

    let snapshot = create(Echo).issue(request).unwrap().await.unwrap();
    assert_eq!(snapshot.payload, 9);
}

// ============================================================================
// Adapter Contract
// ============================================================================

#[tokio::test]
async fn test_convert_and_create_state() {
    let handle = create(Echo).prepare(RawRequest::new().payload(3)).unwrap();
    assert_eq!(handle.result().as_deref(), Some("initial"));

    handle.start();
    let snapshot = handle.completion().await.unwrap();

    // convert only shapes what the adapter sees
    assert_eq!(snapshot.payload, 3);
    assert_eq!(snapshot.result.as_deref(), Some("300"));
}

#[tokio::test]
async fn test_adapter_sees_current_result() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let adapter = adapter_fn(move |ctx: AdapterContext<u32, u32>| {
        sink.lock().unwrap().push(ctx.result().copied());
        async move {
            if *ctx.payload() == 0 {
                ctx.reject(7);
            } else {
                ctx.resolve(8);
            }
            Ok(())
        }
    })
    .with_initial_state(1);

    let request = RawRequest::new().payload(0).fail(Hook::new(|ctx: FailContext<u32, u32>| {
        ctx.retry(1);
    }));
    create(adapter).issue(request).unwrap().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Some(1), Some(7)]);
}

#[tokio::test]
async fn test_descriptor_adapter_overrides_client_adapter() {
    let fallback = ScriptedAdapter::<u32, String>::resolving("client".to_string());
    let override_adapter = ScriptedAdapter::<u32, String>::resolving("override".to_string());

    let snapshot = create(fallback.clone())
        .issue(RawRequest::new().payload(1).adapter(override_adapter.clone()))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(snapshot.result.as_deref(), Some("override"));
    assert_eq!(fallback.calls(), 0);
    assert_eq!(override_adapter.calls(), 1);
}

#[tokio::test]
async fn test_normalized_descriptor_is_accepted() {
    let client = create(ScriptedAdapter::<u32, String>::resolving("ok".to_string()));

    let snapshot = client.issue(RequestDescriptor::new(4)).unwrap().await.unwrap();
    assert_eq!(snapshot.payload, 4);
    assert_eq!(snapshot.meta, Value::Null);
}

#[tokio::test]
async fn test_missing_payload_is_rejected() {
    let client = create(ScriptedAdapter::<u32, String>::resolving("ok".to_string()));

    let result = client.issue(RawRequest::new());
    assert!(matches!(result, Err(NormalizeError::MissingPayload)));
}

#[tokio::test]
async fn test_request_ids_are_unique() {
    let client = create(ScriptedAdapter::<u32, String>::resolving("ok".to_string()));

    let first = client.prepare(RawRequest::new().payload(1)).unwrap();
    let second = client.clone().prepare(RawRequest::new().payload(2)).unwrap();

    assert_ne!(first.id(), second.id());
}

// ============================================================================
// Done and Fail Chains
// ============================================================================

#[tokio::test]
async fn test_done_hooks_transform_result() {
    let request = RawRequest::new()
        .payload(1_u32)
        .done(Hook::new(|ctx: DoneContext<u32, String>| {
            ctx.next(format!("{}!", ctx.result()));
        }))
        .done(Hook::new(|ctx: DoneContext<u32, String>| {
            ctx.next(ctx.result().to_uppercase());
        }));

    let snapshot = create(ScriptedAdapter::resolving("ok".to_string()))
        .issue(request)
        .unwrap()
        .await
        .unwrap();

    assert!(snapshot.success);
    assert_eq!(snapshot.result.as_deref(), Some("OK!"));
}

#[tokio::test]
async fn test_done_hook_demotes_to_fail_chain() {
    let fail_hook_ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&fail_hook_ran);

    let request = RawRequest::new()
        .payload(1_u32)
        .done(Hook::new(|ctx: DoneContext<u32, String>| {
            ctx.fail(format!("invalid: {}", ctx.result()));
        }))
        .done(Hook::new(|_| panic!("second done hook must not run")))
        .fail(Hook::new(move |ctx: FailContext<u32, String>| {
            *flag.lock().unwrap() = true;
            ctx.next(ctx.result().clone());
        }));

    let snapshot = create(ScriptedAdapter::resolving("ok".to_string()))
        .issue(request)
        .unwrap()
        .await
        .unwrap();

    assert!(*fail_hook_ran.lock().unwrap());
    assert_eq!(snapshot.status(), RequestStatus::Failed);
    assert_eq!(snapshot.result.as_deref(), Some("invalid: ok"));
}

#[tokio::test]
async fn test_fail_hook_promotes_to_done_chain() {
    let request = RawRequest::new()
        .payload(1_u32)
        .fail(Hook::new(|ctx: FailContext<u32, String>| {
            ctx.done(format!("recovered from {}", ctx.result()));
        }))
        .done(Hook::new(|ctx: DoneContext<u32, String>| {
            ctx.next(format!("[{}]", ctx.result()));
        }));

    let snapshot = create(ScriptedAdapter::rejecting("bad".to_string()))
        .issue(request)
        .unwrap()
        .await
        .unwrap();

    assert!(snapshot.success);
    assert_eq!(snapshot.result.as_deref(), Some("[recovered from bad]"));
}

#[tokio::test]
async fn test_retry_round_trip() {
    let adapter = ScriptedAdapter::<u32, String>::new(
        vec![Outcome::Reject("busy".to_string())],
        Outcome::Resolve("ok".to_string()),
    );
    let request = RawRequest::new().payload(1_u32).fail(Hook::new(|ctx: FailContext<u32, String>| {
        ctx.retry(ctx.payload() + 10);
    }));

    let handle = create(adapter.clone()).prepare(request).unwrap();
    let recorder = EventRecorder::attach(&handle);
    handle.start();
    let snapshot = handle.completion().await.unwrap();

    assert!(snapshot.success);
    assert_eq!(snapshot.payload, 11);
    assert_eq!(adapter.payloads(), vec![1, 11]);
    assert_eq!(recorder.count(&EventKind::Done), 1);
    assert_eq!(recorder.count(&EventKind::Fail), 0);
}

#[tokio::test]
async fn test_retry_runs_before_hooks_again() {
    let adapter = ScriptedAdapter::<u32, String>::new(
        vec![Outcome::Reject("busy".to_string())],
        Outcome::Resolve("ok".to_string()),
    );
    let request = RawRequest::new()
        .payload(1)
        .before(add(1))
        .fail(Hook::new(|ctx: FailContext<u32, String>| {
            ctx.retry(*ctx.payload());
        }));

    let snapshot = create(adapter.clone()).issue(request).unwrap().await.unwrap();

    assert_eq!(adapter.payloads(), vec![2, 3]);
    assert_eq!(snapshot.payload, 3);
}

#[tokio::test]
async fn test_async_fail_hook_retries_with_backoff() {
    let adapter = ScriptedAdapter::<u32, String>::new(
        vec![
            Outcome::Reject("busy".to_string()),
            Outcome::Reject("busy".to_string()),
        ],
        Outcome::Resolve("ok".to_string()),
    );
    let request = RawRequest::new().payload(0).fail(Hook::spawn(
        |ctx: hookline_runtime::FailContext<u32, String>| async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            ctx.retry(ctx.payload() + 1);
        },
    ));

    let snapshot = create(adapter.clone()).issue(request).unwrap().await.unwrap();

    assert!(snapshot.success);
    assert_eq!(adapter.payloads(), vec![0, 1, 2]);
}
