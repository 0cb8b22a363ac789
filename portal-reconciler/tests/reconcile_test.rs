//! End-to-end reconcile cycles against scripted and file-backed remotes.

use std::sync::Arc;
use std::time::Duration;

use portal_reconciler::clients::{CurrentSource, FileOrderStore};
use portal_reconciler::reconciler::{Phase, PhaseOutcome};
use portal_reconciler::resources::{AddressPolicy, TechnicalUser};
use portal_reconciler::test_util::{Call, ScriptedRemote};
use portal_reconciler::{
    Collection, FieldValue, Identity, ReconcileError, Reconciler, ReconcilerConfig, RemoteError,
    Violation,
};

const ORDER: &str = "order-42";

fn policy(name: &str, full: &str) -> AddressPolicy {
    AddressPolicy::new("DC", name, full, "10Mb")
}

#[tokio::test]
async fn test_create_update_and_delete_in_one_cycle() {
    let current = Collection::new(vec![policy("x", "FAIL"), policy("y", "FAIL")]);
    let remote = ScriptedRemote::new().with_current(ORDER, current);
    let reconciler = Reconciler::new(remote, ReconcilerConfig::default());

    let desired = Collection::new(vec![policy("x", "BLOCK"), policy("z", "PAGE")]);
    let result = reconciler.reconcile(ORDER, &desired).await.unwrap();

    assert!(result.is_converged());
    let calls = reconciler.client().mutating_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], Call::Create(vec![Identity::new("DC.z")]));
    match &calls[1] {
        Call::Update(identity, changes) => {
            assert_eq!(identity, &Identity::new("DC.x"));
            assert_eq!(
                changes.changed.get("address_full_policy"),
                Some(&FieldValue::from("BLOCK"))
            );
            assert_eq!(changes.changed.len(), 1);
        }
        other => panic!("expected update, got {:?}", other),
    }
    assert_eq!(calls[2], Call::Delete(vec![Identity::new("DC.y")]));
}

#[tokio::test]
async fn test_partial_failure_reruns_only_failed_create() {
    let current = Collection::new(vec![policy("b", "FAIL"), policy("c", "FAIL")]);
    let remote = ScriptedRemote::new().with_current(ORDER, current.clone());
    remote.fail_create(RemoteError::rejected("address quota exceeded"));
    let reconciler = Reconciler::new(remote, ReconcilerConfig::default());

    let desired = Collection::new(vec![policy("a", "FAIL"), policy("b", "BLOCK")]);
    let result = reconciler.reconcile(ORDER, &desired).await.unwrap();

    assert_eq!(result.outcome(Phase::Create), Some(PhaseOutcome::Failed));
    assert_eq!(result.outcome(Phase::Update), Some(PhaseOutcome::Done));
    assert_eq!(result.outcome(Phase::Delete), Some(PhaseOutcome::Done));

    let partial = result.partial_error().unwrap();
    assert_eq!(partial.failures.len(), 1);
    assert_eq!(partial.failures[0].identities, vec![Identity::new("DC.a")]);
    assert_eq!(
        partial.converged,
        vec![Identity::new("DC.b"), Identity::new("DC.c")]
    );

    // Record what the remote confirmed, then retry once it recovers.
    let client = reconciler.client();
    client.set_current(ORDER, result.confirmed(&current));
    client.heal();
    let before = client.mutating_calls().len();

    let rerun = reconciler.reconcile(ORDER, &desired).await.unwrap();
    assert!(rerun.is_converged());
    assert_eq!(
        client.mutating_calls()[before..],
        [Call::Create(vec![Identity::new("DC.a")])]
    );
}

#[tokio::test]
async fn test_immutable_change_blocks_whole_collection() {
    let current = Collection::new(vec![policy("x", "FAIL"), policy("y", "FAIL")]);
    let remote = ScriptedRemote::new().with_current(ORDER, current);
    let reconciler = Reconciler::new(remote, ReconcilerConfig::default());

    // DC.y alone would be a valid update; nothing is sent.
    let desired = Collection::new(vec![
        policy("x", "FAIL").with_routing_type("MULTICAST"),
        policy("y", "BLOCK"),
    ]);
    let err = reconciler.reconcile(ORDER, &desired).await.unwrap_err();

    let ReconcileError::Validation(e) = err else {
        panic!("expected validation error");
    };
    assert_eq!(e.violations.len(), 1);
    assert!(matches!(
        &e.violations[0],
        Violation::ImmutableField { field: "routing_type", .. }
    ));
    assert!(reconciler.client().mutating_calls().is_empty());
}

#[tokio::test]
async fn test_duplicate_identity_rejected_without_remote_calls() {
    let remote = ScriptedRemote::<AddressPolicy>::new();
    let reconciler = Reconciler::new(remote, ReconcilerConfig::default());

    let desired = Collection::new(vec![
        policy("foo", "FAIL"),
        policy("bar", "FAIL"),
        policy("foo", "BLOCK"),
    ]);
    let err = reconciler.reconcile(ORDER, &desired).await.unwrap_err();

    let ReconcileError::Validation(e) = err else {
        panic!("expected validation error");
    };
    assert_eq!(
        e.violations,
        vec![Violation::DuplicateIdentity {
            identity: Identity::new("DC.foo"),
            positions: vec![0, 2],
        }]
    );
    assert!(reconciler.client().mutating_calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cycles_for_one_order_are_serialized() {
    let remote = ScriptedRemote::<TechnicalUser>::new().with_fetch_delay(Duration::from_millis(20));
    let reconciler = Arc::new(Reconciler::new(remote, ReconcilerConfig::default()));

    let mut handles = Vec::new();
    for i in 0..4 {
        let reconciler = reconciler.clone();
        handles.push(tokio::spawn(async move {
            let desired = Collection::new(vec![TechnicalUser::new(&format!("svc-{}", i))]);
            reconciler.reconcile(ORDER, &desired).await.map(|r| r.is_converged())
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    // No other cycle fetches between a fetch and its create.
    let calls = reconciler.client().calls();
    assert_eq!(calls.len(), 8);
    for pair in calls.chunks(2) {
        assert!(matches!(pair[0], Call::Fetch(_)), "{:?}", calls);
        assert!(matches!(pair[1], Call::Create(_)), "{:?}", calls);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cycles_for_different_orders_overlap() {
    let remote = ScriptedRemote::<TechnicalUser>::new().with_fetch_delay(Duration::from_millis(100));
    let reconciler = Arc::new(Reconciler::new(remote, ReconcilerConfig::default()));

    let mut handles = Vec::new();
    for order in ["order-a", "order-b"] {
        let reconciler = reconciler.clone();
        handles.push(tokio::spawn(async move {
            let desired = Collection::new(vec![TechnicalUser::new("svc")]);
            reconciler.reconcile(order, &desired).await.map(|r| r.is_converged())
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    let calls = reconciler.client().calls();
    assert!(matches!(calls[0], Call::Fetch(_)), "{:?}", calls);
    assert!(matches!(calls[1], Call::Fetch(_)), "{:?}", calls);
}

#[tokio::test]
async fn test_file_store_converges_and_stays_converged() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("orders.json");

    let reconciler = Reconciler::new(
        FileOrderStore::<TechnicalUser>::new(&path),
        ReconcilerConfig::default(),
    );

    let first = Collection::new(vec![
        TechnicalUser::new("svc-reader").with_read(&["DC.a", "DC.b"]),
        TechnicalUser::new("svc-writer").with_write(&["DC.a"]),
    ]);
    assert!(reconciler.reconcile(ORDER, &first).await.unwrap().is_converged());

    let second = Collection::new(vec![
        TechnicalUser::new("svc-reader").with_read(&["DC.b", "DC.a", "DC.c"]),
    ]);
    let result = reconciler.reconcile(ORDER, &second).await.unwrap();
    assert!(result.is_converged());
    assert_eq!(result.updated.len(), 1);
    assert_eq!(result.deleted, vec![Identity::new("svc-writer")]);

    let stored = reconciler.client().fetch_current(ORDER).await.unwrap();
    assert_eq!(stored.len(), 1);

    // A reordered permission list is not a change.
    let third = Collection::new(vec![
        TechnicalUser::new("svc-reader").with_read(&["DC.c", "DC.b", "DC.a"]),
    ]);
    let result = reconciler.reconcile(ORDER, &third).await.unwrap();
    assert!(result.is_converged());
    assert!(result.converged().is_empty());
}
