//! Reconciliation and message handling against mock collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loadbalancer_manager::dataplane::DataPlaneError;
use loadbalancer_manager::events::{
    Acker, BrokerError, ChangeEvent, ChangeMessage, EventType, FailureClass, MemoryConnection, Subscriber,
};
use loadbalancer_manager::inventory::InventoryError;
use loadbalancer_manager::lifecycle::ReadinessError;
use loadbalancer_manager::manager::{Manager, ManagerError, ProcessError, ReconcileError};
use tokio_util::sync::CancellationToken;

mod common;

use common::{base_config_path, example_load_balancer, expected_config, MockDataPlane, MockInventory, MANAGED_LB_ID};

struct NoopAcker;

#[async_trait::async_trait]
impl Acker for NoopAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn nak(&self, _delay: Duration) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn term(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

fn event(payload: Vec<u8>) -> ChangeEvent {
    ChangeEvent::new("load-balancer", payload, Box::new(NoopAcker))
}

fn change_event(msg: &ChangeMessage) -> ChangeEvent {
    event(serde_json::to_vec(msg).unwrap())
}

fn manager(dataplane: &Arc<MockDataPlane>, inventory: &Arc<MockInventory>) -> Manager {
    Manager::new(MANAGED_LB_ID, base_config_path())
        .with_dataplane(dataplane.clone())
        .with_inventory(inventory.clone())
        .with_readiness(3, Duration::from_millis(1))
}

#[tokio::test]
async fn test_update_config_to_latest() {
    let dataplane = Arc::new(MockDataPlane::healthy());
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = manager(&dataplane, &inventory);

    mgr.update_config_to_latest().await.unwrap();

    let current = mgr.current_config().unwrap();
    assert_eq!(current.trim(), expected_config("lb-ex-1-exp.cfg").trim());
    assert_eq!(dataplane.calls(), (0, 1, 1));
    assert_eq!(dataplane.posted.lock().unwrap().as_slice(), &[current.to_string()]);
    assert_eq!(inventory.calls(), 1);
}

#[tokio::test]
async fn test_repeated_reconciliation_is_identical() {
    let dataplane = Arc::new(MockDataPlane::healthy());
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = manager(&dataplane, &inventory);

    mgr.update_config_to_latest().await.unwrap();
    mgr.update_config_to_latest().await.unwrap();

    let posted = dataplane.posted.lock().unwrap();
    assert_eq!(posted.len(), 2);
    assert_eq!(posted[0], posted[1]);
}

#[tokio::test]
async fn test_fetch_failure_keeps_previous_snapshot() {
    let fail = Arc::new(AtomicBool::new(false));
    let dataplane = Arc::new(MockDataPlane::healthy());
    let inventory = Arc::new(MockInventory::new({
        let fail = fail.clone();
        move || {
            if fail.load(Ordering::SeqCst) {
                Err(InventoryError::NotFound)
            } else {
                Ok(example_load_balancer())
            }
        }
    }));
    let mgr = manager(&dataplane, &inventory);

    mgr.update_config_to_latest().await.unwrap();
    let before = mgr.current_config().unwrap();

    fail.store(true, Ordering::SeqCst);
    let err = mgr.update_config_to_latest().await.unwrap_err();
    assert!(matches!(err, ReconcileError::Inventory(InventoryError::NotFound)));
    assert_eq!(err.class(), FailureClass::Retryable);

    assert_eq!(mgr.current_config().unwrap(), before);
    assert_eq!(dataplane.calls(), (0, 1, 1));
}

#[tokio::test]
async fn test_invalid_document_is_not_applied() {
    let dataplane = Arc::new(
        MockDataPlane::healthy().with_check(|| Err(DataPlaneError::ConfigInvalid("unknown keyword".to_string()))),
    );
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = manager(&dataplane, &inventory);

    let err = mgr.update_config_to_latest().await.unwrap_err();
    assert!(matches!(err, ReconcileError::Validate(DataPlaneError::ConfigInvalid(_))));
    assert_eq!(err.class(), FailureClass::Permanent);
    assert_eq!(dataplane.calls(), (0, 1, 0));
    assert!(mgr.current_config().is_none());
}

#[tokio::test]
async fn test_apply_failure_is_retryable() {
    let dataplane = Arc::new(MockDataPlane::healthy().with_post(|| Err(DataPlaneError::Unauthorized)));
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = manager(&dataplane, &inventory);

    let err = mgr.update_config_to_latest().await.unwrap_err();
    assert!(matches!(err, ReconcileError::Apply(DataPlaneError::Unauthorized)));
    assert_eq!(err.class(), FailureClass::Retryable);
    assert!(mgr.current_config().is_none());
}

#[tokio::test]
async fn test_missing_template_is_fatal() {
    let dataplane = Arc::new(MockDataPlane::healthy());
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = Manager::new(MANAGED_LB_ID, "/nonexistent/haproxy.cfg")
        .with_dataplane(dataplane.clone())
        .with_inventory(inventory.clone());

    let err = mgr.update_config_to_latest().await.unwrap_err();
    assert!(matches!(err, ReconcileError::Template(_)));
    assert_eq!(err.class(), FailureClass::Fatal);
    assert_eq!(inventory.calls(), 0);
}

#[tokio::test]
async fn test_empty_managed_id() {
    let dataplane = Arc::new(MockDataPlane::healthy());
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = Manager::new("", base_config_path())
        .with_dataplane(dataplane)
        .with_inventory(inventory.clone());

    let err = mgr.update_config_to_latest().await.unwrap_err();
    assert!(matches!(err, ReconcileError::MissingLoadBalancerId));
    assert_eq!(inventory.calls(), 0);
}

#[tokio::test]
async fn test_missing_collaborators() {
    let mgr = Manager::new(MANAGED_LB_ID, base_config_path());
    let err = mgr.update_config_to_latest().await.unwrap_err();
    assert!(matches!(err, ReconcileError::MissingCollaborator(_)));

    let mgr = Arc::new(mgr.with_dataplane(Arc::new(MockDataPlane::healthy())));
    let mut subscriber = Subscriber::new(Arc::new(MemoryConnection::new()), CancellationToken::new());
    let err = mgr.run(&mut subscriber).await.unwrap_err();
    assert!(matches!(err, ManagerError::MissingCollaborator("inventory client")));
}

#[tokio::test]
async fn test_cancelled_before_fetch() {
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let dataplane = Arc::new(MockDataPlane::healthy());
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = manager(&dataplane, &inventory).with_shutdown(shutdown);

    let err = mgr.update_config_to_latest().await.unwrap_err();
    assert!(matches!(err, ReconcileError::Cancelled));
    assert_eq!(inventory.calls(), 0);
    assert_eq!(dataplane.calls(), (0, 0, 0));
}

#[tokio::test]
async fn test_process_msg_filtering() {
    let cases = [
        ("targeted subject", ChangeMessage::new(MANAGED_LB_ID, EventType::Update), 1),
        (
            "targeted additional subject",
            ChangeMessage::new("loadprt-abc", EventType::Create).with_additional_subjects([MANAGED_LB_ID]),
            1,
        ),
        (
            "other load balancer",
            ChangeMessage::new("loadprt-abc", EventType::Update).with_additional_subjects(["loadbal-other"]),
            0,
        ),
        (
            "no load balancer",
            ChangeMessage::new("loadprt-abc", EventType::Delete).with_additional_subjects(["loadpol-xyz"]),
            0,
        ),
        (
            "unrelated event type",
            ChangeMessage::new(MANAGED_LB_ID, EventType::Other("audit".to_string())),
            0,
        ),
    ];

    for (name, msg, reconciliations) in cases {
        let dataplane = Arc::new(MockDataPlane::healthy());
        let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
        let mgr = manager(&dataplane, &inventory);

        mgr.process_msg(&change_event(&msg)).await.unwrap();

        assert_eq!(inventory.calls(), reconciliations, "{name}");
        assert_eq!(dataplane.calls(), (0, reconciliations, reconciliations), "{name}");
    }
}

#[tokio::test]
async fn test_process_msg_malformed_payload() {
    let dataplane = Arc::new(MockDataPlane::healthy());
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = manager(&dataplane, &inventory);

    let err = mgr.process_msg(&event(b"not json".to_vec())).await.unwrap_err();
    assert!(matches!(err, ProcessError::Decode(_)));
    assert_eq!(err.class(), FailureClass::Permanent);
    assert_eq!(inventory.calls(), 0);
}

#[tokio::test]
async fn test_process_msg_ambiguous_target() {
    let dataplane = Arc::new(MockDataPlane::healthy());
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = manager(&dataplane, &inventory);

    let msg = ChangeMessage::new("loadprt-abc", EventType::Update)
        .with_additional_subjects([MANAGED_LB_ID, "loadbal-other"]);
    let err = mgr.process_msg(&change_event(&msg)).await.unwrap_err();

    match &err {
        ProcessError::AmbiguousTarget { ids } => {
            assert_eq!(ids, &vec!["loadbal-other".to_string(), MANAGED_LB_ID.to_string()]);
        }
        other => panic!("expected ambiguous target, got {other:?}"),
    }
    assert_eq!(err.class(), FailureClass::Permanent);
    assert_eq!(inventory.calls(), 0);

    // the same id repeated is not ambiguous
    let msg = ChangeMessage::new(MANAGED_LB_ID, EventType::Update).with_additional_subjects([MANAGED_LB_ID]);
    mgr.process_msg(&change_event(&msg)).await.unwrap();
    assert_eq!(inventory.calls(), 1);
}

#[tokio::test]
async fn test_process_msg_propagates_reconcile_failure() {
    let dataplane = Arc::new(MockDataPlane::healthy());
    let inventory = Arc::new(MockInventory::new(|| Err(InventoryError::Unauthorized)));
    let mgr = manager(&dataplane, &inventory);

    let msg = ChangeMessage::new(MANAGED_LB_ID, EventType::Update);
    let err = mgr.process_msg(&change_event(&msg)).await.unwrap_err();

    assert!(matches!(err, ProcessError::Reconcile(ReconcileError::Inventory(InventoryError::Unauthorized))));
    assert_eq!(err.class(), FailureClass::Retryable);
}

#[tokio::test]
async fn test_run_stops_when_dataplane_never_ready() {
    let dataplane = Arc::new(MockDataPlane::healthy().with_ready(|| false));
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = Arc::new(manager(&dataplane, &inventory));

    let conn = MemoryConnection::new();
    let mut subscriber = Subscriber::new(Arc::new(conn.clone()), CancellationToken::new());
    subscriber.subscribe("load-balancer").await.unwrap();

    let err = mgr.run(&mut subscriber).await.unwrap_err();
    assert!(matches!(
        err,
        ManagerError::Readiness(ReadinessError::NotReady { attempts: 3 })
    ));
    assert_eq!(dataplane.calls(), (3, 0, 0));
    assert_eq!(inventory.calls(), 0);
    // nothing consumed the subscription
    assert_eq!(subscriber.topics().count(), 1);
}

#[tokio::test]
async fn test_run_returns_when_cancelled_before_ready() {
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let dataplane = Arc::new(MockDataPlane::healthy().with_ready(|| false));
    let inventory = Arc::new(MockInventory::returning(example_load_balancer()));
    let mgr = Arc::new(manager(&dataplane, &inventory).with_shutdown(shutdown.clone()));

    let mut subscriber = Subscriber::new(Arc::new(MemoryConnection::new()), shutdown);
    mgr.run(&mut subscriber).await.unwrap();
    assert_eq!(inventory.calls(), 0);
}
