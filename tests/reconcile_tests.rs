//! # Reconcile Tests
//!
//! End-to-end runs of the reconciler against the in-memory object store:
//! - Creation, update and idempotence of synced items
//! - Deletion of listed items
//! - Force-recreate after an update rejected as invalid
//! - Status conditions and counters after success, partial and total failure
//! - Namespace-scoped runs and cancellation

mod common;

use common::*;
use serde_json::json;
use std::sync::atomic::AtomicBool;
use sync_policy_controller::controller::reconciler::status::{
    MESSAGE_NOTHING_SUCCEEDED, REASON_FAILED_WITH_ERROR,
};
use sync_policy_controller::controller::reconciler::{reconcile_policy, RunCounters, RunOutcome};
use sync_policy_controller::controller::store::{
    NamespaceInfo, ObjectStore, Propagation, ResourceKey, StoreCall,
};
use sync_policy_controller::crd::{ConditionStatus, ConditionType, SyncPolicySpec};

fn cm_key(namespace: &str, name: &str) -> ResourceKey {
    ResourceKey::new("v1", "ConfigMap", namespace, name)
}

#[tokio::test]
async fn test_sync_item_created_in_matched_namespace_only() {
    let store = store_with_namespaces(&["ns-a", "ns-b"]);
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![config_map("project-info", json!({"owner": "platform"}))],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    assert!(store.object(&cm_key("ns-a", "project-info")).is_some());
    assert!(store.object(&cm_key("ns-b", "project-info")).is_none());

    let status = result.status.expect("completed run writes status");
    assert_eq!(status.synchronized_item_count, 1);
    assert_eq!(status.failed_item_count, 0);
    assert_eq!(status.deleted_item_count, 0);
    assert_eq!(status.observed_generation, Some(1));
    assert!(status.is_condition_true(ConditionType::Ready));
    assert!(status.condition(ConditionType::Errored).is_none());
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let store = store_with_namespaces(&["ns-a"]);
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![config_map("project-info", json!({"owner": "platform"}))],
        ..Default::default()
    });
    let cancel = AtomicBool::new(false);

    let first = reconcile_policy(&store, &policy, None, &cancel).await;
    let after_first = store.object(&cm_key("ns-a", "project-info")).unwrap();
    let second = reconcile_policy(&store, &policy, None, &cancel).await;
    let after_second = store.object(&cm_key("ns-a", "project-info")).unwrap();

    assert_eq!(first.status.unwrap().failed_item_count, 0);
    assert_eq!(second.status.unwrap().failed_item_count, 0);
    assert_eq!(after_first["data"], after_second["data"]);
    assert_eq!(after_first["metadata"]["uid"], after_second["metadata"]["uid"]);
    assert_eq!(
        store.calls(),
        vec![
            StoreCall::Create(cm_key("ns-a", "project-info")),
            StoreCall::Create(cm_key("ns-a", "project-info")),
            StoreCall::Replace(cm_key("ns-a", "project-info")),
        ]
    );
}

#[tokio::test]
async fn test_update_converges_changed_content() {
    let store = store_with_namespaces(&["ns-a"]);
    store
        .insert_object(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "project-info", "namespace": "ns-a", "labels": {"stale": "yes"}},
            "data": {"owner": "someone-else"},
        }))
        .unwrap();
    let before = store.object(&cm_key("ns-a", "project-info")).unwrap();

    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![config_map("project-info", json!({"owner": "platform"}))],
        ..Default::default()
    });
    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    let after = store.object(&cm_key("ns-a", "project-info")).unwrap();
    assert_eq!(after["data"]["owner"], "platform");
    assert_eq!(after["metadata"]["uid"], before["metadata"]["uid"]);
    assert_eq!(
        after["metadata"]["creationTimestamp"],
        before["metadata"]["creationTimestamp"]
    );
    assert_eq!(result.status.unwrap().synchronized_item_count, 1);
}

#[tokio::test]
async fn test_placeholder_replaced_with_namespace_name() {
    let store = store_with_namespaces(&["team-a", "team-b"]);
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["team-.*"]),
        sync_items: vec![config_map(
            "${PROJECT_NAME}-info",
            json!({"project": "${PROJECT_NAME}", "url": "https://${PROJECT_NAME}.example.com"}),
        )],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;
    assert_eq!(result.status.unwrap().synchronized_item_count, 2);

    for namespace in ["team-a", "team-b"] {
        let object = store
            .object(&cm_key(namespace, &format!("{namespace}-info")))
            .unwrap();
        assert_eq!(object["data"]["project"], namespace);
        assert_eq!(
            object["data"]["url"],
            format!("https://{namespace}.example.com")
        );
    }
}

#[tokio::test]
async fn test_delete_item_removes_existing_resource() {
    let store = store_with_namespaces(&["ns-a"]);
    store
        .insert_object(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "legacy-token", "namespace": "ns-a"},
        }))
        .unwrap();

    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        delete_items: vec![delete_ref("Secret", "legacy-token")],
        ..Default::default()
    });
    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    let key = ResourceKey::new("v1", "Secret", "ns-a", "legacy-token");
    assert!(store.object(&key).is_none());
    assert_eq!(
        store.calls(),
        vec![StoreCall::Delete(key, Propagation::Background)]
    );
    let status = result.status.unwrap();
    assert_eq!(status.deleted_item_count, 1);
    assert!(status.is_condition_true(ConditionType::Ready));
}

#[tokio::test]
async fn test_delete_of_absent_resource_is_not_counted() {
    let store = store_with_namespaces(&["ns-a"]);
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        delete_items: vec![delete_ref("Secret", "never-existed")],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    let status = result.status.unwrap();
    assert_eq!(status.deleted_item_count, 0);
    assert_eq!(status.failed_item_count, 0);
    assert!(status.is_condition_true(ConditionType::Ready));
}

#[tokio::test]
async fn test_deletes_run_before_syncs() {
    let store = store_with_namespaces(&["ns-a"]);
    store
        .insert_object(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "project-info", "namespace": "ns-a"},
        }))
        .unwrap();

    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![config_map("project-info", json!({"v": "2"}))],
        delete_items: vec![delete_ref("ConfigMap", "project-info")],
        ..Default::default()
    });
    reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    let key = cm_key("ns-a", "project-info");
    assert_eq!(
        store.calls(),
        vec![
            StoreCall::Delete(key.clone(), Propagation::Background),
            StoreCall::Create(key.clone()),
        ]
    );
    assert_eq!(store.object(&key).unwrap()["data"]["v"], "2");
}

#[tokio::test]
async fn test_force_recreate_after_invalid_update() {
    let store = store_with_namespaces(&["ns-a"]);
    store
        .insert_object(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "project-info", "namespace": "ns-a"},
            "data": {"owner": "old"},
        }))
        .unwrap();
    store.reject_replace_as_invalid("ConfigMap", "project-info");
    let key = cm_key("ns-a", "project-info");
    let old_uid = store.object(&key).unwrap()["metadata"]["uid"].clone();

    let policy = policy(SyncPolicySpec {
        force_recreate: true,
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![config_map("project-info", json!({"owner": "platform"}))],
        ..Default::default()
    });
    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    assert_eq!(
        store.calls(),
        vec![
            StoreCall::Create(key.clone()),
            StoreCall::Replace(key.clone()),
            StoreCall::Delete(key.clone(), Propagation::Foreground),
            StoreCall::Create(key.clone()),
        ]
    );
    let recreated = store.object(&key).unwrap();
    assert_eq!(recreated["data"]["owner"], "platform");
    assert_ne!(recreated["metadata"]["uid"], old_uid);

    let status = result.status.unwrap();
    assert_eq!(status.synchronized_item_count, 1);
    assert_eq!(status.failed_item_count, 0);
}

#[tokio::test]
async fn test_invalid_update_without_force_recreate_fails_item() {
    let store = store_with_namespaces(&["ns-a"]);
    store
        .insert_object(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "project-info", "namespace": "ns-a"},
            "data": {"owner": "old"},
        }))
        .unwrap();
    store.reject_replace_as_invalid("ConfigMap", "project-info");

    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![config_map("project-info", json!({"owner": "platform"}))],
        ..Default::default()
    });
    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    let key = cm_key("ns-a", "project-info");
    assert_eq!(store.object(&key).unwrap()["data"]["owner"], "old");
    assert!(!store
        .calls()
        .iter()
        .any(|call| matches!(call, StoreCall::Delete(..))));
    assert_eq!(result.status.unwrap().failed_item_count, 1);
}

#[tokio::test]
async fn test_all_items_failing_marks_policy_errored() {
    let store = store_with_namespaces(&["ns-a"]);
    store.fail_create("ConfigMap", "project-info");

    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });
    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    let status = result.status.unwrap();
    assert_eq!(status.failed_item_count, 1);
    assert_eq!(status.synchronized_item_count, 0);
    let ready = status.condition(ConditionType::Ready).unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    let errored = status.condition(ConditionType::Errored).unwrap();
    assert_eq!(errored.status, ConditionStatus::True);
    assert_eq!(errored.reason.as_deref(), Some(REASON_FAILED_WITH_ERROR));
    assert_eq!(errored.message.as_deref(), Some(MESSAGE_NOTHING_SUCCEEDED));
}

#[tokio::test]
async fn test_partial_failure_keeps_policy_ready() {
    let store = store_with_namespaces(&["ns-a"]);
    store.fail_create("ConfigMap", "broken");

    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![
            config_map("broken", json!({})),
            config_map("project-info", json!({})),
        ],
        ..Default::default()
    });
    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    let status = result.status.unwrap();
    assert_eq!(status.failed_item_count, 1);
    assert_eq!(status.synchronized_item_count, 1);
    assert!(status.is_condition_true(ConditionType::Ready));
    assert!(status.condition(ConditionType::Errored).is_none());
}

#[tokio::test]
async fn test_recovery_clears_errored_condition() {
    let store = store_with_namespaces(&["ns-a"]);
    store.fail_create("ConfigMap", "project-info");
    let mut policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });
    let cancel = AtomicBool::new(false);

    let failed = reconcile_policy(&store, &policy, None, &cancel).await;
    policy.status = failed.status;
    assert!(policy
        .status
        .as_ref()
        .unwrap()
        .condition(ConditionType::Errored)
        .is_some());

    // The fault only applies to the store it was injected into
    let healthy = store_with_namespaces(&["ns-a"]);
    let recovered = reconcile_policy(&healthy, &policy, None, &cancel).await;
    let status = recovered.status.unwrap();
    assert!(status.is_condition_true(ConditionType::Ready));
    assert!(status.condition(ConditionType::Errored).is_none());
    assert_eq!(status.failed_item_count, 0);
}

#[tokio::test]
async fn test_manifest_without_name_is_counted_as_failed() {
    let store = store_with_namespaces(&["ns-a"]);
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![
            serde_json::from_value(json!({"apiVersion": "v1", "kind": "ConfigMap"})).unwrap(),
            config_map("project-info", json!({})),
        ],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    let status = result.status.unwrap();
    assert_eq!(status.failed_item_count, 1);
    assert_eq!(status.synchronized_item_count, 1);
}

#[tokio::test]
async fn test_delete_failure_counts_as_failed() {
    let store = store_with_namespaces(&["ns-a"]);
    store
        .insert_object(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "legacy-token", "namespace": "ns-a"},
        }))
        .unwrap();
    store.fail_delete("Secret", "legacy-token");

    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        delete_items: vec![delete_ref("Secret", "legacy-token")],
        ..Default::default()
    });
    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    let status = result.status.unwrap();
    assert_eq!(status.failed_item_count, 1);
    assert_eq!(status.deleted_item_count, 0);
    assert!(!status.is_condition_true(ConditionType::Ready));
}

#[tokio::test]
async fn test_invalid_policy_sets_invalid_condition_without_side_effects() {
    let store = store_with_namespaces(&["ns-a"]);
    let policy = policy(SyncPolicySpec {
        namespace_selector: None,
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    assert!(matches!(result.outcome, RunOutcome::Invalid(_)));
    assert!(store.calls().is_empty());
    let status = result.status.unwrap();
    let invalid = status.condition(ConditionType::Invalid).unwrap();
    assert_eq!(invalid.status, ConditionStatus::True);
    assert!(invalid
        .message
        .as_deref()
        .unwrap_or_default()
        .contains("namespaceSelector"));
    assert!(!status.is_condition_true(ConditionType::Ready));
}

#[tokio::test]
async fn test_fixed_policy_flips_invalid_to_false() {
    let store = store_with_namespaces(&["ns-a"]);
    let mut policy = policy(SyncPolicySpec {
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });
    let cancel = AtomicBool::new(false);
    policy.status = reconcile_policy(&store, &policy, None, &cancel).await.status;

    policy.spec.namespace_selector = match_names(&["ns-a"]);
    policy.metadata.generation = Some(2);
    let status = reconcile_policy(&store, &policy, None, &cancel)
        .await
        .status
        .unwrap();

    assert_eq!(
        status.condition(ConditionType::Invalid).unwrap().status,
        ConditionStatus::False
    );
    assert!(status.is_condition_true(ConditionType::Ready));
    assert_eq!(status.observed_generation, Some(2));
}

#[tokio::test]
async fn test_namespace_fetch_failure_leaves_status_untouched() {
    let store = store_with_namespaces(&["ns-a"]);
    store.fail_namespace_list(Some("connection refused"));
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    assert!(matches!(result.outcome, RunOutcome::NamespaceFetchFailed(_)));
    assert!(result.status.is_none());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_scoped_run_only_touches_scoped_namespace() {
    let store = store_with_namespaces(&["ns-a", "ns-b"]);
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-.*"]),
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, Some("ns-b"), &AtomicBool::new(false)).await;

    assert!(store.object(&cm_key("ns-b", "project-info")).is_some());
    assert!(store.object(&cm_key("ns-a", "project-info")).is_none());
    assert!(matches!(
        result.outcome,
        RunOutcome::Completed { namespaces: 1, .. }
    ));
    assert!(result.status.is_none());
}

#[tokio::test]
async fn test_scoped_run_still_applies_selector() {
    let store = store_with_namespaces(&["ns-a", "other"]);
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-.*"]),
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, Some("other"), &AtomicBool::new(false)).await;

    assert!(store.calls().is_empty());
    assert!(matches!(
        result.outcome,
        RunOutcome::Completed { namespaces: 0, .. }
    ));
}

#[tokio::test]
async fn test_scoped_run_keeps_full_run_status() {
    let store = store_with_namespaces(&["ns-a", "other"]);
    store.fail_create("ConfigMap", "project-info");
    let mut policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-.*"]),
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });
    let cancel = AtomicBool::new(false);

    policy.status = reconcile_policy(&store, &policy, None, &cancel).await.status;
    let full = policy.status.clone().unwrap();
    assert!(!full.is_condition_true(ConditionType::Ready));
    assert!(full.is_condition_true(ConditionType::Errored));
    assert_eq!(full.failed_item_count, 1);

    // A namespace the policy does not select
    let unrelated = reconcile_policy(&store, &policy, Some("other"), &cancel).await;
    assert!(matches!(
        unrelated.outcome,
        RunOutcome::Completed { namespaces: 0, .. }
    ));
    assert!(unrelated.status.is_none());

    // A selected namespace still gets its side effects but no status
    let selected = reconcile_policy(&store, &policy, Some("ns-a"), &cancel).await;
    assert!(matches!(
        selected.outcome,
        RunOutcome::Completed {
            namespaces: 1,
            counters: RunCounters { failed: 1, .. }
        }
    ));
    assert!(selected.status.is_none());
}

#[tokio::test]
async fn test_scoped_run_of_invalid_policy_writes_no_status() {
    let store = store_with_namespaces(&["ns-a"]);
    let policy = policy(SyncPolicySpec {
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, Some("ns-a"), &AtomicBool::new(false)).await;

    assert!(matches!(result.outcome, RunOutcome::Invalid(_)));
    assert!(result.status.is_none());
}

#[tokio::test]
async fn test_terminating_namespace_is_skipped() {
    let store = store_with_namespaces(&["ns-a"]);
    store.insert_namespace(NamespaceInfo::active("ns-b").with_phase("Terminating"));
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-.*"]),
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    assert!(store.object(&cm_key("ns-b", "project-info")).is_none());
    assert_eq!(result.status.unwrap().synchronized_item_count, 1);
}

#[tokio::test]
async fn test_cancelled_run_stops_and_writes_no_status() {
    let store = store_with_namespaces(&["ns-a", "ns-b"]);
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-.*"]),
        sync_items: vec![config_map("project-info", json!({}))],
        ..Default::default()
    });

    let result = reconcile_policy(&store, &policy, None, &AtomicBool::new(true)).await;

    assert!(matches!(
        result.outcome,
        RunOutcome::Cancelled(RunCounters {
            synced: 0,
            deleted: 0,
            failed: 0
        })
    ));
    assert!(result.status.is_none());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_store_view_after_run_matches_desired_manifest() {
    let store = store_with_namespaces(&["ns-a"]);
    let policy = policy(SyncPolicySpec {
        namespace_selector: match_names(&["ns-a"]),
        sync_items: vec![config_map("project-info", json!({"a": "1", "b": "2"}))],
        ..Default::default()
    });
    reconcile_policy(&store, &policy, None, &AtomicBool::new(false)).await;

    let stored = store.get(&cm_key("ns-a", "project-info")).await.unwrap();
    assert_eq!(stored["data"], json!({"a": "1", "b": "2"}));
    assert_eq!(stored["metadata"]["namespace"], "ns-a");
}
