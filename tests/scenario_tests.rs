//! End-to-end scenarios against the public facade surface, one per
//! concrete case spelled out for this store (create-cluster happy path,
//! terminal reconcile, double-delete, rekey-on-read, ambiguous result,
//! lock contention).
use hcp_resource_store::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const CLUSTER_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourcegroups/RG/providers/Microsoft.RedHatOpenShift/hcpopenshiftclusters/C";
const SUB: &str = "00000000-0000-0000-0000-000000000000";

fn epoch() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(0, 0).unwrap()
}

fn bare_cluster(resource_id: ResourceId) -> ClusterDoc {
    ClusterDoc::new(ResourceDocument {
        resource_id,
        internal_id: String::new(),
        active_operation_id: String::new(),
        provisioning_state: ProvisioningState::Accepted,
        identity: Default::default(),
        system_data: json!({}),
        tags: BTreeMap::new(),
        internal_state: json!({}),
        location: "eastus".to_string(),
        etag: None,
        ts: None,
    })
}

/// Create-cluster happy path.
#[tokio::test]
async fn create_cluster_happy_path() {
    let container: Arc<dyn ContainerClient> = Arc::new(InMemoryContainer::new());
    let db = DbClient::new(container.clone());
    let clusters = db.hcp_clusters();
    let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();

    let lifecycle = OperationLifecycle::new(container.clone());

    let op = lifecycle.allocate(
        SUB,
        "Microsoft.RedHatOpenShift",
        "hcpOperationStatuses",
        &resource_id,
        OperationRequest::Create,
        "tenant-1",
        "client-1",
        "client-req-1",
        "corr-1",
        None,
        epoch(),
    );
    assert_eq!(op.status, ProvisioningState::Accepted);
    container
        .create(&op.operation_id.partition_key(), op.encode())
        .await
        .unwrap();

    let mut doc = bare_cluster(resource_id.clone());
    doc.0.active_operation_id = op.operation_id.name().to_string();
    clusters.create(&doc).await.unwrap();

    let fetched = clusters.get(&resource_id).await.unwrap();
    assert_eq!(fetched.0.resource_id.cosmos_id(), resource_id.cosmos_id());
    assert_eq!(
        fetched.0.active_operation_id,
        op.operation_id.name().to_string()
    );
}

/// Terminal reconcile clears `activeOperationID` and sets the
/// resource's provisioning state to the operation's terminal status.
#[tokio::test]
async fn terminal_reconcile_clears_active_operation() {
    let container: Arc<dyn ContainerClient> = Arc::new(InMemoryContainer::new());
    let db = DbClient::new(container.clone());
    let lifecycle = OperationLifecycle::new(container.clone());
    let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();

    let op = lifecycle.allocate(
        SUB, "Microsoft.RedHatOpenShift", "hcpOperationStatuses", &resource_id,
        OperationRequest::Create, "t", "c", "cr", "corr", None, epoch(),
    );
    let op_name = op.operation_id.name().to_string();
    container.create(&op.operation_id.partition_key(), op.encode()).await.unwrap();

    let mut doc = bare_cluster(resource_id.clone());
    doc.0.active_operation_id = op_name.clone();
    db.hcp_clusters().create(&doc).await.unwrap();

    lifecycle
        .advance(&op.operation_id, ProvisioningState::Succeeded, None, epoch())
        .await
        .unwrap();

    let outcome = lifecycle
        .reconcile(
            &resource_id,
            hcp_resource_store::envelope::RESOURCE_TYPE_CLUSTER,
            &[hcp_resource_store::envelope::RESOURCE_TYPE_CLUSTER],
            &op_name,
            ProvisioningState::Succeeded,
        )
        .await
        .unwrap();

    match outcome {
        ReconcileOutcome::Reconciled(resource) => {
            assert_eq!(resource.provisioning_state, ProvisioningState::Succeeded);
            assert_eq!(resource.active_operation_id, "");
        }
        other => panic!("expected Reconciled, got {:?}", other),
    }

    let refetched = db.hcp_clusters().get(&resource_id).await.unwrap();
    assert_eq!(refetched.0.provisioning_state, ProvisioningState::Succeeded);
    assert_eq!(refetched.0.active_operation_id, "");
}

/// Calling delete twice never errors, and the resource is gone afterwards.
#[tokio::test]
async fn double_delete_is_idempotent() {
    let db = DbClient::new(Arc::new(InMemoryContainer::new()));
    let clusters = db.hcp_clusters();
    let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();
    clusters.create(&bare_cluster(resource_id.clone())).await.unwrap();

    clusters.delete(&resource_id).await.unwrap();
    clusters.delete(&resource_id).await.unwrap();

    let err = clusters.get(&resource_id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

/// A document seeded under an old-cased document ID is found
/// by resource ID and migrated onto the canonical lowercase ID.
#[tokio::test]
async fn rekey_on_read_moves_to_canonical_id() {
    let container = Arc::new(InMemoryContainer::new());
    let db = DbClient::new(container.clone());
    let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();

    let doc = bare_cluster(resource_id.clone());
    let mut raw = doc.0.encode(hcp_resource_store::envelope::RESOURCE_TYPE_CLUSTER);
    raw["id"] = json!(CLUSTER_ID.to_string());
    container.seed_raw(&resource_id.partition_key(), raw).await;

    let fetched = db.hcp_clusters().get(&resource_id).await.unwrap();
    assert_eq!(fetched.0.resource_id.cosmos_id(), resource_id.cosmos_id());

    assert!(container
        .point_read(&resource_id.partition_key(), &resource_id.cosmos_id())
        .await
        .unwrap()
        .is_some());
    assert!(container
        .point_read(&resource_id.partition_key(), CLUSTER_ID)
        .await
        .unwrap()
        .is_none());
}

/// Two documents both matching the same resource ID surface
/// as `AmbiguousResult` rather than picking one arbitrarily.
#[tokio::test]
async fn ambiguous_result_when_two_documents_match() {
    let container = Arc::new(InMemoryContainer::new());
    let db = DbClient::new(container.clone());
    let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();
    let doc = bare_cluster(resource_id.clone());

    let mut old_raw = doc.0.encode(hcp_resource_store::envelope::RESOURCE_TYPE_CLUSTER);
    old_raw["id"] = json!("oldid");
    container.seed_raw(&resource_id.partition_key(), old_raw).await;
    container
        .seed_raw(
            &resource_id.partition_key(),
            doc.0.encode(hcp_resource_store::envelope::RESOURCE_TYPE_CLUSTER),
        )
        .await;

    let err = db.hcp_clusters().get(&resource_id).await.unwrap_err();
    assert!(matches!(err, StoreError::AmbiguousResult { .. }));
}

/// Of two concurrent `AcquireLock` callers, exactly one gets
/// the lock immediately; the other blocks until the first releases.
#[tokio::test]
async fn lock_contention_second_caller_acquires_after_release() {
    let container = Arc::new(InMemoryContainer::new());
    let clock = Arc::new(SystemClock);
    let service = Arc::new(LockService::new(container, clock, Duration::from_secs(10)));

    let held = service.try_acquire("cluster-lock", "owner-a").await.unwrap();
    assert!(held.is_some());
    let held = held.unwrap();

    let waiter = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .acquire("cluster-lock", "owner-b", Duration::from_secs(15))
                .await
        })
    };

    // Give the waiter a chance to observe contention before releasing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    service.release(&held).await.unwrap();

    let second_held = waiter.await.unwrap().unwrap();
    assert!(!second_held.is_lost());
}

/// Billing records are never hard-deleted: a deletion is recorded by
/// patching `deletionTime` onto the existing document.
#[tokio::test]
async fn billing_deletion_is_recorded_not_removed() {
    let container: Arc<dyn ContainerClient> = Arc::new(InMemoryContainer::new());
    let db = DbClient::new(container.clone());
    let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();

    let created = db
        .global_listers()
        .create_billing(&BillingDocument {
            resource_id: resource_id.clone(),
            subscription_id: SUB.to_string(),
            tenant_id: "tenant-1".to_string(),
            managed_resource_group: "managed-rg".to_string(),
            creation_time: epoch(),
            deletion_time: None,
            etag: None,
            ts: None,
        })
        .await
        .unwrap();
    assert!(created.deletion_time.is_none());

    let deleted_at = chrono::DateTime::from_timestamp(1000, 0).unwrap();
    let updated = db
        .global_listers()
        .record_deletion(&resource_id, deleted_at)
        .await
        .unwrap();
    assert_eq!(updated.deletion_time, Some(deleted_at));

    // Still readable by the same document ID — the record persists.
    let fetched = db.global_listers().get_billing(&resource_id).await.unwrap();
    assert_eq!(fetched.deletion_time, Some(deleted_at));
    assert_eq!(fetched.managed_resource_group, "managed-rg");
}
