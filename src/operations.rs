//! Operation lifecycle: allocate → transactional attach →
//! advance → reconcile → notify → expire.
use crate::container::{ContainerClient, QueryOptions};
use crate::defaults::ProvisioningState;
use crate::envelope::{
    CloudError, OperationDocument, OperationRequest, ResourceDocument, RESOURCE_TYPE_OPERATION_STATUS,
};
use crate::error::{StoreError, StoreResult};
use crate::id::ResourceId;
use crate::iterator::ResultIterator;
use crate::notifier::Notifier;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Drives the operation lifecycle against a single container.
pub struct OperationLifecycle {
    container: Arc<dyn ContainerClient>,
}

/// The outcome of a reconcile attempt.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The resource was updated to mirror the operation's terminal status.
    Reconciled(ResourceDocument),
    /// The resource's `activeOperationID` no longer names this operation;
    /// another operation has taken over and nothing was written.
    Superseded,
    /// The resource no longer exists.
    ResourceGone,
}

/// The outcome of a notify attempt.
#[derive(Debug)]
pub enum NotifyOutcome {
    /// Delivered; `notificationURI` has been cleared.
    Sent(OperationDocument),
    /// Nothing to do: not terminal, or no `notificationURI` set.
    Skipped(OperationDocument),
    /// Delivery failed; `notificationURI` is left in place for retry.
    Failed(OperationDocument),
}

/// Selects which active operations [`OperationLifecycle::list_active`]
/// returns.
#[derive(Debug, Clone, Default)]
pub struct ActiveOperationsFilter {
    pub request: Option<OperationRequest>,
    pub external_id_equals: Option<String>,
    /// Matches `externalId` by prefix-with-slash, to include nested
    /// resources under the named parent.
    pub external_id_prefix: Option<String>,
}

impl OperationLifecycle {
    pub fn new(container: Arc<dyn ContainerClient>) -> Self {
        OperationLifecycle { container }
    }

    /// Allocate. `status` starts at `Deleting` for
    /// a `Delete` request (so a second concurrent Delete is rejected by
    /// the resource's provisioning-state check) and `Accepted` otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn allocate(
        &self,
        subscription_id: &str,
        provider_namespace: &str,
        operation_status_type_name: &str,
        external_id: &ResourceId,
        request: OperationRequest,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_request_id: impl Into<String>,
        correlation_request_id: impl Into<String>,
        notification_uri: Option<String>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> OperationDocument {
        let name = Uuid::new_v4().to_string();
        let operation_id = ResourceId::new_operation(
            subscription_id,
            provider_namespace,
            operation_status_type_name,
            name,
        );
        let status = if request == OperationRequest::Delete {
            ProvisioningState::Deleting
        } else {
            ProvisioningState::Accepted
        };
        OperationDocument {
            operation_id,
            external_id: external_id.to_string(),
            internal_id: String::new(),
            request,
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_request_id: client_request_id.into(),
            correlation_request_id: correlation_request_id.into(),
            notification_uri,
            status,
            error: None,
            start_time: now,
            last_transition_time: now,
            etag: None,
            ts: None,
        }
    }

    /// Advance. Rejects a no-op status change
    /// unless `notificationURI` is set, matching the rule that a rewrite
    /// is only legal to retry a missed notification.
    pub async fn advance(
        &self,
        operation_id: &ResourceId,
        new_status: ProvisioningState,
        error: Option<CloudError>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<OperationDocument> {
        let pk = operation_id.partition_key();
        let doc_id = operation_id.cosmos_id();
        let resp = self
            .container
            .point_read(&pk, &doc_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(doc_id.clone()))?;
        let current = OperationDocument::decode(&resp.value)?;

        if current.status == new_status && current.notification_uri.is_none() {
            return Err(StoreError::transport(
                "operation status unchanged and no notification pending retry",
                Some(400),
            ));
        }

        let mut updated = current;
        updated.status = new_status;
        updated.last_transition_time = now;
        updated.error = error;
        updated.etag = Some(resp.etag.clone());
        updated.ts = Some(resp.ts);

        let replaced = self
            .container
            .replace(&pk, &doc_id, updated.encode(), Some(&resp.etag))
            .await?;
        OperationDocument::decode(&replaced.value)
    }

    /// Reconcile: a read-modify-write guarded by a
    /// check that `activeOperationID` still names this operation.
    pub async fn reconcile(
        &self,
        resource_id: &ResourceId,
        resource_type: &str,
        expected_types: &[&str],
        operation_name: &str,
        terminal_status: ProvisioningState,
    ) -> StoreResult<ReconcileOutcome> {
        let pk = resource_id.partition_key();
        let doc_id = resource_id.cosmos_id();
        let resp = match self.container.point_read(&pk, &doc_id).await? {
            Some(r) => r,
            None => return Ok(ReconcileOutcome::ResourceGone),
        };
        let mut resource = ResourceDocument::decode(&resp.value, expected_types)?;
        if resource.active_operation_id != operation_name {
            tracing::info!(
                resource_id = %resource_id,
                operation_name,
                active_operation_id = %resource.active_operation_id,
                "reconcile skipped: another operation has taken over"
            );
            return Ok(ReconcileOutcome::Superseded);
        }

        resource.provisioning_state = terminal_status;
        resource.active_operation_id = String::new();
        resource.etag = Some(resp.etag.clone());
        resource.ts = Some(resp.ts);

        match self
            .container
            .replace(&pk, &doc_id, resource.encode(resource_type), Some(&resp.etag))
            .await
        {
            Ok(replaced) => Ok(ReconcileOutcome::Reconciled(ResourceDocument::decode(
                &replaced.value,
                expected_types,
            )?)),
            Err(StoreError::PreconditionFailed(_)) => {
                tracing::info!(resource_id = %resource_id, "reconcile lost the race; another writer took over");
                Ok(ReconcileOutcome::Superseded)
            }
            Err(e) => Err(e),
        }
    }

    /// Notify. A no-op unless the operation is
    /// terminal and `notificationURI` is set.
    pub async fn notify(
        &self,
        operation: &OperationDocument,
        notifier: &dyn Notifier,
    ) -> StoreResult<NotifyOutcome> {
        let Some(uri) = operation.notification_uri.clone() else {
            return Ok(NotifyOutcome::Skipped(operation.clone()));
        };
        if !operation.status.is_terminal() {
            return Ok(NotifyOutcome::Skipped(operation.clone()));
        }

        let payload = json!({
            "operationId": operation.operation_id.to_string(),
            "status": format!("{:?}", operation.status),
        });

        match notifier.notify(&uri, &payload).await {
            Ok(()) => {
                let mut updated = operation.clone();
                updated.notification_uri = None;
                let pk = operation.operation_id.partition_key();
                let doc_id = operation.operation_id.cosmos_id();
                let resp = self
                    .container
                    .replace(&pk, &doc_id, updated.encode(), operation.etag.as_deref())
                    .await?;
                Ok(NotifyOutcome::Sent(OperationDocument::decode(&resp.value)?))
            }
            Err(err) => {
                tracing::warn!(error = %err, uri, "operation notify failed, leaving for retry");
                Ok(NotifyOutcome::Failed(operation.clone()))
            }
        }
    }

    /// `ListActiveOperations`: excludes
    /// `{Succeeded, Failed, Canceled}` via an in-process filter, since the
    /// container contract exposes no `NOT ARRAYCONTAINS` primitive.
    pub async fn list_active(
        &self,
        subscription_id: &str,
        filter: ActiveOperationsFilter,
    ) -> StoreResult<Vec<OperationDocument>> {
        let pk = subscription_id.to_lowercase();
        let options = QueryOptions::in_partition(pk).with_resource_type(RESOURCE_TYPE_OPERATION_STATUS);
        let mut iter = ResultIterator::new(self.container.query(options));
        let mut out = Vec::new();
        while let Some(raw) = iter.next().await {
            let op = OperationDocument::decode(&raw)?;
            if op.status.is_terminal() {
                continue;
            }
            if let Some(request) = filter.request {
                if op.request != request {
                    continue;
                }
            }
            if let Some(equals) = &filter.external_id_equals {
                if !op.external_id.eq_ignore_ascii_case(equals) {
                    continue;
                }
            }
            if let Some(prefix) = &filter.external_id_prefix {
                let with_slash = format!("{}/", prefix.to_lowercase());
                if !op.external_id.to_lowercase().starts_with(&with_slash) {
                    continue;
                }
            }
            out.push(op);
        }
        if let Some(err) = iter.into_error() {
            return Err(err);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::ProvisioningState;
    use crate::envelope::{Identity, RESOURCE_TYPE_CLUSTER};
    use crate::memory_store::InMemoryContainer;
    use crate::notifier::NoopNotifier;
    use serde_json::json as js;
    use std::collections::BTreeMap;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";
    const CLUSTER_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/RG/providers/Microsoft.RedHatOpenShift/hcpOpenShiftClusters/C";

    fn epoch() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(0, 0).unwrap()
    }

    fn resource_doc(active_operation_id: &str) -> ResourceDocument {
        ResourceDocument {
            resource_id: ResourceId::parse(CLUSTER_ID).unwrap(),
            internal_id: String::new(),
            active_operation_id: active_operation_id.to_string(),
            provisioning_state: ProvisioningState::Accepted,
            identity: Identity::default(),
            system_data: js!({}),
            tags: BTreeMap::new(),
            internal_state: js!({}),
            location: "eastus".to_string(),
            etag: None,
            ts: None,
        }
    }

    #[test]
    fn allocate_starts_delete_at_deleting() {
        let container: Arc<dyn ContainerClient> = Arc::new(InMemoryContainer::new());
        let lifecycle = OperationLifecycle::new(container);
        let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();
        let op = lifecycle.allocate(
            SUB,
            "Microsoft.RedHatOpenShift",
            "hcpOperationStatuses",
            &resource_id,
            OperationRequest::Delete,
            "tenant",
            "client",
            "creq",
            "correq",
            None,
            epoch(),
        );
        assert_eq!(op.status, ProvisioningState::Deleting);
    }

    #[test]
    fn allocate_starts_others_at_accepted() {
        let container: Arc<dyn ContainerClient> = Arc::new(InMemoryContainer::new());
        let lifecycle = OperationLifecycle::new(container);
        let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();
        let op = lifecycle.allocate(
            SUB,
            "Microsoft.RedHatOpenShift",
            "hcpOperationStatuses",
            &resource_id,
            OperationRequest::Create,
            "tenant",
            "client",
            "creq",
            "correq",
            None,
            epoch(),
        );
        assert_eq!(op.status, ProvisioningState::Accepted);
    }

    #[tokio::test]
    async fn advance_rejects_no_op_status_change_without_notification() {
        let container: Arc<dyn ContainerClient> = Arc::new(InMemoryContainer::new());
        let lifecycle = OperationLifecycle::new(container.clone());
        let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();
        let op = lifecycle.allocate(
            SUB, "Microsoft.RedHatOpenShift", "hcpOperationStatuses", &resource_id,
            OperationRequest::Create, "t", "c", "cr", "corr", None, epoch(),
        );
        container.create(&op.operation_id.partition_key(), op.encode()).await.unwrap();

        let err = lifecycle
            .advance(&op.operation_id, ProvisioningState::Accepted, None, epoch())
            .await
            .unwrap_err();
        assert!(err.is_status(400));
    }

    #[tokio::test]
    async fn advance_to_terminal_then_reconcile_clears_active_operation() {
        let container: Arc<dyn ContainerClient> = Arc::new(InMemoryContainer::new());
        let lifecycle = OperationLifecycle::new(container.clone());
        let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();
        let op = lifecycle.allocate(
            SUB, "Microsoft.RedHatOpenShift", "hcpOperationStatuses", &resource_id,
            OperationRequest::Create, "t", "c", "cr", "corr", None, epoch(),
        );
        let op_name = op.operation_id.name().to_string();
        container.create(&op.operation_id.partition_key(), op.encode()).await.unwrap();

        let resource = resource_doc(&op_name);
        container
            .create(&resource.resource_id.partition_key(), resource.encode(RESOURCE_TYPE_CLUSTER))
            .await
            .unwrap();

        lifecycle
            .advance(&op.operation_id, ProvisioningState::Succeeded, None, epoch())
            .await
            .unwrap();

        let outcome = lifecycle
            .reconcile(&resource_id, RESOURCE_TYPE_CLUSTER, &[RESOURCE_TYPE_CLUSTER], &op_name, ProvisioningState::Succeeded)
            .await
            .unwrap();

        match outcome {
            ReconcileOutcome::Reconciled(doc) => {
                assert_eq!(doc.provisioning_state, ProvisioningState::Succeeded);
                assert_eq!(doc.active_operation_id, "");
            }
            other => panic!("expected Reconciled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn reconcile_is_superseded_when_active_operation_mismatches() {
        let container: Arc<dyn ContainerClient> = Arc::new(InMemoryContainer::new());
        let lifecycle = OperationLifecycle::new(container.clone());
        let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();
        let resource = resource_doc("some-other-operation");
        container
            .create(&resource.resource_id.partition_key(), resource.encode(RESOURCE_TYPE_CLUSTER))
            .await
            .unwrap();

        let outcome = lifecycle
            .reconcile(&resource_id, RESOURCE_TYPE_CLUSTER, &[RESOURCE_TYPE_CLUSTER], "stale-operation", ProvisioningState::Succeeded)
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Superseded));
    }

    #[tokio::test]
    async fn notify_sends_once_and_clears_uri() {
        let container: Arc<dyn ContainerClient> = Arc::new(InMemoryContainer::new());
        let lifecycle = OperationLifecycle::new(container.clone());
        let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();
        let mut op = lifecycle.allocate(
            SUB, "Microsoft.RedHatOpenShift", "hcpOperationStatuses", &resource_id,
            OperationRequest::Create, "t", "c", "cr", "corr", Some("https://callback.example/hook".to_string()), epoch(),
        );
        op.status = ProvisioningState::Succeeded;
        let resp = container.create(&op.operation_id.partition_key(), op.encode()).await.unwrap();
        op.etag = Some(resp.etag);

        let outcome = lifecycle.notify(&op, &NoopNotifier).await.unwrap();
        match outcome {
            NotifyOutcome::Sent(doc) => assert!(doc.notification_uri.is_none()),
            other => panic!("expected Sent, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn list_active_excludes_terminal_operations() {
        let container: Arc<dyn ContainerClient> = Arc::new(InMemoryContainer::new());
        let lifecycle = OperationLifecycle::new(container.clone());
        let resource_id = ResourceId::parse(CLUSTER_ID).unwrap();

        let mut running = lifecycle.allocate(
            SUB, "Microsoft.RedHatOpenShift", "hcpOperationStatuses", &resource_id,
            OperationRequest::Create, "t", "c", "cr", "corr", None, epoch(),
        );
        running.status = ProvisioningState::Provisioning;
        container.create(&running.operation_id.partition_key(), running.encode()).await.unwrap();

        let mut done = lifecycle.allocate(
            SUB, "Microsoft.RedHatOpenShift", "hcpOperationStatuses", &resource_id,
            OperationRequest::Update, "t", "c", "cr", "corr", None, epoch(),
        );
        done.status = ProvisioningState::Succeeded;
        container.create(&done.operation_id.partition_key(), done.encode()).await.unwrap();

        let active = lifecycle
            .list_active(SUB, ActiveOperationsFilter::default())
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].request, OperationRequest::Create);
    }
}
