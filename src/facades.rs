//! Typed CRUD facades: per-resource-kind wrappers over the
//! generic CRUD kernel, scoped to a subscription and (for the child
//! surfaces) a parent cluster.
use crate::container::{ContainerClient, PatchOperation, QueryOptions};
use crate::crud::{CrudDocument, CrudKernel, ListPage, ListRequest};
use crate::iterator::fetch_single_page;
use crate::envelope::{
    BillingDocument, LockDocument, OperationDocument, ResourceDocument, SubscriptionDocument,
    RESOURCE_TYPE_CLUSTER, RESOURCE_TYPE_EXTERNAL_AUTH, RESOURCE_TYPE_NODE_POOL,
    RESOURCE_TYPE_OPERATION_STATUS,
};
use crate::error::{StoreError, StoreResult};
use crate::id::ResourceId;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Tags a [`TypedResource`] with the ARM resource type it decodes as, so
/// the generic kernel can be instantiated per facade without each call
/// site repeating `expected_types`.
pub trait ResourceKind {
    const RESOURCE_TYPE: &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterKind;
impl ResourceKind for ClusterKind {
    const RESOURCE_TYPE: &'static str = RESOURCE_TYPE_CLUSTER;
}

#[derive(Debug, Clone, Copy)]
pub struct NodePoolKind;
impl ResourceKind for NodePoolKind {
    const RESOURCE_TYPE: &'static str = RESOURCE_TYPE_NODE_POOL;
}

#[derive(Debug, Clone, Copy)]
pub struct ExternalAuthKind;
impl ResourceKind for ExternalAuthKind {
    const RESOURCE_TYPE: &'static str = RESOURCE_TYPE_EXTERNAL_AUTH;
}

/// A [`ResourceDocument`] pinned to one ARM resource type via `K`.
#[derive(Debug, Clone)]
pub struct TypedResource<K: ResourceKind>(pub ResourceDocument, PhantomData<K>);

impl<K: ResourceKind> TypedResource<K> {
    pub fn new(doc: ResourceDocument) -> Self {
        TypedResource(doc, PhantomData)
    }
}

impl<K: ResourceKind> CrudDocument for TypedResource<K> {
    fn cosmos_id(&self) -> String {
        self.0.resource_id.cosmos_id()
    }
    fn partition_key(&self) -> String {
        self.0.resource_id.partition_key()
    }
    fn encode(&self) -> Value {
        self.0.encode(K::RESOURCE_TYPE)
    }
    fn decode(raw: &Value) -> StoreResult<Self> {
        Ok(TypedResource::new(ResourceDocument::decode(raw, &[K::RESOURCE_TYPE])?))
    }
}

/// A hosted OpenShift cluster document.
pub type ClusterDoc = TypedResource<ClusterKind>;
/// A cluster's node pool document.
pub type NodePoolDoc = TypedResource<NodePoolKind>;
/// A cluster's external-auth provider document.
pub type ExternalAuthDoc = TypedResource<ExternalAuthKind>;

fn require_descendant(child: &ResourceId, parent: &ResourceId) -> StoreResult<()> {
    if !child.is_descendant_of(parent) {
        return Err(StoreError::InvalidResourceId {
            id: child.to_string(),
            reason: format!("not a descendant of '{}'", parent),
        });
    }
    Ok(())
}

/// Cross-partition subscription CRUD.
pub struct Subscriptions {
    kernel: CrudKernel,
}

impl Subscriptions {
    pub fn new(container: Arc<dyn ContainerClient>) -> Self {
        Subscriptions { kernel: CrudKernel::new(container) }
    }

    pub async fn get(&self, subscription_id: &str) -> StoreResult<SubscriptionDocument> {
        let id = subscription_id.to_lowercase();
        self.kernel.get_by_document_id(&id, &id).await
    }

    pub async fn create(&self, doc: &SubscriptionDocument) -> StoreResult<SubscriptionDocument> {
        self.kernel.create(doc).await
    }

    pub async fn replace(&self, doc: &SubscriptionDocument, if_match: Option<&str>) -> StoreResult<SubscriptionDocument> {
        self.kernel.replace(doc, if_match).await
    }

    pub async fn list_all(&self) -> StoreResult<ListPage<SubscriptionDocument>> {
        self.kernel.list(ListRequest::cross_partition()).await
    }
}

/// Single-partition operation CRUD, scoped to one subscription.
pub struct Operations {
    kernel: CrudKernel,
    subscription_id: String,
}

impl Operations {
    pub fn new(container: Arc<dyn ContainerClient>, subscription_id: impl Into<String>) -> Self {
        Operations {
            kernel: CrudKernel::new(container),
            subscription_id: subscription_id.into(),
        }
    }

    pub async fn get(&self, operation_id: &ResourceId) -> StoreResult<OperationDocument> {
        self.kernel
            .get_by_document_id(&operation_id.partition_key(), &operation_id.cosmos_id())
            .await
    }

    pub async fn create(&self, doc: &OperationDocument) -> StoreResult<OperationDocument> {
        self.kernel.create(doc).await
    }

    /// `ListActiveOperations`: every operation in this
    /// subscription's partition tagged with the operation-status type.
    pub async fn list(&self) -> StoreResult<ListPage<OperationDocument>> {
        self.kernel
            .list(
                ListRequest::in_partition(self.subscription_id.to_lowercase())
                    .with_resource_type(RESOURCE_TYPE_OPERATION_STATUS),
            )
            .await
    }
}

/// Cluster CRUD plus child sub-surfaces, scoped to one subscription and
/// resource group.
pub struct HCPClusters {
    container: Arc<dyn ContainerClient>,
    kernel: CrudKernel,
}

impl HCPClusters {
    pub fn new(container: Arc<dyn ContainerClient>) -> Self {
        HCPClusters {
            kernel: CrudKernel::new(container.clone()),
            container,
        }
    }

    pub async fn get(&self, resource_id: &ResourceId) -> StoreResult<ClusterDoc> {
        self.kernel.get_by_resource_id(resource_id).await
    }

    pub async fn create(&self, doc: &ClusterDoc) -> StoreResult<ClusterDoc> {
        self.kernel.create(doc).await
    }

    pub async fn replace(&self, doc: &ClusterDoc, if_match: Option<&str>) -> StoreResult<ClusterDoc> {
        self.kernel.replace(doc, if_match).await
    }

    pub async fn delete(&self, resource_id: &ResourceId) -> StoreResult<()> {
        self.kernel.delete_resource::<ClusterDoc>(resource_id).await
    }

    pub async fn list_in_resource_group(&self, subscription_id: &str, resource_group: &str) -> StoreResult<ListPage<ClusterDoc>> {
        let prefix = format!(
            "/subscriptions/{}/resourcegroups/{}",
            subscription_id.to_lowercase(),
            resource_group.to_lowercase()
        );
        self.kernel
            .list(
                ListRequest::in_partition(subscription_id.to_lowercase())
                    .with_resource_type(RESOURCE_TYPE_CLUSTER)
                    .with_prefix(prefix)
                    .direct_descendants_only(),
            )
            .await
    }

    /// Scopes node-pool CRUD to `cluster_id`'s children.
    pub fn node_pools(&self, cluster_id: ResourceId) -> NodePools {
        NodePools {
            kernel: CrudKernel::new(self.container.clone()),
            cluster_id,
        }
    }

    /// Scopes external-auth CRUD to `cluster_id`'s children.
    pub fn external_auth(&self, cluster_id: ResourceId) -> ExternalAuth {
        ExternalAuth {
            kernel: CrudKernel::new(self.container.clone()),
            cluster_id,
        }
    }
}

/// Node-pool CRUD scoped to one parent cluster.
pub struct NodePools {
    kernel: CrudKernel,
    cluster_id: ResourceId,
}

impl NodePools {
    /// Builds the child resource ID via [`ResourceId::child`], never by
    /// re-parsing a user string.
    pub fn child_id(&self, name: &str) -> ResourceId {
        self.cluster_id.child("nodePools", name)
    }

    pub async fn get(&self, resource_id: &ResourceId) -> StoreResult<NodePoolDoc> {
        require_descendant(resource_id, &self.cluster_id)?;
        self.kernel.get_by_resource_id(resource_id).await
    }

    pub async fn create(&self, doc: &NodePoolDoc) -> StoreResult<NodePoolDoc> {
        require_descendant(&doc.0.resource_id, &self.cluster_id)?;
        self.kernel.create(doc).await
    }

    pub async fn replace(&self, doc: &NodePoolDoc, if_match: Option<&str>) -> StoreResult<NodePoolDoc> {
        require_descendant(&doc.0.resource_id, &self.cluster_id)?;
        self.kernel.replace(doc, if_match).await
    }

    pub async fn delete(&self, resource_id: &ResourceId) -> StoreResult<()> {
        require_descendant(resource_id, &self.cluster_id)?;
        self.kernel.delete_resource::<NodePoolDoc>(resource_id).await
    }

    pub async fn list(&self) -> StoreResult<ListPage<NodePoolDoc>> {
        self.kernel
            .list(
                ListRequest::in_partition(self.cluster_id.partition_key())
                    .with_resource_type(RESOURCE_TYPE_NODE_POOL)
                    .with_prefix(self.cluster_id.to_canonical_string())
                    .direct_descendants_only(),
            )
            .await
    }
}

/// External-auth CRUD scoped to one parent cluster.
pub struct ExternalAuth {
    kernel: CrudKernel,
    cluster_id: ResourceId,
}

impl ExternalAuth {
    pub fn child_id(&self, name: &str) -> ResourceId {
        self.cluster_id.child("externalAuths", name)
    }

    pub async fn get(&self, resource_id: &ResourceId) -> StoreResult<ExternalAuthDoc> {
        require_descendant(resource_id, &self.cluster_id)?;
        self.kernel.get_by_resource_id(resource_id).await
    }

    pub async fn create(&self, doc: &ExternalAuthDoc) -> StoreResult<ExternalAuthDoc> {
        require_descendant(&doc.0.resource_id, &self.cluster_id)?;
        self.kernel.create(doc).await
    }

    pub async fn replace(&self, doc: &ExternalAuthDoc, if_match: Option<&str>) -> StoreResult<ExternalAuthDoc> {
        require_descendant(&doc.0.resource_id, &self.cluster_id)?;
        self.kernel.replace(doc, if_match).await
    }

    pub async fn delete(&self, resource_id: &ResourceId) -> StoreResult<()> {
        require_descendant(resource_id, &self.cluster_id)?;
        self.kernel.delete_resource::<ExternalAuthDoc>(resource_id).await
    }

    pub async fn list(&self) -> StoreResult<ListPage<ExternalAuthDoc>> {
        self.kernel
            .list(
                ListRequest::in_partition(self.cluster_id.partition_key())
                    .with_resource_type(RESOURCE_TYPE_EXTERNAL_AUTH)
                    .with_prefix(self.cluster_id.to_canonical_string())
                    .direct_descendants_only(),
            )
            .await
    }
}

/// Untyped CRUD against an arbitrary resource, for callers that only need
/// the envelope and not a typed payload.
pub struct UntypedCrud {
    container: Arc<dyn ContainerClient>,
    parent: ResourceId,
}

impl UntypedCrud {
    pub fn new(container: Arc<dyn ContainerClient>, parent: ResourceId) -> Self {
        UntypedCrud { container, parent }
    }

    pub async fn get_raw(&self, resource_id: &ResourceId) -> StoreResult<Value> {
        require_descendant(resource_id, &self.parent)?;
        self.container
            .point_read(&resource_id.partition_key(), &resource_id.cosmos_id())
            .await?
            .map(|r| r.value)
            .ok_or_else(|| StoreError::NotFound(resource_id.cosmos_id()))
    }

    /// Lists every descendant of the facade's declared ancestor, bare
    /// envelopes undecoded, for cascading deletes and fleet queries
    /// across heterogeneous resource types within the subscription
    /// partition.
    pub async fn list(&self, ancestor: &ResourceId) -> StoreResult<Vec<Value>> {
        if ancestor.cosmos_id() != self.parent.cosmos_id() {
            require_descendant(ancestor, &self.parent)?;
        }
        let options = QueryOptions::in_partition(ancestor.partition_key())
            .with_prefix(ancestor.cosmos_id());
        let mut pager = self.container.query(options);
        let page = fetch_single_page(pager.as_mut()).await?;
        Ok(page.items)
    }
}

/// Read-only facades over the billing and lock containers that need no
/// subscription scoping.
pub struct GlobalListers {
    kernel: CrudKernel,
}

impl GlobalListers {
    pub fn new(container: Arc<dyn ContainerClient>) -> Self {
        GlobalListers { kernel: CrudKernel::new(container) }
    }

    pub async fn get_billing(&self, resource_id: &ResourceId) -> StoreResult<BillingDocument> {
        self.kernel
            .get_by_document_id(&resource_id.partition_key(), &resource_id.cosmos_id())
            .await
    }

    pub async fn get_lock(&self, lock_id: &str) -> StoreResult<LockDocument> {
        let id = lock_id.to_lowercase();
        self.kernel.get_by_document_id(&id, &id).await
    }

    pub async fn list_all_billing(&self) -> StoreResult<ListPage<BillingDocument>> {
        self.kernel.list(ListRequest::cross_partition()).await
    }

    pub async fn create_billing(&self, doc: &BillingDocument) -> StoreResult<BillingDocument> {
        self.kernel.create(doc).await
    }

    /// Records deletion by patching `deletionTime` onto the existing
    /// document; the billing record itself is never hard-deleted.
    pub async fn record_deletion(
        &self,
        resource_id: &ResourceId,
        deletion_time: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<BillingDocument> {
        let response = self
            .kernel
            .container()
            .patch(
                &resource_id.partition_key(),
                &resource_id.cosmos_id(),
                vec![PatchOperation::Set {
                    path: "/properties/deletionTime".to_string(),
                    value: Value::String(deletion_time.to_rfc3339()),
                }],
                None,
            )
            .await?;
        BillingDocument::decode(&response.value)
    }
}

/// Top-level entry point assembling every facade over one container.
pub struct DbClient {
    container: Arc<dyn ContainerClient>,
}

impl DbClient {
    pub fn new(container: Arc<dyn ContainerClient>) -> Self {
        DbClient { container }
    }

    pub fn subscriptions(&self) -> Subscriptions {
        Subscriptions::new(self.container.clone())
    }

    pub fn operations(&self, subscription_id: impl Into<String>) -> Operations {
        Operations::new(self.container.clone(), subscription_id)
    }

    pub fn hcp_clusters(&self) -> HCPClusters {
        HCPClusters::new(self.container.clone())
    }

    pub fn untyped_crud(&self, parent: ResourceId) -> UntypedCrud {
        UntypedCrud::new(self.container.clone(), parent)
    }

    pub fn global_listers(&self) -> GlobalListers {
        GlobalListers::new(self.container.clone())
    }
}
