//! Generic CRUD kernel: get/list/create/replace/delete
//! operations parameterized by an internal type and its on-disk codec.
use crate::container::{ContainerClient, QueryOptions};
use crate::error::{StoreError, StoreResult};
use crate::envelope::{
    BillingDocument, LockDocument, OperationDocument, SubscriptionDocument,
};
use crate::id::ResourceId;
use crate::iterator::{fetch_single_page, ResultIterator};
use serde_json::Value;
use std::sync::Arc;

/// Anything the generic kernel can get/list/create/replace/delete: it
/// knows its own cosmos id and partition key, and round-trips through the
/// envelope codec.
pub trait CrudDocument: Sized {
    fn cosmos_id(&self) -> String;
    fn partition_key(&self) -> String;
    fn encode(&self) -> Value;
    fn decode(raw: &Value) -> StoreResult<Self>;
}

impl CrudDocument for OperationDocument {
    fn cosmos_id(&self) -> String {
        self.operation_id.cosmos_id()
    }
    fn partition_key(&self) -> String {
        self.operation_id.partition_key()
    }
    fn encode(&self) -> Value {
        OperationDocument::encode(self)
    }
    fn decode(raw: &Value) -> StoreResult<Self> {
        OperationDocument::decode(raw)
    }
}

impl CrudDocument for SubscriptionDocument {
    fn cosmos_id(&self) -> String {
        self.subscription_id.to_lowercase()
    }
    fn partition_key(&self) -> String {
        self.subscription_id.to_lowercase()
    }
    fn encode(&self) -> Value {
        SubscriptionDocument::encode(self)
    }
    fn decode(raw: &Value) -> StoreResult<Self> {
        SubscriptionDocument::decode(raw)
    }
}

impl CrudDocument for LockDocument {
    fn cosmos_id(&self) -> String {
        self.id.to_lowercase()
    }
    fn partition_key(&self) -> String {
        self.id.to_lowercase()
    }
    fn encode(&self) -> Value {
        LockDocument::encode(self)
    }
    fn decode(raw: &Value) -> StoreResult<Self> {
        LockDocument::decode(raw)
    }
}

impl CrudDocument for BillingDocument {
    fn cosmos_id(&self) -> String {
        self.resource_id.cosmos_id()
    }
    fn partition_key(&self) -> String {
        self.resource_id.partition_key()
    }
    fn encode(&self) -> Value {
        BillingDocument::encode(self)
    }
    fn decode(raw: &Value) -> StoreResult<Self> {
        BillingDocument::decode(raw)
    }
}

/// Parameters for [`CrudKernel::list`].
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    /// `None` requests a cross-partition scan (subscription enumeration /
    /// global listers only).
    pub partition_key: Option<String>,
    pub resource_type: Option<String>,
    pub prefix: Option<String>,
    pub direct_descendants_only: bool,
    pub page_size: Option<u32>,
    pub continuation_token: Option<String>,
}

impl ListRequest {
    pub fn in_partition(partition_key: impl Into<String>) -> Self {
        ListRequest {
            partition_key: Some(partition_key.into()),
            ..Default::default()
        }
    }

    pub fn cross_partition() -> Self {
        ListRequest::default()
    }

    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn direct_descendants_only(mut self) -> Self {
        self.direct_descendants_only = true;
        self
    }
}

/// One page of a list call plus the token to resume from.
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub continuation_token: Option<String>,
}

/// The generic kernel: get/list/create/replace/delete against a single
/// [`ContainerClient`], parameterized per call by a [`CrudDocument`].
pub struct CrudKernel {
    container: Arc<dyn ContainerClient>,
}

impl CrudKernel {
    pub fn new(container: Arc<dyn ContainerClient>) -> Self {
        CrudKernel { container }
    }

    /// The underlying container, for callers that need a primitive the
    /// generic kernel doesn't wrap (e.g. a bespoke patch).
    pub fn container(&self) -> &Arc<dyn ContainerClient> {
        &self.container
    }

    /// Get by document ID.
    pub async fn get_by_document_id<T: CrudDocument>(
        &self,
        partition_key: &str,
        id: &str,
    ) -> StoreResult<T> {
        let pk = partition_key.to_lowercase();
        let doc_id = id.to_lowercase();
        match self.container.point_read(&pk, &doc_id).await? {
            Some(resp) => T::decode(&resp.value),
            None => Err(StoreError::NotFound(doc_id)),
        }
    }

    /// Get by resource ID, with 404 fallback to a filtered query and
    /// one-time online re-key on fallback success.
    pub async fn get_by_resource_id<T: CrudDocument>(
        &self,
        resource_id: &ResourceId,
    ) -> StoreResult<T> {
        let pk = resource_id.partition_key();
        let canonical_id = resource_id.cosmos_id();

        match self.container.point_read(&pk, &canonical_id).await {
            Ok(Some(resp)) => return T::decode(&resp.value),
            Ok(None) => {}
            Err(e) if e.is_status(404) => {}
            Err(e) => return Err(e),
        }

        let options = QueryOptions::in_partition(pk.clone())
            .with_resource_id_equals(resource_id.to_canonical_string());
        let mut iter = ResultIterator::new(self.container.query(options));
        let mut matches = Vec::new();
        while let Some(item) = iter.next().await {
            matches.push(item);
        }
        if let Some(err) = iter.into_error() {
            return Err(err);
        }

        match matches.len() {
            0 => Err(StoreError::NotFound(canonical_id)),
            1 => {
                let raw = matches.remove(0);
                let decoded: T = T::decode(&raw)?;
                let old_id = raw
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if old_id != canonical_id {
                    self.container.create(&pk, decoded.encode()).await?;
                    self.container.delete(&pk, &old_id, None).await?;
                }
                Ok(decoded)
            }
            count => Err(StoreError::AmbiguousResult {
                resource_id: resource_id.to_canonical_string(),
                count,
            }),
        }
    }

    /// List.
    pub async fn list<T: CrudDocument>(&self, req: ListRequest) -> StoreResult<ListPage<T>> {
        let mut options = match req.partition_key {
            Some(pk) => QueryOptions::in_partition(pk),
            None => QueryOptions::cross_partition(),
        };
        if let Some(rt) = req.resource_type {
            options = options.with_resource_type(rt);
        }
        if let Some(prefix) = req.prefix {
            options = options.with_prefix(prefix);
        }
        if req.direct_descendants_only {
            options = options.direct_descendants_only();
        }
        if let Some(page_size) = req.page_size {
            options = options.with_page_size(page_size);
        }
        if let Some(token) = req.continuation_token {
            options = options.with_continuation(token);
        }

        let mut pager = self.container.query(options);
        let page = fetch_single_page(pager.as_mut()).await?;
        let mut items = Vec::with_capacity(page.items.len());
        for raw in page.items {
            items.push(T::decode(&raw)?);
        }
        Ok(ListPage {
            items,
            continuation_token: page.continuation_token,
        })
    }

    /// Create. Duplicate IDs surface as a 409
    /// transport error from the container.
    pub async fn create<T: CrudDocument>(&self, doc: &T) -> StoreResult<T> {
        let resp = self.container.create(&doc.partition_key(), doc.encode()).await?;
        T::decode(&resp.value)
    }

    /// Replace. Unconditional unless `if_match`
    /// is given.
    pub async fn replace<T: CrudDocument>(&self, doc: &T, if_match: Option<&str>) -> StoreResult<T> {
        let resp = self
            .container
            .replace(&doc.partition_key(), &doc.cosmos_id(), doc.encode(), if_match)
            .await?;
        T::decode(&resp.value)
    }

    /// Delete resource: resolves the canonical document ID first (to
    /// survive pre-rekey data) then issues a point-delete, swallowing 404
    /// for idempotency.
    pub async fn delete_resource<T: CrudDocument>(&self, resource_id: &ResourceId) -> StoreResult<()> {
        let doc = match self.get_by_resource_id::<T>(resource_id).await {
            Ok(doc) => doc,
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        match self
            .container
            .delete(&doc.partition_key(), &doc.cosmos_id(), None)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_status(404) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Delete by document ID directly, for document kinds addressed by a
    /// fixed ID rather than a resource ID (locks, subscriptions).
    pub async fn delete_by_document_id(
        &self,
        partition_key: &str,
        id: &str,
        if_match: Option<&str>,
    ) -> StoreResult<()> {
        match self
            .container
            .delete(&partition_key.to_lowercase(), &id.to_lowercase(), if_match)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_status(404) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{RESOURCE_TYPE_CLUSTER, ResourceDocument, Identity};
    use crate::defaults::ProvisioningState;
    use crate::memory_store::InMemoryContainer;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct ClusterDoc(ResourceDocument);

    impl CrudDocument for ClusterDoc {
        fn cosmos_id(&self) -> String {
            self.0.resource_id.cosmos_id()
        }
        fn partition_key(&self) -> String {
            self.0.resource_id.partition_key()
        }
        fn encode(&self) -> Value {
            self.0.encode(RESOURCE_TYPE_CLUSTER)
        }
        fn decode(raw: &Value) -> StoreResult<Self> {
            Ok(ClusterDoc(ResourceDocument::decode(raw, &[RESOURCE_TYPE_CLUSTER])?))
        }
    }

    fn cluster(id: &str) -> ClusterDoc {
        ClusterDoc(ResourceDocument {
            resource_id: ResourceId::parse(id).unwrap(),
            internal_id: String::new(),
            active_operation_id: String::new(),
            provisioning_state: ProvisioningState::Accepted,
            identity: Identity::default(),
            system_data: json!({}),
            tags: BTreeMap::new(),
            internal_state: json!({}),
            location: "eastus".to_string(),
            etag: None,
            ts: None,
        })
    }

    const ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/RG/providers/Microsoft.RedHatOpenShift/hcpOpenShiftClusters/C";

    #[tokio::test]
    async fn create_then_get_by_resource_id() {
        let kernel = CrudKernel::new(Arc::new(InMemoryContainer::new()));
        let created = kernel.create(&cluster(ID)).await.unwrap();
        let fetched: ClusterDoc = kernel
            .get_by_resource_id(&ResourceId::parse(ID).unwrap())
            .await
            .unwrap();
        assert_eq!(fetched.0.resource_id, created.0.resource_id);
    }

    #[tokio::test]
    async fn get_by_resource_id_is_case_insensitive() {
        let kernel = CrudKernel::new(Arc::new(InMemoryContainer::new()));
        kernel.create(&cluster(ID)).await.unwrap();
        let upper = ResourceId::parse(&ID.to_uppercase()).unwrap();
        let fetched: StoreResult<ClusterDoc> = kernel.get_by_resource_id(&upper).await;
        assert!(fetched.is_ok());
    }

    #[tokio::test]
    async fn rekey_on_read_moves_document_to_canonical_id() {
        let container = Arc::new(InMemoryContainer::new());
        let kernel = CrudKernel::new(container.clone());
        let resource_id = ResourceId::parse(ID).unwrap();

        // Seed under an uppercase document id whose payload resourceId matches R.
        let mut doc = cluster(ID);
        doc.0.resource_id = resource_id.clone();
        let mut raw = doc.encode();
        raw["id"] = json!(ID.to_string());
        container
            .seed_raw(&resource_id.partition_key(), raw)
            .await;

        let fetched: ClusterDoc = kernel.get_by_resource_id(&resource_id).await.unwrap();
        assert_eq!(fetched.0.resource_id, resource_id);

        let canonical = container
            .point_read(&resource_id.partition_key(), &resource_id.cosmos_id())
            .await
            .unwrap();
        assert!(canonical.is_some());
        let old = container
            .point_read(&resource_id.partition_key(), ID)
            .await
            .unwrap();
        assert!(old.is_none());
    }

    #[tokio::test]
    async fn ambiguous_result_when_two_documents_match() {
        let container = Arc::new(InMemoryContainer::new());
        let kernel = CrudKernel::new(container.clone());
        let resource_id = ResourceId::parse(ID).unwrap();
        let mut doc = cluster(ID);
        doc.0.resource_id = resource_id.clone();

        let mut old_raw = doc.encode();
        old_raw["id"] = json!("OLDID");
        container.seed_raw(&resource_id.partition_key(), old_raw).await;
        container.seed_raw(&resource_id.partition_key(), doc.encode()).await;

        let result: StoreResult<ClusterDoc> = kernel.get_by_resource_id(&resource_id).await;
        assert!(matches!(result, Err(StoreError::AmbiguousResult { .. })));
    }

    #[tokio::test]
    async fn double_delete_is_idempotent() {
        let kernel = CrudKernel::new(Arc::new(InMemoryContainer::new()));
        let resource_id = ResourceId::parse(ID).unwrap();
        kernel.create(&cluster(ID)).await.unwrap();
        kernel.delete_resource::<ClusterDoc>(&resource_id).await.unwrap();
        kernel.delete_resource::<ClusterDoc>(&resource_id).await.unwrap();
        let result: StoreResult<ClusterDoc> = kernel.get_by_resource_id(&resource_id).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
