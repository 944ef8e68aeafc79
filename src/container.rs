//! The store contract consumed from outside the core: a
//! partitioned document database offering point read, create, replace,
//! patch, delete, query-with-pager, TTL, and single-partition
//! transactional batches. This crate only depends on this trait surface;
//! [`crate::memory_store`] is the one bundled implementation.
use crate::error::StoreResult;
use async_trait::async_trait;
use serde_json::Value;

/// A JSON-pointer-style mutation applied by [`ContainerClient::patch`].
#[derive(Debug, Clone)]
pub enum PatchOperation {
    Set { path: String, value: Value },
    Remove { path: String },
    Append { path: String, value: Value },
}

/// The result of a single-item operation: the server's echoed state (when
/// `EnableContentResponseOnWrite` applies, or always for reads) and the
/// etag it was written with.
#[derive(Debug, Clone)]
pub struct ItemResponse {
    pub value: Value,
    pub etag: String,
    pub ts: i64,
}

/// Selects the documents a [`ContainerClient::query`] call should return
///. `partition_key: None` requests a cross-partition scan,
/// used only for subscription enumeration and global listers.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub partition_key: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id_equals: Option<String>,
    pub resource_id_prefix: Option<String>,
    pub direct_descendants_only: bool,
    pub page_size: Option<u32>,
    pub continuation_token: Option<String>,
}

impl QueryOptions {
    pub fn in_partition(partition_key: impl Into<String>) -> Self {
        QueryOptions {
            partition_key: Some(partition_key.into()),
            ..Default::default()
        }
    }

    pub fn cross_partition() -> Self {
        QueryOptions::default()
    }

    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_resource_id_equals(mut self, id: impl Into<String>) -> Self {
        self.resource_id_equals = Some(id.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.resource_id_prefix = Some(prefix.into());
        self
    }

    pub fn direct_descendants_only(mut self) -> Self {
        self.direct_descendants_only = true;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_continuation(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }
}

/// Yields successive pages of matching documents. A page is an empty
/// `Vec` to signal end-of-results; the pager is never reused after that.
#[async_trait]
pub trait Pager: Send {
    async fn next_page(&mut self) -> StoreResult<Vec<Value>>;

    /// The token to resume from after the most recently yielded page, or
    /// `None` once the query is exhausted.
    fn continuation_token(&self) -> Option<String>;
}

/// A single step within a transactional batch, as submitted to the store
///. The higher-level step builders in
/// [`crate::transaction`] compile down to this.
#[derive(Debug, Clone)]
pub enum TransactionWrite {
    Read,
    Create(Value),
    Replace(Value),
    Patch(Vec<PatchOperation>),
    Delete,
}

#[derive(Debug, Clone)]
pub struct TransactionOp {
    pub id: String,
    pub write: TransactionWrite,
}

/// Per-step outcome within a batch response. `FailedDependency` (HTTP 424)
/// is what every step other than the one true failure carries when a
/// batch fails.
#[derive(Debug, Clone)]
pub struct TransactionStepResult {
    pub status: u16,
    pub value: Option<Value>,
}

/// The outcome of submitting a batch: either every step committed, or
/// none did.
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub success: bool,
    /// One entry per submitted step, in order.
    pub steps: Vec<TransactionStepResult>,
}

/// The store contract. Every method takes the caller's already-resolved
/// partition key; nothing here parses resource IDs.
#[async_trait]
pub trait ContainerClient: Send + Sync {
    async fn point_read(&self, partition_key: &str, id: &str) -> StoreResult<Option<ItemResponse>>;

    async fn create(&self, partition_key: &str, item: Value) -> StoreResult<ItemResponse>;

    async fn replace(
        &self,
        partition_key: &str,
        id: &str,
        item: Value,
        if_match: Option<&str>,
    ) -> StoreResult<ItemResponse>;

    async fn patch(
        &self,
        partition_key: &str,
        id: &str,
        ops: Vec<PatchOperation>,
        if_match: Option<&str>,
    ) -> StoreResult<ItemResponse>;

    async fn delete(&self, partition_key: &str, id: &str, if_match: Option<&str>) -> StoreResult<()>;

    fn query(&self, options: QueryOptions) -> Box<dyn Pager>;

    /// Executes a single-partition transactional batch. `partition_key`
    /// must equal every step's own partition; callers enforce this before
    /// calling in, so implementations may assume it.
    async fn execute_transaction(
        &self,
        partition_key: &str,
        ops: Vec<TransactionOp>,
    ) -> StoreResult<TransactionOutcome>;
}
