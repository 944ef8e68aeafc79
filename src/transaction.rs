//! Transaction engine: wraps the store's single-partition
//! transactional batch behind a step builder and typed result accessors.
use crate::container::{ContainerClient, PatchOperation, TransactionOp, TransactionWrite};
use crate::crud::CrudDocument;
use crate::envelope::{OperationDocument, ResourceDocument};
use crate::error::{StoreError, StoreResult};
use crate::id::ResourceId;
use std::collections::HashMap;
use serde_json::Value;

const FAILED_DEPENDENCY: u16 = 424;

/// The kind of mutation a step performs, recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Read,
    Create,
    Replace,
    Patch,
    Delete,
}

/// A step's diagnostic record: action kind, the document type it targets,
/// its cosmos ID, and (when known) the ARM resource ID behind it.
#[derive(Debug, Clone)]
pub struct TransactionStepDetail {
    pub kind: StepKind,
    pub doc_type: &'static str,
    pub cosmos_id: String,
    pub resource_id: Option<String>,
}

type OnSuccessCallback = Box<dyn FnOnce(&TransactionResult) + Send>;

/// Builds a single-partition transactional batch.
pub struct TransactionBuilder {
    partition_key: String,
    ops: Vec<TransactionOp>,
    details: Vec<TransactionStepDetail>,
    callbacks: Vec<OnSuccessCallback>,
}

impl TransactionBuilder {
    pub fn new(partition_key: impl Into<String>) -> Self {
        TransactionBuilder {
            partition_key: partition_key.into(),
            ops: Vec::new(),
            details: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    fn check_partition(&self, item_partition_key: &str, step: &str) -> StoreResult<()> {
        if item_partition_key != self.partition_key {
            return Err(StoreError::WrongPartition {
                transaction: self.partition_key.clone(),
                step: step.to_string(),
            });
        }
        Ok(())
    }

    pub fn read_doc(mut self, doc_type: &'static str, cosmos_id: impl Into<String>) -> Self {
        let cosmos_id = cosmos_id.into();
        self.details.push(TransactionStepDetail {
            kind: StepKind::Read,
            doc_type,
            cosmos_id: cosmos_id.clone(),
            resource_id: None,
        });
        self.ops.push(TransactionOp {
            id: cosmos_id,
            write: TransactionWrite::Read,
        });
        self
    }

    /// Enqueues a create step. Fails synchronously
    /// if `doc`'s partition key disagrees with the transaction's.
    pub fn create_doc<T: CrudDocument>(
        mut self,
        doc_type: &'static str,
        doc: &T,
    ) -> StoreResult<Self> {
        self.check_partition(&doc.partition_key(), "create")?;
        let cosmos_id = doc.cosmos_id();
        self.details.push(TransactionStepDetail {
            kind: StepKind::Create,
            doc_type,
            cosmos_id: cosmos_id.clone(),
            resource_id: None,
        });
        self.ops.push(TransactionOp {
            id: cosmos_id,
            write: TransactionWrite::Create(doc.encode()),
        });
        Ok(self)
    }

    pub fn replace_doc<T: CrudDocument>(
        mut self,
        doc_type: &'static str,
        doc: &T,
    ) -> StoreResult<Self> {
        self.check_partition(&doc.partition_key(), "replace")?;
        let cosmos_id = doc.cosmos_id();
        self.details.push(TransactionStepDetail {
            kind: StepKind::Replace,
            doc_type,
            cosmos_id: cosmos_id.clone(),
            resource_id: None,
        });
        self.ops.push(TransactionOp {
            id: cosmos_id,
            write: TransactionWrite::Replace(doc.encode()),
        });
        Ok(self)
    }

    pub fn patch_doc(
        mut self,
        doc_type: &'static str,
        item_partition_key: &str,
        cosmos_id: impl Into<String>,
        ops: Vec<PatchOperation>,
    ) -> StoreResult<Self> {
        self.check_partition(item_partition_key, "patch")?;
        let cosmos_id = cosmos_id.into();
        self.details.push(TransactionStepDetail {
            kind: StepKind::Patch,
            doc_type,
            cosmos_id: cosmos_id.clone(),
            resource_id: None,
        });
        self.ops.push(TransactionOp {
            id: cosmos_id,
            write: TransactionWrite::Patch(ops),
        });
        Ok(self)
    }

    pub fn delete_doc(
        mut self,
        doc_type: &'static str,
        item_partition_key: &str,
        cosmos_id: impl Into<String>,
    ) -> StoreResult<Self> {
        self.check_partition(item_partition_key, "delete")?;
        let cosmos_id = cosmos_id.into();
        self.details.push(TransactionStepDetail {
            kind: StepKind::Delete,
            doc_type,
            cosmos_id: cosmos_id.clone(),
            resource_id: None,
        });
        self.ops.push(TransactionOp {
            id: cosmos_id,
            write: TransactionWrite::Delete,
        });
        Ok(self)
    }

    /// Attaches a best-effort ARM resource ID to the most recently added
    /// step, purely for diagnostics.
    pub fn with_resource_id(mut self, resource_id: &ResourceId) -> Self {
        if let Some(last) = self.details.last_mut() {
            last.resource_id = Some(resource_id.to_string());
        }
        self
    }

    pub fn on_success(mut self, f: impl FnOnce(&TransactionResult) + Send + 'static) -> Self {
        self.callbacks.push(Box::new(f));
        self
    }

    /// Submits the batch and decodes the result.
    pub async fn execute(self, container: &dyn ContainerClient) -> StoreResult<TransactionResult> {
        let n = self.ops.len();
        let outcome = container.execute_transaction(&self.partition_key, self.ops).await?;

        if !outcome.success {
            let failing = outcome
                .steps
                .iter()
                .enumerate()
                .find(|(_, step)| step.status != FAILED_DEPENDENCY);
            return match failing {
                Some((idx, step)) => Err(StoreError::transport(
                    format!("step {} of {} failed with status {}", idx + 1, n, step.status),
                    Some(step.status),
                )),
                None => Err(StoreError::transport(
                    format!("transaction of {} steps failed", n),
                    None,
                )),
            };
        }

        let mut items = HashMap::new();
        for (detail, step) in self.details.iter().zip(outcome.steps.iter()) {
            if let Some(value) = &step.value {
                items.insert(detail.cosmos_id.clone(), value.clone());
            }
        }

        let result = TransactionResult { items };
        for callback in self.callbacks {
            callback(&result);
        }
        Ok(result)
    }
}

/// The decoded outcome of a successfully committed transaction.
pub struct TransactionResult {
    items: HashMap<String, Value>,
}

impl TransactionResult {
    pub fn get_item<T: CrudDocument>(&self, cosmos_id: &str) -> StoreResult<T> {
        let raw = self
            .items
            .get(cosmos_id)
            .ok_or_else(|| StoreError::ItemNotFound(cosmos_id.to_string()))?;
        T::decode(raw)
    }

    pub fn get_resource_doc(
        &self,
        resource_id: &ResourceId,
        expected_types: &[&str],
    ) -> StoreResult<ResourceDocument> {
        let cosmos_id = resource_id.cosmos_id();
        let raw = self
            .items
            .get(&cosmos_id)
            .ok_or_else(|| StoreError::ItemNotFound(cosmos_id.clone()))?;
        ResourceDocument::decode(raw, expected_types)
    }

    pub fn get_operation_doc(&self, operation_id: &ResourceId) -> StoreResult<OperationDocument> {
        let cosmos_id = operation_id.cosmos_id();
        let raw = self
            .items
            .get(&cosmos_id)
            .ok_or_else(|| StoreError::ItemNotFound(cosmos_id.clone()))?;
        OperationDocument::decode(raw)
    }
}
