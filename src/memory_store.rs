//! In-memory stand-in: a map-of-lowercase-keys
//! implementation of [`ContainerClient`] for tests. It honors the same
//! interface surface as the real store but does not implement etags as a
//! true optimistic-concurrency primitive beyond single-call precondition
//! checks, and its transactions are "all steps land, or none do" within
//! one call — nothing more. Tests that exercise real concurrent
//! contention across calls belong against the Cosmos-backed path.
use crate::clock::{Clock, SystemClock};
use crate::container::{
    ContainerClient, ItemResponse, Pager, PatchOperation, QueryOptions, TransactionOp,
    TransactionOutcome, TransactionStepResult, TransactionWrite,
};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct StoredItem {
    value: Value,
    etag: String,
    ts: i64,
    ttl: Option<i64>,
}

impl StoredItem {
    fn expired(&self, now: i64) -> bool {
        matches!(self.ttl, Some(ttl) if self.ts + ttl < now)
    }

    fn to_response(&self) -> ItemResponse {
        let mut value = self.value.clone();
        value["_etag"] = Value::String(self.etag.clone());
        value["_ts"] = Value::from(self.ts);
        ItemResponse {
            value,
            etag: self.etag.clone(),
            ts: self.ts,
        }
    }
}

type Partition = BTreeMap<String, StoredItem>;

/// The in-memory [`ContainerClient`] implementation.
pub struct InMemoryContainer {
    partitions: Mutex<BTreeMap<String, Partition>>,
    clock: Arc<dyn Clock>,
    etag_seq: AtomicU64,
}

impl InMemoryContainer {
    pub fn new() -> Self {
        InMemoryContainer {
            partitions: Mutex::new(BTreeMap::new()),
            clock: Arc::new(SystemClock),
            etag_seq: AtomicU64::new(0),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryContainer {
            partitions: Mutex::new(BTreeMap::new()),
            clock,
            etag_seq: AtomicU64::new(0),
        }
    }

    fn next_etag(&self) -> String {
        format!("etag-{}", self.etag_seq.fetch_add(1, Ordering::SeqCst))
    }

    fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }

    /// Test-only helper: inserts a raw, already-enveloped document exactly
    /// as given, bypassing id derivation — used to seed legacy pre-rekey
    /// data and duplicate-ID ambiguity fixtures.
    #[cfg(test)]
    pub async fn seed_raw(&self, partition_key: &str, raw: Value) {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let ts = raw.get("_ts").and_then(Value::as_i64).unwrap_or_else(|| self.now());
        let etag = raw
            .get("_etag")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.next_etag());
        let ttl = raw.get("ttl").and_then(Value::as_i64);
        let mut partitions = self.partitions.lock().unwrap();
        partitions
            .entry(partition_key.to_lowercase())
            .or_default()
            .insert(id, StoredItem { value: raw, etag, ts, ttl });
    }

    fn resource_id_of(value: &Value) -> Option<String> {
        value
            .get("properties")
            .and_then(Value::as_object)
            .and_then(|p| p.get("resourceId"))
            .and_then(Value::as_str)
            .map(str::to_lowercase)
    }

    fn matches(options: &QueryOptions, id: &str, item: &StoredItem) -> bool {
        if let Some(rt) = &options.resource_type {
            let stored_rt = item.value.get("resourceType").and_then(Value::as_str).unwrap_or("");
            if !stored_rt.eq_ignore_ascii_case(rt) {
                return false;
            }
        }
        if let Some(equals) = &options.resource_id_equals {
            let candidate = Self::resource_id_of(&item.value).unwrap_or_else(|| id.to_string());
            if candidate != equals.to_lowercase() {
                return false;
            }
        }
        if let Some(prefix) = &options.resource_id_prefix {
            let candidate = Self::resource_id_of(&item.value).unwrap_or_else(|| id.to_string());
            let prefix_lower = prefix.to_lowercase();
            let with_slash = format!("{}/", prefix_lower);
            if !candidate.starts_with(&with_slash) {
                return false;
            }
            if options.direct_descendants_only {
                let prefix_slashes = prefix_lower.matches('/').count();
                let candidate_slashes = candidate.matches('/').count();
                let delta = candidate_slashes.saturating_sub(prefix_slashes);
                if delta != 2 && delta != 4 {
                    return false;
                }
            }
        }
        true
    }
}

impl Default for InMemoryContainer {
    fn default() -> Self {
        InMemoryContainer::new()
    }
}

fn split_pointer(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((parent, key)) => (parent.to_string(), key.to_string()),
        None => (String::new(), path.to_string()),
    }
}

fn apply_patch(value: &mut Value, ops: &[PatchOperation]) -> StoreResult<()> {
    for op in ops {
        match op {
            PatchOperation::Set { path, value: new_value } => {
                let (parent_ptr, key) = split_pointer(path);
                let parent = if parent_ptr.is_empty() {
                    value
                } else {
                    value.pointer_mut(&parent_ptr).ok_or_else(|| {
                        StoreError::transport(format!("patch path not found: {}", path), None)
                    })?
                };
                let obj = parent.as_object_mut().ok_or_else(|| {
                    StoreError::transport(format!("patch path is not an object: {}", path), None)
                })?;
                obj.insert(key, new_value.clone());
            }
            PatchOperation::Remove { path } => {
                let (parent_ptr, key) = split_pointer(path);
                let parent = if parent_ptr.is_empty() {
                    value
                } else {
                    value.pointer_mut(&parent_ptr).ok_or_else(|| {
                        StoreError::transport(format!("patch path not found: {}", path), None)
                    })?
                };
                if let Some(obj) = parent.as_object_mut() {
                    obj.remove(&key);
                }
            }
            PatchOperation::Append { path, value: new_value } => {
                let (parent_ptr, key) = split_pointer(path);
                let parent = if parent_ptr.is_empty() {
                    value
                } else {
                    value.pointer_mut(&parent_ptr).ok_or_else(|| {
                        StoreError::transport(format!("patch path not found: {}", path), None)
                    })?
                };
                let obj = parent.as_object_mut().ok_or_else(|| {
                    StoreError::transport(format!("patch path is not an object: {}", path), None)
                })?;
                let arr = obj
                    .entry(key)
                    .or_insert_with(|| Value::Array(Vec::new()));
                arr.as_array_mut()
                    .ok_or_else(|| StoreError::transport(format!("patch append target is not an array: {}", path), None))?
                    .push(new_value.clone());
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ContainerClient for InMemoryContainer {
    async fn point_read(&self, partition_key: &str, id: &str) -> StoreResult<Option<ItemResponse>> {
        let now = self.now();
        let mut partitions = self.partitions.lock().unwrap();
        let partition_key = partition_key.to_lowercase();
        let id = id.to_lowercase();
        if let Some(partition) = partitions.get_mut(&partition_key) {
            if let Some(item) = partition.get(&id) {
                if item.expired(now) {
                    partition.remove(&id);
                    return Ok(None);
                }
                return Ok(Some(item.to_response()));
            }
        }
        Ok(None)
    }

    async fn create(&self, partition_key: &str, item: Value) -> StoreResult<ItemResponse> {
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::transport("create: item has no id", None))?
            .to_lowercase();
        let now = self.now();
        let etag = self.next_etag();
        let ttl = item.get("ttl").and_then(Value::as_i64);
        let mut partitions = self.partitions.lock().unwrap();
        let partition = partitions.entry(partition_key.to_lowercase()).or_default();
        if let Some(existing) = partition.get(&id) {
            if !existing.expired(now) {
                return Err(StoreError::transport(
                    format!("item already exists: {}", id),
                    Some(409),
                ));
            }
        }
        let stored = StoredItem { value: item, etag, ts: now, ttl };
        let response = stored.to_response();
        partition.insert(id, stored);
        Ok(response)
    }

    async fn replace(
        &self,
        partition_key: &str,
        id: &str,
        item: Value,
        if_match: Option<&str>,
    ) -> StoreResult<ItemResponse> {
        let now = self.now();
        let id = id.to_lowercase();
        let mut partitions = self.partitions.lock().unwrap();
        let partition = partitions
            .get_mut(&partition_key.to_lowercase())
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let existing = partition
            .get(&id)
            .filter(|item| !item.expired(now))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if let Some(expected) = if_match {
            if existing.etag != expected {
                return Err(StoreError::PreconditionFailed(id));
            }
        }
        let ttl = item.get("ttl").and_then(Value::as_i64).or(existing.ttl);
        let stored = StoredItem {
            value: item,
            etag: self.next_etag(),
            ts: now,
            ttl,
        };
        let response = stored.to_response();
        partition.insert(id, stored);
        Ok(response)
    }

    async fn patch(
        &self,
        partition_key: &str,
        id: &str,
        ops: Vec<PatchOperation>,
        if_match: Option<&str>,
    ) -> StoreResult<ItemResponse> {
        let now = self.now();
        let id = id.to_lowercase();
        let mut partitions = self.partitions.lock().unwrap();
        let partition = partitions
            .get_mut(&partition_key.to_lowercase())
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let existing = partition
            .get(&id)
            .filter(|item| !item.expired(now))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if let Some(expected) = if_match {
            if existing.etag != expected {
                return Err(StoreError::PreconditionFailed(id));
            }
        }
        let mut value = existing.value.clone();
        apply_patch(&mut value, &ops)?;
        let stored = StoredItem {
            value,
            etag: self.next_etag(),
            ts: now,
            ttl: existing.ttl,
        };
        let response = stored.to_response();
        partition.insert(id, stored);
        Ok(response)
    }

    async fn delete(&self, partition_key: &str, id: &str, if_match: Option<&str>) -> StoreResult<()> {
        let id = id.to_lowercase();
        let mut partitions = self.partitions.lock().unwrap();
        let Some(partition) = partitions.get_mut(&partition_key.to_lowercase()) else {
            return Err(StoreError::transport(format!("not found: {}", id), Some(404)));
        };
        let Some(existing) = partition.get(&id) else {
            return Err(StoreError::transport(format!("not found: {}", id), Some(404)));
        };
        if let Some(expected) = if_match {
            if existing.etag != expected {
                return Err(StoreError::transport(format!("precondition failed: {}", id), Some(412)));
            }
        }
        partition.remove(&id);
        Ok(())
    }

    fn query(&self, options: QueryOptions) -> Box<dyn Pager> {
        Box::new(InMemoryPager {
            partitions: self.partitions.lock().unwrap().clone(),
            options,
            served: false,
        })
    }

    async fn execute_transaction(
        &self,
        partition_key: &str,
        ops: Vec<TransactionOp>,
    ) -> StoreResult<TransactionOutcome> {
        let now = self.now();
        let partition_key = partition_key.to_lowercase();
        let mut partitions = self.partitions.lock().unwrap();
        let mut working = partitions.get(&partition_key).cloned().unwrap_or_default();

        let mut results = Vec::with_capacity(ops.len());
        let mut failure: Option<(usize, u16)> = None;

        for (idx, op) in ops.iter().enumerate() {
            if failure.is_some() {
                results.push(TransactionStepResult { status: 424, value: None });
                continue;
            }
            let id = op.id.to_lowercase();
            let outcome = match &op.write {
                TransactionWrite::Read => match working.get(&id).filter(|i| !i.expired(now)) {
                    Some(item) => Ok((200, Some(item.to_response().value))),
                    None => Err(404u16),
                },
                TransactionWrite::Create(item) => {
                    if working.get(&id).is_some_and(|i| !i.expired(now)) {
                        Err(409)
                    } else {
                        let etag = format!("etag-{}-{}", idx, self.etag_seq.fetch_add(1, Ordering::SeqCst));
                        let ttl = item.get("ttl").and_then(Value::as_i64);
                        let stored = StoredItem { value: item.clone(), etag, ts: now, ttl };
                        let resp = stored.to_response();
                        working.insert(id.clone(), stored);
                        Ok((201, Some(resp.value)))
                    }
                }
                TransactionWrite::Replace(item) => {
                    if !working.get(&id).is_some_and(|i| !i.expired(now)) {
                        Err(404)
                    } else {
                        let etag = format!("etag-{}-{}", idx, self.etag_seq.fetch_add(1, Ordering::SeqCst));
                        let ttl = item.get("ttl").and_then(Value::as_i64);
                        let stored = StoredItem { value: item.clone(), etag, ts: now, ttl };
                        let resp = stored.to_response();
                        working.insert(id.clone(), stored);
                        Ok((200, Some(resp.value)))
                    }
                }
                TransactionWrite::Patch(patch_ops) => {
                    match working.get(&id).filter(|i| !i.expired(now)) {
                        None => Err(404),
                        Some(existing) => {
                            let mut value = existing.value.clone();
                            match apply_patch(&mut value, patch_ops) {
                                Ok(()) => {
                                    let etag = format!(
                                        "etag-{}-{}",
                                        idx,
                                        self.etag_seq.fetch_add(1, Ordering::SeqCst)
                                    );
                                    let ttl = existing.ttl;
                                    let stored = StoredItem { value, etag, ts: now, ttl };
                                    let resp = stored.to_response();
                                    working.insert(id.clone(), stored);
                                    Ok((200, Some(resp.value)))
                                }
                                Err(_) => Err(400),
                            }
                        }
                    }
                }
                TransactionWrite::Delete => {
                    if working.remove(&id).is_some() {
                        Ok((204, None))
                    } else {
                        Err(404)
                    }
                }
            };

            match outcome {
                Ok((status, value)) => results.push(TransactionStepResult { status, value }),
                Err(status) => {
                    failure = Some((idx, status));
                    results.push(TransactionStepResult { status, value: None });
                }
            }
        }

        if let Some((idx, status)) = failure {
            for (i, r) in results.iter_mut().enumerate() {
                if i != idx {
                    r.status = 424;
                    r.value = None;
                }
            }
            return Ok(TransactionOutcome { success: false, steps: results });
        }

        partitions.insert(partition_key, working);
        Ok(TransactionOutcome { success: true, steps: results })
    }
}

struct InMemoryPager {
    partitions: BTreeMap<String, Partition>,
    options: QueryOptions,
    served: bool,
}

#[async_trait]
impl Pager for InMemoryPager {
    async fn next_page(&mut self) -> StoreResult<Vec<Value>> {
        if self.served {
            return Ok(Vec::new());
        }
        self.served = true;

        let scan: Box<dyn Iterator<Item = (&String, &Partition)>> = match &self.options.partition_key {
            Some(pk) => Box::new(
                self.partitions
                    .get(&pk.to_lowercase())
                    .into_iter()
                    .map(move |p| (pk, p)),
            ),
            None => Box::new(self.partitions.iter()),
        };

        let mut items = Vec::new();
        for (_pk, partition) in scan {
            for (id, item) in partition.iter() {
                if InMemoryContainer::matches(&self.options, id, item) {
                    items.push(item.to_response().value);
                }
            }
        }
        if let Some(limit) = self.options.page_size {
            items.truncate(limit as usize);
        }
        Ok(items)
    }

    fn continuation_token(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_point_read() {
        let store = InMemoryContainer::new();
        let item = json!({"id": "x", "resourceType": "t", "properties": {}});
        store.create("sub", item.clone()).await.unwrap();
        let read = store.point_read("sub", "x").await.unwrap().unwrap();
        assert_eq!(read.value["id"], "x");
    }

    #[tokio::test]
    async fn create_duplicate_conflicts() {
        let store = InMemoryContainer::new();
        let item = json!({"id": "x", "resourceType": "t", "properties": {}});
        store.create("sub", item.clone()).await.unwrap();
        let err = store.create("sub", item).await.unwrap_err();
        assert!(err.is_status(409));
    }

    #[tokio::test]
    async fn replace_with_wrong_etag_fails_precondition() {
        let store = InMemoryContainer::new();
        let item = json!({"id": "x", "resourceType": "t", "properties": {}});
        store.create("sub", item.clone()).await.unwrap();
        let err = store
            .replace("sub", "x", item, Some("bogus-etag"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn patch_set_and_remove() {
        let store = InMemoryContainer::new();
        let item = json!({"id": "x", "resourceType": "t", "properties": {"status": "Accepted"}});
        store.create("sub", item).await.unwrap();
        let resp = store
            .patch(
                "sub",
                "x",
                vec![PatchOperation::Set {
                    path: "/properties/status".to_string(),
                    value: json!("Succeeded"),
                }],
                None,
            )
            .await
            .unwrap();
        assert_eq!(resp.value["properties"]["status"], "Succeeded");
    }

    #[tokio::test]
    async fn transaction_all_or_nothing() {
        let store = InMemoryContainer::new();
        let a = json!({"id": "a", "resourceType": "t", "properties": {}});
        store.create("sub", a.clone()).await.unwrap();

        let ops = vec![
            TransactionOp { id: "b".to_string(), write: TransactionWrite::Create(json!({"id": "b", "properties": {}})) },
            TransactionOp { id: "a".to_string(), write: TransactionWrite::Create(a) },
        ];
        let outcome = store.execute_transaction("sub", ops).await.unwrap();
        assert!(!outcome.success);
        // "b" must not have been committed despite its step succeeding in isolation.
        assert!(store.point_read("sub", "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ttl_expiry_makes_item_invisible() {
        use crate::clock::test_support::FixedClock;
        let clock = Arc::new(FixedClock::new(chrono::DateTime::from_timestamp(0, 0).unwrap()));
        let store = InMemoryContainer::with_clock(clock.clone());
        let item = json!({"id": "x", "resourceType": "t", "properties": {}, "ttl": 5});
        store.create("sub", item).await.unwrap();
        clock.advance(chrono::Duration::seconds(10));
        assert!(store.point_read("sub", "x").await.unwrap().is_none());
    }
}
