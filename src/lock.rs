//! Distributed lock service: TTL-backed acquire/renew/release
//! over a single document per lock name.
use crate::clock::Clock;
use crate::container::ContainerClient;
use crate::envelope::LockDocument;
use crate::error::{StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A held lock: the document's coordinates plus a background renewal
/// worker. Dropping this does not release the lock; call
/// [`LockService::release`] explicitly.
pub struct HeldLock {
    partition_key: String,
    id: String,
    etag: Arc<Mutex<String>>,
    stop: Arc<Notify>,
    lost: Arc<AtomicBool>,
    renewal: Option<JoinHandle<()>>,
}

impl HeldLock {
    /// `true` once the renewal worker has observed a precondition failure
    /// and given up — the caller no longer holds the lock.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn current_etag(&self) -> String {
        self.etag.lock().unwrap().clone()
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        self.stop.notify_waiters();
        if let Some(handle) = self.renewal.take() {
            handle.abort();
        }
    }
}

/// Distributed lock service, backed by a single-item-per-lock container.
pub struct LockService {
    container: Arc<dyn ContainerClient>,
    clock: Arc<dyn Clock>,
    ttl_seconds: i64,
}

impl LockService {
    pub fn new(container: Arc<dyn ContainerClient>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        LockService {
            container,
            clock,
            ttl_seconds: ttl.as_secs().max(1) as i64,
        }
    }

    /// `TryAcquireLock`: one create attempt, no
    /// waiting. `Ok(None)` on contention.
    pub async fn try_acquire(&self, lock_id: &str, owner: &str) -> StoreResult<Option<HeldLock>> {
        let doc = LockDocument {
            id: lock_id.to_string(),
            owner: owner.to_string(),
            ttl_seconds: self.ttl_seconds,
            etag: None,
            ts: None,
        };
        let partition_key = lock_id.to_lowercase();
        match self.container.create(&partition_key, doc.encode()).await {
            Ok(resp) => Ok(Some(self.spawn_holder(
                partition_key,
                lock_id.to_lowercase(),
                resp.etag,
                resp.ts,
            ))),
            Err(e) if e.is_status(409) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `AcquireLock`: retries [`Self::try_acquire`]
    /// at a fixed interval until it succeeds or `timeout` elapses.
    pub async fn acquire(&self, lock_id: &str, owner: &str, timeout: Duration) -> StoreResult<HeldLock> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(held) = self.try_acquire(lock_id, owner).await? {
                return Ok(held);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(StoreError::transport(
                    format!("timed out acquiring lock '{}'", lock_id),
                    Some(503),
                ));
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let jitter_ms = rand::random::<u64>() % 250;
            let wait = Duration::from_secs(1) + Duration::from_millis(jitter_ms);
            tokio::time::sleep(wait.min(remaining)).await;
        }
    }

    /// Spawns the background renewal loop: per §4.H, wakes at
    /// `lastServerTimestamp + ttl - 1s` (using the injected clock against
    /// the server `_ts` the last write echoed back, not a fixed interval),
    /// renews with `IfMatch`, and stops (marking the lock lost) the first
    /// time the precondition fails.
    fn spawn_holder(&self, partition_key: String, id: String, etag: String, ts: i64) -> HeldLock {
        let stop = Arc::new(Notify::new());
        let lost = Arc::new(AtomicBool::new(false));
        let container = self.container.clone();
        let clock = self.clock.clone();
        let ttl_seconds = self.ttl_seconds;
        let owner_partition_key = partition_key.clone();
        let owner_id = id.clone();
        let current_etag = Arc::new(Mutex::new(etag.clone()));
        let current_ts = Arc::new(Mutex::new(ts));

        let stop_for_task = stop.clone();
        let lost_for_task = lost.clone();
        let etag_for_task = current_etag.clone();
        let ts_for_task = current_ts.clone();
        let renewal = tokio::spawn(async move {
            loop {
                let last_ts = *ts_for_task.lock().unwrap();
                let wake_at = last_ts + (ttl_seconds - 1).max(0);
                let sleep_for = (wake_at - clock.now().timestamp()).max(0) as u64;
                tokio::select! {
                    _ = stop_for_task.notified() => return,
                    _ = tokio::time::sleep(Duration::from_secs(sleep_for)) => {}
                }
                let last_etag = etag_for_task.lock().unwrap().clone();
                let doc = LockDocument {
                    id: owner_id.clone(),
                    owner: String::new(),
                    ttl_seconds,
                    etag: None,
                    ts: None,
                };
                match container
                    .replace(&owner_partition_key, &owner_id, doc.encode(), Some(&last_etag))
                    .await
                {
                    Ok(resp) => {
                        *etag_for_task.lock().unwrap() = resp.etag;
                        *ts_for_task.lock().unwrap() = resp.ts;
                    }
                    Err(_) => {
                        lost_for_task.store(true, Ordering::SeqCst);
                        return;
                    }
                }
            }
        });

        HeldLock {
            partition_key,
            id,
            etag: current_etag,
            stop,
            lost,
            renewal: Some(renewal),
        }
    }

    /// `ReleaseLock`: deletes with `IfMatch`; a 412
    /// (someone else's renewal already overwrote it) counts as released.
    pub async fn release(&self, held: &HeldLock) -> StoreResult<()> {
        held.stop.notify_waiters();
        match self
            .container
            .delete(&held.partition_key, &held.id, Some(&held.current_etag()))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if matches!(e, StoreError::PreconditionFailed(_)) || e.is_status(412) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
