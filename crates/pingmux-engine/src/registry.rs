//! Two-phase job registry: ids are reserved first, and the full job record
//! is published later, once construction finishes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use pingmux_core::JobId;

use crate::job::JobInstance;

/// One registry slot, observable while the job behind it is still being
/// built.
///
/// The ready gate fires exactly once per entry lifetime: either when the job
/// record is published, or when construction is abandoned and the entry is
/// removed. After the gate fires, `record` returning `None` means the job
/// never came up.
pub struct JobEntry {
    ready: CancellationToken,
    record: Mutex<Option<Arc<JobInstance>>>,
}

impl JobEntry {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            ready: CancellationToken::new(),
            record: Mutex::new(None),
        })
    }

    /// Wait until the entry is published or abandoned.
    pub async fn ready(&self) {
        self.ready.cancelled().await;
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_cancelled()
    }

    /// The published job, if construction succeeded.
    pub fn record(&self) -> Option<Arc<JobInstance>> {
        self.record.lock().clone()
    }

    fn publish(&self, job: Arc<JobInstance>) {
        *self.record.lock() = Some(job);
        self.ready.cancel();
    }

    fn abandon(&self) {
        self.ready.cancel();
    }
}

/// All live jobs, reserved and ready alike, behind one mutex.
pub struct JobRegistry {
    entries: Mutex<HashMap<JobId, Arc<JobEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve `id` if it is free. The reservation occupies the id until the
    /// entry is removed.
    pub fn try_reserve(&self, id: JobId) -> Option<Arc<JobEntry>> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return None;
        }
        let entry = JobEntry::new();
        entries.insert(id, Arc::clone(&entry));
        Some(entry)
    }

    /// Publish a finished job into its reserved entry and fire the ready
    /// gate. Returns false if the reservation is gone, in which case the job
    /// must not be considered registered.
    pub fn publish(&self, id: JobId, job: Arc<JobInstance>) -> bool {
        let entries = self.entries.lock();
        match entries.get(&id) {
            Some(entry) => {
                entry.publish(job);
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, id: JobId) -> Option<Arc<JobEntry>> {
        self.entries.lock().get(&id).cloned()
    }

    /// Remove `id` and fire its ready gate, so waiters holding the entry
    /// never block on an id that no longer exists.
    pub fn remove(&self, id: JobId) -> Option<Arc<JobEntry>> {
        let entry = self.entries.lock().remove(&id)?;
        entry.abandon();
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Every published job, for listings. Reserved-but-unpublished entries
    /// are skipped.
    pub fn ready_jobs(&self) -> Vec<Arc<JobInstance>> {
        self.entries
            .lock()
            .values()
            .filter_map(|entry| entry.record())
            .collect()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use pingmux_core::EffectiveParams;
    use pingmux_probe::mock::MockProber;

    fn job(id: JobId) -> Arc<JobInstance> {
        JobInstance::new(
            id,
            String::new(),
            EffectiveParams::default(),
            Arc::new(MockProber::new(Vec::new())),
            CancellationToken::new(),
            0,
            0,
            5,
        )
    }

    #[test]
    fn reserve_occupies_the_id() {
        let registry = JobRegistry::new();
        let id = JobId::new(42);
        assert!(registry.try_reserve(id).is_some());
        assert!(registry.try_reserve(id).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reserved_entry_is_visible_but_not_ready() {
        let registry = JobRegistry::new();
        let id = JobId::new(1);
        registry.try_reserve(id).unwrap();

        let entry = registry.lookup(id).unwrap();
        assert!(!entry.is_ready());
        assert!(entry.record().is_none());
        assert!(registry.ready_jobs().is_empty());
    }

    #[tokio::test]
    async fn publish_fires_the_gate_and_exposes_the_record() {
        let registry = JobRegistry::new();
        let id = JobId::new(9);
        registry.try_reserve(id).unwrap();
        let entry = registry.lookup(id).unwrap();

        let waiter = {
            let entry = Arc::clone(&entry);
            tokio::spawn(async move {
                entry.ready().await;
                entry.record().is_some()
            })
        };

        assert!(registry.publish(id, job(id)));
        assert!(waiter.await.unwrap());
        assert_eq!(registry.ready_jobs().len(), 1);
    }

    #[tokio::test]
    async fn remove_unblocks_waiters_with_no_record() {
        let registry = JobRegistry::new();
        let id = JobId::new(3);
        registry.try_reserve(id).unwrap();
        let entry = registry.lookup(id).unwrap();

        let waiter = {
            let entry = Arc::clone(&entry);
            tokio::spawn(async move {
                entry.ready().await;
                entry.record().is_none()
            })
        };

        registry.remove(id);
        assert!(waiter.await.unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn publish_into_removed_entry_fails() {
        let registry = JobRegistry::new();
        let id = JobId::new(5);
        registry.try_reserve(id).unwrap();
        registry.remove(id);

        assert!(!registry.publish(id, job(id)));
        assert!(registry.lookup(id).is_none());
    }

    #[test]
    fn removed_id_is_reusable() {
        let registry = JobRegistry::new();
        let id = JobId::new(8);
        registry.try_reserve(id).unwrap();
        registry.remove(id);
        assert!(registry.try_reserve(id).is_some());
    }
}
