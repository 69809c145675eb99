//! Per-key records of the last status each provider reported.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use vnode_core::Pod;

/// Record for one pod key, from first observation until removal.
///
/// Fields are only touched under the record's own lock. The snapshot itself is
/// treated as immutable and handed out by value.
#[derive(Debug, Default)]
pub struct KnownPod {
    last_status_from_provider: Mutex<Option<Pod>>,
}

impl KnownPod {
    fn lock(&self) -> MutexGuard<'_, Option<Pod>> {
        self.last_status_from_provider
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `pod` if its status differs from the last one recorded.
    ///
    /// Returns `true` when the record changed and the key needs a status push.
    pub fn record_status(&self, pod: Pod) -> bool {
        let mut last = self.lock();
        if last.as_ref().is_some_and(|prev| prev.status == pod.status) {
            return false;
        }
        *last = Some(pod);
        true
    }

    pub fn last_status(&self) -> Option<Pod> {
        self.lock().clone()
    }
}

/// Concurrent key → record map. No lock spans more than one key.
#[derive(Debug, Default)]
pub struct KnownPods {
    pods: DashMap<String, Arc<KnownPod>>,
}

impl KnownPods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `key`, creating it if absent.
    pub fn observe(&self, key: &str) -> Arc<KnownPod> {
        self.pods
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(KnownPod::default()))
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<Arc<KnownPod>> {
        self.pods.get(key).map(|entry| entry.value().clone())
    }

    pub fn forget(&self, key: &str) -> bool {
        self.pods.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pods.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }
}
