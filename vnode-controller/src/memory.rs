//! In-process [`PodInformer`] backed by a map.
//!
//! Used to embed the controller without a cluster watch, and by tests.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use vnode_core::{CacheError, Pod, ResourceKey};

use crate::cache::{DeletedPod, PodInformer, PodLister, ResourceEventHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Pending,
    Synced,
    Failed,
}

#[derive(Default)]
struct PodStore {
    pods: RwLock<BTreeMap<ResourceKey, Pod>>,
}

impl PodStore {
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ResourceKey, Pod>> {
        self.pods.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ResourceKey, Pod>> {
        self.pods.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PodLister for PodStore {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Pod>, CacheError> {
        Ok(self.read().get(&ResourceKey::new(namespace, name)).cloned())
    }
}

pub struct InMemoryPodInformer {
    store: Arc<PodStore>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler>>>,
    sync: watch::Sender<SyncState>,
}

impl Default for InMemoryPodInformer {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPodInformer {
    pub fn new() -> Self {
        let (sync, _) = watch::channel(SyncState::Pending);
        Self {
            store: Arc::new(PodStore::default()),
            handlers: RwLock::new(Vec::new()),
            sync,
        }
    }

    /// Complete the initial listing.
    pub fn mark_synced(&self) {
        self.sync.send_replace(SyncState::Synced);
    }

    /// Make every pending and future [`wait_for_sync`](PodInformer::wait_for_sync) fail.
    pub fn fail_sync(&self) {
        self.sync.send_replace(SyncState::Failed);
    }

    fn handlers(&self) -> Vec<Arc<dyn ResourceEventHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Insert or replace `pod`, notifying handlers with an add or update.
    pub fn apply(&self, pod: Pod) {
        let key = pod.key();
        let previous = self.store.write().insert(key, pod.clone());
        for handler in self.handlers() {
            match &previous {
                Some(old) => handler.on_update(old, &pod),
                None => handler.on_add(&pod),
            }
        }
    }

    /// Remove the pod, notifying handlers. Returns the removed pod.
    pub fn remove(&self, namespace: &str, name: &str) -> Option<Pod> {
        let removed = self
            .store
            .write()
            .remove(&ResourceKey::new(namespace, name))?;
        let deleted = DeletedPod::Pod(removed.clone());
        for handler in self.handlers() {
            handler.on_delete(&deleted);
        }
        Some(removed)
    }

    /// Remove the pod and deliver a tombstone instead of its final state.
    pub fn remove_unobserved(&self, namespace: &str, name: &str) -> Option<Pod> {
        let key = ResourceKey::new(namespace, name);
        let removed = self.store.write().remove(&key)?;
        let deleted = DeletedPod::Tombstone {
            key: key.to_string(),
        };
        for handler in self.handlers() {
            handler.on_delete(&deleted);
        }
        Some(removed)
    }

    /// Current cached copy of a pod.
    pub fn get(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.store
            .read()
            .get(&ResourceKey::new(namespace, name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PodInformer for InMemoryPodInformer {
    async fn wait_for_sync(&self) -> bool {
        let mut rx = self.sync.subscribe();
        let synced = match rx.wait_for(|state| *state != SyncState::Pending).await {
            Ok(state) => *state == SyncState::Synced,
            Err(_) => false,
        };
        synced
    }

    fn lister(&self) -> Arc<dyn PodLister> {
        self.store.clone()
    }

    fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handler.clone());
        let existing: Vec<Pod> = self.store.read().values().cloned().collect();
        for pod in &existing {
            handler.on_add(pod);
        }
    }
}
