//! Boundary to the watched, eventually consistent mirror of cluster pods.

use std::sync::Arc;

use async_trait::async_trait;
use vnode_core::{CacheError, Pod, ResourceKey};

/// Read access to the cache mirror.
pub trait PodLister: Send + Sync {
    /// `Ok(None)` when the cache has no such pod.
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Pod>, CacheError>;
}

/// Payload of a delete notification.
#[derive(Debug, Clone, PartialEq)]
pub enum DeletedPod {
    /// Last known state of the deleted pod.
    Pod(Pod),
    /// The watch missed the delete; only the key is known.
    Tombstone { key: String },
}

impl DeletedPod {
    /// Queue token for the deleted object.
    pub fn key(&self) -> String {
        match self {
            DeletedPod::Pod(pod) => pod.key().to_string(),
            DeletedPod::Tombstone { key } => key.clone(),
        }
    }
}

/// Receives cache notifications. Called on the cache's own threads; must not block.
pub trait ResourceEventHandler: Send + Sync {
    fn on_add(&self, pod: &Pod);
    fn on_update(&self, old: &Pod, new: &Pod);
    fn on_delete(&self, deleted: &DeletedPod);
}

/// A cache mirror plus its watch.
#[async_trait]
pub trait PodInformer: Send + Sync {
    /// Wait for the initial full listing. `false` if the cache can never sync.
    async fn wait_for_sync(&self) -> bool;

    fn lister(&self) -> Arc<dyn PodLister>;

    /// Register `handler`. Pods already in the cache are replayed to it as adds.
    fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler>);
}

/// Look up the pod for `key`.
pub fn get_by_key(lister: &dyn PodLister, key: &ResourceKey) -> Result<Option<Pod>, CacheError> {
    lister.get(&key.namespace, &key.name)
}
