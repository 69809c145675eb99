//! Cache notification handlers: filter, record, enqueue.

use std::sync::Arc;

use vnode_core::{pods_effectively_equal, Pod};
use vnode_queue::RateLimitingQueue;

use crate::cache::{DeletedPod, ResourceEventHandler};
use crate::controller::Shared;
use crate::known::KnownPods;

/// Runs on the cache's threads. Only filters and enqueues; never blocks.
pub(crate) struct PodEventHandler {
    known: Arc<KnownPods>,
    queue: Arc<RateLimitingQueue<String>>,
}

impl PodEventHandler {
    pub(crate) fn new(shared: &Shared) -> Self {
        Self {
            known: shared.known.clone(),
            queue: shared.sync_queue.clone(),
        }
    }
}

impl ResourceEventHandler for PodEventHandler {
    fn on_add(&self, pod: &Pod) {
        let key = pod.key().to_string();
        self.known.observe(&key);
        self.queue.add_rate_limited(key);
    }

    fn on_update(&self, old: &Pod, new: &Pod) {
        // Status-only writes, including our own, come back as updates.
        if pods_effectively_equal(old, new) {
            return;
        }
        self.queue.add_rate_limited(new.key().to_string());
    }

    fn on_delete(&self, deleted: &DeletedPod) {
        let key = deleted.key();
        self.known.forget(&key);
        self.queue.add_rate_limited(key);
    }
}
