//! Deduplicating work queue with delayed adds.
//!
//! Items move through three sets:
//! - `dirty`: needs processing (queued, or re-added while in flight)
//! - `processing`: handed to a worker, not yet `done`
//! - `waiting`: scheduled for a later `add`
//!
//! An item is never in `queue` twice and never handed to two workers at once.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::cmp::Reverse;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Stand-in deadline for delays past what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Bounds for anything that can travel through a [`WorkQueue`].
pub trait QueueItem: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

impl<T> QueueItem for T where T: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

struct State<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    /// Earliest pending deadline per delayed item.
    waiting: HashMap<T, Instant>,
    /// Min-heap of `(deadline, item)`; entries superseded in `waiting` are stale.
    timers: BinaryHeap<Reverse<(Instant, T)>>,
    shutting_down: bool,
}

impl<T: QueueItem> State<T> {
    fn insert(&mut self, item: T) -> bool {
        if self.dirty.contains(&item) {
            return false;
        }
        self.dirty.insert(item.clone());
        if self.processing.contains(&item) {
            // Re-queued by `done`.
            return false;
        }
        self.queue.push_back(item);
        true
    }

    /// Move every delayed item whose deadline has passed into the queue.
    fn promote_due(&mut self, now: Instant) -> usize {
        let mut promoted = 0;
        while let Some(Reverse((deadline, _))) = self.timers.peek() {
            if *deadline > now {
                break;
            }
            let Some(Reverse((deadline, item))) = self.timers.pop() else {
                break;
            };
            if self.waiting.get(&item) != Some(&deadline) {
                continue;
            }
            self.waiting.remove(&item);
            if self.insert(item) {
                promoted += 1;
            }
        }
        promoted
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.peek().map(|Reverse((deadline, _))| *deadline)
    }
}

/// A named queue of keys with dedup and in-flight coalescing.
pub struct WorkQueue<T> {
    name: String,
    state: Mutex<State<T>>,
    notify: Notify,
}

impl<T: QueueItem> WorkQueue<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                waiting: HashMap::new(),
                timers: BinaryHeap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Critical sections never panic while mutating; a poisoned lock still
        // holds consistent sets.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `item` as needing processing. No-op after [`shut_down`](Self::shut_down).
    pub fn add(&self, item: T) {
        let queued = {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            state.insert(item)
        };
        if queued {
            self.notify.notify_one();
        }
    }

    /// Add `item` once `delay` has elapsed.
    ///
    /// If the item is already waiting, the earlier of the two deadlines wins.
    pub fn add_after(&self, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        let now = Instant::now();
        let deadline = now.checked_add(delay).unwrap_or(now + FAR_FUTURE);
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            match state.waiting.get(&item) {
                Some(existing) if *existing <= deadline => return,
                _ => {}
            }
            state.waiting.insert(item.clone(), deadline);
            state.timers.push(Reverse((deadline, item)));
        }
        // Waiters re-evaluate their sleep against the new earliest deadline.
        self.notify.notify_waiters();
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the queue is shut down and every ready item has
    /// been handed out. The caller must call [`done`](Self::done) afterwards.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_deadline = {
                let mut state = self.lock();
                state.promote_due(Instant::now());
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    if !state.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
                state.next_deadline()
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Finish processing `item`. Re-queues it if it was added meanwhile.
    pub fn done(&self, item: &T) {
        let requeued = {
            let mut state = self.lock();
            state.processing.remove(item);
            if state.dirty.contains(item) {
                state.queue.push_back(item.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Stop accepting items and wake every waiter.
    ///
    /// Delayed items that have not come due are discarded.
    pub fn shut_down(&self) {
        {
            let mut state = self.lock();
            state.shutting_down = true;
            state.waiting.clear();
            state.timers.clear();
        }
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Items ready to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items scheduled for a later add.
    pub fn waiting_len(&self) -> usize {
        self.lock().waiting.len()
    }
}

impl<T> Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue").field("name", &self.name).finish()
    }
}
