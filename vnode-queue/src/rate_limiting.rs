//! [`WorkQueue`] with rate-limited requeues.

use std::ops::Deref;

use crate::queue::{QueueItem, WorkQueue};
use crate::rate_limiter::{default_controller_rate_limiter, RateLimitSettings, RateLimiter};

pub struct RateLimitingQueue<T> {
    queue: WorkQueue<T>,
    limiter: Box<dyn RateLimiter<T>>,
}

impl<T: QueueItem> RateLimitingQueue<T> {
    pub fn new(name: impl Into<String>, limiter: Box<dyn RateLimiter<T>>) -> Self {
        Self {
            queue: WorkQueue::new(name),
            limiter,
        }
    }

    /// Queue backed by [`default_controller_rate_limiter`].
    pub fn with_settings(name: impl Into<String>, settings: RateLimitSettings) -> Self {
        Self::new(name, Box::new(default_controller_rate_limiter(settings)))
    }

    /// Add `item` after the delay its rate limiter assigns.
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.limiter.when(&item);
        tracing::trace!(queue = %self.queue.name(), item = ?item, delay_ms = delay.as_millis(), "rate-limited add");
        self.queue.add_after(item, delay);
    }

    /// Clear retry history for `item`. Does not remove it from the queue.
    pub fn forget(&self, item: &T) {
        self.limiter.forget(item);
    }

    pub fn num_requeues(&self, item: &T) -> u32 {
        self.limiter.num_requeues(item)
    }
}

impl<T> Deref for RateLimitingQueue<T> {
    type Target = WorkQueue<T>;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}
