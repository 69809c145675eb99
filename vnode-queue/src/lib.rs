//! # vnode-queue
//!
//! Rate-limited, deduplicating work queue for reconciliation loops.
//!
//! Producers [`add`](WorkQueue::add) keys; workers loop on
//! [`handle_queue_item`] until the queue is shut down. A key is never handed
//! to two workers at once, and adding a key that is already queued or in
//! flight is coalesced.

pub mod queue;
pub mod rate_limiter;
pub mod rate_limiting;
pub mod worker;

pub use queue::{QueueItem, WorkQueue};
pub use rate_limiter::{
    default_controller_rate_limiter, BucketRateLimiter, ItemExponentialFailureRateLimiter,
    MaxOfRateLimiter, RateLimitSettings, RateLimiter,
};
pub use rate_limiting::RateLimitingQueue;
pub use worker::{handle_queue_item, ItemOutcome, Retryable, DEFAULT_MAX_RETRIES};
