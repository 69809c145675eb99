//! One step of a queue worker: dequeue, handle, requeue or forget.

use std::fmt::Display;
use std::future::Future;

use crate::queue::QueueItem;
use crate::rate_limiting::RateLimitingQueue;

/// Retries a key gets before it is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Errors a handler can hand back to the queue.
pub trait Retryable: Display {
    /// `false` when retrying can never succeed.
    fn is_retryable(&self) -> bool;
}

/// What happened to the item handled by [`handle_queue_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Handler succeeded; retry history cleared.
    Synced,
    /// Handler failed; item scheduled again with backoff.
    Requeued,
    /// Handler failed with an error that retrying cannot fix.
    Dropped,
    /// Handler failed and the item ran out of retries.
    RetriesExhausted,
}

/// Take one item off `queue` and run `handler` on it.
///
/// Returns `None` once the queue is shut down and drained, which tells the
/// worker loop to exit.
pub async fn handle_queue_item<T, F, Fut, E>(
    queue: &RateLimitingQueue<T>,
    max_retries: u32,
    handler: F,
) -> Option<ItemOutcome>
where
    T: QueueItem,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Retryable,
{
    let item = queue.get().await?;
    let result = handler(item.clone()).await;

    let outcome = match result {
        Ok(()) => {
            queue.forget(&item);
            ItemOutcome::Synced
        }
        Err(err) if !err.is_retryable() => {
            queue.forget(&item);
            tracing::warn!(queue = %queue.name(), item = ?item, error = %err, "dropping item after non-retryable failure");
            ItemOutcome::Dropped
        }
        Err(err) if queue.num_requeues(&item) < max_retries => {
            tracing::warn!(queue = %queue.name(), item = ?item, error = %err, "requeuing item after failed sync");
            queue.add_rate_limited(item.clone());
            ItemOutcome::Requeued
        }
        Err(err) => {
            queue.forget(&item);
            tracing::error!(queue = %queue.name(), item = ?item, error = %err, "forgetting item, maximum retries reached");
            ItemOutcome::RetriesExhausted
        }
    };

    queue.done(&item);
    Some(outcome)
}
