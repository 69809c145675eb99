//! Startup cleanup of provider pods the cluster no longer knows about.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;
use vnode_core::Pod;

use crate::cache::get_by_key;
use crate::controller::Shared;
use crate::telemetry::dangling_pod_span;

/// What the sweep did, for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SweepSummary {
    /// Provider pods with no cluster counterpart.
    pub(crate) dangling: usize,
    pub(crate) deleted: usize,
    pub(crate) failed: usize,
    /// The provider list or a cache lookup failed; nothing was deleted.
    pub(crate) aborted: bool,
}

impl Shared {
    /// Delete provider pods that have no pod in the cache.
    ///
    /// At most `concurrency` deletions run at once. Per-pod failures are
    /// logged and not retried.
    pub(crate) async fn delete_dangling_pods(self: &Arc<Self>, concurrency: usize) -> SweepSummary {
        let mut summary = SweepSummary::default();

        let listed = tokio::select! {
            _ = self.cancel.cancelled() => None,
            listed = self.provider.get_pods() => Some(listed),
        };
        let provider_pods = match listed {
            Some(Ok(pods)) => pods,
            None => {
                summary.aborted = true;
                return summary;
            }
            Some(Err(err)) => {
                tracing::error!(error = %err, "failed to fetch the list of pods from the provider");
                summary.aborted = true;
                return summary;
            }
        };

        let mut dangling: Vec<Pod> = Vec::new();
        for pod in provider_pods {
            match get_by_key(self.lister.as_ref(), &pod.key()) {
                Ok(Some(_)) => {}
                Ok(None) => dangling.push(pod),
                Err(err) => {
                    tracing::error!(error = %err, "failed to fetch pod from the cache");
                    summary.aborted = true;
                    return summary;
                }
            }
        }
        summary.dangling = dangling.len();
        if dangling.is_empty() {
            return summary;
        }

        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut deletions = JoinSet::new();
        for pod in dangling {
            let shared = self.clone();
            let permits = permits.clone();
            let span = dangling_pod_span(&pod);
            deletions.spawn(
                async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return false;
                    };
                    match shared.delete_pod(pod.namespace(), pod.name()).await {
                        Ok(()) => {
                            tracing::info!("deleted leaked pod in provider");
                            true
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "failed to delete leaked pod in provider");
                            false
                        }
                    }
                }
                .instrument(span),
            );
        }

        while let Some(joined) = deletions.join_next().await {
            match joined {
                Ok(true) => summary.deleted += 1,
                Ok(false) => summary.failed += 1,
                Err(err) => {
                    tracing::error!(error = %err, "dangling pod deletion task failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            dangling = summary.dangling,
            deleted = summary.deleted,
            failed = summary.failed,
            "dangling pod sweep finished",
        );
        summary
    }
}
