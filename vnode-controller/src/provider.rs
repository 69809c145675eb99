//! The capability contract a workload backend implements.

use async_trait::async_trait;
use tokio::sync::mpsc;
use vnode_core::{Pod, ProviderError};

/// Reacts to pods scheduled to the node the provider backs.
///
/// Errors must carry an [`ErrorKind`](vnode_core::ErrorKind) so the
/// controller can tell retryable failures from permanent ones.
#[async_trait]
pub trait PodLifecycleHandler: Send + Sync {
    /// Deploy `pod` in the provider.
    async fn create_pod(&self, pod: &Pod) -> Result<(), ProviderError>;

    /// Bring an existing provider workload in line with `pod`.
    async fn update_pod(&self, pod: &Pod) -> Result<(), ProviderError>;

    /// Remove the workload. Deleting an absent workload may return a
    /// `NotFound` error, which the controller treats as success.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ProviderError>;

    /// The provider's view of one workload, `None` if it has no record.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ProviderError>;

    /// Every workload the provider runs. May be cached.
    async fn get_pods(&self) -> Result<Vec<Pod>, ProviderError>;

    /// Hand the provider the channel it reports status changes on.
    ///
    /// Called once, before the controller starts waiting for its cache.
    fn notify_pods(&self, notifier: StatusNotifier);
}

/// Sending half of the status back-channel.
///
/// Cloneable and non-blocking: a provider thread never waits on the
/// controller. Notifications sent after shutdown are discarded.
#[derive(Debug, Clone)]
pub struct StatusNotifier {
    tx: mpsc::UnboundedSender<Pod>,
}

impl StatusNotifier {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Pod>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report the current observed state of `pod`. Its status must be up to date.
    pub fn notify(&self, pod: Pod) {
        if self.tx.send(pod).is_err() {
            tracing::debug!("status notification dropped, controller has stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
