//! Provider status → cluster.

use tracing::Instrument;
use vnode_core::{ClientError, Pod, ResourceKey};

use crate::cache::get_by_key;
use crate::controller::Shared;
use crate::error::SyncError;

impl Shared {
    /// Record a provider notification and queue a status push if it changed.
    ///
    /// Returns `true` when the key was enqueued.
    pub(crate) fn enqueue_pod_status_update(&self, pod: Pod) -> bool {
        let key = pod.key();
        let token = key.to_string();

        let record = match self.known.get(&token) {
            Some(record) => record,
            None => match get_by_key(self.lister.as_ref(), &key) {
                // Notification raced the add event.
                Ok(Some(_)) => self.known.observe(&token),
                Ok(None) => {
                    tracing::debug!(pod = %token, "dropping status for pod unknown to the cluster");
                    return false;
                }
                Err(err) => {
                    tracing::warn!(pod = %token, error = %err, "dropping status, cache lookup failed");
                    return false;
                }
            },
        };

        if !record.record_status(pod) {
            return false;
        }
        self.status_queue.add_rate_limited(token);
        true
    }

    /// Write the last status the provider reported for `key` to the cluster.
    pub(crate) async fn process_pod_status_update(&self, key: &str) -> Result<(), SyncError> {
        let span = tracing::info_span!("process_pod_status_update", key);
        async {
            let coordinates = ResourceKey::parse(key)?;

            let cluster_pod =
                match get_by_key(self.lister.as_ref(), &coordinates).map_err(|source| {
                    SyncError::Cache {
                        key: key.to_owned(),
                        source,
                    }
                })? {
                    Some(pod) => pod,
                    None => {
                        tracing::debug!("pod no longer in cache, skipping status update");
                        return Ok(());
                    }
                };

            let Some(record) = self.known.get(key) else {
                tracing::debug!("pod no longer tracked, skipping status update");
                return Ok(());
            };
            let Some(provider_pod) = record.last_status() else {
                return Ok(());
            };

            self.update_pod_status(cluster_pod, &provider_pod).await
        }
        .instrument(span)
        .await
    }

    async fn update_pod_status(&self, cluster_pod: Pod, provider_pod: &Pod) -> Result<(), SyncError> {
        let key = cluster_pod.key().to_string();
        if cluster_pod.phase().is_terminal() {
            tracing::debug!(phase = %cluster_pod.phase(), "pod already terminal in cluster, not overwriting status");
            return Ok(());
        }
        if cluster_pod.status == provider_pod.status {
            return Ok(());
        }

        let mut updated = cluster_pod;
        updated.status = provider_pod.status.clone();
        match self
            .unless_cancelled(&key, self.client.update_status(&updated))
            .await?
        {
            Ok(_) => {
                tracing::debug!(phase = %updated.phase(), "updated pod status in cluster");
                Ok(())
            }
            Err(ClientError::NotFound { .. }) => Ok(()),
            Err(ClientError::Conflict { .. }) => self.retry_status_on_latest(&key, provider_pod).await,
            Err(source) => Err(SyncError::Client { key, source }),
        }
    }

    /// The cached copy was stale. Apply the status once to the API's copy.
    async fn retry_status_on_latest(&self, key: &str, provider_pod: &Pod) -> Result<(), SyncError> {
        let mut latest = match self
            .unless_cancelled(
                key,
                self.client.get(provider_pod.namespace(), provider_pod.name()),
            )
            .await?
        {
            Ok(latest) => latest,
            Err(ClientError::NotFound { .. }) => return Ok(()),
            Err(source) => {
                return Err(SyncError::Client {
                    key: key.to_owned(),
                    source,
                })
            }
        };
        if latest.phase().is_terminal() || latest.status == provider_pod.status {
            return Ok(());
        }
        latest.status = provider_pod.status.clone();
        match self
            .unless_cancelled(key, self.client.update_status(&latest))
            .await?
        {
            Ok(_) | Err(ClientError::NotFound { .. }) => Ok(()),
            Err(source) => Err(SyncError::Client {
                key: key.to_owned(),
                source,
            }),
        }
    }
}
