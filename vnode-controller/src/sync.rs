//! Desired state → provider.

use tracing::Instrument;
use vnode_core::{workload_matches, Pod, ResourceKey};

use crate::cache::get_by_key;
use crate::client::EventType;
use crate::controller::Shared;
use crate::error::SyncError;
use crate::telemetry::sync_pod_span;

impl Shared {
    /// Converge the provider with the cached pod for `key`.
    pub(crate) async fn sync_handler(&self, key: &str) -> Result<(), SyncError> {
        let span = tracing::info_span!("sync_handler", key);
        async {
            // Not retryable; the worker drops the key with a warning.
            let coordinates = ResourceKey::parse(key)?;

            let pod = get_by_key(self.lister.as_ref(), &coordinates).map_err(|source| {
                SyncError::Cache {
                    key: key.to_owned(),
                    source,
                }
            })?;

            match pod {
                Some(pod) => self.sync_pod_in_provider(&pod).await,
                // Gone from the cache: make sure it is gone from the provider too.
                None => {
                    self.delete_pod(&coordinates.namespace, &coordinates.name)
                        .await
                }
            }
        }
        .instrument(span)
        .await
    }

    pub(crate) async fn sync_pod_in_provider(&self, pod: &Pod) -> Result<(), SyncError> {
        async {
            if pod.is_marked_for_deletion() {
                let result = self.delete_pod(pod.namespace(), pod.name()).await;
                if let Err(err) = &result {
                    self.recorder.event(
                        pod,
                        EventType::Warning,
                        "ProviderDeleteFailed",
                        &err.to_string(),
                    );
                }
                return result;
            }

            if pod.phase().is_terminal() {
                tracing::warn!(phase = %pod.phase(), "skipping sync of pod in terminal phase");
                return Ok(());
            }

            self.create_or_update_pod(pod).await
        }
        .instrument(sync_pod_span(pod))
        .await
    }

    /// Create the pod, or update it if the provider already runs a different
    /// version of it.
    async fn create_or_update_pod(&self, pod: &Pod) -> Result<(), SyncError> {
        let key = pod.key().to_string();
        let existing = match self
            .unless_cancelled(&key, self.provider.get_pod(pod.namespace(), pod.name()))
            .await?
        {
            Ok(existing) => existing,
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(SyncError::provider(key, "get", err)),
        };

        match existing {
            None => {
                tracing::debug!("creating pod in provider");
                if let Err(err) = self
                    .unless_cancelled(&key, self.provider.create_pod(pod))
                    .await?
                {
                    let err = SyncError::provider(key, "create", err);
                    self.recorder.event(
                        pod,
                        EventType::Warning,
                        "ProviderCreateFailed",
                        &err.to_string(),
                    );
                    return Err(err);
                }
                tracing::info!("created pod in provider");
            }
            Some(current) if workload_matches(&current, pod) => {
                tracing::debug!("pod already up to date in provider");
            }
            Some(_) => {
                tracing::debug!("updating pod in provider");
                if let Err(err) = self
                    .unless_cancelled(&key, self.provider.update_pod(pod))
                    .await?
                {
                    let err = SyncError::provider(key, "update", err);
                    self.recorder.event(
                        pod,
                        EventType::Warning,
                        "ProviderUpdateFailed",
                        &err.to_string(),
                    );
                    return Err(err);
                }
                tracing::info!("updated pod in provider");
            }
        }
        Ok(())
    }

    /// Delete from the provider. An already-absent pod counts as deleted.
    pub(crate) async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), SyncError> {
        let key = ResourceKey::new(namespace, name).to_string();
        match self
            .unless_cancelled(&key, self.provider.delete_pod(namespace, name))
            .await?
        {
            Ok(()) => {
                tracing::info!(pod = %key, "deleted pod in provider");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!(pod = %key, "pod already absent from provider");
                Ok(())
            }
            Err(err) => Err(SyncError::provider(key, "delete", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use vnode_core::{ErrorKind, PodPhase};
    use vnode_queue::Retryable;

    use crate::testing::{pod, FakeProvider, Harness};

    use super::*;

    #[tokio::test]
    async fn malformed_key_is_rejected_without_retry() {
        let h = Harness::new(FakeProvider::default());
        let err = h.shared.sync_handler("a/b/c").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidKey(_)));
        assert!(!err.is_retryable());
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn pod_missing_from_cache_is_deleted_in_provider() {
        let h = Harness::new(FakeProvider::with_pods([pod("default", "web", "nginx:1")]));
        h.shared.sync_handler("default/web").await.expect("sync");
        assert_eq!(h.provider.calls(), vec!["delete default/web"]);
        assert!(!h.provider.has("default", "web"));
    }

    #[tokio::test]
    async fn deleting_an_absent_pod_succeeds() {
        let h = Harness::new(FakeProvider::default());
        h.shared.sync_handler("default/ghost").await.expect("not found is success");
        assert_eq!(h.provider.calls(), vec!["delete default/ghost"]);
    }

    #[tokio::test]
    async fn new_pod_is_created() {
        let h = Harness::new(FakeProvider::default());
        h.informer.apply(pod("default", "web", "nginx:1"));
        h.shared.sync_handler("default/web").await.expect("sync");
        assert_eq!(h.provider.calls(), vec!["create default/web"]);
    }

    #[tokio::test]
    async fn running_pod_with_same_workload_is_left_alone() {
        let h = Harness::new(FakeProvider::with_pods([pod("default", "web", "nginx:1")]));
        let mut cached = pod("default", "web", "nginx:1");
        cached.metadata.resource_version = "7".into();
        h.informer.apply(cached);
        h.shared.sync_handler("default/web").await.expect("sync");
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn changed_workload_is_updated() {
        let h = Harness::new(FakeProvider::with_pods([pod("default", "web", "nginx:1")]));
        h.informer.apply(pod("default", "web", "nginx:2"));
        h.shared.sync_handler("default/web").await.expect("sync");
        assert_eq!(h.provider.calls(), vec!["update default/web"]);
    }

    #[tokio::test]
    async fn pod_marked_for_deletion_is_deleted() {
        let h = Harness::new(FakeProvider::with_pods([pod("default", "web", "nginx:1")]));
        let mut cached = pod("default", "web", "nginx:1");
        cached.metadata.deletion_timestamp = Some(Utc::now());
        h.informer.apply(cached);
        h.shared.sync_handler("default/web").await.expect("sync");
        assert_eq!(h.provider.calls(), vec!["delete default/web"]);
    }

    #[tokio::test]
    async fn terminal_pod_is_skipped() {
        let h = Harness::new(FakeProvider::default());
        let mut cached = pod("default", "job", "busybox");
        cached.status.phase = PodPhase::Succeeded;
        h.informer.apply(cached);
        h.shared.sync_handler("default/job").await.expect("sync");
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn create_failure_is_retryable_and_recorded() {
        let h = Harness::new(FakeProvider::default());
        h.provider.fail_next("create", ErrorKind::Transient);
        h.informer.apply(pod("default", "web", "nginx:1"));

        let err = h.shared.sync_handler("default/web").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Transient);
        let events = h.recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![(EventType::Warning, "ProviderCreateFailed".to_string())]
        );
    }

    #[tokio::test]
    async fn invalid_delete_is_not_retryable() {
        let h = Harness::new(FakeProvider::with_pods([pod("default", "web", "nginx:1")]));
        h.provider.fail_next("delete", ErrorKind::InvalidInput);
        let mut cached = pod("default", "web", "nginx:1");
        cached.metadata.deletion_timestamp = Some(Utc::now());
        h.informer.apply(cached);

        let err = h.shared.sync_handler("default/web").await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(
            h.recorder.events.lock().unwrap()[0],
            (EventType::Warning, "ProviderDeleteFailed".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pending_provider_call_is_abandoned_on_shutdown() {
        let provider = FakeProvider::with_pods([pod("default", "web", "nginx:1")]);
        provider.set_delete_delay(std::time::Duration::from_secs(3600));
        let h = Harness::new(provider);

        let (result, ()) = tokio::join!(h.shared.sync_handler("default/web"), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            h.shared.cancel.cancel();
        });
        let err = result.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled { .. }));
        assert!(!err.is_retryable());
        assert!(h.provider.has("default", "web"));
    }

    #[tokio::test]
    async fn no_provider_calls_after_shutdown() {
        let h = Harness::new(FakeProvider::default());
        h.informer.apply(pod("default", "web", "nginx:1"));
        h.shared.cancel.cancel();

        let err = h.shared.sync_handler("default/web").await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled { .. }));
        assert!(h.provider.calls().is_empty());
    }
}
