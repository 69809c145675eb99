//! Fakes for unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use vnode_core::{ClientError, ErrorKind, Pod, ProviderError, ResourceKey};
use vnode_queue::RateLimitingQueue;

use crate::cache::PodInformer;
use crate::client::{EventRecorder, EventType, PodStatusClient};
use crate::controller::Shared;
use crate::known::KnownPods;
use crate::memory::InMemoryPodInformer;
use crate::provider::{PodLifecycleHandler, StatusNotifier};
use vnode_queue::RateLimitSettings;

#[derive(Default)]
pub(crate) struct FakeProvider {
    pods: Mutex<BTreeMap<ResourceKey, Pod>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<(&'static str, ErrorKind)>>,
    list_error: Mutex<Option<ErrorKind>>,
    delete_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn with_pods(pods: impl IntoIterator<Item = Pod>) -> Self {
        let provider = Self::default();
        {
            let mut map = provider.pods.lock().unwrap();
            for pod in pods {
                map.insert(pod.key(), pod);
            }
        }
        provider
    }

    /// Fail the next call of `op` with `kind`.
    pub(crate) fn fail_next(&self, op: &'static str, kind: ErrorKind) {
        self.failures.lock().unwrap().push_back((op, kind));
    }

    pub(crate) fn fail_list(&self, kind: ErrorKind) {
        *self.list_error.lock().unwrap() = Some(kind);
    }

    pub(crate) fn set_delete_delay(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap() = delay;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn has(&self, namespace: &str, name: &str) -> bool {
        self.pods
            .lock()
            .unwrap()
            .contains_key(&ResourceKey::new(namespace, name))
    }

    fn record(&self, op: &str, key: &ResourceKey) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(format!("{op} {key}"));
        let mut failures = self.failures.lock().unwrap();
        if let Some(pos) = failures.iter().position(|(failing, _)| *failing == op) {
            let (_, kind) = failures.remove(pos).unwrap();
            return Err(ProviderError::new(kind, format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl PodLifecycleHandler for FakeProvider {
    async fn create_pod(&self, pod: &Pod) -> Result<(), ProviderError> {
        self.record("create", &pod.key())?;
        self.pods.lock().unwrap().insert(pod.key(), pod.clone());
        Ok(())
    }

    async fn update_pod(&self, pod: &Pod) -> Result<(), ProviderError> {
        self.record("update", &pod.key())?;
        self.pods.lock().unwrap().insert(pod.key(), pod.clone());
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ProviderError> {
        let key = ResourceKey::new(namespace, name);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delete_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.record("delete", &key)?;
        match self.pods.lock().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(ProviderError::not_found(format!("{key} not running"))),
        }
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ProviderError> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .get(&ResourceKey::new(namespace, name))
            .cloned())
    }

    async fn get_pods(&self) -> Result<Vec<Pod>, ProviderError> {
        if let Some(kind) = *self.list_error.lock().unwrap() {
            return Err(ProviderError::new(kind, "injected list failure"));
        }
        Ok(self.pods.lock().unwrap().values().cloned().collect())
    }

    fn notify_pods(&self, _notifier: StatusNotifier) {}
}

#[derive(Default)]
pub(crate) struct FakeClient {
    pub(crate) writes: Mutex<Vec<Pod>>,
    pub(crate) latest: Mutex<BTreeMap<ResourceKey, Pod>>,
    pub(crate) errors: Mutex<VecDeque<ClientError>>,
}

#[async_trait]
impl PodStatusClient for FakeClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Pod, ClientError> {
        let key = ResourceKey::new(namespace, name);
        self.latest
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(ClientError::NotFound {
                key: key.to_string(),
            })
    }

    async fn update_status(&self, pod: &Pod) -> Result<Pod, ClientError> {
        if let Some(err) = self.errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.writes.lock().unwrap().push(pod.clone());
        Ok(pod.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeRecorder {
    pub(crate) events: Mutex<Vec<(EventType, String)>>,
}

impl EventRecorder for FakeRecorder {
    fn event(&self, _pod: &Pod, event_type: EventType, reason: &str, _message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((event_type, reason.to_owned()));
    }
}

/// `Shared` wired to fakes, without a running controller.
pub(crate) struct Harness {
    pub(crate) shared: Arc<Shared>,
    pub(crate) informer: Arc<InMemoryPodInformer>,
    pub(crate) provider: Arc<FakeProvider>,
    pub(crate) client: Arc<FakeClient>,
    pub(crate) recorder: Arc<FakeRecorder>,
}

impl Harness {
    pub(crate) fn new(provider: FakeProvider) -> Self {
        let informer = Arc::new(InMemoryPodInformer::new());
        let provider = Arc::new(provider);
        let client = Arc::new(FakeClient::default());
        let recorder = Arc::new(FakeRecorder::default());
        let settings = RateLimitSettings {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(100),
            qps: 1_000_000.0,
            burst: 1_000_000,
        };
        let shared = Arc::new(Shared {
            provider: provider.clone(),
            lister: informer.lister(),
            client: client.clone(),
            recorder: recorder.clone(),
            known: Arc::new(KnownPods::new()),
            sync_queue: Arc::new(RateLimitingQueue::with_settings("sync", settings)),
            status_queue: Arc::new(RateLimitingQueue::with_settings("status", settings)),
            max_retries: 3,
            cancel: CancellationToken::new(),
        });
        Self {
            shared,
            informer,
            provider,
            client,
            recorder,
        }
    }
}

pub(crate) fn pod(namespace: &str, name: &str, image: &str) -> Pod {
    let mut pod = Pod::new(namespace, name);
    pod.spec.containers.push(vnode_core::Container {
        name: "main".into(),
        image: image.into(),
        ..Default::default()
    });
    pod
}
