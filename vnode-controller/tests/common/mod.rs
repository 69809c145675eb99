#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vnode_controller::{
    CancellationToken, ControllerError, EventRecorder, EventType, InMemoryPodInformer,
    PodController, PodLifecycleHandler, PodStatusClient, StatusNotifier,
};
use vnode_core::{ClientError, Container, ErrorKind, Pod, ProviderError, ResourceKey};

pub fn pod(namespace: &str, name: &str, image: &str) -> Pod {
    let mut pod = Pod::new(namespace, name);
    pod.spec.node_name = "vnode-0".into();
    pod.spec.containers.push(Container {
        name: "main".into(),
        image: image.into(),
        ..Default::default()
    });
    pod
}

#[derive(Default)]
pub struct FakeProvider {
    pods: Mutex<BTreeMap<ResourceKey, Pod>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<(&'static str, ErrorKind)>>,
    notifier: Mutex<Option<StatusNotifier>>,
    stalled: Mutex<HashSet<&'static str>>,
}

impl FakeProvider {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_pods(pods: impl IntoIterator<Item = Pod>) -> Arc<Self> {
        let provider = Self::default();
        provider
            .pods
            .lock()
            .unwrap()
            .extend(pods.into_iter().map(|pod| (pod.key(), pod)));
        Arc::new(provider)
    }

    pub fn fail_next(&self, op: &'static str, kind: ErrorKind) {
        self.failures.lock().unwrap().push_back((op, kind));
    }

    /// Make every later `op` call hang forever.
    pub fn stall(&self, op: &'static str) {
        self.stalled.lock().unwrap().insert(op);
    }

    async fn maybe_stall(&self, op: &str) {
        let stalled = self.stalled.lock().unwrap().contains(op);
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn running(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods
            .lock()
            .unwrap()
            .get(&ResourceKey::new(namespace, name))
            .cloned()
    }

    /// Push a status change through the channel the controller handed over.
    pub fn report(&self, pod: Pod) {
        let notifier = self.notifier.lock().unwrap().clone();
        notifier.expect("controller registered a notifier").notify(pod);
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
        self.maybe_stall("create").await;
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
        self.record("delete", &key)?;
        match self.pods.lock().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(ProviderError::not_found(format!("{key} not running"))),
        }
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ProviderError> {
        Ok(self.running(namespace, name))
    }

    async fn get_pods(&self) -> Result<Vec<Pod>, ProviderError> {
        self.maybe_stall("list").await;
        Ok(self.pods.lock().unwrap().values().cloned().collect())
    }

    fn notify_pods(&self, notifier: StatusNotifier) {
        *self.notifier.lock().unwrap() = Some(notifier);
    }
}

#[derive(Default)]
pub struct FakeClient {
    pub writes: Mutex<Vec<Pod>>,
}

#[async_trait]
impl PodStatusClient for FakeClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Pod, ClientError> {
        Err(ClientError::NotFound {
            key: ResourceKey::new(namespace, name).to_string(),
        })
    }

    async fn update_status(&self, pod: &Pod) -> Result<Pod, ClientError> {
        self.writes.lock().unwrap().push(pod.clone());
        Ok(pod.clone())
    }
}

#[derive(Default)]
pub struct RecordingRecorder {
    pub events: Mutex<Vec<(EventType, String)>>,
}

impl EventRecorder for RecordingRecorder {
    fn event(&self, _pod: &Pod, event_type: EventType, reason: &str, _message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((event_type, reason.to_owned()));
    }
}

pub struct Fixture {
    pub controller: Arc<PodController>,
    pub informer: Arc<InMemoryPodInformer>,
    pub provider: Arc<FakeProvider>,
    pub client: Arc<FakeClient>,
    pub recorder: Arc<RecordingRecorder>,
    pub shutdown: CancellationToken,
}

impl Fixture {
    pub fn new(provider: Arc<FakeProvider>) -> Self {
        let informer = Arc::new(InMemoryPodInformer::new());
        let client = Arc::new(FakeClient::default());
        let recorder = Arc::new(RecordingRecorder::default());
        let controller = PodController::builder()
            .with_pod_client(client.clone())
            .with_pod_informer(informer.clone())
            .with_event_recorder(recorder.clone())
            .with_provider(provider.clone())
            .build()
            .expect("all dependencies supplied");
        Self {
            controller: Arc::new(controller),
            informer,
            provider,
            client,
            recorder,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn start(
        &self,
        workers: usize,
    ) -> tokio::task::JoinHandle<Result<(), ControllerError>> {
        let controller = self.controller.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { controller.run(shutdown, workers).await })
    }
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}
