//! Controller runtime: cache sync, handlers, sweep, worker pools, shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use vnode_core::Pod;
use vnode_queue::{handle_queue_item, RateLimitingQueue};

use crate::cache::{PodInformer, PodLister};
use crate::client::{EventRecorder, PodStatusClient};
use crate::config::{ControllerConfig, STATUS_QUEUE_NAME, SYNC_QUEUE_NAME};
use crate::error::{ControllerError, SyncError};
use crate::handlers::PodEventHandler;
use crate::known::KnownPods;
use crate::lifecycle::{EngineState, Lifecycle};
use crate::provider::{PodLifecycleHandler, StatusNotifier};

/// State shared by every worker.
pub(crate) struct Shared {
    pub(crate) provider: Arc<dyn PodLifecycleHandler>,
    pub(crate) lister: Arc<dyn PodLister>,
    pub(crate) client: Arc<dyn PodStatusClient>,
    pub(crate) recorder: Arc<dyn EventRecorder>,
    pub(crate) known: Arc<KnownPods>,
    pub(crate) sync_queue: Arc<RateLimitingQueue<String>>,
    pub(crate) status_queue: Arc<RateLimitingQueue<String>>,
    pub(crate) max_retries: u32,
    /// Fired once the controller starts stopping. Collaborator calls race it.
    pub(crate) cancel: CancellationToken,
}

impl Shared {
    /// Await a provider or client call for `key`, abandoning it on shutdown.
    pub(crate) async fn unless_cancelled<T>(
        &self,
        key: &str,
        call: impl Future<Output = T>,
    ) -> Result<T, SyncError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled { key: key.to_owned() }),
            out = call => Ok(out),
        }
    }
}

/// Keeps provider workloads converged with cluster pods, and cluster pod
/// status converged with the provider.
///
/// Run it once with [`run`](Self::run); it cannot be restarted.
pub struct PodController {
    shared: Arc<Shared>,
    informer: Arc<dyn PodInformer>,
    lifecycle: Lifecycle,
}

/// Assembles a [`PodController`]. Every collaborator is required.
#[derive(Default)]
pub struct PodControllerBuilder {
    pod_client: Option<Arc<dyn PodStatusClient>>,
    pod_informer: Option<Arc<dyn PodInformer>>,
    event_recorder: Option<Arc<dyn EventRecorder>>,
    provider: Option<Arc<dyn PodLifecycleHandler>>,
    config: ControllerConfig,
}

impl PodControllerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client used to write pod status back to the cluster.
    pub fn with_pod_client(mut self, client: Arc<dyn PodStatusClient>) -> Self {
        self.pod_client = Some(client);
        self
    }

    /// Cache of the pods scheduled to this node.
    pub fn with_pod_informer(mut self, informer: Arc<dyn PodInformer>) -> Self {
        self.pod_informer = Some(informer);
        self
    }

    pub fn with_event_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.event_recorder = Some(recorder);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn PodLifecycleHandler>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<PodController, ControllerError> {
        let client = self
            .pod_client
            .ok_or_else(|| ControllerError::InvalidInput("missing core client".into()))?;
        let recorder = self
            .event_recorder
            .ok_or_else(|| ControllerError::InvalidInput("missing event recorder".into()))?;
        let informer = self
            .pod_informer
            .ok_or_else(|| ControllerError::InvalidInput("missing pod informer".into()))?;
        let provider = self
            .provider
            .ok_or_else(|| ControllerError::InvalidInput("missing provider".into()))?;
        self.config
            .validate()
            .map_err(|err| ControllerError::InvalidInput(err.to_string()))?;

        let settings = self.config.rate_limit_settings();
        let shared = Shared {
            provider,
            lister: informer.lister(),
            client,
            recorder,
            known: Arc::new(KnownPods::new()),
            sync_queue: Arc::new(RateLimitingQueue::with_settings(SYNC_QUEUE_NAME, settings)),
            status_queue: Arc::new(RateLimitingQueue::with_settings(STATUS_QUEUE_NAME, settings)),
            max_retries: self.config.max_retries,
            cancel: CancellationToken::new(),
        };

        Ok(PodController {
            shared: Arc::new(shared),
            informer,
            lifecycle: Lifecycle::new(),
        })
    }
}

impl PodController {
    pub fn builder() -> PodControllerBuilder {
        PodControllerBuilder::new()
    }

    /// Start the controller and block until `shutdown` is cancelled.
    ///
    /// Waits for the cache to sync, registers event handlers, deletes
    /// dangling provider pods, then launches `pod_sync_workers` workers for
    /// each queue. On cancellation both queues are shut down and the call
    /// returns once every worker has drained. The outcome is also stored for
    /// [`err`](Self::err).
    pub async fn run(
        &self,
        shutdown: CancellationToken,
        pod_sync_workers: usize,
    ) -> Result<(), ControllerError> {
        if !self.lifecycle.begin() {
            return Err(ControllerError::AlreadyStarted);
        }

        let result = self.run_inner(shutdown, pod_sync_workers).await;

        // Idempotent; covers early returns before the workers started.
        self.shared.cancel.cancel();
        self.shared.sync_queue.shut_down();
        self.shared.status_queue.shut_down();
        if let Err(err) = &result {
            tracing::error!(error = %err, "pod controller exited with error");
        }
        self.lifecycle.finish(&result);
        result
    }

    async fn run_inner(
        &self,
        shutdown: CancellationToken,
        pod_sync_workers: usize,
    ) -> Result<(), ControllerError> {
        if pod_sync_workers == 0 {
            return Err(ControllerError::InvalidInput(
                "pod sync workers must be at least 1".into(),
            ));
        }

        let (notifier, status_rx) = StatusNotifier::channel();
        self.shared.provider.notify_pods(notifier);

        let synced = tokio::select! {
            synced = self.informer.wait_for_sync() => synced,
            _ = shutdown.cancelled() => false,
        };
        if !synced {
            return Err(ControllerError::CacheSyncFailed);
        }
        tracing::info!("pod cache in-sync");

        // Registered after the sync, so existing pods arrive as synthetic adds.
        self.informer
            .add_event_handler(Arc::new(PodEventHandler::new(&self.shared)));

        // Best effort: failures here are logged and never retried.
        let swept = tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = self
                .shared
                .delete_dangling_pods(pod_sync_workers)
                .instrument(tracing::info_span!("delete_dangling_pods")) => true,
        };
        if !swept {
            tracing::info!("shutdown requested during dangling pod sweep");
            self.lifecycle.mark_stopping();
            return Ok(());
        }

        tracing::info!(workers = pod_sync_workers, "starting workers");
        let mut workers = JoinSet::new();
        workers.spawn(status_dispatcher(
            self.shared.clone(),
            status_rx,
            shutdown.clone(),
        ));
        for id in 0..pod_sync_workers {
            workers.spawn(run_status_worker(self.shared.clone(), id));
        }
        for id in 0..pod_sync_workers {
            workers.spawn(run_sync_worker(self.shared.clone(), id));
        }

        self.lifecycle.mark_running();
        tracing::info!("started workers");

        shutdown.cancelled().await;
        self.lifecycle.mark_stopping();
        tracing::info!("shutting down workers");
        self.shared.cancel.cancel();
        self.shared.sync_queue.shut_down();
        self.shared.status_queue.shut_down();

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "worker task join failure");
            }
        }
        Ok(())
    }

    /// Resolves once the controller is handling pods. Never resolves if
    /// startup fails.
    pub async fn ready(&self) {
        self.lifecycle.ready().wait().await
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.ready().is_open()
    }

    /// Resolves once [`run`](Self::run) has returned.
    pub async fn done(&self) {
        self.lifecycle.done().wait().await
    }

    /// Error that stopped the controller; `None` after a clean shutdown or
    /// while still running.
    pub fn err(&self) -> Option<ControllerError> {
        self.lifecycle.err()
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.state()
    }
}

async fn run_sync_worker(shared: Arc<Shared>, worker_id: usize) {
    loop {
        let span = tracing::info_span!("process_next_work_item", worker_id, queue = SYNC_QUEUE_NAME);
        let handled = handle_queue_item(&shared.sync_queue, shared.max_retries, |key| {
            let shared = shared.clone();
            async move { shared.sync_handler(&key).await }
        })
        .instrument(span)
        .await;
        if handled.is_none() {
            break;
        }
    }
    tracing::debug!(worker_id, "pod sync worker exited");
}

async fn run_status_worker(shared: Arc<Shared>, worker_id: usize) {
    loop {
        let span =
            tracing::info_span!("process_next_work_item", worker_id, queue = STATUS_QUEUE_NAME);
        let handled = handle_queue_item(&shared.status_queue, shared.max_retries, |key| {
            let shared = shared.clone();
            async move { shared.process_pod_status_update(&key).await }
        })
        .instrument(span)
        .await;
        if handled.is_none() {
            break;
        }
    }
    tracing::debug!(worker_id, "pod status worker exited");
}

/// Drain provider notifications into the status queue.
async fn status_dispatcher(
    shared: Arc<Shared>,
    mut status_rx: mpsc::UnboundedReceiver<Pod>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            notified = status_rx.recv() => {
                let Some(pod) = notified else { break };
                shared.enqueue_pod_status_update(pod);
            }
        }
    }
    status_rx.close();
}
