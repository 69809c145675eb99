//! Pod controller for a virtual node.
//!
//! Two reconciliation loops run side by side:
//! - desired state: cache notifications → sync queue → provider create/update/delete
//! - status: provider notifications → status queue → cluster status writes
//!
//! A one-shot sweep deletes provider pods the cluster no longer knows about
//! before either loop starts.

mod cache;
mod client;
mod config;
mod controller;
mod error;
mod handlers;
mod known;
mod lifecycle;
mod memory;
mod provider;
mod status;
mod sweep;
mod sync;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use cache::{DeletedPod, PodInformer, PodLister, ResourceEventHandler};
pub use client::{EventRecorder, EventType, LogEventRecorder, PodStatusClient};
pub use config::{
    ControllerConfig, RateLimitConfig, MIN_QPS, STATUS_QUEUE_NAME, SYNC_QUEUE_NAME,
};
pub use controller::{PodController, PodControllerBuilder};
pub use error::{ConfigError, ControllerError, SyncError};
pub use known::{KnownPod, KnownPods};
pub use lifecycle::{EngineState, Gate};
pub use memory::InMemoryPodInformer;
pub use provider::{PodLifecycleHandler, StatusNotifier};
pub use tokio_util::sync::CancellationToken;
