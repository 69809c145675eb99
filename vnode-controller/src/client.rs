//! Cluster-facing collaborators: status writes and event recording.

use std::fmt;

use async_trait::async_trait;
use vnode_core::{ClientError, Pod};

/// Cluster API operations on pods.
#[async_trait]
pub trait PodStatusClient: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Pod, ClientError>;

    /// Persist `pod.status`. Must leave metadata and spec untouched.
    async fn update_status(&self, pod: &Pod) -> Result<Pod, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Normal => write!(f, "Normal"),
            EventType::Warning => write!(f, "Warning"),
        }
    }
}

/// Fire-and-forget sink for events attached to a pod.
pub trait EventRecorder: Send + Sync {
    fn event(&self, pod: &Pod, event_type: EventType, reason: &str, message: &str);
}

/// Writes events to the log instead of the cluster.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventRecorder;

impl EventRecorder for LogEventRecorder {
    fn event(&self, pod: &Pod, event_type: EventType, reason: &str, message: &str) {
        match event_type {
            EventType::Normal => tracing::info!(
                pod = %pod.key(),
                reason,
                message,
                "pod event",
            ),
            EventType::Warning => tracing::warn!(
                pod = %pod.key(),
                reason,
                message,
                "pod event",
            ),
        }
    }
}
