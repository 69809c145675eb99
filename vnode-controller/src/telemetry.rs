//! Logging setup and span helpers shared by the worker loops.

use tracing::Span;
use vnode_core::Pod;

/// Install a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Span around the provider calls for one desired pod.
pub(crate) fn sync_pod_span(pod: &Pod) -> Span {
    tracing::info_span!(
        "sync_pod_in_provider",
        namespace = %pod.namespace(),
        name = %pod.name(),
        uid = %pod.metadata.uid,
        phase = %pod.phase(),
    )
}

/// Span around the deletion of one provider pod with no desired state.
pub(crate) fn dangling_pod_span(pod: &Pod) -> Span {
    tracing::info_span!(
        "delete_dangling_pod",
        namespace = %pod.namespace(),
        name = %pod.name(),
        uid = %pod.metadata.uid,
    )
}
