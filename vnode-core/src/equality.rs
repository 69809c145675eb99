//! Change filters for pod notifications.
//!
//! Status writes made by the engine come back as update notifications. They
//! bump `metadata.resource_version` and rewrite `status`, and must not trigger
//! another provider sync.

use crate::types::{ObjectMeta, Pod};

/// Compare two pods, ignoring `metadata.resource_version` and `status`.
///
/// Every other field takes part. The destructuring below is exhaustive so a
/// new field cannot be added to [`Pod`] or [`ObjectMeta`] without deciding
/// here whether it counts.
pub fn pods_effectively_equal(a: &Pod, b: &Pod) -> bool {
    let Pod {
        metadata: meta_a,
        spec: spec_a,
        status: _,
    } = a;
    let Pod {
        metadata: meta_b,
        spec: spec_b,
        status: _,
    } = b;

    spec_a == spec_b && meta_equal_ignoring_resource_version(meta_a, meta_b)
}

fn meta_equal_ignoring_resource_version(a: &ObjectMeta, b: &ObjectMeta) -> bool {
    let ObjectMeta {
        name,
        namespace,
        uid,
        resource_version: _,
        generation,
        labels,
        annotations,
        creation_timestamp,
        deletion_timestamp,
        deletion_grace_period_seconds,
    } = a;

    *name == b.name
        && *namespace == b.namespace
        && *uid == b.uid
        && *generation == b.generation
        && *labels == b.labels
        && *annotations == b.annotations
        && *creation_timestamp == b.creation_timestamp
        && *deletion_timestamp == b.deletion_timestamp
        && *deletion_grace_period_seconds == b.deletion_grace_period_seconds
}

/// Whether a provider-side pod already reflects the desired workload.
///
/// Only the parts a provider acts on are compared: spec, labels, annotations.
pub fn workload_matches(provider: &Pod, desired: &Pod) -> bool {
    provider.spec == desired.spec
        && provider.metadata.labels == desired.metadata.labels
        && provider.metadata.annotations == desired.metadata.annotations
}
