//! Domain types shared by the vnode crates.
//!
//! - [`types`]: pods, metadata, [`ResourceKey`]
//! - [`error`]: [`ErrorKind`] and the error types exchanged with collaborators
//! - [`equality`]: the debounce filter applied to update notifications

pub mod equality;
pub mod error;
pub mod types;

pub use equality::{pods_effectively_equal, workload_matches};
pub use error::{CacheError, ClientError, ErrorKind, KeyError, ProviderError};
pub use types::{
    ConditionStatus, Container, ContainerStatus, EnvVar, ObjectMeta, Pod, PodCondition, PodPhase,
    PodSpec, PodStatus, ResourceKey, RestartPolicy,
};
