//! Pod injectors
//!
//! Each injector reads the original Pod and returns the patch operations for
//! one concern. All emitted paths are valid against the original object, so
//! the operations can be concatenated in any order the policy chooses.

pub mod sidecar;
pub mod volume;

pub use sidecar::{injector_container, inject_sidecar};
pub use volume::{add_secrets_volume, add_volume_mount, secrets_mount, secrets_volume};

/// Name of the shared memory-backed volume
pub const SECRETS_VOLUME_NAME: &str = "secrets";

/// Name of the injected init container
pub const SIDECAR_CONTAINER_NAME: &str = "secrets-injector";

/// `emptyDir` medium keeping secrets off the node's disk
pub const MEMORY_MEDIUM: &str = "Memory";
