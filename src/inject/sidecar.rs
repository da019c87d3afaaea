//! Secret-fetching init container
//!
//! The injected container runs before anything else in the Pod, fetches the
//! secrets named by the opt-in label and writes them into the shared volume.
//! This module only describes the container; it never talks to a secret store.

use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::{Container, Pod, VolumeMount};
use tracing::debug;

use super::{SECRETS_VOLUME_NAME, SIDECAR_CONTAINER_NAME};
use crate::config::MutationConfig;
use crate::patch::{self, INIT_CONTAINERS_PATH};

/// Build the init container for `secret_key` in `secret_format`
///
/// The argument order is part of the contract with the injector image:
/// `[command_arg, secret_key, secret_volume_path, secret_format]`.
pub fn injector_container(
    secret_key: &str,
    secret_format: &str,
    config: &MutationConfig,
) -> Container {
    Container {
        name: SIDECAR_CONTAINER_NAME.to_string(),
        image: Some(config.image.clone()),
        command: Some(vec![config.command.clone()]),
        args: Some(vec![
            config.command_arg.clone(),
            secret_key.to_string(),
            config.secret_volume_path.clone(),
            secret_format.to_string(),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: SECRETS_VOLUME_NAME.to_string(),
            mount_path: config.secret_volume_path.clone(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Put the injector ahead of every existing init container
///
/// With no init containers the list is created by `add`. Otherwise the whole
/// list is written back by `replace` with the injector first, since JSON Patch
/// cannot insert at the head of an array whose length it does not know. An
/// injector left over from an earlier admission (same name and image) is
/// dropped so it never runs twice; any other init container is kept as is.
pub fn inject_sidecar(
    pod: &Pod,
    secret_key: &str,
    secret_format: &str,
    config: &MutationConfig,
) -> Result<Vec<PatchOperation>, serde_json::Error> {
    let existing = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.init_containers.as_deref())
        .unwrap_or_default();
    let injector = injector_container(secret_key, secret_format, config);

    if existing.is_empty() {
        debug!(op = "add", "Creating init containers with secrets injector");
        return Ok(vec![patch::add(INIT_CONTAINERS_PATH, &[injector])?]);
    }

    let mut init_containers = Vec::with_capacity(existing.len() + 1);
    init_containers.push(injector);
    init_containers.extend(
        existing
            .iter()
            .filter(|c| !is_previous_injection(c, config))
            .cloned(),
    );

    debug!(
        op = "replace",
        existing = existing.len(),
        "Prepending secrets injector to init containers"
    );
    Ok(vec![patch::replace(INIT_CONTAINERS_PATH, &init_containers)?])
}

/// A container this webhook injected on an earlier admission
fn is_previous_injection(container: &Container, config: &MutationConfig) -> bool {
    container.name == SIDECAR_CONTAINER_NAME
        && container.image.as_deref() == Some(config.image.as_str())
}
