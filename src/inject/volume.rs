//! Shared secrets volume and its mounts on application containers

use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, Pod, Volume, VolumeMount};
use tracing::debug;

use super::{MEMORY_MEDIUM, SECRETS_VOLUME_NAME};
use crate::patch::{self, APPEND_TOKEN, CONTAINERS_PATH, VOLUMES_PATH};
use crate::DEFAULT_SECRETS_MOUNT_PATH;

/// The memory-backed `emptyDir` volume shared by the injector and the app
pub fn secrets_volume() -> Volume {
    Volume {
        name: SECRETS_VOLUME_NAME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: Some(MEMORY_MEDIUM.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Mount of the secrets volume in application containers
pub fn secrets_mount() -> VolumeMount {
    VolumeMount {
        name: SECRETS_VOLUME_NAME.to_string(),
        mount_path: DEFAULT_SECRETS_MOUNT_PATH.to_string(),
        ..Default::default()
    }
}

/// Add the secrets volume to the Pod
///
/// JSON Patch cannot append to a missing array, so an empty volume list is
/// created whole at `/spec/volumes` while an existing one is appended to at
/// `/spec/volumes/-`. A Pod that already carries the memory-backed `secrets`
/// volume from an earlier admission gets no operation. Any other volume named
/// `secrets` is left for the API server to reject as a duplicate.
pub fn add_secrets_volume(pod: &Pod) -> Result<Vec<PatchOperation>, serde_json::Error> {
    let volumes = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.volumes.as_deref())
        .unwrap_or_default();

    if volumes.iter().any(is_secrets_volume) {
        debug!("secrets volume already present, not adding");
        return Ok(Vec::new());
    }

    let volume = secrets_volume();
    let op = if volumes.is_empty() {
        patch::add(VOLUMES_PATH, &[volume])?
    } else {
        patch::add(VOLUMES_PATH.into_iter().chain([APPEND_TOKEN]), &volume)?
    };

    Ok(vec![op])
}

/// Whether `volume` is the one built by [`secrets_volume`]
fn is_secrets_volume(volume: &Volume) -> bool {
    volume.name == SECRETS_VOLUME_NAME
        && volume
            .empty_dir
            .as_ref()
            .and_then(|e| e.medium.as_deref())
            == Some(MEMORY_MEDIUM)
}

/// Mount the secrets volume in every application container
///
/// Emits a single `replace` of `/spec/containers` carrying the full list.
/// Init containers are left alone.
pub fn add_volume_mount(pod: &Pod) -> Result<Vec<PatchOperation>, serde_json::Error> {
    let mount = secrets_mount();
    let containers: Vec<Container> = pod
        .spec
        .iter()
        .flat_map(|spec| spec.containers.iter())
        .cloned()
        .map(|mut container| {
            append_mount_if_missing(&mut container, &mount);
            container
        })
        .collect();

    Ok(vec![patch::replace(CONTAINERS_PATH, &containers)?])
}

/// A mount counts as present only when both name and path match
fn append_mount_if_missing(container: &mut Container, mount: &VolumeMount) {
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    let present = mounts
        .iter()
        .any(|m| m.name == mount.name && m.mount_path == mount.mount_path);
    if !present {
        mounts.push(mount.clone());
    }
}
