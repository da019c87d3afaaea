//! Label-driven mutation decision
//!
//! A Pod opts in by carrying the secret key label. The policy reads the two
//! labels, then runs the injectors in a fixed order (volume, init container,
//! mounts) and returns the combined patch.

use json_patch::Patch;
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use crate::config::{MutationConfig, DEFAULT_SECRET_FORMAT};
use crate::inject;

/// What to do with a Pod under review
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Admit unchanged
    NoMutation,
    /// Admit with the given patch
    Mutate(Patch),
    /// Could not build the patch; nothing is applied
    Failure(String),
}

/// Secret parameters read from the Pod labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretRequest<'a> {
    /// Opaque identifier(s) of the secrets to fetch
    pub key: &'a str,
    /// Output format of the secrets file
    pub format: &'a str,
}

/// Read the opt-in labels, `None` when the Pod has not opted in
pub fn secret_request<'a>(pod: &'a Pod, config: &MutationConfig) -> Option<SecretRequest<'a>> {
    let labels = pod.metadata.labels.as_ref()?;

    let key = labels
        .get(&config.secret_key_label())
        .map(String::as_str)
        .filter(|k| !k.is_empty())?;
    let format = labels
        .get(&config.secret_format_label())
        .map(String::as_str)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_SECRET_FORMAT);

    Some(SecretRequest { key, format })
}

/// Decide whether and how to mutate `pod`
pub fn decide(pod: &Pod, config: &MutationConfig) -> Outcome {
    let Some(request) = secret_request(pod, config) else {
        debug!(pod = ?pod.metadata.name, "No secret key label, not patching");
        return Outcome::NoMutation;
    };

    if pod.spec.is_none() {
        debug!(pod = ?pod.metadata.name, "Pod has no spec, not patching");
        return Outcome::NoMutation;
    }

    debug!(
        pod = ?pod.metadata.name,
        secret_key = %request.key,
        secret_format = %request.format,
        "Secret key found, creating patch"
    );

    match build_patch(pod, request, config) {
        Ok(patch) => Outcome::Mutate(patch),
        Err(e) => Outcome::Failure(format!("failed to build patch: {e}")),
    }
}

/// Concatenate the injector operations in their fixed order
pub fn build_patch(
    pod: &Pod,
    request: SecretRequest<'_>,
    config: &MutationConfig,
) -> Result<Patch, serde_json::Error> {
    let mut ops = inject::add_secrets_volume(pod)?;
    ops.extend(inject::inject_sidecar(pod, request.key, request.format, config)?);
    ops.extend(inject::add_volume_mount(pod)?);
    Ok(Patch(ops))
}
