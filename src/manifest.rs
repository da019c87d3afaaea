//! MutatingWebhookConfiguration generation
//!
//! Renders the registration object that points the API server at this
//! webhook. Only Pod CREATE requests for Pods carrying the opt-in label are
//! sent, so unlabelled Pods never pay for a webhook round trip.

use std::path::Path;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};
use k8s_openapi::ByteString;

use crate::{Error, Result, MUTATE_PATH};

/// Where the webhook Service lives and how to trust it
#[derive(Clone, Debug)]
pub struct WebhookManifest {
    /// Name of the MutatingWebhookConfiguration and the webhook entry prefix
    pub name: String,
    /// Service fronting the webhook pods
    pub service_name: String,
    /// Namespace of the Service
    pub namespace: String,
    /// Service port (not the container port)
    pub port: i32,
    /// PEM CA bundle the API server uses to verify the serving certificate
    pub ca_bundle: Vec<u8>,
    /// Full key of the opt-in label used in the object selector
    pub secret_key_label: String,
    /// `Fail` or `Ignore`
    pub failure_policy: String,
}

/// Read the PEM CA bundle the API server uses to trust the webhook
pub async fn read_ca_bundle(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let bundle = tokio::fs::read(path.as_ref()).await?;
    if bundle.is_empty() {
        return Err(Error::config(format!(
            "CA bundle {} is empty",
            path.as_ref().display()
        )));
    }
    Ok(bundle)
}

impl WebhookManifest {
    /// Build the MutatingWebhookConfiguration object
    pub fn build(&self) -> MutatingWebhookConfiguration {
        MutatingWebhookConfiguration {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            webhooks: Some(vec![MutatingWebhook {
                name: format!("{}.{}.svc", self.service_name, self.namespace),
                admission_review_versions: vec!["v1".to_string(), "v1beta1".to_string()],
                side_effects: "None".to_string(),
                failure_policy: Some(self.failure_policy.clone()),
                reinvocation_policy: Some("Never".to_string()),
                rules: Some(vec![RuleWithOperations {
                    operations: Some(vec!["CREATE".to_string()]),
                    api_groups: Some(vec![String::new()]),
                    api_versions: Some(vec!["v1".to_string()]),
                    resources: Some(vec!["pods".to_string()]),
                    scope: Some("Namespaced".to_string()),
                }]),
                client_config: WebhookClientConfig {
                    service: Some(ServiceReference {
                        name: self.service_name.clone(),
                        namespace: self.namespace.clone(),
                        path: Some(MUTATE_PATH.to_string()),
                        port: Some(self.port),
                    }),
                    ca_bundle: Some(ByteString(self.ca_bundle.clone())),
                    ..Default::default()
                },
                object_selector: Some(LabelSelector {
                    match_expressions: Some(vec![LabelSelectorRequirement {
                        key: self.secret_key_label.clone(),
                        operator: "Exists".to_string(),
                        values: None,
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
        }
    }

    /// Render the configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.build()).map_err(|e| {
            Error::serialization(format!(
                "failed to serialize MutatingWebhookConfiguration: {e}"
            ))
        })
    }
}
