//! Process-wide configuration
//!
//! Both structs are built once in `main` from command-line flags and never
//! change afterwards. [`MutationConfig`] is shared read-only with every
//! admission request through the webhook state.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::{Error, Result, DEFAULT_SECRETS_MOUNT_PATH};

/// Label that opts a Pod in and names the secret(s) to fetch
pub const SECRET_KEY_LABEL: &str = "secrets-injector-key";

/// Label selecting the output format of the secrets file
pub const SECRET_FORMAT_LABEL: &str = "secrets-injector-format";

/// Format used when the Pod does not carry [`SECRET_FORMAT_LABEL`]
pub const DEFAULT_SECRET_FORMAT: &str = "toml";

/// Settings for the injected init container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationConfig {
    /// Image of the secret-fetching container
    pub image: String,
    /// Executable run by the injected container
    pub command: String,
    /// First argument passed to `command` (typically the fetch script)
    pub command_arg: String,
    /// Path inside the injected container where secrets are written
    pub secret_volume_path: String,
    /// Optional prefix for the opt-in labels, e.g. `example.com/`
    pub label_prefix: Option<String>,
}

impl MutationConfig {
    /// Create a config for `image` with the default command and paths
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: "python".to_string(),
            command_arg: "main.py".to_string(),
            secret_volume_path: DEFAULT_SECRETS_MOUNT_PATH.to_string(),
            label_prefix: None,
        }
    }

    /// Reject values that would produce an unschedulable init container
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(Error::config("injector image must not be empty"));
        }
        if self.command.trim().is_empty() {
            return Err(Error::config("injector command must not be empty"));
        }
        if !self.secret_volume_path.starts_with('/') {
            return Err(Error::config(format!(
                "secret volume path must be absolute, got '{}'",
                self.secret_volume_path
            )));
        }
        Ok(())
    }

    /// Full key of the opt-in label, including the configured prefix
    pub fn secret_key_label(&self) -> String {
        self.prefixed(SECRET_KEY_LABEL)
    }

    /// Full key of the format label, including the configured prefix
    pub fn secret_format_label(&self) -> String {
        self.prefixed(SECRET_FORMAT_LABEL)
    }

    fn prefixed(&self, label: &str) -> String {
        match self.label_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}{label}"),
            _ => label.to_string(),
        }
    }
}

/// Listener settings for the HTTPS server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// Path to the PEM certificate chain
    pub cert_file: PathBuf,
    /// Path to the PEM private key matching `cert_file`
    pub key_file: PathBuf,
}

impl ServerConfig {
    /// Listen on all interfaces at `port`
    pub fn new(port: u16, cert_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            cert_file: cert_file.into(),
            key_file: key_file.into(),
        }
    }
}
