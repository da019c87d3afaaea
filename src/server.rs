//! HTTPS server for the admission webhook
//!
//! The API server only calls webhooks over TLS, so the router is always
//! served through rustls with the certificate pair from [`ServerConfig`].

use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use crate::config::ServerConfig;
use crate::webhook::{webhook_router, WebhookState};
use crate::{Error, Result};

/// Install the aws-lc-rs crypto provider for rustls
///
/// Must run once before any TLS configuration is built.
pub fn install_crypto_provider() -> Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| Error::tls("a rustls crypto provider is already installed"))
}

/// Load the PEM certificate chain and private key
pub async fn load_tls_config(config: &ServerConfig) -> Result<RustlsConfig> {
    RustlsConfig::from_pem_file(&config.cert_file, &config.key_file)
        .await
        .map_err(|e| {
            Error::tls(format!(
                "failed to load {} / {}: {}",
                config.cert_file.display(),
                config.key_file.display(),
                e
            ))
        })
}

/// Serve the webhook router until the process is stopped
pub async fn serve(config: ServerConfig, state: Arc<WebhookState>) -> Result<()> {
    let tls_config = load_tls_config(&config).await?;
    let app = webhook_router(state);

    info!(addr = %config.addr, "Starting secrets injector webhook");

    axum_server::bind_rustls(config.addr, tls_config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| Error::server(e.to_string()))
}
