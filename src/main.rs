//! Secrets Injector - mutating admission webhook for secret delivery

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use secrets_injector::config::{MutationConfig, ServerConfig};
use secrets_injector::manifest::{self, WebhookManifest};
use secrets_injector::webhook::WebhookState;
use secrets_injector::{server, DEFAULT_PORT, DEFAULT_SECRETS_MOUNT_PATH};

/// Secrets Injector - inject a secret-fetching init container into labelled Pods
#[derive(Parser, Debug)]
#[command(name = "secrets-injector", version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTPS admission webhook
    Serve(ServeArgs),

    /// Print a MutatingWebhookConfiguration for this webhook and exit
    Manifest(ManifestArgs),
}

/// Serve mode arguments
#[derive(Args, Debug)]
struct ServeArgs {
    /// Webhook server port
    #[arg(long, env = "SECRETS_INJECTOR_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path to the x509 certificate for https
    #[arg(
        long,
        env = "SECRETS_INJECTOR_TLS_CERT_FILE",
        default_value = "/etc/webhook/certs/cert.pem"
    )]
    tls_cert_file: PathBuf,

    /// Path to the x509 private key matching the certificate
    #[arg(
        long,
        env = "SECRETS_INJECTOR_TLS_KEY_FILE",
        default_value = "/etc/webhook/certs/key.pem"
    )]
    tls_key_file: PathBuf,

    /// Image of the secret-fetching init container
    #[arg(long, env = "SECRETS_INJECTOR_IMAGE")]
    image: String,

    /// Executable run by the init container
    #[arg(long, env = "SECRETS_INJECTOR_COMMAND", default_value = "python")]
    command: String,

    /// First argument passed to the executable
    #[arg(long, env = "SECRETS_INJECTOR_COMMAND_ARG", default_value = "main.py")]
    command_arg: String,

    /// Path inside the init container where secrets are written
    #[arg(
        long,
        env = "SECRETS_INJECTOR_SECRET_VOLUME_PATH",
        default_value = DEFAULT_SECRETS_MOUNT_PATH
    )]
    secret_volume_path: String,

    /// Prefix for the opt-in labels, e.g. `example.com/`
    #[arg(long, env = "SECRETS_INJECTOR_LABEL_PREFIX")]
    label_prefix: Option<String>,
}

/// Manifest mode arguments
#[derive(Args, Debug)]
struct ManifestArgs {
    /// Name of the MutatingWebhookConfiguration
    #[arg(long, default_value = "secrets-injector")]
    name: String,

    /// Service fronting the webhook
    #[arg(long, default_value = "secrets-injector")]
    service_name: String,

    /// Namespace of the Service
    #[arg(long, default_value = "kube-system")]
    namespace: String,

    /// Service port
    #[arg(long, default_value_t = 443)]
    service_port: i32,

    /// PEM CA bundle that signed the serving certificate
    #[arg(long)]
    ca_bundle_file: PathBuf,

    /// Prefix for the opt-in labels, e.g. `example.com/`
    #[arg(long, env = "SECRETS_INJECTOR_LABEL_PREFIX")]
    label_prefix: Option<String>,

    /// What the API server does when the webhook is unreachable
    #[arg(long, default_value = "Ignore", value_parser = ["Fail", "Ignore"])]
    failure_policy: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_json);

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Manifest(args) => run_manifest(args).await,
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Option<Layer> implements Layer, so exactly one formatter is active
    let (json_layer, text_layer) = if json {
        (Some(fmt::layer().json().with_target(true)), None)
    } else {
        (None, Some(fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Run the webhook server
async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    server::install_crypto_provider()?;

    let mutation = MutationConfig {
        image: args.image,
        command: args.command,
        command_arg: args.command_arg,
        secret_volume_path: args.secret_volume_path,
        label_prefix: args.label_prefix,
    };
    mutation.validate()?;

    tracing::info!(
        image = %mutation.image,
        command = %mutation.command,
        secret_volume_path = %mutation.secret_volume_path,
        secret_key_label = %mutation.secret_key_label(),
        "Loaded injector configuration"
    );

    let server_config = ServerConfig::new(args.port, args.tls_cert_file, args.tls_key_file);
    let state = Arc::new(WebhookState::new(mutation));

    server::serve(server_config, state).await?;
    Ok(())
}

/// Print the MutatingWebhookConfiguration YAML
async fn run_manifest(args: ManifestArgs) -> anyhow::Result<()> {
    let ca_bundle = manifest::read_ca_bundle(&args.ca_bundle_file)
        .await
        .with_context(|| format!("Failed to read CA bundle {:?}", args.ca_bundle_file))?;

    let mut label_config = MutationConfig::new(String::new());
    label_config.label_prefix = args.label_prefix;

    let manifest = WebhookManifest {
        name: args.name,
        service_name: args.service_name,
        namespace: args.namespace,
        port: args.service_port,
        ca_bundle,
        secret_key_label: label_config.secret_key_label(),
        failure_policy: args.failure_policy,
    };

    println!("{}", manifest.to_yaml()?);
    Ok(())
}
