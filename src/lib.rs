//! Secrets Injector - mutating admission webhook for secret delivery
//!
//! Pods that carry the `secrets-injector-key` label get a memory-backed
//! `secrets` volume, an init container that writes the requested secrets into
//! it, and a `/secrets` mount on every application container. Pods without
//! the label are admitted untouched.
//!
//! # Modules
//!
//! - [`config`] - Process-wide configuration built once at startup
//! - [`patch`] - JSON Patch helpers shared by the injectors
//! - [`inject`] - Volume, mount and init-container injectors
//! - [`policy`] - Label-driven mutation decision
//! - [`webhook`] - AdmissionReview HTTP handlers and router
//! - [`server`] - HTTPS listener
//! - [`manifest`] - MutatingWebhookConfiguration generation
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod inject;
pub mod manifest;
pub mod patch;
pub mod policy;
pub mod server;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Default port for the HTTPS webhook server
///
/// Port 8443 is used instead of 443 to avoid requiring root privileges.
pub const DEFAULT_PORT: u16 = 8443;

/// Route the API server posts Pod admission reviews to
pub const MUTATE_PATH: &str = "/mutate";

/// Mount path of the shared secrets volume in application containers
pub const DEFAULT_SECRETS_MOUNT_PATH: &str = "/secrets";
