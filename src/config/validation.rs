//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::{Config, TransportHook};
use ipnet::IpNet;
use slirc_wire::casemap::{irc_eq, irc_to_lower};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.name must contain a '.', got '{0}'")]
    InvalidServerName(String),
    #[error("link '{0}' is defined more than once")]
    DuplicateLink(String),
    #[error("link '{0}' has the same name as this server")]
    LinkToSelf(String),
    #[error("link '{link}' fails over to unknown link '{target}'")]
    UnknownFailover { link: String, target: String },
    #[error("link '{link}' has an invalid allow_mask '{mask}'")]
    InvalidAllowMask { link: String, mask: String },
    #[error("link '{0}' has an empty password")]
    EmptyPassword(String),
    #[error("link '{0}' has a malformed cert_fingerprint (expected 64 hex digits)")]
    InvalidFingerprint(String),
    #[error("listener {0} uses the tls transport but no [tls] section is configured")]
    MissingTlsConfig(String),
    #[error("tls.cert_path does not exist: {0}")]
    TlsCertNotFound(String),
    #[error("tls.key_path does not exist: {0}")]
    TlsKeyNotFound(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let name = &config.server.name;
    if name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    } else if !name.contains('.') {
        errors.push(ValidationError::InvalidServerName(name.clone()));
    }

    let mut seen = HashSet::new();
    for link in &config.links {
        if !seen.insert(irc_to_lower(&link.name)) {
            errors.push(ValidationError::DuplicateLink(link.name.clone()));
        }
        if irc_eq(&link.name, name) {
            errors.push(ValidationError::LinkToSelf(link.name.clone()));
        }
        if link.send_password.is_empty() || link.recv_password.is_empty() {
            errors.push(ValidationError::EmptyPassword(link.name.clone()));
        }
        if let Some(mask) = &link.allow_mask
            && mask.parse::<IpNet>().is_err()
        {
            errors.push(ValidationError::InvalidAllowMask {
                link: link.name.clone(),
                mask: mask.clone(),
            });
        }
        if let Some(fp) = &link.cert_fingerprint {
            let hex: String = fp.chars().filter(|c| *c != ':').collect();
            if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                errors.push(ValidationError::InvalidFingerprint(link.name.clone()));
            }
        }
    }

    for link in &config.links {
        if let Some(target) = &link.failover
            && !config.links.iter().any(|l| irc_eq(&l.name, target))
        {
            errors.push(ValidationError::UnknownFailover {
                link: link.name.clone(),
                target: target.clone(),
            });
        }
    }

    // TLS validation
    for listen in &config.listen {
        if listen.transport == Some(TransportHook::Tls) && config.tls.is_none() {
            errors.push(ValidationError::MissingTlsConfig(listen.address.to_string()));
        }
    }
    if let Some(ref tls) = config.tls {
        if !Path::new(&tls.cert_path).exists() {
            errors.push(ValidationError::TlsCertNotFound(tls.cert_path.clone()));
        }
        if !Path::new(&tls.key_path).exists() {
            errors.push(ValidationError::TlsKeyNotFound(tls.key_path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
