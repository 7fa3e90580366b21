// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client configuration.
//!
//! [`ClientConfig`] carries the caller-facing construction parameters
//! (application name, endpoint, security flag, trust flag, credentials)
//! together with session tuning. It can be built in code or loaded from
//! YAML, TOML or JSON through [`ConfigLoader`].
//!
//! # Examples
//!
//! ```
//! use ua_access::config::ClientConfig;
//!
//! let config = ClientConfig::builder()
//!     .application_name("line-monitor")
//!     .endpoint("opc.tcp://localhost:52240")
//!     .security_enabled(true)
//!     .accept_untrusted(true)
//!     .credentials("operator", "secret")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.namespace_index, 2);
//! ```

mod loader;

pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, ConfigLoaderBuilder};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ConnectionError, UaError, UaResult};
use crate::provider::SessionRequest;
use crate::status::StatusCode;
use crate::types::{humantime_serde, EndpointSecurity, UserIdentity};

// =============================================================================
// ClientConfig
// =============================================================================

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Application name presented to the server.
    pub application_name: String,

    /// Server endpoint URL (`opc.tcp://host:port[/path]`).
    pub endpoint: String,

    /// Selects a signed and encrypted endpoint when `true`.
    pub security_enabled: bool,

    /// Accepts server certificates that are not in the trusted store.
    pub accept_untrusted: bool,

    /// User identity.
    pub identity: UserIdentity,

    /// Application URI. Derived from host and application name when unset.
    pub application_uri: Option<String>,

    /// Per-request operation timeout.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Requested session timeout.
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Default timeout for establishing a session.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Keep-alive interval requested from the provider.
    #[serde(with = "humantime_serde")]
    pub keep_alive_interval: Duration,

    /// Namespace holding the device hierarchy.
    pub namespace_index: u16,

    /// Root of the certificate store handed to the provider.
    pub pki_dir: PathBuf,

    /// Root children that are not devices.
    pub excluded_root_nodes: Vec<String>,

    /// Deepest group nesting the browser will follow.
    pub browse_max_depth: usize,
}

impl ClientConfig {
    /// Default namespace index.
    pub const DEFAULT_NAMESPACE_INDEX: u16 = 2;
    /// Default operation timeout.
    pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(20);
    /// Default session timeout.
    pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(5);
    /// Default connect timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default keep-alive interval.
    pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);
    /// Default browse depth limit.
    pub const DEFAULT_BROWSE_MAX_DEPTH: usize = 64;

    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> UaResult<()> {
        if self.endpoint.is_empty() {
            return Err(ConfigurationError::MissingField { field: "endpoint" }.into());
        }
        if !self.endpoint.starts_with("opc.tcp://") {
            return Err(ConnectionError::invalid_endpoint(
                &self.endpoint,
                "Endpoint must start with 'opc.tcp://'",
            )
            .into());
        }
        if self.application_name.trim().is_empty() {
            return Err(ConfigurationError::MissingField {
                field: "application_name",
            }
            .into());
        }
        if let UserIdentity::UserName { username, .. } = &self.identity {
            if username.is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "identity.username",
                    "username must not be empty",
                )
                .into());
            }
        }
        for (field, value) in [
            ("operation_timeout", self.operation_timeout),
            ("session_timeout", self.session_timeout),
            ("connect_timeout", self.connect_timeout),
            ("keep_alive_interval", self.keep_alive_interval),
        ] {
            if value.is_zero() {
                return Err(
                    ConfigurationError::invalid_value(field, "must be greater than zero").into(),
                );
            }
        }
        if self.browse_max_depth == 0 {
            return Err(ConfigurationError::invalid_value(
                "browse_max_depth",
                "must be greater than zero",
            )
            .into());
        }
        Ok(())
    }

    /// Returns the application URI, deriving it when unset.
    pub fn effective_application_uri(&self) -> String {
        self.application_uri
            .clone()
            .unwrap_or_else(|| format!("urn:{}:{}", host_name(), self.application_name))
    }

    /// Returns the endpoint security derived from the security flag.
    pub fn endpoint_security(&self) -> EndpointSecurity {
        EndpointSecurity::from_flag(self.security_enabled)
    }

    /// Returns the certificate trust policy.
    pub fn certificate_trust(&self) -> CertificateTrust {
        CertificateTrust {
            accept_untrusted: self.accept_untrusted,
        }
    }

    /// Returns the certificate store layout under `pki_dir`.
    pub fn certificate_store(&self) -> CertificateStoreLayout {
        CertificateStoreLayout::new(&self.pki_dir)
    }

    /// Builds the request handed to the session provider.
    pub fn session_request(&self) -> SessionRequest {
        SessionRequest {
            application_name: self.application_name.clone(),
            application_uri: self.effective_application_uri(),
            endpoint: self.endpoint.clone(),
            security: self.endpoint_security(),
            identity: self.identity.clone(),
            trust: self.certificate_trust(),
            session_timeout: self.session_timeout,
            operation_timeout: self.operation_timeout,
            keep_alive_interval: self.keep_alive_interval,
            pki_dir: self.pki_dir.clone(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            application_name: "ua-access".to_string(),
            endpoint: String::new(),
            security_enabled: false,
            accept_untrusted: false,
            identity: UserIdentity::Anonymous,
            application_uri: None,
            operation_timeout: Self::DEFAULT_OPERATION_TIMEOUT,
            session_timeout: Self::DEFAULT_SESSION_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            keep_alive_interval: Self::DEFAULT_KEEP_ALIVE_INTERVAL,
            namespace_index: Self::DEFAULT_NAMESPACE_INDEX,
            pki_dir: PathBuf::from("Certificates"),
            excluded_root_nodes: vec!["Server".to_string()],
            browse_max_depth: Self::DEFAULT_BROWSE_MAX_DEPTH,
        }
    }
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

// =============================================================================
// ClientConfigBuilder
// =============================================================================

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = name.into();
        self
    }

    /// Sets the endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Enables or disables message security.
    pub fn security_enabled(mut self, enabled: bool) -> Self {
        self.config.security_enabled = enabled;
        self
    }

    /// Accepts or rejects untrusted server certificates.
    pub fn accept_untrusted(mut self, accept: bool) -> Self {
        self.config.accept_untrusted = accept;
        self
    }

    /// Authenticates with username and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.identity = UserIdentity::user_name(username, password);
        self
    }

    /// Sets the user identity.
    pub fn identity(mut self, identity: UserIdentity) -> Self {
        self.config.identity = identity;
        self
    }

    /// Sets the application URI.
    pub fn application_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.application_uri = Some(uri.into());
        self
    }

    /// Sets the operation timeout.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    /// Sets the default connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the keep-alive interval.
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.config.keep_alive_interval = interval;
        self
    }

    /// Sets the namespace index.
    pub fn namespace_index(mut self, index: u16) -> Self {
        self.config.namespace_index = index;
        self
    }

    /// Sets the certificate store root.
    pub fn pki_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pki_dir = dir.into();
        self
    }

    /// Replaces the excluded root node names.
    pub fn excluded_root_nodes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.excluded_root_nodes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the browse depth limit.
    pub fn browse_max_depth(mut self, depth: usize) -> Self {
        self.config.browse_max_depth = depth;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<ClientConfig, UaError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// =============================================================================
// Certificates
// =============================================================================

/// Trust decision consulted by the provider on certificate validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CertificateTrust {
    /// Accept certificates that are merely untrusted.
    pub accept_untrusted: bool,
}

impl CertificateTrust {
    /// Decides a certificate-validation event.
    ///
    /// Only an untrusted certificate can be accepted, and only when the
    /// policy allows it. Every other validation failure is rejected.
    pub fn accepts(&self, validation_status: StatusCode) -> bool {
        self.accept_untrusted && validation_status == StatusCode::BAD_CERTIFICATE_UNTRUSTED
    }
}

/// Directory layout of the certificate store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateStoreLayout {
    root: PathBuf,
}

impl CertificateStoreLayout {
    /// Creates the layout rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Application instance certificate store.
    pub fn application(&self) -> PathBuf {
        self.root.join("Application")
    }

    /// Trusted issuer store.
    pub fn trusted(&self) -> PathBuf {
        self.root.join("Trusted")
    }

    /// Trusted peer store.
    pub fn trusted_peer(&self) -> PathBuf {
        self.root.join("TrustedPeer")
    }

    /// Rejected certificate store.
    pub fn rejected(&self) -> PathBuf {
        self.root.join("Rejected")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ClientConfigBuilder {
        ClientConfig::builder()
            .application_name("testing")
            .endpoint("opc.tcp://localhost:52240")
    }

    #[test]
    fn test_defaults() {
        let config = valid().build().unwrap();
        assert_eq!(config.operation_timeout, Duration::from_secs(20));
        assert_eq!(config.session_timeout, Duration::from_secs(5));
        assert_eq!(config.namespace_index, 2);
        assert_eq!(config.excluded_root_nodes, vec!["Server".to_string()]);
        assert!(config.identity.is_anonymous());
    }

    #[test]
    fn test_validation_rejects_bad_endpoint() {
        let err = ClientConfig::builder()
            .endpoint("http://localhost:4840")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            UaError::Connection(ConnectionError::InvalidEndpoint { .. })
        ));

        let err = ClientConfig::builder().build().unwrap_err();
        assert!(matches!(
            err,
            UaError::Configuration(ConfigurationError::MissingField { field: "endpoint" })
        ));
    }

    #[test]
    fn test_validation_rejects_zero_timeouts() {
        assert!(valid().operation_timeout(Duration::ZERO).build().is_err());
        assert!(valid().browse_max_depth(0).build().is_err());
        assert!(valid().credentials("", "pw").build().is_err());
    }

    #[test]
    fn test_application_uri() {
        let config = valid().application_uri("urn:plant:monitor").build().unwrap();
        assert_eq!(config.effective_application_uri(), "urn:plant:monitor");

        let derived = valid().build().unwrap().effective_application_uri();
        assert!(derived.starts_with("urn:"));
        assert!(derived.ends_with(":testing"));
    }

    #[test]
    fn test_certificate_trust() {
        let lenient = CertificateTrust {
            accept_untrusted: true,
        };
        assert!(lenient.accepts(StatusCode::BAD_CERTIFICATE_UNTRUSTED));
        assert!(!lenient.accepts(StatusCode::BAD_CERTIFICATE_INVALID));

        let strict = CertificateTrust::default();
        assert!(!strict.accepts(StatusCode::BAD_CERTIFICATE_UNTRUSTED));
    }

    #[test]
    fn test_certificate_store_layout() {
        let config = valid().pki_dir("/var/lib/ua/pki").build().unwrap();
        let store = config.certificate_store();
        assert_eq!(store.trusted_peer(), PathBuf::from("/var/lib/ua/pki/TrustedPeer"));
        assert_eq!(store.rejected(), PathBuf::from("/var/lib/ua/pki/Rejected"));
    }

    #[test]
    fn test_session_request() {
        let config = valid()
            .security_enabled(true)
            .accept_untrusted(true)
            .credentials("operator", "secret")
            .build()
            .unwrap();
        let request = config.session_request();
        assert_eq!(request.endpoint, "opc.tcp://localhost:52240");
        assert!(request.security.is_secure());
        assert!(request.trust.accept_untrusted);
        assert!(!request.identity.is_anonymous());
    }

    #[test]
    fn test_serde_humantime_durations() {
        let config = valid().build().unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["operation_timeout"], "20s");

        let back: ClientConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
