// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders
//! 3. Parse YAML, TOML or JSON into [`ClientConfig`]
//! 4. Apply environment variable overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! UA_ACCESS_ENDPOINT=opc.tcp://plc-01:4840
//! UA_ACCESS_APPLICATION_NAME=line-monitor
//! UA_ACCESS_SECURITY_ENABLED=true
//! UA_ACCESS_ACCEPT_UNTRUSTED=false
//! UA_ACCESS_USERNAME=operator
//! UA_ACCESS_PASSWORD=secret
//! ```

use std::env;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::ClientConfig;
use crate::error::{ConfigurationError, UaResult};
use crate::types::UserIdentity;

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader.
///
/// # Examples
///
/// ```no_run
/// use ua_access::config::ConfigLoader;
///
/// let config = ConfigLoader::new().load("ua-access.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve placeholders and apply overrides.
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Default environment variable prefix.
    pub const DEFAULT_ENV_PREFIX: &'static str = "UA_ACCESS";

    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            env_prefix: Self::DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::default()
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable handling.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The file format is determined by the extension: `.yaml`/`.yml`,
    /// `.toml` or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> UaResult<ClientConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading client configuration");

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|source| ConfigurationError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config = self.load_from_str(&content, format)?;
        debug!(endpoint = %config.endpoint, "Client configuration loaded");
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> UaResult<ClientConfig> {
        let content = if self.resolve_env_vars {
            resolve_env_placeholders(content)
        } else {
            content.to_string()
        };

        let mut config: ClientConfig = parse_str(&content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&self, config: &mut ClientConfig) -> UaResult<()> {
        let var = |name: &str| env::var(format!("{}_{}", self.env_prefix, name)).ok();

        if let Some(value) = var("ENDPOINT") {
            config.endpoint = value;
        }
        if let Some(value) = var("APPLICATION_NAME") {
            config.application_name = value;
        }
        if let Some(value) = var("SECURITY_ENABLED") {
            config.security_enabled = parse_bool(&value);
        }
        if let Some(value) = var("ACCEPT_UNTRUSTED") {
            config.accept_untrusted = parse_bool(&value);
        }
        if let Some(value) = var("NAMESPACE_INDEX") {
            config.namespace_index = value.parse().map_err(|_| {
                ConfigurationError::invalid_value(
                    "namespace_index",
                    format!(
                        "{}_NAMESPACE_INDEX must be a number, got '{}'",
                        self.env_prefix, value
                    ),
                )
            })?;
        }

        match (var("USERNAME"), var("PASSWORD")) {
            (Some(username), password) => {
                config.identity = UserIdentity::user_name(username, password.unwrap_or_default());
            }
            (None, Some(password)) => match &mut config.identity {
                UserIdentity::UserName { password: current, .. } => *current = password,
                UserIdentity::Anonymous => {
                    warn!(prefix = %self.env_prefix, "Password override ignored without a username")
                }
            },
            (None, None) => {}
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for [`ConfigLoader`].
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Sets the environment variable prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable handling.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Builds the ConfigLoader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(enabled) = self.resolve_env_vars {
            loader.resolve_env_vars = enabled;
        }
        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Detects format from file extension.
    pub fn from_path(path: &Path) -> UaResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            Some(other) => Err(ConfigurationError::UnsupportedFormat {
                extension: other.to_string(),
            }
            .into()),
            None => Err(ConfigurationError::UnsupportedFormat {
                extension: "(no extension)".to_string(),
            }
            .into()),
        }
    }

    /// Returns the format name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Yaml => "YAML",
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> UaResult<T> {
    let parsed = match format {
        ConfigFormat::Yaml => parse_yaml(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigurationError::parse(format.name(), e))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigurationError::parse(format.name(), e))
        }
    };
    Ok(parsed?)
}

/// YAML parsing through the `config` crate.
fn parse_yaml<T: DeserializeOwned>(content: &str) -> Result<T, ConfigurationError> {
    config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ConfigurationError::parse("YAML", e))
}

/// Resolves `${VAR_NAME}` and `${VAR_NAME:default}` placeholders.
///
/// Unset variables without a default keep their placeholder text.
fn resolve_env_placeholders(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            result.push(c);
            continue;
        }
        chars.next();

        let mut var_content = String::new();
        let mut found_close = false;
        for c in chars.by_ref() {
            if c == '}' {
                found_close = true;
                break;
            }
            var_content.push(c);
        }

        if !found_close {
            result.push_str("${");
            result.push_str(&var_content);
            continue;
        }

        let (var_name, default_value) = match var_content.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (var_content.as_str(), None),
        };

        match (env::var(var_name), default_value) {
            (Ok(value), _) => result.push_str(&value),
            (Err(_), Some(default)) => result.push_str(default),
            (Err(_), None) => {
                warn!(variable = var_name, "Environment variable not found");
                result.push_str("${");
                result.push_str(var_name);
                result.push('}');
            }
        }
    }

    result
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> UaResult<ClientConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> UaResult<ClientConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    use crate::error::UaError;

    /// Loader with a prefix no other test touches.
    fn isolated_loader() -> (ConfigLoader, String) {
        let prefix = format!("UA_ACCESS_TEST_{}", uuid::Uuid::new_v4().simple());
        (ConfigLoader::new().with_env_prefix(prefix.clone()), prefix)
    }

    const YAML: &str = r#"
application_name: line-monitor
endpoint: opc.tcp://localhost:52240
security_enabled: true
accept_untrusted: true
operation_timeout: 10s
identity:
  type: user_name
  username: operator
  password: secret
excluded_root_nodes:
  - Server
  - Aliases
"#;

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let (loader, _) = isolated_loader();
        let config = loader.load(file.path()).unwrap();

        assert_eq!(config.application_name, "line-monitor");
        assert!(config.security_enabled);
        assert_eq!(config.operation_timeout, Duration::from_secs(10));
        assert_eq!(config.session_timeout, ClientConfig::DEFAULT_SESSION_TIMEOUT);
        assert_eq!(config.identity, UserIdentity::user_name("operator", "secret"));
        assert_eq!(config.excluded_root_nodes.len(), 2);
    }

    #[test]
    fn test_load_toml_str() {
        let toml = r#"
application_name = "line-monitor"
endpoint = "opc.tcp://plc-01:4840"
namespace_index = 3
keep_alive_interval = "2s"
"#;
        let (loader, _) = isolated_loader();
        let config = loader.load_from_str(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.namespace_index, 3);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_load_json_str() {
        let json = r#"{"endpoint": "opc.tcp://plc-01:4840", "browse_max_depth": 8}"#;
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(json, ConfigFormat::Json)
            .unwrap();
        assert_eq!(config.browse_max_depth, 8);
        assert_eq!(config.application_name, "ua-access");
    }

    #[test]
    fn test_env_placeholders() {
        let var = format!("UA_ACCESS_TEST_HOST_{}", uuid::Uuid::new_v4().simple());
        env::set_var(&var, "plc-07");

        let content = format!(
            "endpoint: opc.tcp://${{{var}}}:4840\n\
             application_name: ${{UA_ACCESS_UNSET_NAME_XYZ:fallback}}\n"
        );
        let (loader, _) = isolated_loader();
        let config = loader.load_from_str(&content, ConfigFormat::Yaml).unwrap();

        assert_eq!(config.endpoint, "opc.tcp://plc-07:4840");
        assert_eq!(config.application_name, "fallback");
        env::remove_var(&var);
    }

    #[test]
    fn test_unresolved_placeholder_is_kept() {
        assert_eq!(
            resolve_env_placeholders("a ${UA_ACCESS_DEFINITELY_UNSET_VAR} b"),
            "a ${UA_ACCESS_DEFINITELY_UNSET_VAR} b"
        );
        assert_eq!(resolve_env_placeholders("cost: $5 ${open"), "cost: $5 ${open");
    }

    #[test]
    fn test_env_overrides() {
        let (loader, prefix) = isolated_loader();
        env::set_var(format!("{prefix}_ENDPOINT"), "opc.tcp://override:4840");
        env::set_var(format!("{prefix}_ACCEPT_UNTRUSTED"), "yes");
        env::set_var(format!("{prefix}_USERNAME"), "maint");

        let config = loader.load_from_str(YAML, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.endpoint, "opc.tcp://override:4840");
        assert!(config.accept_untrusted);
        assert_eq!(config.identity, UserIdentity::user_name("maint", ""));

        for name in ["ENDPOINT", "ACCEPT_UNTRUSTED", "USERNAME"] {
            env::remove_var(format!("{prefix}_{name}"));
        }
    }

    #[test]
    fn test_invalid_namespace_override() {
        let (loader, prefix) = isolated_loader();
        env::set_var(format!("{prefix}_NAMESPACE_INDEX"), "two");
        let err = loader.load_from_str(YAML, ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, UaError::Configuration(_)));
        env::remove_var(format!("{prefix}_NAMESPACE_INDEX"));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.TOML")).unwrap(), ConfigFormat::Toml);
        assert!(ConfigFormat::from_path(Path::new("a.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("config")).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config("/nonexistent/ua-access.yaml").unwrap_err();
        assert!(matches!(
            err,
            UaError::Configuration(ConfigurationError::FileRead { .. })
        ));
    }
}
