//! Relayer configuration.
//!
//! Loaded from a TOML file in which string values may reference environment
//! variables as `$VAR` or `${VAR}`.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4402
//! relayer_private_key = "$RELAYER_KEY"
//! event_poll_interval_secs = 15
//!
//! [deployments.mumbai]
//! rpc_url = "https://rpc-mumbai.maticvigil.com"
//! rpc_rate_limit = 10
//! chain_id = 80001
//! forwarder = "0x4da46ba4dbe3c49b51fea12e1d9ae71021768db0"
//! target = "0xf6182b90ef0fed5b838918e7ed0bea3159577b0c"
//! event_scan_from_block = 25000000
//! domain = { name = "MinimalForwarder", version = "0.0.1" }
//!
//! [deployments.mumbai.policy]
//! receipt_timeout_secs = 120
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to the configuration file (default: `config.toml`)
//! - `HOST` - Overrides the bind address
//! - `PORT` - Overrides the port
//! - Any `$VAR` referenced by the file, typically the relayer key

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use alloy_signer_local::PrivateKeySigner;
use metarelay::{DeploymentConfig, MetaTxError};
use serde::{Deserialize, Serialize};
use url::Url;

/// Failure to load or interpret the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Configuration path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A deployment failed validation.
    #[error("deployment '{tag}': {source}")]
    Deployment {
        /// Deployment tag.
        tag: String,
        /// Validation error.
        source: MetaTxError,
    },
    /// A value is missing, still an unexpanded `$VAR`, or malformed.
    #[error("{0}")]
    Invalid(String),
}

/// Top-level relayer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    /// Bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port (default: `4402`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Key of the account that pays for relayed transactions.
    #[serde(default)]
    pub relayer_private_key: String,

    /// Delay between background event scans (default: 15 s).
    #[serde(default = "default_event_poll_interval_secs")]
    pub event_poll_interval_secs: u64,

    /// Deployments keyed by tag.
    #[serde(default)]
    pub deployments: HashMap<String, DeploymentEntry>,
}

/// One deployment and the node that serves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentEntry {
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: String,

    /// Requests per second allowed against `rpc_url`.
    #[serde(default)]
    pub rpc_rate_limit: Option<u32>,

    /// Contracts, domain and relay policy.
    #[serde(flatten)]
    pub contract: DeploymentConfig,
}

impl DeploymentEntry {
    /// Parsed RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the URL does not parse.
    pub fn url(&self) -> Result<Url, ConfigError> {
        self.rpc_url
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invalid rpc_url '{}': {e}", self.rpc_url)))
    }
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    4402
}

const fn default_event_poll_interval_secs() -> u64 {
    15
}

impl RelayerConfig {
    /// Loads from `$CONFIG`, falling back to `config.toml`.
    ///
    /// # Errors
    ///
    /// See [`Self::load_from`].
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads from `path`, expands `$VAR` references, applies `HOST`/`PORT`
    /// overrides and validates every deployment.
    ///
    /// A missing file yields the defaults (and no deployments).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed or validated.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };

        let mut config = Self::parse(&content)?;

        if let Some(host) = std::env::var("HOST").ok().and_then(|h| h.parse().ok()) {
            config.host = host;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses TOML text after environment expansion. Does not validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed input.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&expand_env_vars(content))?)
    }

    /// Validates every deployment and the poll interval.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "event_poll_interval_secs must be at least 1".into(),
            ));
        }
        for (tag, entry) in &self.deployments {
            entry
                .contract
                .validate()
                .map_err(|source| ConfigError::Deployment {
                    tag: tag.clone(),
                    source,
                })?;
            entry.url()?;
        }
        Ok(())
    }

    /// Looks up a deployment by tag.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unknown tags.
    pub fn deployment(&self, tag: &str) -> Result<&DeploymentEntry, ConfigError> {
        self.deployments
            .get(tag)
            .ok_or_else(|| ConfigError::Invalid(MetaTxError::UnknownDeployment(tag.to_owned()).to_string()))
    }

    /// The fee-paying relayer key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the key is missing, still an
    /// unresolved `$VAR`, or malformed.
    pub fn relayer_signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        parse_key("relayer_private_key", &self.relayer_private_key)
    }

    /// Delay between background event scans.
    #[must_use]
    pub const fn event_poll_interval(&self) -> Duration {
        Duration::from_secs(self.event_poll_interval_secs)
    }
}

/// Parses a hex private key, rejecting unresolved `$VAR` placeholders.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming `field`.
pub fn parse_key(field: &str, raw: &str) -> Result<PrivateKeySigner, ConfigError> {
    let key = raw.trim();
    if key.is_empty() || key.starts_with('$') {
        return Err(ConfigError::Invalid(format!(
            "{field} not resolved (missing env var?)"
        )));
    }
    key.parse()
        .map_err(|e| ConfigError::Invalid(format!("invalid {field}: {e}")))
}

/// Expands `$VAR` and `${VAR}` from the process environment.
///
/// Unresolved variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match std::env::var(&name) {
            Ok(value) if !name.is_empty() => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}
