// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Gateway configuration
//!
//! Configuration is loaded from a TOML file when one is given, otherwise a
//! single target is described through environment variables:
//!
//! - `CHASSIS_TARGET_NAME` (default: `default`)
//! - `CHASSIS_TARGET_ADDRESS`
//! - `CHASSIS_TARGET_USERNAME`
//! - `CHASSIS_TARGET_PASSWORD`
//!
//! Either way the result is validated before the registry is built, so
//! request handling never sees a malformed target.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

/// Default bind address for the HTTP server
pub const DEFAULT_BIND_ADDRESS: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

/// Target name used when the target comes from the environment
pub const DEFAULT_TARGET_NAME: &str = "default";

/// Default path of the ipmitool executable
const DEFAULT_IPMITOOL_PATH: &str = "ipmitool";

/// Default ipmitool interface
const DEFAULT_IPMITOOL_INTERFACE: &str = "lanplus";

/// Default bound on a single ipmitool run (seconds)
const DEFAULT_IPMITOOL_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {0} is required when no config file is given")]
    MissingEnv(&'static str),

    #[error("no targets configured")]
    NoTargets,

    #[error("target {name:?}: {reason}")]
    InvalidTarget { name: String, reason: &'static str },
}

/// Protocol backend used to reach management controllers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Shell out to the system `ipmitool`
    #[default]
    Ipmitool,
    /// In-memory simulated controllers, for local development
    Stub,
}

/// Settings for the ipmitool backend
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IpmitoolConfig {
    /// Path to the ipmitool executable
    pub path: PathBuf,
    /// ipmitool interface (`-I`)
    pub interface: String,
    /// Upper bound on a single ipmitool run
    pub timeout_secs: u64,
}

impl Default for IpmitoolConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_IPMITOOL_PATH),
            interface: DEFAULT_IPMITOOL_INTERFACE.to_string(),
            timeout_secs: DEFAULT_IPMITOOL_TIMEOUT_SECS,
        }
    }
}

/// Address and credentials of one target's management controller
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    /// `host` or `host:port` of the management controller
    pub address: String,
    pub username: String,
    pub password: SecretString,
}

/// Gateway configuration
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub ipmitool: IpmitoolConfig,
    /// Targets keyed by name
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

fn default_bind_address() -> SocketAddr {
    DEFAULT_BIND_ADDRESS
}

impl GatewayConfig {
    /// Load and validate configuration, from `path` if given, otherwise
    /// from the process environment
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path).await?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build a single-target configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a single-target configuration from a variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| var(name).ok_or(ConfigError::MissingEnv(name));

        let name = var("CHASSIS_TARGET_NAME").unwrap_or_else(|| DEFAULT_TARGET_NAME.to_string());
        let target = TargetConfig {
            address: required("CHASSIS_TARGET_ADDRESS")?,
            username: required("CHASSIS_TARGET_USERNAME")?,
            password: SecretString::from(required("CHASSIS_TARGET_PASSWORD")?),
        };

        Ok(Self {
            bind_address: default_bind_address(),
            backend: Backend::default(),
            ipmitool: IpmitoolConfig::default(),
            targets: BTreeMap::from([(name, target)]),
        })
    }

    /// Reject configurations that would produce unusable targets
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        for (name, target) in &self.targets {
            let invalid = |reason| ConfigError::InvalidTarget {
                name: name.clone(),
                reason,
            };
            if name.trim().is_empty() {
                return Err(invalid("name is empty"));
            }
            if target.address.trim().is_empty() {
                return Err(invalid("address is empty"));
            }
            if target.username.is_empty() {
                return Err(invalid("username is empty"));
            }
        }

        Ok(())
    }
}
