// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Target registry
//!
//! Built once at startup and read-only afterwards, so it is shared between
//! request handlers without locking.

use std::collections::HashMap;

use secrecy::SecretString;

use crate::config::GatewayConfig;

/// A named server and the credentials for its management controller
#[derive(Debug)]
pub struct Target {
    pub name: String,
    pub address: String,
    pub username: String,
    pub password: SecretString,
}

/// Immutable mapping from target name to [`Target`]
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: HashMap<String, Target>,
}

impl TargetRegistry {
    pub fn new(targets: impl IntoIterator<Item = Target>) -> Self {
        let targets = targets
            .into_iter()
            .map(|target| (target.name.clone(), target))
            .collect();
        Self { targets }
    }

    /// Build the registry from a loaded configuration
    pub fn from_config(config: GatewayConfig) -> Self {
        Self::new(config.targets.into_iter().map(|(name, target)| Target {
            name,
            address: target.address,
            username: target.username,
            password: target.password,
        }))
    }

    /// Look up a target by name. Absence is the only failure.
    pub fn lookup(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Configured target names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
