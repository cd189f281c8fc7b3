// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Management controller protocol boundary.
//!
//! The gateway never speaks the out-of-band protocol itself. A backend
//! supplies a [`Dialer`], which hands out a [`Transport`] per address, on
//! which an authenticated [`Session`] can be negotiated. Sessions and
//! transports are closed independently; see [`crate::broker`] for the
//! ordering the gateway enforces.
//!
//! Cancellation follows the usual async rules: dropping a pending dial,
//! negotiation or command future abandons the exchange.

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

/// Maximum privilege level requested when negotiating a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrivilegeLevel {
    Callback,
    User,
    Operator,
    Administrator,
}

impl PrivilegeLevel {
    /// Returns the privilege name in the form management tools expect
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivilegeLevel::Callback => "CALLBACK",
            PrivilegeLevel::User => "USER",
            PrivilegeLevel::Operator => "OPERATOR",
            PrivilegeLevel::Administrator => "ADMINISTRATOR",
        }
    }
}

impl std::fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chassis control primitive understood by the management controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChassisControl {
    PowerOff,
    PowerOn,
    PowerCycle,
    HardReset,
    DiagnosticInterrupt,
    SoftPowerOff,
}

/// Chassis status as reported by the management controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChassisStatus {
    pub powered_on: bool,
    pub power_overload: bool,
    pub power_fault: bool,
    pub power_control_fault: bool,
    pub last_power_down_supply_failure: bool,
    pub last_power_down_overload: bool,
    pub last_power_down_interlock: bool,
    pub last_power_down_fault: bool,
    /// Last power-on was commanded through the controller
    pub powered_on_by_controller: bool,
    pub reset_button_disabled: bool,
    pub power_off_button_disabled: bool,
}

/// Credentials and privilege for session negotiation
#[derive(Debug)]
pub struct SessionOpts {
    pub username: String,
    pub password: SecretString,
    pub max_privilege_level: PrivilegeLevel,
}

/// Errors raised by a protocol backend
#[derive(Error, Debug)]
pub enum BmcError {
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("unable to resolve {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("session is closed")]
    Closed,

    /// Failure reported by the controller or the backend tooling
    #[error("{0}")]
    Command(String),
}

/// Opens transports to management controllers
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, address: &str) -> Result<Box<dyn Transport>, BmcError>;
}

/// An unauthenticated connection to one management controller
#[async_trait]
pub trait Transport: Send {
    async fn new_session(&mut self, opts: &SessionOpts) -> Result<Box<dyn Session>, BmcError>;

    async fn close(&mut self) -> Result<(), BmcError>;
}

/// An authenticated session layered on a [`Transport`]
#[async_trait]
pub trait Session: Send {
    async fn get_chassis_status(&mut self) -> Result<ChassisStatus, BmcError>;

    async fn chassis_control(&mut self, control: ChassisControl) -> Result<(), BmcError>;

    /// Log out of the controller. The owning transport stays open.
    async fn close(&mut self) -> Result<(), BmcError>;
}
