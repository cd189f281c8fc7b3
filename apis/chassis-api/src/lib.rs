// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Dropshot API trait for the chassis power-control gateway.
//!
//! The gateway fronts a set of named servers whose management controllers
//! are reachable over the network. Every request names one target; the
//! gateway opens a session to that target's controller, runs exactly one
//! command and relays the result.
//!
//! ## Endpoints
//!
//! - `GET /targets/{target}/chassis` - Read chassis power and fault status
//! - `POST /targets/{target}/chassis/control` - Issue a power control command
//! - `GET /health` - Liveness check
//!
//! ## Errors
//!
//! Failures are reported with a small, stable set of kinds. The kind is
//! carried in the `error_code` field of the error body:
//!
//! | kind                  | status | `error_code`          |
//! |-----------------------|--------|-----------------------|
//! | unknown target        | 404    | `not_found`           |
//! | unrecognized command  | 400    | `invalid_argument`    |
//! | controller failure    | 412    | `failed_precondition` |

use dropshot::{HttpError, HttpResponseOk, Path, RequestContext, TypedBody};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Path parameter naming a configured target
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TargetPath {
    /// Target name as configured on the gateway (e.g., "rack1")
    pub target: String,
}

/// Power control command accepted by the gateway
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChassisControlCommand {
    /// Power down immediately
    Off,
    /// Power up
    On,
    /// Power down, then back up after a controller-defined interval
    Cycle,
    /// Hard reset without cycling power
    Reset,
    /// Pulse a diagnostic interrupt (NMI) to the host
    DiagnosticInterrupt,
    /// Ask the operating system to shut down cleanly
    SoftPowerOff,
}

impl ChassisControlCommand {
    /// Returns the wire name of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            ChassisControlCommand::Off => "OFF",
            ChassisControlCommand::On => "ON",
            ChassisControlCommand::Cycle => "CYCLE",
            ChassisControlCommand::Reset => "RESET",
            ChassisControlCommand::DiagnosticInterrupt => "DIAGNOSTIC_INTERRUPT",
            ChassisControlCommand::SoftPowerOff => "SOFT_POWER_OFF",
        }
    }
}

impl std::fmt::Display for ChassisControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command name that matches no [`ChassisControlCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl std::fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown chassis control command {:?}", self.0)
    }
}

impl std::error::Error for UnknownCommand {}

impl std::str::FromStr for ChassisControlCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use strum::IntoEnumIterator;

        Self::iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// Body of a control command request
///
/// The command travels as a plain string so that an unrecognized value
/// reaches the handler, which reports it after the target lookup. The
/// schema still advertises the [`ChassisControlCommand`] values.
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ChassisControlRequest {
    /// Command to issue to the target's chassis
    #[schemars(with = "ChassisControlCommand")]
    pub command: String,
}

/// Acknowledgement of a control command
///
/// No status is re-read after a command; callers that need the resulting
/// power state should query the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ChassisControlResponse {
    /// Target the command was issued to
    pub target: String,
}

/// Chassis power state and fault conditions of a target
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetChassisStatusResponse {
    /// Target the status was read from
    pub target: String,
    /// System power is on
    pub powered_on: bool,
    /// The controller failed to change power state
    pub power_control_fault: bool,
    /// A fault was detected in the main power subsystem
    pub power_fault: bool,
    /// Power was shut down because of an overload
    pub power_overload: bool,
    /// The last power-on was requested through the management controller
    pub powered_on_by_controller: bool,
    /// The last power-down was caused by a power fault
    pub last_power_down_fault: bool,
    /// The last power-down was caused by a power interlock
    pub last_power_down_interlock: bool,
    /// The last power-down was caused by a power overload
    pub last_power_down_overload: bool,
    /// The last power-down was caused by an AC supply failure
    pub last_power_down_supply_failure: bool,
    /// The front-panel reset button is disabled
    pub reset_button_disabled: bool,
    /// The front-panel power button is disabled
    pub power_off_button_disabled: bool,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Chassis Gateway API
///
/// Remote chassis power control for a fixed set of configured targets.
#[dropshot::api_description]
pub trait ChassisApi {
    /// Context type for request handlers
    type Context: Send + Sync + 'static;

    /// Get chassis status
    ///
    /// Opens a session to the target's management controller, reads the
    /// chassis status and closes the session again.
    ///
    /// Returns 404 if the target is not configured.
    /// Returns 412 if the controller cannot be reached, refuses the
    /// session, or fails to report its status.
    #[endpoint {
        method = GET,
        path = "/targets/{target}/chassis",
        tags = ["chassis"],
    }]
    async fn get_chassis_status(
        rqctx: RequestContext<Self::Context>,
        path: Path<TargetPath>,
    ) -> Result<HttpResponseOk<GetChassisStatusResponse>, HttpError>;

    /// Issue a chassis control command
    ///
    /// Opens an administrator session to the target's management
    /// controller, issues the command and closes the session again.
    ///
    /// Returns 404 if the target is not configured.
    /// Returns 400 if the command is not recognized.
    /// Returns 412 if the controller cannot be reached, refuses the
    /// session, or rejects the command.
    #[endpoint {
        method = POST,
        path = "/targets/{target}/chassis/control",
        tags = ["chassis"],
    }]
    async fn issue_chassis_control_command(
        rqctx: RequestContext<Self::Context>,
        path: Path<TargetPath>,
        body: TypedBody<ChassisControlRequest>,
    ) -> Result<HttpResponseOk<ChassisControlResponse>, HttpError>;

    /// Health check endpoint
    #[endpoint {
        method = GET,
        path = "/health",
        tags = ["system"],
    }]
    async fn health(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<HealthResponse>, HttpError>;
}
