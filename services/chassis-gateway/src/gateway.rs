// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Command dispatch
//!
//! Each operation runs strictly in order: registry lookup, session open,
//! one command, session close. Requests share nothing but the registry.

use std::sync::Arc;

use chassis_api::{ChassisControlCommand, ChassisControlResponse, GetChassisStatusResponse};
use tracing::{info, warn};

use crate::bmc::{ChassisStatus, Dialer, PrivilegeLevel};
use crate::broker::SessionBroker;
use crate::commands;
use crate::error::GatewayError;
use crate::registry::{Target, TargetRegistry};

/// Privilege requested for status reads
pub const STATUS_PRIVILEGE: PrivilegeLevel = PrivilegeLevel::User;

/// Privilege requested for control commands
pub const CONTROL_PRIVILEGE: PrivilegeLevel = PrivilegeLevel::Administrator;

/// Resolves targets and runs one command per request against them
#[derive(Clone)]
pub struct ChassisGateway {
    registry: Arc<TargetRegistry>,
    broker: SessionBroker,
}

impl ChassisGateway {
    pub fn new(registry: Arc<TargetRegistry>, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            registry,
            broker: SessionBroker::new(dialer),
        }
    }

    fn lookup(&self, name: &str) -> Result<&Target, GatewayError> {
        self.registry
            .lookup(name)
            .ok_or_else(|| GatewayError::TargetNotFound(name.to_string()))
    }

    /// Read the chassis status of `target`
    pub async fn get_chassis_status(
        &self,
        target: &str,
    ) -> Result<GetChassisStatusResponse, GatewayError> {
        let target = self.lookup(target)?;

        let status = self
            .broker
            .with_session(target, STATUS_PRIVILEGE, |session| {
                Box::pin(session.get_chassis_status())
            })
            .await?
            .map_err(|e| {
                warn!(target_name = %target.name, error = %e, "command failed");
                GatewayError::StatusRead(e)
            })?;

        Ok(status_response(&target.name, status))
    }

    /// Issue the command named `command` to the chassis of `target`.
    ///
    /// The target is resolved first, so an unknown target is reported as
    /// such whatever the command. The command is validated before any
    /// session is opened.
    pub async fn issue_chassis_control_command(
        &self,
        target: &str,
        command: &str,
    ) -> Result<ChassisControlResponse, GatewayError> {
        let target = self.lookup(target)?;
        let (command, control) = command
            .parse::<ChassisControlCommand>()
            .ok()
            .and_then(|command| commands::translate(command).map(|control| (command, control)))
            .ok_or_else(|| {
                warn!(target_name = %target.name, command = %command, "invalid command");
                GatewayError::InvalidCommand(command.to_string())
            })?;

        self.broker
            .with_session(target, CONTROL_PRIVILEGE, move |session| {
                Box::pin(session.chassis_control(control))
            })
            .await?
            .map_err(|e| {
                warn!(
                    target_name = %target.name,
                    command = %command,
                    error = %e,
                    "chassis control failed"
                );
                GatewayError::ControlFailed(e)
            })?;

        info!(target_name = %target.name, command = %command, "chassis control issued");

        Ok(ChassisControlResponse {
            target: target.name.clone(),
        })
    }
}

fn status_response(target: &str, status: ChassisStatus) -> GetChassisStatusResponse {
    GetChassisStatusResponse {
        target: target.to_string(),
        powered_on: status.powered_on,
        power_control_fault: status.power_control_fault,
        power_fault: status.power_fault,
        power_overload: status.power_overload,
        powered_on_by_controller: status.powered_on_by_controller,
        last_power_down_fault: status.last_power_down_fault,
        last_power_down_interlock: status.last_power_down_interlock,
        last_power_down_overload: status.last_power_down_overload,
        last_power_down_supply_failure: status.last_power_down_supply_failure,
        reset_button_disabled: status.reset_button_disabled,
        power_off_button_disabled: status.power_off_button_disabled,
    }
}
