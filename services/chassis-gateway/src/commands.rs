// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Translation from API control commands to controller primitives.

use std::collections::HashMap;
use std::sync::LazyLock;

use chassis_api::ChassisControlCommand;

use crate::bmc::ChassisControl;

const COMMANDS: [(ChassisControlCommand, ChassisControl); 6] = [
    (ChassisControlCommand::Off, ChassisControl::PowerOff),
    (ChassisControlCommand::On, ChassisControl::PowerOn),
    (ChassisControlCommand::Cycle, ChassisControl::PowerCycle),
    (ChassisControlCommand::Reset, ChassisControl::HardReset),
    (
        ChassisControlCommand::DiagnosticInterrupt,
        ChassisControl::DiagnosticInterrupt,
    ),
    (ChassisControlCommand::SoftPowerOff, ChassisControl::SoftPowerOff),
];

static COMMAND_TABLE: LazyLock<HashMap<ChassisControlCommand, ChassisControl>> =
    LazyLock::new(|| HashMap::from(COMMANDS));

/// Look up the controller primitive for `command`
pub fn translate(command: ChassisControlCommand) -> Option<ChassisControl> {
    COMMAND_TABLE.get(&command).copied()
}
