// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! API context for the chassis gateway

use std::sync::Arc;

use tracing::info;

use crate::bmc::Dialer;
use crate::config::{Backend, GatewayConfig};
use crate::gateway::ChassisGateway;
use crate::ipmitool::IpmitoolDialer;
use crate::registry::TargetRegistry;
use crate::stub::{StubController, StubDialer};

/// API context shared across all request handlers
pub struct ApiContext {
    gateway: ChassisGateway,
}

impl ApiContext {
    pub fn new(gateway: ChassisGateway) -> Self {
        Self { gateway }
    }

    /// Build the registry and the configured backend
    pub fn from_config(config: GatewayConfig) -> Self {
        let dialer: Arc<dyn Dialer> = match config.backend {
            Backend::Ipmitool => {
                info!(
                    path = %config.ipmitool.path.display(),
                    interface = %config.ipmitool.interface,
                    "using ipmitool backend"
                );
                Arc::new(IpmitoolDialer::new(config.ipmitool.clone()))
            }
            Backend::Stub => {
                info!("using stub backend, no controller will be contacted");
                let stub = StubDialer::new();
                for target in config.targets.values() {
                    stub.add_controller(&target.address, StubController::default());
                }
                Arc::new(stub)
            }
        };

        let registry = TargetRegistry::from_config(config);
        info!(targets = ?registry.names(), "target registry loaded");

        Self::new(ChassisGateway::new(Arc::new(registry), dialer))
    }

    pub fn gateway(&self) -> &ChassisGateway {
        &self.gateway
    }
}
