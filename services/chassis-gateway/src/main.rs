// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Chassis Gateway Service
//!
//! Serves chassis status reads and power control commands for the targets
//! named in its configuration. Configuration comes from a TOML file when
//! `--config` is given, otherwise from `CHASSIS_TARGET_*` variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dropshot::{ConfigDropshot, ConfigLogging, ConfigLoggingLevel, HttpServerStarter};
use tracing::info;

use chassis_gateway::ChassisGatewayImpl;
use chassis_gateway::config::GatewayConfig;
use chassis_gateway::context::ApiContext;

/// Control requests carry a single small JSON object.
const DEFAULT_BODY_MAX_BYTES: usize = 64 * 1024;

#[derive(Parser)]
#[command(name = "chassis-gateway")]
#[command(about = "Chassis power-control gateway", long_about = None)]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long, env = "CHASSIS_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Server bind address, overriding the configuration
    #[arg(long, env = "BIND_ADDRESS")]
    bind_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "chassis_gateway=info,dropshot=info".to_string()),
        ))
        .init();

    let mut config = GatewayConfig::load(args.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    if let Some(bind_address) = args.bind_address {
        config.bind_address = bind_address;
    }
    let bind_address = config.bind_address;

    let api_context = ApiContext::from_config(config);

    let api = chassis_api::chassis_api_mod::api_description::<ChassisGatewayImpl>()
        .map_err(|e| anyhow::anyhow!("Failed to create API description: {}", e))?;

    let config_dropshot = ConfigDropshot {
        bind_address,
        default_request_body_max_bytes: DEFAULT_BODY_MAX_BYTES,
        default_handler_task_mode: dropshot::HandlerTaskMode::Detached,
        ..Default::default()
    };

    let config_logging = ConfigLogging::StderrTerminal {
        level: ConfigLoggingLevel::Info,
    };

    let log = config_logging
        .to_logger("chassis-gateway")
        .map_err(|error| anyhow::anyhow!("failed to create logger: {}", error))?;

    let server = HttpServerStarter::new(&config_dropshot, api, api_context, &log)
        .map_err(|error| anyhow::anyhow!("failed to create server: {}", error))?
        .start();

    info!("Chassis gateway running on http://{}", server.local_addr());

    server
        .await
        .map_err(|error| anyhow::anyhow!("server failed: {}", error))
}
