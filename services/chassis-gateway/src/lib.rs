// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Chassis Gateway Library
//!
//! Remote chassis power control for a fixed set of named servers. Each
//! request opens its own session to the target's management controller,
//! runs one command and closes the session again.
//!
//! # Modules
//!
//! - [`bmc`] - Management controller protocol boundary (dialer, transport, session)
//! - [`broker`] - Per-request session lifecycle with guaranteed teardown
//! - [`commands`] - API command to controller primitive translation
//! - [`config`] - TOML and environment configuration
//! - [`context`] - API context for request handlers
//! - [`error`] - Error kinds and their HTTP mapping
//! - [`gateway`] - Command dispatch
//! - [`ipmitool`] - Backend driving the system `ipmitool`
//! - [`registry`] - Target name to controller lookup
//! - [`stub`] - Simulated controllers for tests and local development

pub mod bmc;
pub mod broker;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod ipmitool;
pub mod registry;
pub mod stub;

use chassis_api::{
    ChassisApi, ChassisControlRequest, ChassisControlResponse, GetChassisStatusResponse,
    HealthResponse, TargetPath,
};
use dropshot::{HttpError, HttpResponseOk, Path, RequestContext, TypedBody};

use crate::context::ApiContext;

/// Chassis Gateway API implementation
///
/// All state lives in the [`ApiContext`].
pub enum ChassisGatewayImpl {}

impl ChassisApi for ChassisGatewayImpl {
    type Context = ApiContext;

    async fn get_chassis_status(
        rqctx: RequestContext<Self::Context>,
        path: Path<TargetPath>,
    ) -> Result<HttpResponseOk<GetChassisStatusResponse>, HttpError> {
        let ctx = rqctx.context();
        let target = path.into_inner().target;

        tracing::debug!(target_name = %target, "get chassis status");

        let status = ctx.gateway().get_chassis_status(&target).await?;
        Ok(HttpResponseOk(status))
    }

    async fn issue_chassis_control_command(
        rqctx: RequestContext<Self::Context>,
        path: Path<TargetPath>,
        body: TypedBody<ChassisControlRequest>,
    ) -> Result<HttpResponseOk<ChassisControlResponse>, HttpError> {
        let ctx = rqctx.context();
        let target = path.into_inner().target;
        let command = body.into_inner().command;

        tracing::info!(target_name = %target, command = %command, "chassis control requested");

        let response = ctx
            .gateway()
            .issue_chassis_control_command(&target, &command)
            .await?;
        Ok(HttpResponseOk(response))
    }

    async fn health(
        _rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<HealthResponse>, HttpError> {
        Ok(HttpResponseOk(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }))
    }
}
