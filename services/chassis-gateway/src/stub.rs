// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! In-memory stub management controllers
//!
//! Backs the gateway with simulated controllers so it can be exercised
//! without hardware:
//!
//! - Integration and unit tests, which inject failures per controller and
//!   inspect the recorded protocol calls
//! - Local development with `backend = "stub"`
//!
//! Every dial, session negotiation, command and close is appended to a
//! shared event log in the order it happened. Power commands update the
//! simulated power state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::bmc::{
    BmcError, ChassisControl, ChassisStatus, Dialer, PrivilegeLevel, Session, SessionOpts,
    Transport,
};

/// A protocol call observed by the stub, tagged with the controller address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubEvent {
    Dial(String),
    NewSession(String, PrivilegeLevel),
    GetStatus(String),
    Control(String, ChassisControl),
    SessionClose(String),
    TransportClose(String),
}

/// Behaviour of one simulated controller
#[derive(Debug, Clone, Default)]
pub struct StubController {
    pub status: ChassisStatus,
    /// Required `(username, password)`; any credentials are accepted if unset
    pub credentials: Option<(String, String)>,
    pub dial_error: Option<String>,
    pub session_error: Option<String>,
    pub status_error: Option<String>,
    pub control_error: Option<String>,
}

#[derive(Debug, Default)]
struct StubState {
    controllers: HashMap<String, StubController>,
    events: Vec<StubEvent>,
}

/// [`Dialer`] backed by in-memory controllers keyed by address
#[derive(Debug, Clone, Default)]
pub struct StubDialer {
    state: Arc<Mutex<StubState>>,
}

impl StubDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the controller answering at `address`
    pub fn add_controller(&self, address: &str, controller: StubController) {
        self.lock()
            .controllers
            .insert(address.to_string(), controller);
    }

    /// Current simulated status of the controller at `address`
    pub fn status(&self, address: &str) -> Option<ChassisStatus> {
        self.lock().controllers.get(address).map(|c| c.status)
    }

    /// All recorded protocol calls, oldest first
    pub fn events(&self) -> Vec<StubEvent> {
        self.lock().events.clone()
    }

    pub fn dials(&self) -> usize {
        self.count(|e| matches!(e, StubEvent::Dial(_)))
    }

    pub fn session_closes(&self, address: &str) -> usize {
        self.count(|e| matches!(e, StubEvent::SessionClose(a) if a == address))
    }

    pub fn transport_closes(&self, address: &str) -> usize {
        self.count(|e| matches!(e, StubEvent::TransportClose(a) if a == address))
    }

    /// Control primitives issued to `address`, in order
    pub fn controls(&self, address: &str) -> Vec<ChassisControl> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                StubEvent::Control(a, control) if a == address => Some(*control),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&StubEvent) -> bool) -> usize {
        self.lock().events.iter().filter(|e| predicate(e)).count()
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<StubState>) -> MutexGuard<'_, StubState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Dialer for StubDialer {
    async fn dial(&self, address: &str) -> Result<Box<dyn Transport>, BmcError> {
        let mut state = self.lock();
        state.events.push(StubEvent::Dial(address.to_string()));

        let refused = |msg: String| {
            BmcError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                msg,
            ))
        };
        match state.controllers.get(address) {
            None => Err(refused(format!("no controller at {}", address))),
            Some(StubController {
                dial_error: Some(msg),
                ..
            }) => Err(refused(msg.clone())),
            Some(_) => Ok(Box::new(StubTransport {
                address: address.to_string(),
                state: Arc::clone(&self.state),
            })),
        }
    }
}

struct StubTransport {
    address: String,
    state: Arc<Mutex<StubState>>,
}

#[async_trait]
impl Transport for StubTransport {
    async fn new_session(&mut self, opts: &SessionOpts) -> Result<Box<dyn Session>, BmcError> {
        let mut state = lock(&self.state);
        state.events.push(StubEvent::NewSession(
            self.address.clone(),
            opts.max_privilege_level,
        ));

        let controller = state
            .controllers
            .get(&self.address)
            .ok_or(BmcError::Closed)?;
        if let Some(msg) = &controller.session_error {
            return Err(BmcError::Command(msg.clone()));
        }
        if let Some((username, password)) = &controller.credentials {
            if *username != opts.username || password.as_str() != opts.password.expose_secret() {
                return Err(BmcError::Command("authentication failed".to_string()));
            }
        }

        Ok(Box::new(StubSession {
            address: self.address.clone(),
            privilege: opts.max_privilege_level,
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&mut self) -> Result<(), BmcError> {
        lock(&self.state)
            .events
            .push(StubEvent::TransportClose(self.address.clone()));
        Ok(())
    }
}

struct StubSession {
    address: String,
    privilege: PrivilegeLevel,
    state: Arc<Mutex<StubState>>,
}

#[async_trait]
impl Session for StubSession {
    async fn get_chassis_status(&mut self) -> Result<ChassisStatus, BmcError> {
        let mut state = lock(&self.state);
        state
            .events
            .push(StubEvent::GetStatus(self.address.clone()));

        let controller = state
            .controllers
            .get(&self.address)
            .ok_or(BmcError::Closed)?;
        match &controller.status_error {
            Some(msg) => Err(BmcError::Command(msg.clone())),
            None => Ok(controller.status),
        }
    }

    async fn chassis_control(&mut self, control: ChassisControl) -> Result<(), BmcError> {
        let mut state = lock(&self.state);
        state
            .events
            .push(StubEvent::Control(self.address.clone(), control));

        let controller = state
            .controllers
            .get_mut(&self.address)
            .ok_or(BmcError::Closed)?;
        if let Some(msg) = &controller.control_error {
            return Err(BmcError::Command(msg.clone()));
        }
        if self.privilege < PrivilegeLevel::Operator {
            return Err(BmcError::Command(
                "insufficient privilege level".to_string(),
            ));
        }

        let status = &mut controller.status;
        match control {
            ChassisControl::PowerOff | ChassisControl::SoftPowerOff => {
                status.powered_on = false;
            }
            ChassisControl::PowerOn | ChassisControl::PowerCycle => {
                status.powered_on = true;
                status.powered_on_by_controller = true;
            }
            ChassisControl::HardReset | ChassisControl::DiagnosticInterrupt => {}
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BmcError> {
        lock(&self.state)
            .events
            .push(StubEvent::SessionClose(self.address.clone()));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn opts(privilege: PrivilegeLevel) -> SessionOpts {
        SessionOpts {
            username: "admin".to_string(),
            password: SecretString::from("password".to_string()),
            max_privilege_level: privilege,
        }
    }

    #[tokio::test]
    async fn test_unknown_address_refuses_dial() {
        let stub = StubDialer::new();
        assert!(stub.dial("10.9.9.9").await.is_err());
        assert_eq!(stub.dials(), 1);
    }

    #[tokio::test]
    async fn test_power_commands_update_state() {
        let stub = StubDialer::new();
        stub.add_controller("bmc", StubController::default());

        let mut transport = stub.dial("bmc").await.unwrap();
        let mut session = transport
            .new_session(&opts(PrivilegeLevel::Administrator))
            .await
            .unwrap();

        session.chassis_control(ChassisControl::PowerOn).await.unwrap();
        assert!(session.get_chassis_status().await.unwrap().powered_on);

        session
            .chassis_control(ChassisControl::SoftPowerOff)
            .await
            .unwrap();
        assert!(!stub.status("bmc").unwrap().powered_on);
        assert_eq!(
            stub.controls("bmc"),
            vec![ChassisControl::PowerOn, ChassisControl::SoftPowerOff]
        );
    }

    #[tokio::test]
    async fn test_control_requires_operator() {
        let stub = StubDialer::new();
        stub.add_controller("bmc", StubController::default());

        let mut transport = stub.dial("bmc").await.unwrap();
        let mut session = transport
            .new_session(&opts(PrivilegeLevel::User))
            .await
            .unwrap();

        assert!(session.get_chassis_status().await.is_ok());
        assert!(session.chassis_control(ChassisControl::PowerOff).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_credentials() {
        let stub = StubDialer::new();
        stub.add_controller(
            "bmc",
            StubController {
                credentials: Some(("admin".to_string(), "other".to_string())),
                ..Default::default()
            },
        );

        let mut transport = stub.dial("bmc").await.unwrap();
        let result = transport.new_session(&opts(PrivilegeLevel::User)).await;
        assert!(matches!(result, Err(BmcError::Command(msg)) if msg == "authentication failed"));
    }
}
