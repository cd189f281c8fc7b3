// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Session broker
//!
//! Dials a target's management controller, negotiates an authenticated
//! session and hands out a [`BmcSession`] that bundles the session with its
//! transport. Every request gets its own session; nothing is pooled or
//! reused.
//!
//! Teardown always closes the session before the transport. Closing the
//! transport first can prevent a clean logout and leave a session slot
//! held on the controller.
//!
//! [`SessionBroker::with_session`] is the way request handlers use a
//! session: it opens one, runs a single operation on it and releases it on
//! every exit path, including a panic inside the operation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::bmc::{
    BmcError, ChassisControl, ChassisStatus, Dialer, PrivilegeLevel, Session, SessionOpts,
    Transport,
};
use crate::error::GatewayError;
use crate::registry::Target;

/// Opens per-request sessions to management controllers
#[derive(Clone)]
pub struct SessionBroker {
    dialer: Arc<dyn Dialer>,
}

impl SessionBroker {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self { dialer }
    }

    /// Dial `target` and negotiate a session at `privilege`.
    ///
    /// On a negotiation failure the transport is closed before the error is
    /// returned. The caller owns the returned session and must
    /// [`close`](BmcSession::close) it; prefer [`Self::with_session`].
    pub async fn open(
        &self,
        target: &Target,
        privilege: PrivilegeLevel,
    ) -> Result<BmcSession, GatewayError> {
        let transport = self.dialer.dial(&target.address).await.map_err(|e| {
            warn!(
                target_name = %target.name,
                address = %target.address,
                error = %e,
                "unable to reach management controller"
            );
            GatewayError::Unreachable(e)
        })?;

        let mut handle = BmcSession {
            target_name: target.name.clone(),
            session: None,
            transport: Some(transport),
        };

        let opts = SessionOpts {
            username: target.username.clone(),
            password: SecretString::from(target.password.expose_secret().to_string()),
            max_privilege_level: privilege,
        };

        if let Err(e) = handle.negotiate(&opts).await {
            warn!(
                target_name = %target.name,
                address = %target.address,
                privilege = %privilege,
                error = %e,
                "unable to create session"
            );
            handle.close().await;
            return Err(GatewayError::SessionNegotiation(e));
        }

        debug!(
            target_name = %target.name,
            privilege = %privilege,
            "session established"
        );
        Ok(handle)
    }

    /// Open a session, run `f` on it and close the session again.
    ///
    /// The session is closed exactly once whether `f` succeeds, fails or
    /// panics; a panic is resumed after the close completes.
    ///
    /// The workspace builds with `panic = "abort"`, so the close-on-panic
    /// path only runs under the test harness. A deployed binary aborts on
    /// a panic without closing the session.
    pub async fn with_session<T, F>(
        &self,
        target: &Target,
        privilege: PrivilegeLevel,
        f: F,
    ) -> Result<T, GatewayError>
    where
        F: for<'s> FnOnce(&'s mut BmcSession) -> BoxFuture<'s, T>,
    {
        let mut session = self.open(target, privilege).await?;
        let outcome = AssertUnwindSafe(f(&mut session)).catch_unwind().await;
        session.close().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// An authenticated session and the transport it runs on
pub struct BmcSession {
    target_name: String,
    session: Option<Box<dyn Session>>,
    transport: Option<Box<dyn Transport>>,
}

impl BmcSession {
    async fn negotiate(&mut self, opts: &SessionOpts) -> Result<(), BmcError> {
        let transport = self.transport.as_mut().ok_or(BmcError::Closed)?;
        self.session = Some(transport.new_session(opts).await?);
        Ok(())
    }

    pub async fn get_chassis_status(&mut self) -> Result<ChassisStatus, BmcError> {
        let session = self.session.as_mut().ok_or(BmcError::Closed)?;
        session.get_chassis_status().await
    }

    pub async fn chassis_control(&mut self, control: ChassisControl) -> Result<(), BmcError> {
        let session = self.session.as_mut().ok_or(BmcError::Closed)?;
        session.chassis_control(control).await
    }

    /// Close the session, then the transport. Close failures are logged.
    pub async fn close(mut self) {
        release(&self.target_name, self.session.take(), self.transport.take()).await;
    }
}

impl Drop for BmcSession {
    fn drop(&mut self) {
        let session = self.session.take();
        let transport = self.transport.take();
        if session.is_none() && transport.is_none() {
            return;
        }

        // Only reached when a request future is dropped mid-flight.
        let target_name = std::mem::take(&mut self.target_name);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(target_name = %target_name, "session dropped while open, closing in background");
                runtime.spawn(async move {
                    release(&target_name, session, transport).await;
                });
            }
            Err(_) => {
                warn!(target_name = %target_name, "session dropped outside a runtime, not closed");
            }
        }
    }
}

async fn release(
    target_name: &str,
    session: Option<Box<dyn Session>>,
    transport: Option<Box<dyn Transport>>,
) {
    if let Some(mut session) = session {
        if let Err(e) = session.close().await {
            warn!(target_name = %target_name, error = %e, "failed to close session");
        }
    }
    if let Some(mut transport) = transport {
        if let Err(e) = transport.close().await {
            warn!(target_name = %target_name, error = %e, "failed to close transport");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::stub::{StubController, StubDialer, StubEvent};

    const ADDR: &str = "10.0.0.21";

    fn target() -> Target {
        Target {
            name: "rack1".to_string(),
            address: ADDR.to_string(),
            username: "admin".to_string(),
            password: SecretString::from("password".to_string()),
        }
    }

    fn broker(stub: &StubDialer) -> SessionBroker {
        SessionBroker::new(Arc::new(stub.clone()))
    }

    #[tokio::test]
    async fn test_open_and_close_order() {
        let stub = StubDialer::new();
        stub.add_controller(ADDR, StubController::default());

        let session = broker(&stub)
            .open(&target(), PrivilegeLevel::User)
            .await
            .unwrap();
        session.close().await;

        assert_eq!(
            stub.events(),
            vec![
                StubEvent::Dial(ADDR.to_string()),
                StubEvent::NewSession(ADDR.to_string(), PrivilegeLevel::User),
                StubEvent::SessionClose(ADDR.to_string()),
                StubEvent::TransportClose(ADDR.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_dial_failure_closes_nothing() {
        let stub = StubDialer::new();
        stub.add_controller(
            ADDR,
            StubController {
                dial_error: Some("no route to host".to_string()),
                ..Default::default()
            },
        );

        let result = broker(&stub).open(&target(), PrivilegeLevel::User).await;
        assert!(matches!(result, Err(GatewayError::Unreachable(_))));
        assert_eq!(stub.events(), vec![StubEvent::Dial(ADDR.to_string())]);
    }

    #[tokio::test]
    async fn test_negotiation_failure_closes_transport_once() {
        let stub = StubDialer::new();
        stub.add_controller(
            ADDR,
            StubController {
                session_error: Some("RAKP 2 HMAC is invalid".to_string()),
                ..Default::default()
            },
        );

        let result = broker(&stub)
            .open(&target(), PrivilegeLevel::Administrator)
            .await;
        assert!(matches!(result, Err(GatewayError::SessionNegotiation(_))));
        assert_eq!(stub.transport_closes(ADDR), 1);
        assert_eq!(stub.session_closes(ADDR), 0);
    }

    #[tokio::test]
    async fn test_with_session_closes_after_operation_error() {
        let stub = StubDialer::new();
        stub.add_controller(
            ADDR,
            StubController {
                control_error: Some("command not supported".to_string()),
                ..Default::default()
            },
        );

        let result = broker(&stub)
            .with_session(&target(), PrivilegeLevel::Administrator, |session| {
                Box::pin(session.chassis_control(ChassisControl::PowerCycle))
            })
            .await
            .unwrap();
        assert!(result.is_err());

        let events = stub.events();
        assert_eq!(
            &events[events.len() - 2..],
            &[
                StubEvent::SessionClose(ADDR.to_string()),
                StubEvent::TransportClose(ADDR.to_string()),
            ]
        );
        assert_eq!(stub.session_closes(ADDR), 1);
        assert_eq!(stub.transport_closes(ADDR), 1);
    }

    #[tokio::test]
    async fn test_with_session_closes_on_panic() {
        let stub = StubDialer::new();
        stub.add_controller(ADDR, StubController::default());
        let broker = broker(&stub);

        let handle = tokio::spawn(async move {
            broker
                .with_session::<(), _>(&target(), PrivilegeLevel::User, |_session| {
                    Box::pin(async { panic!("handler bug") })
                })
                .await
        });

        let join = handle.await;
        assert!(join.expect_err("task should panic").is_panic());
        assert_eq!(stub.session_closes(ADDR), 1);
        assert_eq!(stub.transport_closes(ADDR), 1);
    }

    #[tokio::test]
    async fn test_dropped_session_is_closed_in_background() {
        let stub = StubDialer::new();
        stub.add_controller(ADDR, StubController::default());

        let session = broker(&stub)
            .open(&target(), PrivilegeLevel::User)
            .await
            .unwrap();
        drop(session);

        for _ in 0..100 {
            if stub.transport_closes(ADDR) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(stub.session_closes(ADDR), 1);
        assert_eq!(stub.transport_closes(ADDR), 1);
    }

    #[tokio::test]
    async fn test_operation_after_close_is_rejected() {
        let mut session = BmcSession {
            target_name: "rack1".to_string(),
            session: None,
            transport: None,
        };
        assert!(matches!(
            session.get_chassis_status().await,
            Err(BmcError::Closed)
        ));
    }
}
