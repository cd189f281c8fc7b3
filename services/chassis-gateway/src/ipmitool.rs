// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! ipmitool-backed protocol implementation
//!
//! The wire protocol (RMCP+ over UDP) is left to the system `ipmitool`.
//! Dialing resolves the controller address, connects a UDP socket to it and
//! exchanges an ASF presence ping/pong, so a controller that does not answer
//! is reported as unreachable rather than as a session failure. Every later
//! exchange runs one `ipmitool -I lanplus` invocation against the resolved
//! address.
//!
//! The password is handed to ipmitool through `IPMI_PASSWORD` (`-E`) so it
//! never appears in the process table. Each invocation is bounded by the
//! configured timeout and killed if the request is dropped.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::UdpSocket;
use tokio::process::Command;
use tracing::debug;

use crate::bmc::{
    BmcError, ChassisControl, ChassisStatus, Dialer, PrivilegeLevel, Session, SessionOpts,
    Transport,
};
use crate::config::IpmitoolConfig;

/// RMCP port used when the address does not name one
pub const DEFAULT_RMCP_PORT: u16 = 623;

/// Tag carried by our presence pings and echoed in the pong
const PING_TAG: u8 = 0x23;

/// RMCP header (version 6, no ACK, class ASF) followed by an ASF presence
/// ping for the ASF IANA enterprise number.
const PRESENCE_PING: [u8; 12] = [
    0x06, 0x00, 0xff, 0x06, 0x00, 0x00, 0x11, 0xbe, 0x80, PING_TAG, 0x00, 0x00,
];

const ASF_PRESENCE_PONG: u8 = 0x40;

/// [`Dialer`] that drives controllers through ipmitool
pub struct IpmitoolDialer {
    config: Arc<IpmitoolConfig>,
}

impl IpmitoolDialer {
    pub fn new(config: IpmitoolConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }
}

#[async_trait]
impl Dialer for IpmitoolDialer {
    async fn dial(&self, address: &str) -> Result<Box<dyn Transport>, BmcError> {
        let (host, port) = split_address(address)?;

        let mut addrs = tokio::time::timeout(
            self.timeout(),
            tokio::net::lookup_host((host.as_str(), port)),
        )
        .await
        .map_err(|_| BmcError::Timeout(self.config.timeout_secs))?
        .map_err(|source| BmcError::Resolve {
            address: address.to_string(),
            source,
        })?;
        let remote = addrs.next().ok_or_else(|| BmcError::Resolve {
            address: address.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found"),
        })?;

        let local: SocketAddr = match remote.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;

        tokio::time::timeout(self.timeout(), presence_ping(&socket))
            .await
            .map_err(|_| BmcError::Timeout(self.config.timeout_secs))??;

        debug!(address = %address, remote = %remote, "dialed management controller");

        Ok(Box::new(IpmitoolTransport {
            remote,
            socket: Some(socket),
            config: Arc::clone(&self.config),
        }))
    }
}

struct IpmitoolTransport {
    remote: SocketAddr,
    socket: Option<UdpSocket>,
    config: Arc<IpmitoolConfig>,
}

#[async_trait]
impl Transport for IpmitoolTransport {
    async fn new_session(&mut self, opts: &SessionOpts) -> Result<Box<dyn Session>, BmcError> {
        if self.socket.is_none() {
            return Err(BmcError::Closed);
        }

        let runner = Runner {
            path: self.config.path.clone(),
            interface: self.config.interface.clone(),
            timeout_secs: self.config.timeout_secs,
            remote: self.remote,
            username: opts.username.clone(),
            password: SecretString::from(opts.password.expose_secret().to_string()),
            privilege: opts.max_privilege_level,
        };

        // Get Device ID forces the full session handshake.
        runner.run(&["mc", "info"]).await?;

        Ok(Box::new(IpmitoolSession {
            runner,
            open: true,
        }))
    }

    async fn close(&mut self) -> Result<(), BmcError> {
        self.socket = None;
        Ok(())
    }
}

/// Each ipmitool run logs in and out on its own, so closing only stops
/// further use of the session.
struct IpmitoolSession {
    runner: Runner,
    open: bool,
}

impl IpmitoolSession {
    fn runner(&self) -> Result<&Runner, BmcError> {
        if self.open {
            Ok(&self.runner)
        } else {
            Err(BmcError::Closed)
        }
    }
}

#[async_trait]
impl Session for IpmitoolSession {
    async fn get_chassis_status(&mut self) -> Result<ChassisStatus, BmcError> {
        let output = self.runner()?.run(&["chassis", "status"]).await?;
        Ok(parse_chassis_status(&output))
    }

    async fn chassis_control(&mut self, control: ChassisControl) -> Result<(), BmcError> {
        self.runner()?
            .run(&["chassis", "power", power_argument(control)])
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BmcError> {
        self.open = false;
        Ok(())
    }
}

struct Runner {
    path: PathBuf,
    interface: String,
    timeout_secs: u64,
    remote: SocketAddr,
    username: String,
    password: SecretString,
    privilege: PrivilegeLevel,
}

impl Runner {
    async fn run(&self, args: &[&str]) -> Result<String, BmcError> {
        let mut command = Command::new(&self.path);
        command
            .arg("-I")
            .arg(&self.interface)
            .arg("-H")
            .arg(self.remote.ip().to_string())
            .arg("-p")
            .arg(self.remote.port().to_string())
            .arg("-U")
            .arg(&self.username)
            .arg("-E")
            .arg("-L")
            .arg(self.privilege.as_str())
            .args(args)
            .env("IPMI_PASSWORD", self.password.expose_secret())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(remote = %self.remote, args = ?args, "running ipmitool");

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            command.output(),
        )
        .await
        .map_err(|_| BmcError::Timeout(self.timeout_secs))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BmcError::Command(if stderr.is_empty() {
                format!("ipmitool exited with {}", output.status)
            } else {
                stderr
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Send an ASF presence ping and wait for the matching pong
async fn presence_ping(socket: &UdpSocket) -> Result<(), BmcError> {
    socket.send(&PRESENCE_PING).await?;

    let mut buf = [0u8; 64];
    loop {
        let len = socket.recv(&mut buf).await?;
        if is_presence_pong(&buf[..len]) {
            return Ok(());
        }
        debug!(len, "ignoring unexpected RMCP datagram");
    }
}

fn is_presence_pong(datagram: &[u8]) -> bool {
    datagram.len() >= 12
        && datagram[0] == 0x06
        && datagram[3] == 0x06
        && datagram[8] == ASF_PRESENCE_PONG
        && datagram[9] == PING_TAG
}

/// Split `host`, `host:port`, `[v6]` or `[v6]:port` into host and port.
/// A bare IPv6 address is taken as a host without a port.
fn split_address(address: &str) -> Result<(String, u16), BmcError> {
    let invalid = || BmcError::InvalidAddress(address.to_string());
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    if let Some(rest) = trimmed.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = match tail {
            "" => DEFAULT_RMCP_PORT,
            tail => tail
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)?,
        };
        if host.is_empty() {
            return Err(invalid());
        }
        return Ok((host.to_string(), port));
    }

    match trimmed.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port.parse().map_err(|_| invalid())?;
            if host.is_empty() {
                return Err(invalid());
            }
            Ok((host.to_string(), port))
        }
        _ => Ok((trimmed.to_string(), DEFAULT_RMCP_PORT)),
    }
}

fn power_argument(control: ChassisControl) -> &'static str {
    match control {
        ChassisControl::PowerOff => "off",
        ChassisControl::PowerOn => "on",
        ChassisControl::PowerCycle => "cycle",
        ChassisControl::HardReset => "reset",
        ChassisControl::DiagnosticInterrupt => "diag",
        ChassisControl::SoftPowerOff => "soft",
    }
}

/// Parse the `Key : value` report printed by `ipmitool chassis status`.
/// Missing keys read as false.
fn parse_chassis_status(output: &str) -> ChassisStatus {
    let fields: HashMap<&str, &str> = output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect();

    let is = |key: &str, expected: &str| {
        fields
            .get(key)
            .is_some_and(|value| value.eq_ignore_ascii_case(expected))
    };
    let last_event = fields.get("Last Power Event").copied().unwrap_or_default();
    let last = |flag: &str| last_event.split_whitespace().any(|e| e == flag);

    ChassisStatus {
        powered_on: is("System Power", "on"),
        power_overload: is("Power Overload", "true"),
        power_fault: is("Main Power Fault", "true"),
        power_control_fault: is("Power Control Fault", "true"),
        last_power_down_supply_failure: last("ac-failed"),
        last_power_down_overload: last("overload"),
        last_power_down_interlock: last("interlock"),
        last_power_down_fault: last("fault"),
        powered_on_by_controller: last("command"),
        reset_button_disabled: is("Reset Button Disabled", "true"),
        power_off_button_disabled: is("Power Button Disabled", "true"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use test_case::test_case;

    const STATUS_ON: &str = "\
System Power         : on
Power Overload       : false
Power Interlock      : inactive
Main Power Fault     : false
Power Control Fault  : false
Power Restore Policy : always-off
Last Power Event     : command
Chassis Intrusion    : inactive
Front-Panel Lockout  : inactive
Drive Fault          : false
Cooling/Fan Fault    : false
Sleep Button Disable : not allowed
Diag Button Disable  : allowed
Reset Button Disable : allowed
Power Button Disable : allowed
Sleep Button Disabled: false
Diag Button Disabled : false
Reset Button Disabled: true
Power Button Disabled: false
";

    const STATUS_FAULTED: &str = "\
System Power         : off
Power Overload       : true
Power Interlock      : inactive
Main Power Fault     : true
Power Control Fault  : true
Power Restore Policy : previous
Last Power Event     : ac-failed overload fault
";

    #[test]
    fn test_parse_powered_on() {
        let status = parse_chassis_status(STATUS_ON);
        assert_eq!(
            status,
            ChassisStatus {
                powered_on: true,
                powered_on_by_controller: true,
                reset_button_disabled: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_parse_faulted() {
        let status = parse_chassis_status(STATUS_FAULTED);
        assert!(!status.powered_on);
        assert!(status.power_overload);
        assert!(status.power_fault);
        assert!(status.power_control_fault);
        assert!(status.last_power_down_supply_failure);
        assert!(status.last_power_down_overload);
        assert!(status.last_power_down_fault);
        assert!(!status.last_power_down_interlock);
        assert!(!status.powered_on_by_controller);
        assert!(!status.power_off_button_disabled);
    }

    #[test]
    fn test_parse_empty_output() {
        assert_eq!(parse_chassis_status(""), ChassisStatus::default());
    }

    #[test_case("10.0.0.21", "10.0.0.21", 623; "bare host")]
    #[test_case("bmc.example.com:6230", "bmc.example.com", 6230; "host and port")]
    #[test_case("[fe80::1]:6230", "fe80::1", 6230; "bracketed v6 with port")]
    #[test_case("[fe80::1]", "fe80::1", 623; "bracketed v6")]
    #[test_case("fe80::1", "fe80::1", 623; "bare v6")]
    fn test_split_address(address: &str, host: &str, port: u16) {
        assert_eq!(split_address(address).unwrap(), (host.to_string(), port));
    }

    #[test_case(""; "empty")]
    #[test_case("bmc:notaport"; "bad port")]
    #[test_case(":623"; "missing host")]
    #[test_case("[fe80::1"; "unclosed bracket")]
    #[test_case("[]:623"; "empty bracket")]
    fn test_split_address_invalid(address: &str) {
        assert!(matches!(
            split_address(address),
            Err(BmcError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_power_arguments() {
        assert_eq!(power_argument(ChassisControl::PowerCycle), "cycle");
        assert_eq!(power_argument(ChassisControl::HardReset), "reset");
        assert_eq!(power_argument(ChassisControl::DiagnosticInterrupt), "diag");
        assert_eq!(power_argument(ChassisControl::SoftPowerOff), "soft");
    }

    /// Answer presence pings on a loopback port until the test ends
    async fn spawn_responder() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                if len < 12 || buf[8] != 0x80 {
                    continue;
                }
                let mut pong = [0u8; 28];
                pong[..8].copy_from_slice(&buf[..8]);
                pong[8] = ASF_PRESENCE_PONG;
                pong[9] = buf[9];
                pong[11] = 0x10;
                let _ = socket.send_to(&pong, peer).await;
            }
        });
        addr
    }

    #[test]
    fn test_presence_pong_recognized() {
        let mut pong = PRESENCE_PING;
        pong[8] = ASF_PRESENCE_PONG;
        assert!(is_presence_pong(&pong));
        assert!(!is_presence_pong(&PRESENCE_PING));
        assert!(!is_presence_pong(&pong[..8]));

        pong[9] = PING_TAG.wrapping_add(1);
        assert!(!is_presence_pong(&pong));
    }

    #[tokio::test]
    async fn test_dial_answers_presence_ping() {
        let addr = spawn_responder().await;
        let dialer = IpmitoolDialer::new(IpmitoolConfig::default());
        let mut transport = dialer.dial(&addr.to_string()).await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_silent_controller_fails() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let dialer = IpmitoolDialer::new(IpmitoolConfig {
            timeout_secs: 1,
            ..Default::default()
        });
        let result = dialer.dial(&addr.to_string()).await;
        assert!(matches!(result, Err(BmcError::Timeout(1))));
    }

    #[tokio::test]
    async fn test_dial_invalid_address() {
        let dialer = IpmitoolDialer::new(IpmitoolConfig::default());
        let result = dialer.dial("bmc:notaport").await;
        assert!(matches!(result, Err(BmcError::InvalidAddress(_))));
    }

    /// Runs the whole dial/session/command cycle against a script that
    /// stands in for ipmitool.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_against_fake_ipmitool() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ipmitool");
        let body = format!(
            "#!/bin/sh\n\
             case \"$*\" in\n\
             *\"mc info\"*)\n\
               [ \"$IPMI_PASSWORD\" = \"good\" ] || {{ echo \"Error: Unable to establish IPMI v2 / RMCP+ session\" >&2; exit 1; }}\n\
               echo \"Device ID : 32\" ;;\n\
             *\"chassis status\"*)\n\
               cat <<'EOF'\n{}EOF\n\
               ;;\n\
             *\"-L ADMINISTRATOR chassis power cycle\"*)\n\
               echo \"Chassis Power Control: Cycle\" ;;\n\
             *)\n\
               echo \"Set Chassis Power Control to Reset failed: Command not supported in present state\" >&2\n\
               exit 1 ;;\n\
             esac\n",
            STATUS_ON
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let dialer = IpmitoolDialer::new(IpmitoolConfig {
            path: script,
            ..Default::default()
        });
        let opts = |password: &str| SessionOpts {
            username: "admin".to_string(),
            password: SecretString::from(password.to_string()),
            max_privilege_level: PrivilegeLevel::Administrator,
        };

        let controller = spawn_responder().await;
        let mut transport = dialer.dial(&controller.to_string()).await.unwrap();

        let err = transport.new_session(&opts("bad")).await.err().unwrap();
        assert_eq!(
            err.to_string(),
            "Error: Unable to establish IPMI v2 / RMCP+ session"
        );

        let mut session = transport.new_session(&opts("good")).await.unwrap();
        let status = session.get_chassis_status().await.unwrap();
        assert!(status.powered_on);
        assert!(status.reset_button_disabled);

        session
            .chassis_control(ChassisControl::PowerCycle)
            .await
            .unwrap();
        let err = session
            .chassis_control(ChassisControl::HardReset)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Set Chassis Power Control to Reset failed: Command not supported in present state"
        );

        session.close().await.unwrap();
        assert!(matches!(
            session.get_chassis_status().await,
            Err(BmcError::Closed)
        ));
        transport.close().await.unwrap();
        assert!(matches!(
            transport.new_session(&opts("good")).await,
            Err(BmcError::Closed)
        ));
    }
}
