//! Port availability probing.
//!
//! A port counts as free only when nothing accepts a TCP connection on
//! loopback and a UDP socket can bind it. Malformed input is reported as busy
//! so callers never launch a daemon against an unusable port.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

use tracing::debug;

const PROBE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::probe");
const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);
const ALTERNATIVES: u16 = 3;

/// Checks loopback ports and proposes alternatives.
#[derive(Debug, Clone, Copy)]
pub struct PortProbe {
    connect_timeout: Duration,
}

impl Default for PortProbe {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl PortProbe {
    /// Builds a probe that waits at most `connect_timeout` per TCP attempt.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Reports whether the textual `port` is unusable.
    ///
    /// Anything that is not a decimal number in `1..=65535` is busy.
    #[must_use]
    pub fn is_port_busy(&self, port: &str) -> bool {
        parse_port(port).is_none_or(|port| self.is_busy(port))
    }

    /// Reports whether `port` is occupied for TCP or UDP.
    #[must_use]
    pub fn is_busy(&self, port: u16) -> bool {
        if port == 0 {
            return true;
        }
        let tcp_busy = self.tcp_busy(port);
        let busy = tcp_busy || udp_busy(port);
        debug!(target: PROBE_TARGET, port, tcp_busy, busy, "probed port");
        busy
    }

    /// Returns the first free port among `base + 1 ..= base + 3`, or `base`
    /// unchanged when none is free or `base` is malformed.
    #[must_use]
    pub fn get_free_port(&self, base: &str) -> String {
        match parse_port(base) {
            Some(port) => first_free(port, |candidate| self.is_busy(candidate)).to_string(),
            None => base.to_owned(),
        }
    }

    fn tcp_busy(&self, port: u16) -> bool {
        let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match TcpStream::connect_timeout(&address, self.connect_timeout) {
            Ok(_) => true,
            Err(error) => !is_port_available(&error),
        }
    }
}

/// Scans the neighbours of `base`, returning `base` when all are taken.
pub(crate) fn first_free(base: u16, is_busy: impl Fn(u16) -> bool) -> u16 {
    (1..=ALTERNATIVES)
        .filter_map(|offset| base.checked_add(offset))
        .find(|candidate| !is_busy(*candidate))
        .unwrap_or(base)
}

fn parse_port(raw: &str) -> Option<u16> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u16>().ok().filter(|port| *port != 0)
}

fn udp_busy(port: u16) -> bool {
    UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).is_err()
}

/// Connection refusal or timeout means nothing is listening; any other
/// failure is treated as busy.
fn is_port_available(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut
    )
}
