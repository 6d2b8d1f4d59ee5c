//! End-to-end connectivity checks through the daemon's SOCKS port.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

const SOCKS_VERSION: u8 = 5;
const NO_AUTHENTICATION: u8 = 0;
const CONNECT: u8 = 1;
const DOMAIN_NAME: u8 = 3;
const SUCCEEDED: u8 = 0;

/// Decides whether traffic actually flows through the supervised daemon.
pub trait ConnectivityChecker: Send + Sync {
    /// Probes connectivity through the proxy listening on `socks_port`.
    fn check(&self, socks_port: u16) -> bool;
}

/// [`ConnectivityChecker`] issuing a SOCKS5 CONNECT to a known host.
#[derive(Debug, Clone)]
pub struct SocksConnectivityChecker {
    host: String,
    port: u16,
    timeout: Duration,
}

impl SocksConnectivityChecker {
    /// Checks reachability of `host:port` via the local SOCKS listener.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    fn handshake(&self, socks_port: u16) -> io::Result<bool> {
        let proxy = SocketAddr::from((Ipv4Addr::LOCALHOST, socks_port));
        let mut stream = TcpStream::connect_timeout(&proxy, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        stream.write_all(&[SOCKS_VERSION, 1, NO_AUTHENTICATION])?;
        let mut choice = [0_u8; 2];
        stream.read_exact(&mut choice)?;
        if choice != [SOCKS_VERSION, NO_AUTHENTICATION] {
            return Ok(false);
        }

        let host = self.host.as_bytes();
        let Ok(host_len) = u8::try_from(host.len()) else {
            return Ok(false);
        };
        let mut request = vec![SOCKS_VERSION, CONNECT, 0, DOMAIN_NAME, host_len];
        request.extend_from_slice(host);
        request.extend_from_slice(&self.port.to_be_bytes());
        stream.write_all(&request)?;

        let mut reply = [0_u8; 2];
        stream.read_exact(&mut reply)?;
        Ok(reply == [SOCKS_VERSION, SUCCEEDED])
    }
}

impl ConnectivityChecker for SocksConnectivityChecker {
    fn check(&self, socks_port: u16) -> bool {
        let available = self.handshake(socks_port).unwrap_or_else(|error| {
            debug!(
                target: concat!(env!("CARGO_PKG_NAME"), "::connectivity"),
                socks_port,
                error = %error,
                "connectivity probe failed"
            );
            false
        });
        debug!(
            target: concat!(env!("CARGO_PKG_NAME"), "::connectivity"),
            socks_port,
            host = %self.host,
            available,
            "checked connectivity"
        );
        available
    }
}
