//! Host network reachability.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use tracing::debug;

/// Reports whether the host's own network is usable.
///
/// Used to tell a broken daemon apart from a host that is simply offline.
pub trait NetworkReachability: Send + Sync {
    /// True when an outbound route exists.
    fn is_network_available(&self) -> bool;
}

/// Address used for the route lookup; nothing is ever sent to it.
const ROUTE_PROBE: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
    53,
);

/// [`NetworkReachability`] based on the kernel's routing table.
///
/// Connecting a UDP socket performs a route lookup without emitting traffic,
/// so it fails fast when no interface can reach the probe address.
#[derive(Debug, Clone, Copy)]
pub struct RouteReachability {
    probe: SocketAddr,
}

impl Default for RouteReachability {
    fn default() -> Self {
        Self { probe: ROUTE_PROBE }
    }
}

impl RouteReachability {
    /// Checks for a route towards `probe` instead of the default address.
    #[must_use]
    pub const fn towards(probe: SocketAddr) -> Self {
        Self { probe }
    }
}

impl NetworkReachability for RouteReachability {
    fn is_network_available(&self) -> bool {
        let available = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .and_then(|socket| socket.connect(self.probe))
            .is_ok();
        debug!(
            target: concat!(env!("CARGO_PKG_NAME"), "::network"),
            probe = %self.probe,
            available,
            "checked network route"
        );
        available
    }
}
