//! Local IPv4 interface enumeration.
//!
//! Used for two things: the directed-broadcast destinations for presence,
//! and the set of our own addresses so that our own broadcasts looping
//! back on a multi-homed host are not mistaken for a peer.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};

use nix::ifaddrs::getifaddrs;

/// Limited broadcast, used when interfaces cannot be enumerated.
pub const LIMITED_BROADCAST: Ipv4Addr = Ipv4Addr::BROADCAST;

/// One IPv4 address assigned to a local interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub name: String,
    pub addr: Ipv4Addr,
    pub broadcast: Option<Ipv4Addr>,
}

/// All IPv4 interface addresses on this host.
pub fn ipv4_interfaces() -> nix::Result<Vec<InterfaceAddr>> {
    let mut out = Vec::new();
    for ifa in getifaddrs()? {
        let Some(addr) = ifa
            .address
            .as_ref()
            .and_then(|a| a.as_sockaddr_in())
            .map(|sin| *SocketAddrV4::from(*sin).ip())
        else {
            continue;
        };
        let broadcast = ifa
            .broadcast
            .as_ref()
            .and_then(|a| a.as_sockaddr_in())
            .map(|sin| *SocketAddrV4::from(*sin).ip());
        out.push(InterfaceAddr {
            name: ifa.interface_name,
            addr,
            broadcast,
        });
    }
    Ok(out)
}

/// Presence destinations: each interface's broadcast address, or the
/// limited broadcast address when none can be found.
pub fn broadcast_targets() -> Vec<Ipv4Addr> {
    let found = match ipv4_interfaces() {
        Ok(ifaces) => broadcast_addrs_of(&ifaces),
        Err(e) => {
            tracing::warn!(error = %e, "interface enumeration failed, using limited broadcast");
            Vec::new()
        }
    };
    if found.is_empty() {
        vec![LIMITED_BROADCAST]
    } else {
        found
    }
}

fn broadcast_addrs_of(ifaces: &[InterfaceAddr]) -> Vec<Ipv4Addr> {
    let mut seen = HashSet::new();
    ifaces
        .iter()
        .filter(|i| !i.addr.is_loopback())
        .filter_map(|i| i.broadcast)
        .filter(|b| seen.insert(*b))
        .collect()
}

/// Our own non-loopback IPv4 addresses.
///
/// Loopback is excluded: a datagram from 127.0.0.1 comes from another
/// instance on this host.
pub fn local_addrs() -> HashSet<IpAddr> {
    match ipv4_interfaces() {
        Ok(ifaces) => own_addrs_of(&ifaces),
        Err(e) => {
            tracing::warn!(error = %e, "interface enumeration failed, probing default route");
            probe_default_route().into_iter().collect()
        }
    }
}

fn own_addrs_of(ifaces: &[InterfaceAddr]) -> HashSet<IpAddr> {
    ifaces
        .iter()
        .filter(|i| !i.addr.is_loopback())
        .map(|i| IpAddr::V4(i.addr))
        .collect()
}

/// Address the kernel would use for outbound traffic. Connecting a UDP
/// socket sends nothing.
fn probe_default_route() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket
        .local_addr()
        .ok()
        .map(|a| a.ip())
        .filter(|ip| !ip.is_unspecified())
}
