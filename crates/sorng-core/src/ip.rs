// ── IP classification & local-host detection ─────────────────────────────────

use crate::addr::LOCALHOST;
use log::debug;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IpFamily {
    V4,
    V6,
}

/// A local network interface carrying a non-loopback IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalInterface {
    pub name: String,
    pub ip: Ipv4Addr,
}

pub fn is_ipv4(s: &str) -> bool {
    s.parse::<Ipv4Addr>().is_ok()
}

pub fn is_ipv6(s: &str) -> bool {
    s.parse::<Ipv6Addr>().is_ok()
}

pub fn classify_ip(s: &str) -> Option<IpFamily> {
    match s.parse::<IpAddr>().ok()? {
        IpAddr::V4(_) => Some(IpFamily::V4),
        IpAddr::V6(_) => Some(IpFamily::V6),
    }
}

/// IPv4 form of `ip`, or `None` for loopback and non-mappable IPv6 addresses.
pub fn v4_address(ip: IpAddr) -> Option<Ipv4Addr> {
    if ip.is_loopback() {
        return None;
    }
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

/// Interfaces that currently carry a non-loopback IPv4 address.
pub fn up_ipv4_interfaces() -> std::io::Result<Vec<LocalInterface>> {
    let interfaces = get_if_addrs::get_if_addrs()?;
    Ok(interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| {
            v4_address(iface.ip()).map(|ip| LocalInterface {
                name: iface.name,
                ip,
            })
        })
        .collect())
}

/// Whether `host` refers to this machine.
///
/// `localhost` and loopback literals are always local. Any other literal is
/// local when one of the machine's interfaces carries it. Hosts that are not
/// IP literals, and interface enumeration failures, count as remote.
pub fn is_local_ip(host: &str) -> bool {
    if host == LOCALHOST {
        return true;
    }
    let ip = match host.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(_) => return false,
    };
    if ip.is_loopback() {
        return true;
    }
    match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces.iter().any(|iface| iface.ip() == ip),
        Err(e) => {
            debug!("interface enumeration failed while checking {}: {}", host, e);
            false
        }
    }
}
