//! Static startup configuration, loaded from a TOML file (spec.md §6 [AMBIENT]).
//!
//! Everything here is immutable after `Router::new` consumes it — the engine never
//! re-reads this file.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::engine::NatSettings;
use crate::iface::{Interface, InterfaceSet};
use crate::nat::{NatTable, NatTimeouts};
use crate::route::{Route, RoutingTable};

#[derive(Debug, Deserialize)]
pub struct RouterConfig {
    pub interface: Vec<InterfaceConfig>,
    #[serde(default)]
    pub route: Vec<RouteConfig>,
    #[serde(default)]
    pub nat: Option<NatConfig>,
}

#[derive(Debug, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub mac: String,
    pub ip: Ipv4Addr,
}

#[derive(Debug, Deserialize)]
pub struct RouteConfig {
    pub dest: Ipv4Addr,
    pub mask: Ipv4Addr,
    #[serde(default = "unspecified_ip")]
    pub gateway: Ipv4Addr,
    pub interface: String,
}

fn unspecified_ip() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

#[derive(Debug, Deserialize)]
pub struct NatConfig {
    pub external_interface: String,
    pub internal_interfaces: Vec<String>,
    #[serde(default = "default_icmp_timeout_secs")]
    pub icmp_timeout_secs: u64,
    #[serde(default = "default_tcp_transitory_timeout_secs")]
    pub tcp_transitory_timeout_secs: u64,
    #[serde(default = "default_tcp_established_timeout_secs")]
    pub tcp_established_timeout_secs: u64,
}

fn default_icmp_timeout_secs() -> u64 {
    NatTimeouts::default().icmp.as_secs()
}

fn default_tcp_transitory_timeout_secs() -> u64 {
    NatTimeouts::default().tcp_transitory.as_secs()
}

fn default_tcp_established_timeout_secs() -> u64 {
    NatTimeouts::default().tcp_established.as_secs()
}

/// Parses a colon-separated hex MAC string like `"02:00:00:00:00:01"`.
fn parse_mac(text: &str) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.split(':');
    for byte in mac.iter_mut() {
        let part = parts.next().with_context(|| format!("MAC address {text:?} has too few octets"))?;
        *byte = u8::from_str_radix(part, 16).with_context(|| format!("invalid hex octet {part:?} in MAC {text:?}"))?;
    }
    if parts.next().is_some() {
        anyhow::bail!("MAC address {text:?} has too many octets");
    }
    Ok(mac)
}

impl RouterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn interfaces(&self) -> Result<InterfaceSet> {
        let mut interfaces = Vec::with_capacity(self.interface.len());
        for iface in &self.interface {
            let mac = parse_mac(&iface.mac).with_context(|| format!("interface {:?}", iface.name))?;
            interfaces.push(Interface { name: iface.name.clone(), mac, ip: iface.ip });
        }
        Ok(InterfaceSet::new(interfaces))
    }

    pub fn routes(&self) -> RoutingTable {
        let mut table = RoutingTable::new();
        for route in &self.route {
            table.insert(Route {
                dest: route.dest,
                mask: route.mask,
                gateway: route.gateway,
                interface_name: route.interface.clone(),
            });
        }
        table
    }

    pub fn nat(&self) -> Option<(NatTable, NatSettings)> {
        let nat = self.nat.as_ref()?;
        let timeouts = NatTimeouts {
            icmp: Duration::from_secs(nat.icmp_timeout_secs),
            tcp_transitory: Duration::from_secs(nat.tcp_transitory_timeout_secs),
            tcp_established: Duration::from_secs(nat.tcp_established_timeout_secs),
        };
        let settings = NatSettings {
            external_interface: nat.external_interface.clone(),
            internal_interfaces: nat.internal_interfaces.iter().cloned().collect::<HashSet<_>>(),
        };
        Some((NatTable::new(timeouts), settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[interface]]
        name = "internal"
        mac = "02:00:00:00:00:01"
        ip = "10.0.1.1"

        [[interface]]
        name = "external"
        mac = "02:00:00:00:00:02"
        ip = "198.51.100.1"

        [[route]]
        dest = "10.0.1.0"
        mask = "255.255.255.0"
        interface = "internal"

        [[route]]
        dest = "0.0.0.0"
        mask = "0.0.0.0"
        gateway = "198.51.100.254"
        interface = "external"

        [nat]
        external_interface = "external"
        internal_interfaces = ["internal"]
    "#;

    #[test]
    fn parses_interfaces_routes_and_nat() {
        let config: RouterConfig = toml::from_str(SAMPLE).unwrap();
        let interfaces = config.interfaces().unwrap();
        assert_eq!(interfaces.by_name("internal").unwrap().mac, [0x02, 0, 0, 0, 0, 1]);

        let routes = config.routes();
        assert!(routes.lookup(Ipv4Addr::new(10, 0, 1, 50)).is_some());

        let (_, settings) = config.nat().unwrap();
        assert_eq!(settings.external_interface, "external");
        assert!(settings.internal_interfaces.contains("internal"));
    }

    #[test]
    fn rejects_malformed_mac() {
        let config = RouterConfig {
            interface: vec![InterfaceConfig { name: "eth0".into(), mac: "not-a-mac".into(), ip: Ipv4Addr::new(1, 2, 3, 4) }],
            route: Vec::new(),
            nat: None,
        };
        assert!(config.interfaces().is_err());
    }
}
