//! Interface set — named interfaces with a MAC and an IPv4 address.
//!
//! Immutable after startup, per spec.md §3; lookup is linear, which is fine for the
//! handful of interfaces a software router like this one carries.

use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
}

#[derive(Debug, Default, Clone)]
pub struct InterfaceSet {
    interfaces: Vec<Interface>,
}

impl InterfaceSet {
    pub fn new(interfaces: Vec<Interface>) -> Self {
        Self { interfaces }
    }

    pub fn by_name(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn by_ip(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.ip == ip)
    }

    pub fn contains_ip(&self, ip: Ipv4Addr) -> bool {
        self.by_ip(ip).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InterfaceSet {
        InterfaceSet::new(vec![
            Interface { name: "eth1".into(), mac: [1; 6], ip: Ipv4Addr::new(10, 0, 1, 1) },
            Interface { name: "eth2".into(), mac: [2; 6], ip: Ipv4Addr::new(192, 168, 2, 1) },
        ])
    }

    #[test]
    fn looks_up_by_name_and_ip() {
        let set = sample();
        assert_eq!(set.by_name("eth1").unwrap().ip, Ipv4Addr::new(10, 0, 1, 1));
        assert_eq!(set.by_ip(Ipv4Addr::new(192, 168, 2, 1)).unwrap().name, "eth2");
        assert!(set.by_name("eth3").is_none());
        assert!(!set.contains_ip(Ipv4Addr::new(8, 8, 8, 8)));
    }
}
