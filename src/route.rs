//! Routing table — an insertion-ordered, read-mostly sequence of routes with
//! longest-prefix-match lookup. Grounded in `networkGetPacketRoute` /
//! `networkGetMaskLength` from `examples/original_source/sr_router.c`: scan every
//! route, keep the running best match, and only replace it on a *strictly longer*
//! mask — which is what makes the first-inserted route win tie-length matches.

use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub dest: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub interface_name: String,
}

#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

fn to_bits(ip: Ipv4Addr) -> u32 {
    u32::from_be_bytes(ip.octets())
}

/// Number of leading one-bits in a mask, e.g. 255.255.0.0 -> 16.
fn mask_len(mask: Ipv4Addr) -> u32 {
    to_bits(mask).leading_ones()
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route. Insertion order matters: it is the tiebreaker for
    /// equal-length mask matches in `lookup`.
    pub fn insert(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Returns the route with the longest mask whose network matches `dst`, or
    /// `None` if the table is empty or nothing matches. Ties go to whichever
    /// matching route was inserted first.
    pub fn lookup(&self, dst: Ipv4Addr) -> Option<&Route> {
        let dst_bits = to_bits(dst);
        let mut best: Option<&Route> = None;
        let mut best_len = -1i64;

        for route in &self.routes {
            let len = mask_len(route.mask) as i64;
            if len > best_len {
                let mask_bits = to_bits(route.mask);
                if (dst_bits & mask_bits) == (to_bits(route.dest) & mask_bits) {
                    best = Some(route);
                    best_len = len;
                }
            }
        }

        best
    }

    /// Looks up the route whose egress interface is `interface_name`, used by the
    /// link-layer sender to find the next-hop gateway for a given interface
    /// (spec.md §4.3).
    pub fn gateway_for_interface(&self, interface_name: &str) -> Option<Ipv4Addr> {
        self.routes.iter().find(|r| r.interface_name == interface_name).map(|r| r.gateway)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(dest: &str, mask: &str, gw: &str, iface: &str) -> Route {
        Route {
            dest: dest.parse().unwrap(),
            mask: mask.parse().unwrap(),
            gateway: gw.parse().unwrap(),
            interface_name: iface.into(),
        }
    }

    fn sample_table() -> RoutingTable {
        let mut table = RoutingTable::new();
        table.insert(route("0.0.0.0", "0.0.0.0", "0.0.0.0", "ifA"));
        table.insert(route("10.0.0.0", "255.0.0.0", "0.0.0.0", "ifB"));
        table.insert(route("10.1.0.0", "255.255.0.0", "0.0.0.0", "ifC"));
        table
    }

    #[test]
    fn longest_prefix_wins() {
        let table = sample_table();
        assert_eq!(table.lookup("10.1.2.3".parse().unwrap()).unwrap().interface_name, "ifC");
        assert_eq!(table.lookup("10.2.0.1".parse().unwrap()).unwrap().interface_name, "ifB");
        assert_eq!(table.lookup("8.8.8.8".parse().unwrap()).unwrap().interface_name, "ifA");
    }

    #[test]
    fn empty_table_returns_none() {
        let table = RoutingTable::new();
        assert!(table.lookup("1.2.3.4".parse().unwrap()).is_none());
    }

    #[test]
    fn ties_prefer_first_inserted() {
        let mut table = RoutingTable::new();
        table.insert(route("10.0.0.0", "255.255.255.0", "0.0.0.0", "first"));
        table.insert(route("10.0.0.0", "255.255.255.0", "0.0.0.0", "second"));
        assert_eq!(table.lookup("10.0.0.5".parse().unwrap()).unwrap().interface_name, "first");
    }

    #[test]
    fn lookup_is_stable_across_repeated_calls() {
        let table = sample_table();
        let dst = "10.1.2.3".parse().unwrap();
        let first = table.lookup(dst).cloned();
        let second = table.lookup(dst).cloned();
        assert_eq!(first, second);
    }
}
