//! NAT mapping table, per spec.md §3 / §4.5 and
//! `examples/original_source/sr_nat.h`.
//!
//! `insert_mapping` does all of its free-port scanning and uniqueness checks while
//! already holding the table's lock, rather than calling back into `lookup_*` — this
//! is the spec.md §9 resolution for the original's reentrant-mutex habit: a single
//! non-recursive `std::sync::Mutex` plus one self-contained critical section.

use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const EXTERNAL_PORT_MIN: u16 = 50000;
pub const EXTERNAL_PORT_MAX: u16 = 59999;
const EXTERNAL_PORT_WINDOW: u32 = (EXTERNAL_PORT_MAX - EXTERNAL_PORT_MIN) as u32 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NatMappingType {
    Icmp,
    Tcp,
}

/// Per-flow TCP bookkeeping. Declared but left opaque in this revision — see
/// spec.md §9's open question on the connection sub-state; nothing currently
/// populates or reads `established`, so every TCP mapping is timed out with
/// [`NatTable::sweep_once`]'s transitory timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatConnection {
    pub remote_ip: Ipv4Addr,
    pub remote_port: u16,
    pub established: bool,
}

#[derive(Debug, Clone)]
pub struct NatMapping {
    pub mapping_type: NatMappingType,
    pub ip_int: Ipv4Addr,
    pub ip_ext: Ipv4Addr,
    pub aux_int: u16,
    pub aux_ext: u16,
    pub last_updated: Instant,
    pub connections: Vec<NatConnection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatTimeouts {
    pub icmp: Duration,
    pub tcp_transitory: Duration,
    pub tcp_established: Duration,
}

impl Default for NatTimeouts {
    fn default() -> Self {
        Self {
            icmp: Duration::from_secs(60),
            tcp_transitory: Duration::from_secs(6 * 60),
            tcp_established: Duration::from_secs(2 * 60 * 60 + 4 * 60),
        }
    }
}

/// Returned by [`NatTable::insert_mapping`] when the 10,000-port window for a type
/// is fully allocated, per spec.md §7's NAT-exhaustion error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortsExhausted;

struct Inner {
    mappings: Vec<NatMapping>,
    next_tcp_port: u32,
    next_icmp_port: u32,
}

pub struct NatTable {
    inner: Mutex<Inner>,
    timeouts: NatTimeouts,
}

impl NatTable {
    pub fn new(timeouts: NatTimeouts) -> Self {
        Self {
            inner: Mutex::new(Inner { mappings: Vec::new(), next_tcp_port: 0, next_icmp_port: 0 }),
            timeouts,
        }
    }

    /// Returns a snapshot of the mapping keyed by `(ip_int, aux_int)` for `mapping_type`,
    /// refreshing `last_updated`.
    pub fn lookup_internal(&self, ip_int: Ipv4Addr, aux_int: u16, mapping_type: NatMappingType, now: Instant) -> Option<NatMapping> {
        let mut inner = self.inner.lock().unwrap();
        let mapping = inner
            .mappings
            .iter_mut()
            .find(|m| m.mapping_type == mapping_type && m.ip_int == ip_int && m.aux_int == aux_int)?;
        mapping.last_updated = now;
        Some(mapping.clone())
    }

    /// Returns a snapshot of the mapping keyed by `aux_ext` for `mapping_type`,
    /// refreshing `last_updated`.
    pub fn lookup_external(&self, aux_ext: u16, mapping_type: NatMappingType, now: Instant) -> Option<NatMapping> {
        let mut inner = self.inner.lock().unwrap();
        let mapping = inner.mappings.iter_mut().find(|m| m.mapping_type == mapping_type && m.aux_ext == aux_ext)?;
        mapping.last_updated = now;
        Some(mapping.clone())
    }

    /// Creates a new mapping for `(ip_int, aux_int)`, assigning a fresh `aux_ext` by
    /// round-robin from this type's counter and skipping any value already in use,
    /// per spec.md §4.5 / §9. `ip_ext` is the router's external interface address.
    pub fn insert_mapping(
        &self,
        ip_int: Ipv4Addr,
        aux_int: u16,
        mapping_type: NatMappingType,
        ip_ext: Ipv4Addr,
        now: Instant,
    ) -> Result<NatMapping, PortsExhausted> {
        let mut inner = self.inner.lock().unwrap();

        let in_use: std::collections::HashSet<u16> =
            inner.mappings.iter().filter(|m| m.mapping_type == mapping_type).map(|m| m.aux_ext).collect();

        let counter = match mapping_type {
            NatMappingType::Tcp => &mut inner.next_tcp_port,
            NatMappingType::Icmp => &mut inner.next_icmp_port,
        };

        let mut aux_ext = None;
        for _ in 0..EXTERNAL_PORT_WINDOW {
            let candidate = EXTERNAL_PORT_MIN + (*counter % EXTERNAL_PORT_WINDOW) as u16;
            *counter = (*counter + 1) % EXTERNAL_PORT_WINDOW;
            if !in_use.contains(&candidate) {
                aux_ext = Some(candidate);
                break;
            }
        }
        let aux_ext = aux_ext.ok_or(PortsExhausted)?;

        let mapping = NatMapping {
            mapping_type,
            ip_int,
            ip_ext,
            aux_int,
            aux_ext,
            last_updated: now,
            connections: Vec::new(),
        };
        inner.mappings.insert(0, mapping.clone());
        Ok(mapping)
    }

    /// Removes every mapping whose idle time has reached its type's timeout.
    /// TCP mappings always use the transitory timeout in this revision, since no
    /// connection ever flips to "established" (spec.md §9).
    pub fn sweep_once(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        let timeouts = self.timeouts;
        inner.mappings.retain(|m| {
            let timeout = match m.mapping_type {
                NatMappingType::Icmp => timeouts.icmp,
                NatMappingType::Tcp => {
                    if m.connections.iter().any(|c| c.established) {
                        timeouts.tcp_established
                    } else {
                        timeouts.tcp_transitory
                    }
                }
            };
            now.duration_since(m.last_updated) < timeout
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext() -> Ipv4Addr {
        Ipv4Addr::new(198, 51, 100, 1)
    }

    #[test]
    fn allocates_sequential_ports_per_type() {
        let table = NatTable::new(NatTimeouts::default());
        let now = Instant::now();
        let m1 = table.insert_mapping(Ipv4Addr::new(10, 0, 1, 100), 40000, NatMappingType::Tcp, ext(), now).unwrap();
        let m2 = table.insert_mapping(Ipv4Addr::new(10, 0, 1, 101), 40001, NatMappingType::Tcp, ext(), now).unwrap();
        assert_eq!(m1.aux_ext, EXTERNAL_PORT_MIN);
        assert_eq!(m2.aux_ext, EXTERNAL_PORT_MIN + 1);
    }

    #[test]
    fn internal_and_external_lookup_find_the_same_mapping() {
        let table = NatTable::new(NatTimeouts::default());
        let now = Instant::now();
        let inserted = table.insert_mapping(Ipv4Addr::new(10, 0, 1, 100), 40000, NatMappingType::Tcp, ext(), now).unwrap();

        let by_internal = table.lookup_internal(Ipv4Addr::new(10, 0, 1, 100), 40000, NatMappingType::Tcp, now).unwrap();
        let by_external = table.lookup_external(inserted.aux_ext, NatMappingType::Tcp, now).unwrap();
        assert_eq!(by_internal.aux_ext, inserted.aux_ext);
        assert_eq!(by_external.ip_int, Ipv4Addr::new(10, 0, 1, 100));
    }

    #[test]
    fn lookup_advances_last_updated() {
        let table = NatTable::new(NatTimeouts::default());
        let t0 = Instant::now();
        table.insert_mapping(Ipv4Addr::new(10, 0, 1, 100), 40000, NatMappingType::Icmp, ext(), t0).unwrap();
        let t1 = t0 + Duration::from_secs(5);
        let refreshed = table.lookup_internal(Ipv4Addr::new(10, 0, 1, 100), 40000, NatMappingType::Icmp, t1).unwrap();
        assert_eq!(refreshed.last_updated, t1);
    }

    #[test]
    fn sweep_removes_idle_icmp_mapping_after_timeout() {
        let timeouts = NatTimeouts { icmp: Duration::from_secs(10), ..NatTimeouts::default() };
        let table = NatTable::new(timeouts);
        let t0 = Instant::now();
        table.insert_mapping(Ipv4Addr::new(10, 0, 1, 100), 1, NatMappingType::Icmp, ext(), t0).unwrap();

        table.sweep_once(t0 + Duration::from_secs(5));
        assert!(table.lookup_internal(Ipv4Addr::new(10, 0, 1, 100), 1, NatMappingType::Icmp, t0 + Duration::from_secs(5)).is_some());

        table.sweep_once(t0 + Duration::from_secs(20));
        assert!(table.lookup_external(1, NatMappingType::Icmp, t0).is_none());
    }

    #[test]
    fn exhausts_when_window_is_full() {
        let table = NatTable::new(NatTimeouts::default());
        let now = Instant::now();
        for i in 0..EXTERNAL_PORT_WINDOW {
            table
                .insert_mapping(Ipv4Addr::new(10, 0, 1, 100), i as u16, NatMappingType::Icmp, ext(), now)
                .expect("window not yet full");
        }
        let result = table.insert_mapping(Ipv4Addr::new(10, 0, 1, 200), 9999, NatMappingType::Icmp, ext(), now);
        assert_eq!(result.unwrap_err(), PortsExhausted);
    }
}
