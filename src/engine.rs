//! The forwarding engine: ties interfaces, routes, the ARP table, and the optional
//! NAT table together behind a single `handle_frame` entry point, per spec.md §2's
//! `HandleFrame` control flow.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::arp_table::{ArpTable, PendingFrame, SweepAction};
use crate::driver::PacketDriver;
use crate::iface::InterfaceSet;
use crate::nat::{NatMapping, NatMappingType, NatTable, NatTimeouts, PortsExhausted};
use crate::route::RoutingTable;
use crate::wire::icmp::unreachable_code;
use crate::wire::{ArpPacket, EthernetFrame, IcmpPacket, IcmpType, Ipv4Header};
use crate::wire::{tcp, BROADCAST_MAC, ETHERTYPE_ARP, ETHERTYPE_IPV4, ICMP_DATA_SIZE, IP_PROTO_ICMP, IP_PROTO_TCP, ZERO_MAC};

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const SWEEP_POLL: Duration = Duration::from_millis(100);
const ICMP_ECHO_TTL: u8 = 64;
const NAT_ECHO_TTL: u8 = 64;

/// Which internal/external interfaces NAT translates across, per spec.md §3.
pub struct NatSettings {
    pub external_interface: String,
    pub internal_interfaces: HashSet<String>,
}

struct Shared {
    interfaces: InterfaceSet,
    routes: RoutingTable,
    arp: ArpTable,
    nat: Option<NatTable>,
    nat_settings: Option<NatSettings>,
    driver: Box<dyn PacketDriver>,
    ip_id: AtomicU16,
}

/// The router. Owns two background sweeper threads (ARP retransmit/expire, NAT idle
/// timeout) for as long as it's alive; dropping it joins them, per spec.md §5.
pub struct Router {
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    arp_sweeper: Option<JoinHandle<()>>,
    nat_sweeper: Option<JoinHandle<()>>,
}

impl Router {
    pub fn new(
        interfaces: InterfaceSet,
        routes: RoutingTable,
        nat: Option<(NatTable, NatSettings)>,
        driver: Box<dyn PacketDriver>,
    ) -> Self {
        let (nat, nat_settings) = match nat {
            Some((table, settings)) => (Some(table), Some(settings)),
            None => (None, None),
        };

        let shared = Arc::new(Shared {
            interfaces,
            routes,
            arp: ArpTable::new(),
            nat,
            nat_settings,
            driver,
            ip_id: AtomicU16::new(1),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let arp_sweeper = {
            let shared = Arc::clone(&shared);
            let shutdown = Arc::clone(&shutdown);
            Some(std::thread::spawn(move || arp_sweep_loop(shared, shutdown)))
        };
        let nat_sweeper = if shared.nat.is_some() {
            let shared = Arc::clone(&shared);
            let shutdown = Arc::clone(&shutdown);
            Some(std::thread::spawn(move || nat_sweep_loop(shared, shutdown)))
        } else {
            None
        };

        Self { shared, shutdown, arp_sweeper, nat_sweeper }
    }

    /// Single entry point for an inbound frame arriving on `interface_name`, per
    /// spec.md §2. Never panics or returns a fallible result: every malformed or
    /// unroutable packet is dropped or answered with an ICMP error here.
    pub fn handle_frame(&self, interface_name: &str, bytes: &[u8]) {
        self.shared.handle_frame(interface_name, bytes);
    }

    /// Stops both sweeper threads and waits for them to exit, discarding any frames
    /// still parked in the ARP queue, per spec.md §5.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.arp_sweeper.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.nat_sweeper.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn arp_sweep_loop(shared: Arc<Shared>, shutdown: Arc<AtomicBool>) {
    let mut last_sweep = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(SWEEP_POLL);
        let now = Instant::now();
        if now.duration_since(last_sweep) < SWEEP_INTERVAL {
            continue;
        }
        last_sweep = now;
        for action in shared.arp.sweep_once(now) {
            shared.apply_arp_sweep_action(action, now);
        }
    }
}

fn nat_sweep_loop(shared: Arc<Shared>, shutdown: Arc<AtomicBool>) {
    let mut last_sweep = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(SWEEP_POLL);
        let now = Instant::now();
        if now.duration_since(last_sweep) < SWEEP_INTERVAL {
            continue;
        }
        last_sweep = now;
        if let Some(nat) = &shared.nat {
            nat.sweep_once(now);
        }
    }
}

impl Shared {
    fn next_ip_id(&self) -> u16 {
        self.ip_id.fetch_add(1, Ordering::Relaxed)
    }

    fn apply_arp_sweep_action(&self, action: SweepAction, now: Instant) {
        match action {
            SweepAction::Retransmit { interface_name, target_ip } => {
                self.broadcast_arp_request(&interface_name, target_ip);
                self.arp.mark_first_sent(target_ip, now);
            }
            SweepAction::Exhausted { frames } => {
                for pending in frames {
                    self.fail_pending_frame(pending);
                }
            }
        }
    }

    /// A queued frame's request exhausted its retries: extract the original IP
    /// datagram it was carrying and answer it with ICMP host-unreachable, per
    /// spec.md §4.2's ARP-failure path.
    fn fail_pending_frame(&self, pending: PendingFrame) {
        let Some(eth) = EthernetFrame::parse(&pending.frame) else { return };
        self.send_icmp_error(IcmpType::DestinationUnreachable, unreachable_code::HOST, eth.payload);
    }

    fn broadcast_arp_request(&self, interface_name: &str, target_ip: Ipv4Addr) {
        let Some(iface) = self.interfaces.by_name(interface_name) else { return };
        let arp = ArpPacket::build_request(iface.mac, iface.ip.octets(), target_ip.octets());
        let frame = EthernetFrame::build(BROADCAST_MAC, iface.mac, ETHERTYPE_ARP, &arp);
        self.driver.send_frame(interface_name, &frame);
    }

    fn handle_frame(&self, interface_name: &str, bytes: &[u8]) {
        let Some(ingress) = self.interfaces.by_name(interface_name) else {
            debug!(interface_name, "frame on unknown interface, dropping");
            return;
        };

        let Some(eth) = EthernetFrame::parse(bytes) else {
            debug!("frame too short to be Ethernet, dropping");
            return;
        };

        if eth.dst_mac != ingress.mac && eth.dst_mac != BROADCAST_MAC {
            debug!("frame not addressed to us, dropping");
            return;
        }

        match eth.ethertype {
            ETHERTYPE_ARP => self.handle_arp(eth.payload, ingress),
            ETHERTYPE_IPV4 => self.handle_ip(eth.payload, ingress),
            other => debug!(ethertype = other, "unsupported ethertype, dropping"),
        }
    }

    fn handle_arp(&self, payload: &[u8], ingress: &crate::iface::Interface) {
        let Some(arp) = ArpPacket::parse(payload) else {
            debug!("malformed ARP packet, dropping");
            return;
        };
        if !arp.is_supported() {
            debug!("unsupported ARP hardware/protocol combination, dropping");
            return;
        }

        let target_ip = Ipv4Addr::from(arp.target_ip);
        if target_ip != ingress.ip {
            debug!(%target_ip, "ARP packet not addressed to our interface, dropping");
            return;
        }

        match arp.operation {
            crate::wire::arp::ARP_OP_REQUEST => {
                let reply = arp.build_reply(ingress.mac, ingress.ip.octets());
                let frame = EthernetFrame::build(arp.sender_mac, ingress.mac, ETHERTYPE_ARP, &reply);
                self.driver.send_frame(&ingress.name, &frame);
            }
            crate::wire::arp::ARP_OP_REPLY => {
                let sender_ip = Ipv4Addr::from(arp.sender_ip);
                let now = Instant::now();
                let flushed = self.arp.insert(sender_ip, arp.sender_mac, now);
                for mut pending in flushed {
                    if pending.frame.len() >= crate::wire::ethernet::ETHERNET_HEADER_LEN {
                        pending.frame[0..6].copy_from_slice(&arp.sender_mac);
                    }
                    self.driver.send_frame(&pending.outbound_interface, &pending.frame);
                }
            }
            other => debug!(operation = other, "unsupported ARP operation, dropping"),
        }
    }

    fn handle_ip(&self, ip_bytes: &[u8], ingress: &crate::iface::Interface) {
        let now = Instant::now();
        let Some(header) = Ipv4Header::parse(ip_bytes) else {
            debug!("malformed IPv4 header, dropping");
            return;
        };

        let inbound_mapping = self.nat_inbound_mapping(&header, ingress, now);

        if self.interfaces.contains_ip(header.dst_ip) && inbound_mapping.is_none() {
            self.handle_local(&header, ip_bytes, ingress);
        } else {
            self.forward(&header, ip_bytes, ingress, inbound_mapping, now);
        }
    }

    /// Returns the external NAT mapping this packet matches, if NAT is enabled, the
    /// packet arrived on the external interface addressed to it, and a matching
    /// mapping already exists. A non-match here is not itself a drop: it simply
    /// falls through to ordinary local/forward classification, which for anything
    /// other than ICMP-to-us naturally yields port-unreachable.
    fn nat_inbound_mapping(&self, header: &Ipv4Header, ingress: &crate::iface::Interface, now: Instant) -> Option<NatMapping> {
        let nat = self.nat.as_ref()?;
        let settings = self.nat_settings.as_ref()?;
        if ingress.name != settings.external_interface {
            return None;
        }
        if header.dst_ip != ingress.ip {
            return None;
        }

        let (mapping_type, aux_ext) = match header.protocol {
            IP_PROTO_ICMP => {
                let icmp = IcmpPacket::parse(header.payload)?;
                (NatMappingType::Icmp, icmp.identifier)
            }
            IP_PROTO_TCP => (NatMappingType::Tcp, tcp::dst_port(header.payload)?),
            _ => return None,
        };

        nat.lookup_external(aux_ext, mapping_type, now)
    }

    fn handle_local(&self, header: &Ipv4Header, ip_bytes: &[u8], ingress: &crate::iface::Interface) {
        if header.protocol != IP_PROTO_ICMP {
            debug!(protocol = header.protocol, "non-ICMP packet addressed to us, replying port-unreachable");
            self.send_icmp_error(IcmpType::DestinationUnreachable, unreachable_code::PORT, ip_bytes);
            return;
        }

        if !IcmpPacket::checksum_is_valid(header.payload) {
            debug!("bad ICMP checksum, dropping");
            return;
        }
        let Some(icmp) = IcmpPacket::parse(header.payload) else {
            debug!("malformed ICMP message, dropping");
            return;
        };

        if icmp.icmp_type != IcmpType::EchoRequest {
            debug!("non-echo ICMP addressed to us, ignoring");
            return;
        }

        let reply_icmp = IcmpPacket::build_echo(IcmpType::EchoReply, icmp.identifier, icmp.sequence, icmp.payload);
        let reply_ip = Ipv4Header::build(header.dst_ip, header.src_ip, IP_PROTO_ICMP, ICMP_ECHO_TTL, self.next_ip_id(), 0, &reply_icmp);
        self.send_ip_frame(&reply_ip, &ingress.name);
    }

    /// TTL decrement, NAT translation, and routing in one pass. `ip_bytes` is the
    /// pristine as-received datagram; every ICMP error this function emits embeds
    /// that untouched slice, never the mutated working copy, per spec.md §4.4.
    fn forward(&self, header: &Ipv4Header, ip_bytes: &[u8], ingress: &crate::iface::Interface, inbound_mapping: Option<NatMapping>, now: Instant) {
        let new_ttl = header.ttl.wrapping_sub(1);
        if new_ttl == 0 {
            warn!(src = %header.src_ip, dst = %header.dst_ip, "TTL expired, replying time-exceeded");
            self.send_icmp_error(IcmpType::TimeExceeded, 0, ip_bytes);
            return;
        }

        let header_len = header.header_len();
        let mut buf = ip_bytes.to_vec();
        buf[8] = new_ttl;

        let mut translated = false;
        let mut final_dst = header.dst_ip;

        if let Some(mapping) = inbound_mapping {
            buf[16..20].copy_from_slice(&mapping.ip_int.octets());
            match header.protocol {
                IP_PROTO_ICMP => {
                    let icmp_start = header_len;
                    buf[icmp_start + 4..icmp_start + 6].copy_from_slice(&mapping.aux_int.to_be_bytes());
                }
                IP_PROTO_TCP => {
                    tcp::set_dst_port(&mut buf[header_len..], mapping.aux_int);
                }
                _ => {}
            }
            final_dst = mapping.ip_int;
            translated = true;
        } else if self.nat.is_some() && self.is_internal_interface(&ingress.name) && matches!(header.protocol, IP_PROTO_ICMP | IP_PROTO_TCP) {
            match self.nat_outbound_translate(header, &mut buf, header_len, now) {
                Ok(()) => translated = true,
                Err(NatOutboundError::Exhausted) => {
                    warn!(src = %header.src_ip, "NAT port allocation exhausted, replying host-unreachable");
                    self.send_icmp_error(IcmpType::DestinationUnreachable, unreachable_code::HOST, ip_bytes);
                    return;
                }
                Err(NatOutboundError::Malformed) => {
                    debug!("packet too short for its declared protocol, dropping");
                    return;
                }
            }
        }

        if translated {
            match header.protocol {
                IP_PROTO_ICMP => {
                    let icmp_slice = &mut buf[header_len..];
                    icmp_slice[2] = 0;
                    icmp_slice[3] = 0;
                    let checksum = crate::checksum::checksum16(icmp_slice);
                    icmp_slice[2..4].copy_from_slice(&checksum.to_be_bytes());
                }
                IP_PROTO_TCP => {
                    let new_src = Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]);
                    let new_dst = Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]);
                    tcp::recompute_checksum(&mut buf[header_len..], new_src, new_dst);
                }
                _ => {}
            }
        }

        buf[10] = 0;
        buf[11] = 0;
        let ip_checksum = crate::checksum::checksum16(&buf[..header_len]);
        buf[10..12].copy_from_slice(&ip_checksum.to_be_bytes());

        let Some(route) = self.routes.lookup(final_dst) else {
            warn!(dst = %final_dst, "no route, replying host-unreachable");
            self.send_icmp_error(IcmpType::DestinationUnreachable, unreachable_code::HOST, ip_bytes);
            return;
        };
        if route.interface_name == ingress.name {
            warn!(dst = %final_dst, interface = %ingress.name, "route points back out ingress interface, replying host-unreachable");
            self.send_icmp_error(IcmpType::DestinationUnreachable, unreachable_code::HOST, ip_bytes);
            return;
        }

        self.send_ip_frame(&buf, &route.interface_name);
    }

    fn is_internal_interface(&self, interface_name: &str) -> bool {
        self.nat_settings.as_ref().is_some_and(|s| s.internal_interfaces.contains(interface_name))
    }

    /// Applies outbound (internal -> external) NAT translation to `buf` in place,
    /// looking up or creating the mapping as needed. Per spec.md §9, mapping
    /// creation is a single self-contained critical section inside
    /// `NatTable::insert_mapping` rather than a reentrant lookup-then-insert.
    fn nat_outbound_translate(&self, header: &Ipv4Header, buf: &mut [u8], header_len: usize, now: Instant) -> Result<(), NatOutboundError> {
        let nat = self.nat.as_ref().expect("checked by caller");
        let settings = self.nat_settings.as_ref().expect("checked by caller");
        let external_ip = self
            .interfaces
            .by_name(&settings.external_interface)
            .map(|i| i.ip)
            .ok_or(NatOutboundError::Malformed)?;

        let (mapping_type, aux_int) = match header.protocol {
            IP_PROTO_ICMP => {
                let icmp = IcmpPacket::parse(header.payload).ok_or(NatOutboundError::Malformed)?;
                (NatMappingType::Icmp, icmp.identifier)
            }
            IP_PROTO_TCP => (NatMappingType::Tcp, tcp::src_port(header.payload).ok_or(NatOutboundError::Malformed)?),
            _ => return Err(NatOutboundError::Malformed),
        };

        let mapping = match nat.lookup_internal(header.src_ip, aux_int, mapping_type, now) {
            Some(mapping) => mapping,
            None => nat.insert_mapping(header.src_ip, aux_int, mapping_type, external_ip, now).map_err(|PortsExhausted| NatOutboundError::Exhausted)?,
        };

        buf[12..16].copy_from_slice(&mapping.ip_ext.octets());
        match header.protocol {
            IP_PROTO_ICMP => {
                buf[header_len + 4..header_len + 6].copy_from_slice(&mapping.aux_ext.to_be_bytes());
            }
            IP_PROTO_TCP => {
                tcp::set_src_port(&mut buf[header_len..], mapping.aux_ext);
            }
            _ => {}
        }

        Ok(())
    }

    /// Builds and sends an ICMP error whose data area is a copy of `original_ip_bytes`,
    /// zero-padded or truncated to the fixed 28-byte data area spec.md §4.4 specifies.
    /// Silently drops instead of replying when the original's source is one of our
    /// own interfaces (self-addressed loop, per the original's
    /// `NetworkSendTypeThreeIcmpPacket`) or when no route exists back to it.
    fn send_icmp_error(&self, icmp_type: IcmpType, code: u8, original_ip_bytes: &[u8]) {
        let Some(header) = Ipv4Header::parse(original_ip_bytes) else { return };
        if self.interfaces.contains_ip(header.src_ip) {
            debug!("refusing to send ICMP error back to our own interface, dropping");
            return;
        }
        let Some(route) = self.routes.lookup(header.src_ip) else {
            debug!(dst = %header.src_ip, "no route to ICMP error destination, dropping");
            return;
        };
        let Some(egress) = self.interfaces.by_name(&route.interface_name) else { return };

        let mut data_area = vec![0u8; ICMP_DATA_SIZE];
        let copy_len = original_ip_bytes.len().min(ICMP_DATA_SIZE);
        data_area[..copy_len].copy_from_slice(&original_ip_bytes[..copy_len]);

        let icmp_body = IcmpPacket::build_error(icmp_type, code, &data_area);
        let ip_packet = Ipv4Header::build(egress.ip, header.src_ip, IP_PROTO_ICMP, NAT_ECHO_TTL, self.next_ip_id(), crate::wire::ipv4::IP_FLAG_DF, &icmp_body);
        self.send_ip_frame(&ip_packet, &egress.name);
    }

    /// Resolves the link-layer next hop for `ip_bytes` going out `egress_interface_name`
    /// and either sends immediately (cache hit) or parks the frame behind an ARP
    /// request (cache miss / pending), per spec.md §4.2 / §4.3.
    fn send_ip_frame(&self, ip_bytes: &[u8], egress_interface_name: &str) {
        let Some(egress) = self.interfaces.by_name(egress_interface_name) else {
            debug!(interface = egress_interface_name, "unknown egress interface, dropping");
            return;
        };
        let Some(next_hop) = self.routes.gateway_for_interface(egress_interface_name) else {
            debug!(interface = egress_interface_name, "no gateway configured for egress interface, dropping");
            return;
        };
        let next_hop = if next_hop.is_unspecified() {
            // A directly-connected route's gateway of 0.0.0.0 means "the destination
            // IP itself is on-link"; recover it from the packet.
            match Ipv4Header::parse(ip_bytes) {
                Some(h) => h.dst_ip,
                None => return,
            }
        } else {
            next_hop
        };

        let now = Instant::now();
        if let Some(mac) = self.arp.lookup(next_hop, now) {
            let frame = EthernetFrame::build(mac, egress.mac, ETHERTYPE_IPV4, ip_bytes);
            self.driver.send_frame(egress_interface_name, &frame);
            return;
        }

        let frame = EthernetFrame::build(ZERO_MAC, egress.mac, ETHERTYPE_IPV4, ip_bytes);
        let outcome = self.arp.queue_request(next_hop, PendingFrame { frame, outbound_interface: egress_interface_name.to_string() });
        if outcome.is_new {
            self.broadcast_arp_request(&outcome.requested_interface, next_hop);
            self.arp.mark_first_sent(next_hop, now);
        }
    }
}

enum NatOutboundError {
    Exhausted,
    Malformed,
}
