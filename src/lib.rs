//! Forwarding plane for a simple IPv4 software router with optional stateful NAT:
//! an IP/ICMP forwarding state machine, an ARP resolver/request queue, and a NAT
//! mapping table, driven by a single [`engine::Router::handle_frame`] entry point.
//!
//! Frame I/O itself (raw sockets, a TAP device, a test harness) is an external
//! collaborator implementing [`driver::PacketDriver`] — this crate never owns a NIC.

pub mod arp_table;
pub mod checksum;
pub mod config;
pub mod driver;
pub mod engine;
pub mod iface;
pub mod nat;
pub mod route;
pub mod wire;

pub use driver::PacketDriver;
pub use engine::{NatSettings, Router};
