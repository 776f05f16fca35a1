//! The packet-injection driver is an external collaborator (spec.md §1, §6): it
//! delivers inbound frames by calling [`crate::engine::Router::handle_frame`] and
//! accepts outbound frames through this trait. Implementations live outside this
//! crate (a raw-socket bridge, a TAP device, a test harness, ...).

/// Sends a fully-built Ethernet frame out `interface_name`.
///
/// Implementations must copy `frame` synchronously before returning, per spec.md
/// §6 ("the driver copies synchronously") — the engine reuses its scratch buffers
/// immediately after this call returns and never holds a table lock across it.
pub trait PacketDriver: Send + Sync {
    fn send_frame(&self, interface_name: &str, frame: &[u8]);
}
