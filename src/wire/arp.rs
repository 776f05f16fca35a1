use super::{ETHERTYPE_IPV4, ETHER_ADDR_LEN, IP_ADDR_LEN};

pub const ARP_HEADER_LEN: usize = 28;

pub const ARP_HTYPE_ETHERNET: u16 = 1;
pub const ARP_OP_REQUEST: u16 = 1;
pub const ARP_OP_REPLY: u16 = 2;

/// A parsed ARP packet (Ethernet/IPv4 combination only, per RFC 826 + spec.md §6).
pub struct ArpPacket {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub hw_addr_len: u8,
    pub proto_addr_len: u8,
    pub operation: u16,
    pub sender_mac: [u8; ETHER_ADDR_LEN],
    pub sender_ip: [u8; IP_ADDR_LEN],
    pub target_mac: [u8; ETHER_ADDR_LEN],
    pub target_ip: [u8; IP_ADDR_LEN],
}

impl ArpPacket {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ARP_HEADER_LEN {
            return None;
        }

        let hardware_type = u16::from_be_bytes([data[0], data[1]]);
        let protocol_type = u16::from_be_bytes([data[2], data[3]]);
        let hw_addr_len = data[4];
        let proto_addr_len = data[5];
        let operation = u16::from_be_bytes([data[6], data[7]]);

        let mut sender_mac = [0u8; ETHER_ADDR_LEN];
        let mut sender_ip = [0u8; IP_ADDR_LEN];
        let mut target_mac = [0u8; ETHER_ADDR_LEN];
        let mut target_ip = [0u8; IP_ADDR_LEN];
        sender_mac.copy_from_slice(&data[8..14]);
        sender_ip.copy_from_slice(&data[14..18]);
        target_mac.copy_from_slice(&data[18..24]);
        target_ip.copy_from_slice(&data[24..28]);

        Some(Self {
            hardware_type,
            protocol_type,
            hw_addr_len,
            proto_addr_len,
            operation,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        })
    }

    /// Rejects anything that isn't plain Ethernet/IPv4 ARP, per spec.md §4.2.
    pub fn is_supported(&self) -> bool {
        self.hardware_type == ARP_HTYPE_ETHERNET
            && self.protocol_type == ETHERTYPE_IPV4
            && self.hw_addr_len as usize == ETHER_ADDR_LEN
            && self.proto_addr_len as usize == IP_ADDR_LEN
    }

    /// Builds the ARP header bytes only (caller prepends the Ethernet header).
    #[allow(clippy::too_many_arguments)]
    fn build(
        operation: u16,
        sender_mac: [u8; ETHER_ADDR_LEN],
        sender_ip: [u8; IP_ADDR_LEN],
        target_mac: [u8; ETHER_ADDR_LEN],
        target_ip: [u8; IP_ADDR_LEN],
    ) -> Vec<u8> {
        let mut packet = vec![0u8; ARP_HEADER_LEN];
        packet[0..2].copy_from_slice(&ARP_HTYPE_ETHERNET.to_be_bytes());
        packet[2..4].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        packet[4] = ETHER_ADDR_LEN as u8;
        packet[5] = IP_ADDR_LEN as u8;
        packet[6..8].copy_from_slice(&operation.to_be_bytes());
        packet[8..14].copy_from_slice(&sender_mac);
        packet[14..18].copy_from_slice(&sender_ip);
        packet[18..24].copy_from_slice(&target_mac);
        packet[24..28].copy_from_slice(&target_ip);
        packet
    }

    /// An ARP request broadcast for `target_ip`, sent from `sender_mac`/`sender_ip`.
    /// Target MAC is left zeroed, per RFC 826 (not strictly required, but matches
    /// the original router's `LinkSendArpRequest`).
    pub fn build_request(sender_mac: [u8; ETHER_ADDR_LEN], sender_ip: [u8; IP_ADDR_LEN], target_ip: [u8; IP_ADDR_LEN]) -> Vec<u8> {
        Self::build(ARP_OP_REQUEST, sender_mac, sender_ip, super::ZERO_MAC, target_ip)
    }

    /// A reply to `self` (a received request), answering with `responder_mac`/`responder_ip`.
    pub fn build_reply(&self, responder_mac: [u8; ETHER_ADDR_LEN], responder_ip: [u8; IP_ADDR_LEN]) -> Vec<u8> {
        Self::build(ARP_OP_REPLY, responder_mac, responder_ip, self.sender_mac, self.sender_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_and_is_supported() {
        let mac = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
        let ip = [10, 0, 1, 1];
        let target = [10, 0, 1, 100];
        let bytes = ArpPacket::build_request(mac, ip, target);
        let parsed = ArpPacket::parse(&bytes).unwrap();
        assert!(parsed.is_supported());
        assert_eq!(parsed.operation, ARP_OP_REQUEST);
        assert_eq!(parsed.sender_mac, mac);
        assert_eq!(parsed.sender_ip, ip);
        assert_eq!(parsed.target_ip, target);
        assert_eq!(parsed.target_mac, super::super::ZERO_MAC);
    }

    #[test]
    fn reply_swaps_sender_and_target() {
        let requester_mac = [0xaa; 6];
        let requester_ip = [10, 0, 1, 100];
        let request = ArpPacket::build_request(requester_mac, requester_ip, [10, 0, 1, 1]);
        let parsed_request = ArpPacket::parse(&request).unwrap();

        let responder_mac = [0xbb; 6];
        let responder_ip = [10, 0, 1, 1];
        let reply = parsed_request.build_reply(responder_mac, responder_ip);
        let parsed_reply = ArpPacket::parse(&reply).unwrap();

        assert_eq!(parsed_reply.operation, ARP_OP_REPLY);
        assert_eq!(parsed_reply.sender_mac, responder_mac);
        assert_eq!(parsed_reply.sender_ip, responder_ip);
        assert_eq!(parsed_reply.target_mac, requester_mac);
        assert_eq!(parsed_reply.target_ip, requester_ip);
    }

    #[test]
    fn rejects_non_ethernet_ipv4_combination() {
        let mut bytes = ArpPacket::build_request([0; 6], [0; 4], [0; 4]);
        bytes[5] = 16; // corrupt proto_addr_len (would be IPv6-sized)
        let parsed = ArpPacket::parse(&bytes).unwrap();
        assert!(!parsed.is_supported());
    }
}
