use crate::checksum::{checksum16, checksum_valid};

pub const ICMP_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpType {
    EchoReply,
    DestinationUnreachable,
    EchoRequest,
    TimeExceeded,
    Other(u8),
}

impl From<u8> for IcmpType {
    fn from(value: u8) -> Self {
        match value {
            0 => IcmpType::EchoReply,
            3 => IcmpType::DestinationUnreachable,
            8 => IcmpType::EchoRequest,
            11 => IcmpType::TimeExceeded,
            other => IcmpType::Other(other),
        }
    }
}

impl From<IcmpType> for u8 {
    fn from(value: IcmpType) -> Self {
        match value {
            IcmpType::EchoReply => 0,
            IcmpType::DestinationUnreachable => 3,
            IcmpType::EchoRequest => 8,
            IcmpType::TimeExceeded => 11,
            IcmpType::Other(v) => v,
        }
    }
}

/// Destination-unreachable codes this router emits.
pub mod unreachable_code {
    pub const NET: u8 = 0;
    pub const HOST: u8 = 1;
    pub const PORT: u8 = 3;
}

/// A parsed ICMP message (header only interpreted; `payload` is everything after the
/// 8-byte header, which for echo request/reply holds the identifier/sequence echoed
/// back unchanged, per spec.md §4.4).
pub struct IcmpPacket<'a> {
    pub icmp_type: IcmpType,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < ICMP_HEADER_LEN {
            return None;
        }

        Some(Self {
            icmp_type: data[0].into(),
            code: data[1],
            checksum: u16::from_be_bytes([data[2], data[3]]),
            identifier: u16::from_be_bytes([data[4], data[5]]),
            sequence: u16::from_be_bytes([data[6], data[7]]),
            payload: &data[ICMP_HEADER_LEN..],
        })
    }

    /// Verifies the ICMP checksum over the full ICMP payload (header + data), per
    /// spec.md §4.4.
    pub fn checksum_is_valid(data: &[u8]) -> bool {
        if data.len() < ICMP_HEADER_LEN {
            return false;
        }
        checksum_valid(data)
    }

    /// Builds an echo reply/request ICMP message (type 0 or 8, code 0), computing
    /// the checksum over the whole message.
    pub fn build_echo(icmp_type: IcmpType, identifier: u16, sequence: u16, payload_tail: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; ICMP_HEADER_LEN + payload_tail.len()];
        packet[0] = icmp_type.into();
        packet[1] = 0;
        packet[4..6].copy_from_slice(&identifier.to_be_bytes());
        packet[6..8].copy_from_slice(&sequence.to_be_bytes());
        packet[ICMP_HEADER_LEN..].copy_from_slice(payload_tail);

        let checksum = checksum16(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
        packet
    }

    /// Builds a type-3 (destination unreachable) or type-11 (time exceeded) error
    /// body: 4-byte ICMP header + 4 unused bytes + the fixed `ICMP_DATA_SIZE`-byte
    /// data area, per spec.md §4.4 / §6.
    pub fn build_error(icmp_type: IcmpType, code: u8, original_ip_packet_prefix: &[u8]) -> Vec<u8> {
        debug_assert_eq!(original_ip_packet_prefix.len(), super::ICMP_DATA_SIZE);
        let mut packet = vec![0u8; ICMP_HEADER_LEN + super::ICMP_DATA_SIZE];
        packet[0] = icmp_type.into();
        packet[1] = code;
        // bytes 4..8 (unused/"rest of header") stay zero for type 3 and type 11.
        packet[ICMP_HEADER_LEN..].copy_from_slice(original_ip_packet_prefix);

        let checksum = checksum16(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_reply_round_trips_payload_and_checksum() {
        let payload = b"abcdef";
        let bytes = IcmpPacket::build_echo(IcmpType::EchoReply, 1, 1, payload);
        assert!(IcmpPacket::checksum_is_valid(&bytes));
        let parsed = IcmpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.icmp_type, IcmpType::EchoReply);
        assert_eq!(parsed.identifier, 1);
        assert_eq!(parsed.sequence, 1);
        assert_eq!(parsed.payload, payload);
    }

    #[test]
    fn error_body_carries_fixed_size_data_area() {
        let original = vec![0xAB; super::super::ICMP_DATA_SIZE];
        let bytes = IcmpPacket::build_error(IcmpType::TimeExceeded, 0, &original);
        assert!(IcmpPacket::checksum_is_valid(&bytes));
        let parsed = IcmpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.icmp_type, IcmpType::TimeExceeded);
        assert_eq!(parsed.payload, &original[..]);
    }

    #[test]
    fn detects_bad_checksum() {
        let mut bytes = IcmpPacket::build_echo(IcmpType::EchoRequest, 7, 9, b"hi");
        bytes[2] ^= 0xFF;
        assert!(!IcmpPacket::checksum_is_valid(&bytes));
    }
}
