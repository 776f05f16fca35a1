use super::ETHER_ADDR_LEN;

pub const ETHERNET_HEADER_LEN: usize = 14;

/// A parsed Ethernet II frame. Borrows the wire buffer; does not own the payload.
pub struct EthernetFrame<'a> {
    pub dst_mac: [u8; ETHER_ADDR_LEN],
    pub src_mac: [u8; ETHER_ADDR_LEN],
    pub ethertype: u16,
    pub payload: &'a [u8],
}

impl<'a> EthernetFrame<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < ETHERNET_HEADER_LEN {
            return None;
        }

        let mut dst_mac = [0u8; ETHER_ADDR_LEN];
        let mut src_mac = [0u8; ETHER_ADDR_LEN];
        dst_mac.copy_from_slice(&data[0..6]);
        src_mac.copy_from_slice(&data[6..12]);
        let ethertype = u16::from_be_bytes([data[12], data[13]]);

        Some(Self {
            dst_mac,
            src_mac,
            ethertype,
            payload: &data[ETHERNET_HEADER_LEN..],
        })
    }

    /// Builds a complete Ethernet frame, prepending the header to `payload`.
    pub fn build(dst_mac: [u8; ETHER_ADDR_LEN], src_mac: [u8; ETHER_ADDR_LEN], ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(ETHERNET_HEADER_LEN + payload.len());
        frame.extend_from_slice(&dst_mac);
        frame.extend_from_slice(&src_mac);
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ETHERTYPE_IPV4;

    #[test]
    fn round_trips_header_fields() {
        let dst = [1, 2, 3, 4, 5, 6];
        let src = [6, 5, 4, 3, 2, 1];
        let frame = EthernetFrame::build(dst, src, ETHERTYPE_IPV4, b"hello");
        let parsed = EthernetFrame::parse(&frame).unwrap();
        assert_eq!(parsed.dst_mac, dst);
        assert_eq!(parsed.src_mac, src);
        assert_eq!(parsed.ethertype, ETHERTYPE_IPV4);
        assert_eq!(parsed.payload, b"hello");
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(EthernetFrame::parse(&[0u8; 13]).is_none());
    }
}
