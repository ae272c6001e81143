//! BMP common and per-peer header construction.

use crate::models::{Asn, BgpIdentifier, Peer};
use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::IntoPrimitive;
use std::net::IpAddr;

/// BMP message type enum.
///
/// <https://www.rfc-editor.org/rfc/rfc7854#section-4.1>
#[derive(Debug, Clone, IntoPrimitive, PartialEq, Eq, Hash, Copy)]
#[repr(u8)]
pub enum BmpMsgType {
    RouteMonitoring = 0,
    StatisticsReport = 1,
    PeerDownNotification = 2,
    PeerUpNotification = 3,
    InitiationMessage = 4,
    TerminationMessage = 5,
    RouteMirroringMessage = 6,
}

pub const BMP_VERSION: u8 = 3;

/// Size of the BMP common header: version, 4-byte length, type.
pub const BMP_COMMON_HEADER_SIZE: usize = 6;

/// Size of the BMP per-peer header.
pub const BMP_PER_PEER_HEADER_SIZE: usize = 42;

bitflags! {
    /// BMP per-peer header flags.
    ///
    /// <https://www.rfc-editor.org/rfc/rfc7854#section-4.2>
    ///
    /// ```text
    ///  0 1 2 3 4 5 6 7
    /// +-+-+-+-+-+-+-+-+
    /// |V|L|A|O| Resv  |
    /// +-+-+-+-+-+-+-+-+
    /// ```
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PeerFlags: u8 {
        const ADDRESS_FAMILY_IPV6 = 0b1000_0000;
        const IS_POST_POLICY = 0b0100_0000;
        const AS_SIZE_16BIT = 0b0010_0000;
        const IS_ADJ_RIB_OUT = 0b0001_0000;
    }
}

/// BMP per-peer header.
///
/// 42 bytes on the wire:
/// ```text
///       0                   1                   2                   3
///       0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///      +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///      |   Peer Type   |  Peer Flags   |
///      +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///      |         Peer Distinguisher (present based on peer type)       |
///      |                                                               |
///      +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///      |                 Peer Address (16 bytes)                       |
///      ~                                                               ~
///      +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///      |                           Peer AS                             |
///      +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///      |                         Peer BGP ID                           |
///      +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///      |                    Timestamp (seconds)                        |
///      +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///      |                  Timestamp (microseconds)                     |
///      +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The timestamp is the MRT record's timestamp, never wall-clock time:
/// downstream analytics key off the archived time of the routing event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BmpPerPeerHeader {
    pub peer_flags: PeerFlags,
    pub peer_distinguisher: u64,
    pub peer_ip: IpAddr,
    pub peer_asn: Asn,
    pub peer_bgp_id: BgpIdentifier,
    pub timestamp_sec: u32,
    pub timestamp_usec: u32,
}

impl BmpPerPeerHeader {
    /// Header for a peer from a PEER_INDEX_TABLE or a BGP4MP record, peer
    /// type Global (0).
    pub fn new(
        peer_ip: IpAddr,
        peer_asn: Asn,
        peer_bgp_id: BgpIdentifier,
        timestamp_sec: u32,
        timestamp_usec: u32,
    ) -> BmpPerPeerHeader {
        let mut peer_flags = PeerFlags::empty();
        if peer_ip.is_ipv6() {
            peer_flags.insert(PeerFlags::ADDRESS_FAMILY_IPV6);
        }
        BmpPerPeerHeader {
            peer_flags,
            peer_distinguisher: 0,
            peer_ip,
            peer_asn,
            peer_bgp_id,
            timestamp_sec,
            timestamp_usec,
        }
    }

    pub fn for_peer(peer: &Peer, timestamp_sec: u32, timestamp_usec: u32) -> BmpPerPeerHeader {
        BmpPerPeerHeader::new(
            peer.peer_ip,
            peer.peer_asn,
            peer.peer_bgp_id,
            timestamp_sec,
            timestamp_usec,
        )
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(BMP_PER_PEER_HEADER_SIZE);
        bytes.put_u8(0); // peer type: Global Instance Peer
        bytes.put_u8(self.peer_flags.bits());
        bytes.put_u64(self.peer_distinguisher);
        put_ip_16_bytes(&mut bytes, self.peer_ip);
        bytes.put_u32(self.peer_asn.to_u32());
        bytes.put_slice(&self.peer_bgp_id.octets());
        bytes.put_u32(self.timestamp_sec);
        bytes.put_u32(self.timestamp_usec);
        bytes.freeze()
    }
}

/// Write an address into a 16-byte field, IPv4 right-aligned per RFC 7854.
pub(crate) fn put_ip_16_bytes(bytes: &mut BytesMut, addr: IpAddr) {
    match addr {
        IpAddr::V4(ip) => {
            bytes.put_slice(&[0u8; 12]);
            bytes.put_slice(&ip.octets());
        }
        IpAddr::V6(ip) => bytes.put_slice(&ip.octets()),
    }
}

/// Wrap a message body in the BMP v3 common header.
pub fn bmp_frame(msg_type: BmpMsgType, body: &[u8]) -> Bytes {
    let mut bytes = BytesMut::with_capacity(BMP_COMMON_HEADER_SIZE + body.len());
    bytes.put_u8(BMP_VERSION);
    bytes.put_u32((BMP_COMMON_HEADER_SIZE + body.len()) as u32);
    bytes.put_u8(msg_type.into());
    bytes.put_slice(body);
    bytes.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::str::FromStr;

    #[test]
    fn test_per_peer_header_ipv4() {
        let header = BmpPerPeerHeader::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            Asn::new_32bit(65010),
            Ipv4Addr::new(192, 0, 2, 1),
            1_600_000_000,
            42,
        );
        let encoded = header.encode();
        assert_eq!(encoded.len(), BMP_PER_PEER_HEADER_SIZE);
        assert_eq!(encoded[0], 0); // peer type
        assert_eq!(encoded[1], 0); // flags: IPv4
        // IPv4 right-aligned in the 16-byte address field
        assert_eq!(&encoded[10..26], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 10, 0, 0, 1]);
        assert_eq!(&encoded[26..30], &65010u32.to_be_bytes());
        assert_eq!(&encoded[30..34], &[192, 0, 2, 1]);
        assert_eq!(&encoded[34..38], &1_600_000_000u32.to_be_bytes());
        assert_eq!(&encoded[38..42], &42u32.to_be_bytes());
    }

    #[test]
    fn test_per_peer_header_ipv6_flag() {
        let header = BmpPerPeerHeader::new(
            IpAddr::V6(Ipv6Addr::from_str("2001:db8::2").unwrap()),
            Asn::new_16bit(65000),
            Ipv4Addr::new(192, 0, 2, 2),
            0,
            0,
        );
        let encoded = header.encode();
        assert_eq!(encoded[1], 0b1000_0000);
        assert_eq!(&encoded[10..14], &[0x20, 0x01, 0x0d, 0xb8]);
    }

    #[test]
    fn test_bmp_frame() {
        let framed = bmp_frame(BmpMsgType::InitiationMessage, &[0xaa, 0xbb]);
        assert_eq!(framed.as_ref(), &[3, 0, 0, 0, 8, 4, 0xaa, 0xbb]);
    }
}
