use crate::error::ParserError;
use crate::models::*;
use crate::parser::utils::ReadUtils;
use bytes::Bytes;
use std::net::Ipv4Addr;

pub fn parse_table_dump_v2_message(
    sub_type: u16,
    mut data: Bytes,
) -> Result<TableDumpV2Message, ParserError> {
    let v2_type: TableDumpV2Type = TableDumpV2Type::try_from(sub_type)?;

    let msg = match v2_type {
        TableDumpV2Type::PeerIndexTable => {
            TableDumpV2Message::PeerIndexTable(parse_peer_index_table(&mut data)?)
        }
        TableDumpV2Type::RibIpv4Unicast | TableDumpV2Type::RibIpv6Unicast => {
            TableDumpV2Message::RibAfi(parse_rib_afi_entries(&mut data, v2_type)?)
        }
        v2_type => {
            return Err(ParserError::UnsupportedMrtType {
                mrt_type: EntryType::TABLE_DUMP_V2,
                subtype: v2_type.into(),
            })
        }
    };

    Ok(msg)
}

/// Peer index table.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.3.1>
pub fn parse_peer_index_table(data: &mut Bytes) -> Result<PeerIndexTable, ParserError> {
    let collector_bgp_id = Ipv4Addr::from(data.read_u32()?);
    let view_name_length = data.read_u16()?;
    let view_name = data
        .read_n_bytes_to_string(view_name_length as usize)
        .unwrap_or_default();

    let peer_count = data.read_u16()?;
    let mut peers = Vec::with_capacity(peer_count as usize);
    for _index in 0..peer_count {
        let peer_type = PeerType::from_bits_retain(data.read_u8()?);
        let afi = match peer_type.contains(PeerType::ADDRESS_FAMILY_IPV6) {
            true => Afi::Ipv6,
            false => Afi::Ipv4,
        };
        let asn_len = match peer_type.contains(PeerType::AS_SIZE_32BIT) {
            true => AsnLength::Bits32,
            false => AsnLength::Bits16,
        };

        let peer_bgp_id = Ipv4Addr::from(data.read_u32()?);
        let peer_ip = data.read_address(&afi)?;
        let peer_asn = data.read_asn(asn_len)?;
        peers.push(Peer {
            peer_type,
            peer_bgp_id,
            peer_ip,
            peer_asn,
        })
    }

    Ok(PeerIndexTable {
        collector_bgp_id,
        view_name,
        peers,
    })
}

/// RIB AFI-specific entries.
///
/// <https://tools.ietf.org/html/rfc6396#section-4.3>
pub fn parse_rib_afi_entries(
    data: &mut Bytes,
    rib_type: TableDumpV2Type,
) -> Result<RibAfiEntries, ParserError> {
    let afi = match rib_type {
        TableDumpV2Type::RibIpv4Unicast => Afi::Ipv4,
        TableDumpV2Type::RibIpv6Unicast => Afi::Ipv6,
        _ => {
            return Err(ParserError::ParseError(format!(
                "wrong RIB type for parsing: {rib_type:?}"
            )))
        }
    };

    let sequence_number = data.read_u32()?;
    let prefix = data.read_nlri_prefix(&afi)?;
    let entry_count = data.read_u16()?;

    let mut rib_entries = Vec::with_capacity(entry_count as usize);
    for _i in 0..entry_count {
        rib_entries.push(parse_rib_entry(data)?);
    }

    Ok(RibAfiEntries {
        rib_type,
        sequence_number,
        prefix,
        rib_entries,
    })
}

/// One RIB entry: peer index, originated time, raw attribute bytes.
fn parse_rib_entry(input: &mut Bytes) -> Result<RibEntry, ParserError> {
    input.require_n_remaining(8, "rib entry")?;
    let peer_index = input.read_u16()?;
    let originated_time = input.read_u32()?;
    let attribute_length = input.read_u16()? as usize;

    input.require_n_remaining(attribute_length, "rib entry attributes")?;
    let attributes = input.split_to(attribute_length);

    Ok(RibEntry {
        peer_index,
        originated_time,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use std::net::IpAddr;
    use std::str::FromStr;

    fn build_peer_index_table() -> Bytes {
        let mut data = BytesMut::new();
        data.put_u32(u32::from(Ipv4Addr::new(10, 0, 0, 255))); // collector BGP ID
        let view = b"test-view";
        data.put_u16(view.len() as u16);
        data.put_slice(view);
        data.put_u16(2); // peer count

        // peer 0: IPv4 address, 32-bit AS
        data.put_u8(0x2);
        data.put_u32(u32::from(Ipv4Addr::new(192, 0, 2, 1))); // bgp id
        data.put_u32(u32::from(Ipv4Addr::new(198, 51, 100, 1))); // address
        data.put_u32(396986);

        // peer 1: IPv6 address, 16-bit AS
        data.put_u8(0x1);
        data.put_u32(u32::from(Ipv4Addr::new(192, 0, 2, 2)));
        data.put_u128(u128::from(std::net::Ipv6Addr::from_str("2001:db8::2").unwrap()));
        data.put_u16(65000);

        data.freeze()
    }

    #[test]
    fn test_parse_peer_index_table() {
        let mut data = build_peer_index_table();
        let table = parse_peer_index_table(&mut data).unwrap();

        assert_eq!(table.collector_bgp_id, Ipv4Addr::new(10, 0, 0, 255));
        assert_eq!(table.view_name, "test-view");
        assert_eq!(table.peers.len(), 2);

        let peer = table.get_peer_by_index(0).unwrap();
        assert_eq!(peer.peer_ip, IpAddr::from_str("198.51.100.1").unwrap());
        assert_eq!(peer.peer_asn, Asn::new_32bit(396986));
        assert_eq!(peer.afi(), Afi::Ipv4);

        let peer = table.get_peer_by_index(1).unwrap();
        assert_eq!(peer.peer_ip, IpAddr::from_str("2001:db8::2").unwrap());
        assert_eq!(peer.peer_asn, Asn::new_16bit(65000));
        assert_eq!(peer.afi(), Afi::Ipv6);

        assert!(table.get_peer_by_index(2).is_none());
    }

    #[test]
    fn test_parse_rib_ipv4_unicast() {
        let mut data = BytesMut::new();
        data.put_u32(7); // sequence number
        data.put_slice(&[24, 10, 0, 0]); // 10.0.0.0/24
        data.put_u16(1); // entry count
        data.put_u16(0); // peer index
        data.put_u32(1_600_000_000); // originated time
        data.put_u16(4); // attribute length
        data.put_slice(&[0x40, 0x01, 0x01, 0x00]); // ORIGIN IGP

        let entries =
            parse_rib_afi_entries(&mut data.freeze(), TableDumpV2Type::RibIpv4Unicast).unwrap();

        assert_eq!(entries.sequence_number, 7);
        assert_eq!(
            entries.prefix,
            NetworkPrefix::from_str("10.0.0.0/24").unwrap()
        );
        assert_eq!(entries.rib_entries.len(), 1);
        assert_eq!(entries.rib_entries[0].peer_index, 0);
        assert_eq!(entries.rib_entries[0].originated_time, 1_600_000_000);
        assert_eq!(
            entries.rib_entries[0].attributes.as_ref(),
            &[0x40, 0x01, 0x01, 0x00]
        );
    }

    #[test]
    fn test_parse_rib_ipv6_unicast() {
        let mut data = BytesMut::new();
        data.put_u32(0);
        data.put_slice(&[32, 0x20, 0x01, 0x0d, 0xb8]); // 2001:db8::/32
        data.put_u16(0); // no entries

        let entries =
            parse_rib_afi_entries(&mut data.freeze(), TableDumpV2Type::RibIpv6Unicast).unwrap();
        assert_eq!(
            entries.prefix,
            NetworkPrefix::from_str("2001:db8::/32").unwrap()
        );
        assert!(entries.rib_entries.is_empty());
    }

    #[test]
    fn test_truncated_rib_entry() {
        let mut data = BytesMut::new();
        data.put_u32(0);
        data.put_slice(&[24, 10, 0, 0]);
        data.put_u16(1); // declares one entry
        data.put_u16(0); // peer index, then nothing

        assert!(matches!(
            parse_rib_afi_entries(&mut data.freeze(), TableDumpV2Type::RibIpv4Unicast),
            Err(ParserError::TruncatedMsg(_))
        ));
    }

    #[test]
    fn test_addpath_subtype_unsupported() {
        let data = Bytes::new();
        assert!(matches!(
            parse_table_dump_v2_message(8, data),
            Err(ParserError::UnsupportedMrtType { .. })
        ));
    }
}
