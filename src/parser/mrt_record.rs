use crate::error::ParserError;
use crate::models::*;
use crate::parser::bgp4mp::parse_bgp4mp;
use crate::parser::table_dump_v2::parse_table_dump_v2_message;
use crate::parser::utils::ReadUtils;
use bytes::{Bytes, BytesMut};
use std::io::Read;

/// Common header with the type code exactly as it appears on the wire, so
/// records of unregistered types can still be skipped by their declared
/// length instead of failing the whole file.
struct RawCommonHeader {
    timestamp: u32,
    microsecond_timestamp: Option<u32>,
    entry_type: u16,
    entry_subtype: u16,
    length: u32,
}

/// Parse the 12-byte MRT common header, plus the 4-byte microsecond
/// extension for `BGP4MP_ET` records.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |             Type              |            Subtype            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             Length                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Message... (variable)
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
fn parse_raw_common_header<T: Read>(input: &mut T) -> Result<RawCommonHeader, ParserError> {
    let mut raw_bytes = [0u8; 12];
    input.read_exact(&mut raw_bytes)?;
    let mut data = Bytes::copy_from_slice(&raw_bytes);

    let timestamp = data.read_u32()?;
    let entry_type = data.read_u16()?;
    let entry_subtype = data.read_u16()?;
    let mut length = data.read_u32()?;

    let microsecond_timestamp = match entry_type == u16::from(EntryType::BGP4MP_ET) {
        true => {
            // the on-wire length includes the 4-byte microsecond field;
            // internally `length` is the message length only
            if length < 4 {
                return Err(ParserError::ParseError(
                    "invalid MRT header length for ET record: length < 4".to_string(),
                ));
            }
            length -= 4;
            let mut raw_bytes: [u8; 4] = [0; 4];
            input.read_exact(&mut raw_bytes)?;
            Some(u32::from_be_bytes(raw_bytes))
        }
        false => None,
    };

    Ok(RawCommonHeader {
        timestamp,
        microsecond_timestamp,
        entry_type,
        entry_subtype,
        length,
    })
}

/// An alternative to [parse_raw_common_header] which returns `None` if the
/// end of the file is reached upon beginning to read the header.
fn try_parse_raw_common_header<T: Read>(
    input: &mut T,
) -> Result<Option<RawCommonHeader>, ParserError> {
    let mut first_byte = [0];
    match input.read(&mut first_byte)? {
        0 => Ok(None),
        1 => {
            let mut reader = &first_byte[..];
            parse_raw_common_header(&mut Read::chain(&mut reader, input)).map(Some)
        }
        _ => unreachable!("Can only read 0 or 1 bytes into buffer of length 1"),
    }
}

fn typed_header(raw: &RawCommonHeader) -> Result<CommonHeader, ParserError> {
    let entry_type = EntryType::try_from(raw.entry_type)
        .map_err(|_| ParserError::UnrecognizedMrtType(raw.entry_type))?;
    Ok(CommonHeader {
        timestamp: raw.timestamp,
        microsecond_timestamp: raw.microsecond_timestamp,
        entry_type,
        entry_subtype: raw.entry_subtype,
        length: raw.length,
    })
}

/// Parse one MRT common header into its typed form. A type code outside the
/// IANA registry is an error here; the record-level reader in
/// [try_parse_mrt_record] skips such records instead.
pub fn parse_common_header<T: Read>(input: &mut T) -> Result<CommonHeader, ParserError> {
    typed_header(&parse_raw_common_header(input)?)
}

/// An alternative to [parse_common_header] which returns `None` if the end
/// of the file is reached upon beginning to read the header.
pub fn try_parse_common_header<T: Read>(
    input: &mut T,
) -> Result<Option<CommonHeader>, ParserError> {
    match try_parse_raw_common_header(input)? {
        Some(raw) => typed_header(&raw).map(Some),
        None => Ok(None),
    }
}

/// Parse the next MRT record, or `None` at a clean end of file.
///
/// Records of types or subtypes the replay does not understand, including
/// type codes not in the registry at all, are skipped using the declared
/// length, so archives carrying newer record kinds keep replaying. A record
/// body that overruns the file surfaces as an error.
pub fn try_parse_mrt_record<T: Read>(input: &mut T) -> Result<Option<MrtRecord>, ParserError> {
    loop {
        let raw_header = match try_parse_raw_common_header(input)? {
            Some(v) => v,
            None => return Ok(None),
        };

        // read the whole message bytes to buffer
        let mut buffer = BytesMut::zeroed(raw_header.length as usize);
        input.read_exact(&mut buffer).map_err(|e| {
            ParserError::TruncatedMsg(format!(
                "truncated MRT record: declared length {} overruns file: {e}",
                raw_header.length
            ))
        })?;

        let common_header = match typed_header(&raw_header) {
            Ok(header) => header,
            Err(_) => {
                log::debug!(
                    "skipping MRT record of unrecognized type {}",
                    raw_header.entry_type
                );
                continue;
            }
        };

        match parse_mrt_body(
            common_header.entry_type,
            common_header.entry_subtype,
            buffer.freeze(),
        ) {
            Ok(message) => {
                return Ok(Some(MrtRecord {
                    common_header,
                    message,
                }))
            }
            Err(ParserError::UnsupportedMrtType { mrt_type, subtype }) => {
                log::debug!("skipping unsupported MRT record: {mrt_type:?} subtype {subtype}");
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Parse MRT message body with given entry type and subtype.
///
/// The entry type and subtype are parsed from the common header, the data is
/// the `length` bytes that follow it.
pub fn parse_mrt_body(
    entry_type: EntryType,
    entry_subtype: u16,
    data: Bytes,
) -> Result<MrtMessage, ParserError> {
    match entry_type {
        EntryType::TABLE_DUMP_V2 => {
            let msg = parse_table_dump_v2_message(entry_subtype, data)?;
            Ok(MrtMessage::TableDumpV2Message(msg))
        }
        EntryType::BGP4MP | EntryType::BGP4MP_ET => {
            let msg = parse_bgp4mp(entry_subtype, data)?;
            Ok(MrtMessage::Bgp4Mp(msg))
        }
        mrt_type => Err(ParserError::UnsupportedMrtType {
            mrt_type,
            subtype: entry_subtype,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_header() {
        let input = Bytes::from_static(&[
            0, 0, 0, 1, // timestamp
            0, 16, // entry type
            0, 4, // entry subtype
            0, 0, 0, 5, // length
        ]);

        let mut reader = input.as_ref();
        let header = parse_common_header(&mut reader).unwrap();

        assert_eq!(header.timestamp, 1);
        assert_eq!(header.entry_type, EntryType::BGP4MP);
        assert_eq!(header.entry_subtype, 4);
        assert_eq!(header.length, 5);
        assert_eq!(header.microsecond_timestamp, None);
    }

    #[test]
    fn test_parse_common_header_et() {
        let input = Bytes::from_static(&[
            0, 0, 0, 1, // timestamp
            0, 17, // entry type = BGP4MP_ET
            0, 4, // entry subtype
            0, 0, 0, 9, // length (includes 4 bytes for microseconds)
            0, 3, 130, 112, // microsecond timestamp
        ]);

        let mut reader = input.as_ref();
        let header = parse_common_header(&mut reader).unwrap();

        assert_eq!(header.length, 5); // adjusted length
        assert_eq!(header.microsecond_timestamp, Some(230_000));
    }

    #[test]
    fn test_parse_common_header_unknown_type() {
        let input = Bytes::from_static(&[
            0, 0, 0, 1, // timestamp
            0, 99, // not an MRT type
            0, 0, // subtype
            0, 0, 0, 0, // length
        ]);
        let mut reader = input.as_ref();
        assert!(matches!(
            parse_common_header(&mut reader),
            Err(ParserError::UnrecognizedMrtType(99))
        ));
    }

    #[test]
    fn test_et_record_with_invalid_length() {
        let input = Bytes::from_static(&[
            0, 0, 0, 0, // timestamp
            0, 17, // entry type = BGP4MP_ET
            0, 0, // subtype
            0, 0, 0, 3, // length, invalid: must cover the microsecond field
        ]);
        let mut reader = input.as_ref();
        assert!(parse_common_header(&mut reader).is_err());
    }

    #[test]
    fn test_eof_returns_none() {
        let mut reader: &[u8] = &[];
        assert!(try_parse_mrt_record(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_declared_length_overrun() {
        // header declares 100 bytes of body, only 2 present
        let input = Bytes::from_static(&[
            0, 0, 0, 1, // timestamp
            0, 16, // BGP4MP
            0, 4, // MessageAs4
            0, 0, 0, 100, // length
            0xde, 0xad,
        ]);
        let mut reader = input.as_ref();
        assert!(matches!(
            try_parse_mrt_record(&mut reader),
            Err(ParserError::TruncatedMsg(_))
        ));
    }

    #[test]
    fn test_unsupported_type_is_skipped() {
        // one ISIS record (type 32) followed by clean EOF
        let input = Bytes::from_static(&[
            0, 0, 0, 1, // timestamp
            0, 32, // ISIS
            0, 0, // subtype
            0, 0, 0, 2, // length
            0xab, 0xcd, // opaque body
        ]);
        let mut reader = input.as_ref();
        assert!(try_parse_mrt_record(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_parse_bgp4mp_record_from_wire_bytes() {
        // BGP4MP_MESSAGE_AS4, peer AS 65000 at 10.0.0.1, wrapping a KEEPALIVE
        let raw = hex::decode(concat!(
            "60000000",         // timestamp
            "0010",             // type: BGP4MP
            "0004",             // subtype: MESSAGE_AS4
            "00000027",         // length: 39
            "0000fde8",         // peer AS
            "0000fde9",         // local AS
            "0000",             // interface index
            "0001",             // AFI: IPv4
            "0a000001",         // peer address
            "0a000002",         // local address
            "ffffffffffffffffffffffffffffffff", // BGP marker
            "0013",             // BGP length: 19
            "04",               // BGP type: KEEPALIVE
        ))
        .unwrap();

        let mut reader = raw.as_slice();
        let record = try_parse_mrt_record(&mut reader).unwrap().unwrap();
        assert_eq!(record.common_header.timestamp, 0x6000_0000);
        let MrtMessage::Bgp4Mp(Bgp4Mp::Message(msg)) = record.message else {
            panic!("expected a BGP4MP message");
        };
        assert_eq!(msg.peer_asn, Asn::new_32bit(65000));
        assert_eq!(msg.peer_ip.to_string(), "10.0.0.1");
        assert_eq!(msg.bgp_message.len(), 19);
        // and the file ends cleanly after one record
        assert!(try_parse_mrt_record(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_unrecognized_type_is_skipped() {
        // a record of a type outside the registry, followed by a valid
        // BGP4MP state change; the unknown record is skipped by its
        // declared length and replay continues
        let mut input = vec![
            0, 0, 0, 1, // timestamp
            0, 99, // not an MRT type
            0, 0, // subtype
            0, 0, 0, 3, // length
            0xaa, 0xbb, 0xcc, // opaque body
        ];
        input.extend_from_slice(&[
            0, 0, 0, 2, // timestamp
            0, 16, // BGP4MP
            0, 5, // StateChangeAs4
            0, 0, 0, 24, // length
        ]);
        input.extend_from_slice(&[0, 0, 0xfd, 0xe8]); // peer AS
        input.extend_from_slice(&[0, 0, 0xfd, 0xe9]); // local AS
        input.extend_from_slice(&[0, 0]); // interface index
        input.extend_from_slice(&[0, 1]); // AFI: IPv4
        input.extend_from_slice(&[10, 0, 0, 1]); // peer address
        input.extend_from_slice(&[10, 0, 0, 2]); // local address
        input.extend_from_slice(&[0, 6]); // old state: Established
        input.extend_from_slice(&[0, 1]); // new state: Idle

        let mut reader = input.as_slice();
        let record = try_parse_mrt_record(&mut reader).unwrap().unwrap();
        assert_eq!(record.common_header.timestamp, 2);
        assert_eq!(record.common_header.entry_type, EntryType::BGP4MP);
        let MrtMessage::Bgp4Mp(Bgp4Mp::StateChange(change)) = record.message else {
            panic!("expected a BGP4MP state change");
        };
        assert_eq!(change.new_state, BgpState::Idle);
        assert!(try_parse_mrt_record(&mut reader).unwrap().is_none());
    }
}
