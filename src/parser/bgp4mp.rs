use crate::error::ParserError;
use crate::models::*;
use crate::parser::utils::ReadUtils;
use bytes::{Buf, Bytes};

/// Minimum length of a BGP message: 16-byte marker, 2-byte length, 1-byte type.
const BGP_MIN_MESSAGE_SIZE: usize = 19;

/// Parse MRT BGP4MP type.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.4>
pub fn parse_bgp4mp(sub_type: u16, input: Bytes) -> Result<Bgp4Mp, ParserError> {
    let bgp4mp_type: Bgp4MpType = Bgp4MpType::try_from(sub_type)?;
    let msg: Bgp4Mp = match bgp4mp_type {
        Bgp4MpType::StateChange => Bgp4Mp::StateChange(parse_bgp4mp_state_change(
            input,
            AsnLength::Bits16,
            bgp4mp_type,
        )?),
        Bgp4MpType::StateChangeAs4 => Bgp4Mp::StateChange(parse_bgp4mp_state_change(
            input,
            AsnLength::Bits32,
            bgp4mp_type,
        )?),
        Bgp4MpType::Message | Bgp4MpType::MessageLocal => {
            Bgp4Mp::Message(parse_bgp4mp_message(input, AsnLength::Bits16, bgp4mp_type)?)
        }
        Bgp4MpType::MessageAs4 | Bgp4MpType::MessageAs4Local => {
            Bgp4Mp::Message(parse_bgp4mp_message(input, AsnLength::Bits32, bgp4mp_type)?)
        }
        add_path_type => {
            return Err(ParserError::UnsupportedMrtType {
                mrt_type: EntryType::BGP4MP,
                subtype: add_path_type.into(),
            })
        }
    };

    Ok(msg)
}

/*
   0                   1                   2                   3
   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |      Peer AS Number (2 or 4 octets based on subtype)          |
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |      Local AS Number (2 or 4 octets based on subtype)         |
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |        Interface Index        |        Address Family         |
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |                      Peer IP Address (variable)               |
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |                      Local IP Address (variable)              |
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |                    BGP Message... (variable)
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
*/
pub fn parse_bgp4mp_message(
    mut data: Bytes,
    asn_len: AsnLength,
    msg_type: Bgp4MpType,
) -> Result<Bgp4MpMessage, ParserError> {
    let peer_asn = data.read_asn(asn_len)?;
    let local_asn = data.read_asn(asn_len)?;
    let interface_index = data.read_u16()?;
    let afi = data.read_afi()?;
    let peer_ip = data.read_address(&afi)?;
    let local_ip = data.read_address(&afi)?;

    // the rest of the record is the raw BGP message; sanity-check its own
    // framing so a garbled record does not travel all the way to the collector
    let bgp_message = data;
    if bgp_message.remaining() < BGP_MIN_MESSAGE_SIZE {
        return Err(ParserError::TruncatedMsg(format!(
            "truncated bgp4mp message: {} bytes left for the BGP message",
            bgp_message.remaining()
        )));
    }
    let declared = u16::from_be_bytes([bgp_message[16], bgp_message[17]]) as usize;
    if declared != bgp_message.remaining() {
        return Err(ParserError::TruncatedMsg(format!(
            "bgp4mp message length mismatch: BGP header declares {declared} bytes, record carries {}",
            bgp_message.remaining()
        )));
    }

    Ok(Bgp4MpMessage {
        msg_type,
        peer_asn,
        local_asn,
        interface_index,
        afi,
        peer_ip,
        local_ip,
        bgp_message,
    })
}

/// BGP4MP_STATE_CHANGE and BGP4MP_STATE_CHANGE_AS4.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.4.1>
pub fn parse_bgp4mp_state_change(
    mut input: Bytes,
    asn_len: AsnLength,
    msg_type: Bgp4MpType,
) -> Result<Bgp4MpStateChange, ParserError> {
    let peer_asn = input.read_asn(asn_len)?;
    let local_asn = input.read_asn(asn_len)?;
    let interface_index = input.read_u16()?;
    let address_family = input.read_afi()?;
    let peer_addr = input.read_address(&address_family)?;
    let local_addr = input.read_address(&address_family)?;
    let old_state = BgpState::try_from(input.read_u16()?)?;
    let new_state = BgpState::try_from(input.read_u16()?)?;
    Ok(Bgp4MpStateChange {
        msg_type,
        peer_asn,
        local_asn,
        interface_index,
        peer_addr,
        local_addr,
        old_state,
        new_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use std::net::IpAddr;
    use std::str::FromStr;

    /// A minimal BGP KEEPALIVE: marker, length 19, type 4.
    pub(crate) fn keepalive_bytes() -> Vec<u8> {
        let mut msg = vec![0xff; 16];
        msg.put_u16(19);
        msg.put_u8(4);
        msg
    }

    fn build_message_as4(bgp_message: &[u8]) -> Bytes {
        let mut data = BytesMut::new();
        data.put_u32(65010); // peer asn
        data.put_u32(65020); // local asn
        data.put_u16(0); // interface index
        data.put_u16(1); // afi ipv4
        data.put_u32(u32::from(std::net::Ipv4Addr::new(10, 0, 0, 1)));
        data.put_u32(u32::from(std::net::Ipv4Addr::new(10, 0, 0, 2)));
        data.put_slice(bgp_message);
        data.freeze()
    }

    #[test]
    fn test_parse_message_as4() {
        let bgp = keepalive_bytes();
        let msg = parse_bgp4mp(4, build_message_as4(&bgp)).unwrap();
        let Bgp4Mp::Message(msg) = msg else {
            panic!("expected message variant");
        };
        assert_eq!(msg.peer_asn, Asn::new_32bit(65010));
        assert_eq!(msg.peer_ip, IpAddr::from_str("10.0.0.1").unwrap());
        assert_eq!(msg.afi, Afi::Ipv4);
        // the BGP message is carried verbatim
        assert_eq!(msg.bgp_message.as_ref(), bgp.as_slice());
        assert_eq!(msg.bgp_message_type(), Some(4));
        assert!(!msg.is_update());
    }

    #[test]
    fn test_bgp_length_mismatch() {
        let mut bgp = keepalive_bytes();
        bgp[17] = 50; // claims 50 bytes, carries 19
        assert!(matches!(
            parse_bgp4mp(4, build_message_as4(&bgp)),
            Err(ParserError::TruncatedMsg(_))
        ));
    }

    #[test]
    fn test_parse_state_change_as4() {
        let mut data = BytesMut::new();
        data.put_u32(65010);
        data.put_u32(65020);
        data.put_u16(0);
        data.put_u16(1);
        data.put_u32(u32::from(std::net::Ipv4Addr::new(10, 0, 0, 1)));
        data.put_u32(u32::from(std::net::Ipv4Addr::new(10, 0, 0, 2)));
        data.put_u16(6); // Established
        data.put_u16(1); // Idle

        let msg = parse_bgp4mp(5, data.freeze()).unwrap();
        let Bgp4Mp::StateChange(change) = msg else {
            panic!("expected state change variant");
        };
        assert_eq!(change.old_state, BgpState::Established);
        assert_eq!(change.new_state, BgpState::Idle);
    }

    #[test]
    fn test_unknown_subtype() {
        assert!(parse_bgp4mp(99, Bytes::new()).is_err());
    }
}
