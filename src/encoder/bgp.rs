//! Synthetic BGP message construction.
//!
//! The replay never speaks BGP; it only fabricates the two message shapes
//! BMP framing requires: OPEN messages for Peer-Up notifications, and UPDATE
//! messages for RIB entries whose MRT encoding strips the BGP framing.

use crate::error::ParserError;
use crate::models::{Afi, Asn, BgpIdentifier, NetworkPrefix};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const BGP_MSG_TYPE_OPEN: u8 = 1;
const BGP_MSG_TYPE_UPDATE: u8 = 2;

const ATTR_TYPE_MP_REACH_NLRI: u8 = 14;
const ATTR_TYPE_MP_UNREACH_NLRI: u8 = 15;

const ATTR_FLAG_OPTIONAL: u8 = 0b1000_0000;
const ATTR_FLAG_EXTENDED_LENGTH: u8 = 0b0001_0000;

const CAPABILITY_MULTIPROTOCOL: u8 = 1;
const CAPABILITY_FOUR_OCTET_AS: u8 = 65;

const OPEN_HOLD_TIME: u16 = 180;
const SAFI_UNICAST: u8 = 1;

/// Wrap a BGP message body with marker, length and type octets.
fn bgp_message_frame(msg_type: u8, body: &[u8]) -> Bytes {
    let mut bytes = BytesMut::with_capacity(19 + body.len());
    bytes.put_slice(&[0xff; 16]);
    bytes.put_u16((19 + body.len()) as u16);
    bytes.put_u8(msg_type);
    bytes.put_slice(body);
    bytes.freeze()
}

/// Synthesize a BGP OPEN message for a peer.
///
/// Always advertises multiprotocol IPv4/unicast and IPv6/unicast plus the
/// four-octet AS capability, so a collector never rejects the session over a
/// family that only shows up later in the replay. Peers with AS numbers
/// beyond 16 bits carry AS_TRANS in the fixed header field.
pub fn encode_open_message(asn: Asn, bgp_id: BgpIdentifier) -> Bytes {
    let mut capabilities = BytesMut::new();
    for afi in [Afi::Ipv4, Afi::Ipv6] {
        capabilities.put_u8(CAPABILITY_MULTIPROTOCOL);
        capabilities.put_u8(4);
        capabilities.put_u16(afi.into());
        capabilities.put_u8(0); // reserved
        capabilities.put_u8(SAFI_UNICAST);
    }
    capabilities.put_u8(CAPABILITY_FOUR_OCTET_AS);
    capabilities.put_u8(4);
    capabilities.put_u32(asn.to_u32());

    let my_as: u16 = match u16::try_from(asn.to_u32()) {
        Ok(short) => short,
        Err(_) => Asn::TRANSITION.to_u32() as u16,
    };

    let mut body = BytesMut::new();
    body.put_u8(4); // BGP version
    body.put_u16(my_as);
    body.put_u16(OPEN_HOLD_TIME);
    body.put_slice(&bgp_id.octets());
    body.put_u8((capabilities.len() + 2) as u8); // optional parameters length
    body.put_u8(2); // parameter type: capabilities
    body.put_u8(capabilities.len() as u8);
    body.put_slice(&capabilities);

    bgp_message_frame(BGP_MSG_TYPE_OPEN, &body)
}

/// One path attribute, flags and value untouched.
#[derive(Debug, Clone)]
pub struct RawAttribute {
    pub flags: u8,
    pub attr_type: u8,
    pub value: Bytes,
}

/// Split a raw attribute blob into individual attributes.
pub fn split_attributes(mut data: Bytes) -> Result<Vec<RawAttribute>, ParserError> {
    let mut attributes = vec![];
    while data.remaining() > 0 {
        if data.remaining() < 3 {
            return Err(ParserError::TruncatedMsg(
                "truncated path attribute header".to_string(),
            ));
        }
        let flags = data.get_u8();
        let attr_type = data.get_u8();
        let length = match flags & ATTR_FLAG_EXTENDED_LENGTH {
            0 => data.get_u8() as usize,
            _ => {
                if data.remaining() < 2 {
                    return Err(ParserError::TruncatedMsg(
                        "truncated extended attribute length".to_string(),
                    ));
                }
                data.get_u16() as usize
            }
        };
        if data.remaining() < length {
            return Err(ParserError::TruncatedMsg(format!(
                "path attribute {attr_type} overruns attribute blob: want {length}, have {}",
                data.remaining()
            )));
        }
        let value = data.split_to(length);
        attributes.push(RawAttribute {
            flags,
            attr_type,
            value,
        });
    }
    Ok(attributes)
}

fn put_attribute(out: &mut BytesMut, flags: u8, attr_type: u8, value: &[u8]) {
    // preserve the original flags; the extended-length bit decides the
    // length field width, forced on when the value no longer fits one octet
    let flags = match value.len() > u8::MAX as usize {
        true => flags | ATTR_FLAG_EXTENDED_LENGTH,
        false => flags,
    };
    out.put_u8(flags);
    out.put_u8(attr_type);
    match flags & ATTR_FLAG_EXTENDED_LENGTH {
        0 => out.put_u8(value.len() as u8),
        _ => out.put_u16(value.len() as u16),
    }
    out.put_slice(value);
}

/// Rebuild the abbreviated TABLE_DUMP_V2 MP_REACH_NLRI (RFC 6396 §4.3.4:
/// next-hop length and next-hop only) into the full RFC 4760 attribute
/// carrying the entry's prefix.
fn rebuild_mp_reach(truncated: &Bytes, prefix: &NetworkPrefix) -> Result<Bytes, ParserError> {
    let Some(&nexthop_len) = truncated.first() else {
        return Err(ParserError::ParseError(
            "empty MP_REACH_NLRI in RIB entry".to_string(),
        ));
    };
    if truncated.len() != 1 + nexthop_len as usize {
        return Err(ParserError::ParseError(format!(
            "unexpected MP_REACH_NLRI form in RIB entry: {} bytes for next hop length {nexthop_len}",
            truncated.len()
        )));
    }
    let nexthop = &truncated[1..];

    let mut value = BytesMut::new();
    value.put_u16(prefix.afi().into());
    value.put_u8(SAFI_UNICAST);
    value.put_u8(nexthop_len);
    value.put_slice(nexthop);
    value.put_u8(0); // reserved
    value.put_slice(&prefix.encode());
    Ok(value.freeze())
}

/// Synthesize a BGP UPDATE announcing `prefix` with the attribute bytes of a
/// TABLE_DUMP_V2 RIB entry.
///
/// IPv4 prefixes travel in the UPDATE's NLRI field; IPv6 prefixes inside a
/// rebuilt MP_REACH_NLRI attribute. Withdrawn routes length is always zero.
pub fn synthesize_rib_update(
    attributes: &Bytes,
    prefix: &NetworkPrefix,
) -> Result<Bytes, ParserError> {
    let split = split_attributes(attributes.clone())?;

    let mut attr_bytes = BytesMut::new();
    let mut mp_reach_rebuilt = false;
    for attr in &split {
        match attr.attr_type {
            ATTR_TYPE_MP_REACH_NLRI => {
                if prefix.afi() == Afi::Ipv6 {
                    let value = rebuild_mp_reach(&attr.value, prefix)?;
                    put_attribute(
                        &mut attr_bytes,
                        ATTR_FLAG_OPTIONAL,
                        ATTR_TYPE_MP_REACH_NLRI,
                        &value,
                    );
                    mp_reach_rebuilt = true;
                }
                // IPv4 entries carry their reachability in the NLRI field;
                // a leftover MP_REACH would contradict it
            }
            ATTR_TYPE_MP_UNREACH_NLRI => {}
            _ => put_attribute(&mut attr_bytes, attr.flags, attr.attr_type, &attr.value),
        }
    }

    if prefix.afi() == Afi::Ipv6 && !mp_reach_rebuilt {
        return Err(ParserError::ParseError(
            "IPv6 RIB entry carries no MP_REACH_NLRI next hop".to_string(),
        ));
    }

    let mut body = BytesMut::new();
    body.put_u16(0); // withdrawn routes length
    body.put_u16(attr_bytes.len() as u16);
    body.put_slice(&attr_bytes);
    if prefix.afi() == Afi::Ipv4 {
        body.put_slice(&prefix.encode());
    }

    Ok(bgp_message_frame(BGP_MSG_TYPE_UPDATE, &body))
}
