//! BMP v3 message construction.
//!
//! <https://www.rfc-editor.org/rfc/rfc7854>

use crate::encoder::bgp::encode_open_message;
use crate::encoder::headers::{bmp_frame, put_ip_16_bytes, BmpMsgType, BmpPerPeerHeader};
use crate::models::BgpIdentifier;
use bytes::{BufMut, Bytes, BytesMut};
use std::net::IpAddr;

/// Initiation and Peer-Up information TLV types.
///
/// <https://www.iana.org/assignments/bmp-parameters/bmp-parameters.xhtml#initiation-peer-up-tlvs>
const INFO_TLV_SYS_DESCR: u16 = 1;
const INFO_TLV_SYS_NAME: u16 = 2;

/// Termination information TLV type and its "administratively closed" code.
const TERM_TLV_REASON: u16 = 1;
const TERM_REASON_ADMIN_CLOSED: u16 = 0;

const BGP_PORT: u16 = 179;

fn put_info_tlv(bytes: &mut BytesMut, info_type: u16, value: &str) {
    bytes.put_u16(info_type);
    bytes.put_u16(value.len() as u16);
    bytes.put_slice(value.as_bytes());
}

/// Initiation message announcing the replay session.
///
/// sysDescr carries `openbmp-mrt2bmp/<router-name>` and sysName the router
/// name, which is how the collector labels the feed.
pub fn initiation_message(router_name: &str) -> Bytes {
    let mut body = BytesMut::new();
    put_info_tlv(
        &mut body,
        INFO_TLV_SYS_DESCR,
        &format!("openbmp-mrt2bmp/{router_name}"),
    );
    put_info_tlv(&mut body, INFO_TLV_SYS_NAME, router_name);
    bmp_frame(BmpMsgType::InitiationMessage, &body)
}

/// Peer-Up notification with synthetic OPEN messages.
///
/// The local side of the fabricated session is the router's synthetic
/// BGP-ID; both OPENs advertise the peer's AS so the collector derives a
/// consistent ASN for the feed.
pub fn peer_up_notification(
    per_peer: &BmpPerPeerHeader,
    local_bgp_id: BgpIdentifier,
) -> Bytes {
    let mut body = BytesMut::new();
    body.put_slice(&per_peer.encode());
    put_ip_16_bytes(&mut body, IpAddr::V4(local_bgp_id));
    body.put_u16(BGP_PORT); // local port
    body.put_u16(BGP_PORT); // remote port
    // sent OPEN, then received OPEN
    body.put_slice(&encode_open_message(per_peer.peer_asn, local_bgp_id));
    body.put_slice(&encode_open_message(per_peer.peer_asn, per_peer.peer_bgp_id));
    bmp_frame(BmpMsgType::PeerUpNotification, &body)
}

/// Peer-Down notification, reason 2: local system closed, no notification.
///
/// Used when a BGP4MP state change reports the peer leaving Established.
pub fn peer_down_notification(per_peer: &BmpPerPeerHeader) -> Bytes {
    let mut body = BytesMut::new();
    body.put_slice(&per_peer.encode());
    body.put_u8(2); // reason
    body.put_u16(0); // FSM event code: unknown
    bmp_frame(BmpMsgType::PeerDownNotification, &body)
}

/// Route Monitoring message wrapping a BGP UPDATE byte-for-byte.
pub fn route_monitoring(per_peer: &BmpPerPeerHeader, bgp_update: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(42 + bgp_update.len());
    body.put_slice(&per_peer.encode());
    body.put_slice(bgp_update);
    bmp_frame(BmpMsgType::RouteMonitoring, &body)
}

/// Termination message for graceful shutdown.
pub fn termination_message() -> Bytes {
    let mut body = BytesMut::new();
    body.put_u16(TERM_TLV_REASON);
    body.put_u16(2);
    body.put_u16(TERM_REASON_ADMIN_CLOSED);
    bmp_frame(BmpMsgType::TerminationMessage, &body)
}
