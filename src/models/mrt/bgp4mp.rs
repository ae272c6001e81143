//! MRT BGP4MP structs.

use crate::models::network::*;
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::net::IpAddr;

/// BGP4MP message types.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u16)]
pub enum Bgp4MpType {
    StateChange = 0,
    Message = 1,
    MessageAs4 = 4,
    StateChangeAs4 = 5,
    MessageLocal = 6,
    MessageAs4Local = 7,
    MessageAddpath = 8,
    MessageAs4Addpath = 9,
    MessageLocalAddpath = 10,
    MessageLocalAs4Addpath = 11,
}

/// BGP states enum.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u16)]
pub enum BgpState {
    Idle = 1,
    Connect = 2,
    Active = 3,
    OpenSent = 4,
    OpenConfirm = 5,
    Established = 6,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Bgp4Mp {
    StateChange(Bgp4MpStateChange),
    Message(Bgp4MpMessage),
}

/// BGP4MP state change message.
#[derive(Debug, Clone, PartialEq)]
pub struct Bgp4MpStateChange {
    pub msg_type: Bgp4MpType,
    pub peer_asn: Asn,
    pub local_asn: Asn,
    pub interface_index: u16,
    pub peer_addr: IpAddr,
    pub local_addr: IpAddr,
    pub old_state: BgpState,
    pub new_state: BgpState,
}

/// BGP4MP message.
///
/// The wrapped BGP message is carried as raw bytes: the replay forwards it
/// byte-for-byte inside a BMP Route Monitoring frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Bgp4MpMessage {
    pub msg_type: Bgp4MpType,
    pub peer_asn: Asn,
    pub local_asn: Asn,
    pub interface_index: u16,
    pub afi: Afi,
    pub peer_ip: IpAddr,
    pub local_ip: IpAddr,
    pub bgp_message: Bytes,
}

impl Bgp4MpMessage {
    /// BGP message type octet (position 18, after marker and length).
    pub fn bgp_message_type(&self) -> Option<u8> {
        self.bgp_message.get(18).copied()
    }

    /// True when the wrapped message is a BGP UPDATE.
    pub fn is_update(&self) -> bool {
        self.bgp_message_type() == Some(2)
    }
}
