/*!
BMP v3 message encoding: common and per-peer headers, the five message
shapes the replay emits, and the synthetic BGP OPEN/UPDATE messages they
embed.
*/
pub mod bgp;
pub mod headers;
pub mod messages;

pub use bgp::{encode_open_message, synthesize_rib_update};
pub use headers::{bmp_frame, BmpMsgType, BmpPerPeerHeader, PeerFlags};
pub use messages::{
    initiation_message, peer_down_notification, peer_up_notification, route_monitoring,
    termination_message,
};
