/*!
Replay processors: the RIB processor announces peers and floods the initial
table once, the UPDATE processor then follows the archive in chronological
order. Both feed encoded BMP frames into the bounded queue drained by the
session writer.
*/
pub mod peers;
pub mod rib;
pub mod updates;

use crate::error::ReplayError;
use crate::models::BgpIdentifier;
use crate::supervisor::Shutdown;
use bytes::Bytes;
use crossbeam_channel::{SendTimeoutError, Sender};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use peers::{PeerKey, SessionRegistry};
pub use rib::RibProcessor;
pub use updates::UpdatesProcessor;

/// Deterministic synthetic BGP-ID for a router name (FNV-1a folded into
/// four octets), so restarts identify the same way to the collector.
pub fn router_bgp_id(router_name: &str) -> BgpIdentifier {
    let mut hash: u32 = 0x811c9dc5;
    for byte in router_name.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    BgpIdentifier::from(hash)
}

/// BGP-ID for peers discovered through BGP4MP records, which carry no
/// identifier of their own: the IPv4 address itself, or the IPv6 address
/// folded into four octets.
pub fn synthetic_peer_bgp_id(peer_ip: &IpAddr) -> BgpIdentifier {
    match peer_ip {
        IpAddr::V4(ip) => *ip,
        IpAddr::V6(ip) => {
            let octets = ip.octets();
            let mut folded = [0u8; 4];
            for (i, byte) in octets.iter().enumerate() {
                folded[i % 4] ^= byte;
            }
            BgpIdentifier::from(folded)
        }
    }
}

/// One entry of the forwarding queue: an encoded BMP frame, tagged with the
/// peer identity for lifecycle frames so the session writer can reconcile
/// queued Peer-Ups with the ones it already replayed from the registry
/// after a reconnect.
#[derive(Debug, Clone)]
pub enum Frame {
    PeerUp { key: PeerKey, bytes: Bytes },
    PeerDown { key: PeerKey, bytes: Bytes },
    Data(Bytes),
}

impl Frame {
    pub fn bytes(&self) -> &Bytes {
        match self {
            Frame::PeerUp { bytes, .. } => bytes,
            Frame::PeerDown { bytes, .. } => bytes,
            Frame::Data(bytes) => bytes,
        }
    }
}

/// Put one encoded frame on the queue, blocking for backpressure while
/// staying responsive to shutdown.
pub(crate) fn enqueue(
    tx: &Sender<Frame>,
    shutdown: &Shutdown,
    frame: Frame,
) -> Result<(), ReplayError> {
    let mut frame = frame;
    loop {
        if shutdown.is_triggered() {
            return Err(ReplayError::ShutdownRequested);
        }
        match tx.send_timeout(frame, Duration::from_secs(1)) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(returned)) => frame = returned,
            Err(SendTimeoutError::Disconnected(_)) => return Err(ReplayError::ShutdownRequested),
        }
    }
}

/// Move a consumed file into the processed directory; quarantined files get
/// a `.bad` suffix so they are never picked up again.
pub(crate) fn move_to_processed(
    path: &Path,
    processed_dir: &Path,
    quarantine: bool,
) -> Result<PathBuf, ReplayError> {
    fs::create_dir_all(processed_dir)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ReplayError::Config(format!("unusable file name: {}", path.display())))?;
    let dest_name = match quarantine {
        true => format!("{file_name}{}", crate::sync::archive::BAD_SUFFIX),
        false => file_name.to_string(),
    };
    let dest = processed_dir.join(dest_name);
    fs::rename(path, &dest)?;
    Ok(dest)
}
