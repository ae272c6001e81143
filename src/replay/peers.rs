//! Peer announcement registry shared between the replay processors and the
//! session writer.
//!
//! Processors record every Peer-Up they emit; on reconnect the writer
//! replays Initiation plus the recorded Peer-Ups before resuming from the
//! queue, so the collector rebuilds its per-peer view.

use crate::models::{Asn, BgpIdentifier};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

/// Identity of a monitored peer within one replay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub peer_ip: IpAddr,
    pub peer_asn: Asn,
}

impl PeerKey {
    pub fn new(peer_ip: IpAddr, peer_asn: Asn) -> PeerKey {
        PeerKey { peer_ip, peer_asn }
    }
}

#[derive(Default)]
struct Announced {
    /// Peer-Up frames in announcement order, for replay on reconnect.
    order: Vec<(PeerKey, Bytes)>,
    /// Peer state: true while announced, false after a Peer-Down.
    up: HashMap<PeerKey, bool>,
}

/// Session-wide registry: the Initiation frame, the router identity and the
/// set of peers announced so far.
pub struct SessionRegistry {
    initiation: Bytes,
    local_bgp_id: BgpIdentifier,
    announced: Mutex<Announced>,
}

impl SessionRegistry {
    pub fn new(initiation: Bytes, local_bgp_id: BgpIdentifier) -> SessionRegistry {
        SessionRegistry {
            initiation,
            local_bgp_id,
            announced: Mutex::new(Announced::default()),
        }
    }

    pub fn initiation(&self) -> Bytes {
        self.initiation.clone()
    }

    pub fn local_bgp_id(&self) -> BgpIdentifier {
        self.local_bgp_id
    }

    /// Record a Peer-Up. Returns false when the peer was already announced
    /// and up, in which case the caller should not emit another Peer-Up.
    pub fn announce(&self, key: PeerKey, peer_up: Bytes) -> bool {
        let mut announced = self.announced.lock().unwrap();
        match announced.up.get(&key).copied() {
            Some(true) => false,
            Some(false) => {
                // peer came back after a Peer-Down: refresh the stored frame
                if let Some(entry) = announced.order.iter_mut().find(|(k, _)| *k == key) {
                    entry.1 = peer_up;
                }
                announced.up.insert(key, true);
                true
            }
            None => {
                announced.order.push((key, peer_up));
                announced.up.insert(key, true);
                true
            }
        }
    }

    /// Record a Peer-Down. Returns false when the peer was never announced
    /// or is already down.
    pub fn mark_down(&self, key: &PeerKey) -> bool {
        let mut announced = self.announced.lock().unwrap();
        match announced.up.get_mut(key) {
            Some(state) if *state => {
                *state = false;
                true
            }
            _ => false,
        }
    }

    pub fn is_up(&self, key: &PeerKey) -> bool {
        self.announced.lock().unwrap().up.get(key) == Some(&true)
    }

    /// Peer-Up frames of all currently-up peers, in announcement order.
    pub fn peer_ups_for_replay(&self) -> Vec<(PeerKey, Bytes)> {
        let announced = self.announced.lock().unwrap();
        announced
            .order
            .iter()
            .filter(|(key, _)| announced.up.get(key) == Some(&true))
            .map(|(key, bytes)| (*key, bytes.clone()))
            .collect()
    }
}
