//! UPDATE replay: follows the staged archive in chronological order,
//! forwarding BGP4MP messages as Route Monitoring frames and translating
//! state changes into peer lifecycle events.

use crate::encoder::{
    peer_down_notification, peer_up_notification, route_monitoring, BmpPerPeerHeader,
};
use crate::error::ReplayError;
use crate::models::{Bgp4Mp, Bgp4MpMessage, Bgp4MpStateChange, BgpState, MrtMessage};
use crate::parser::MrtReader;
use crate::replay::{
    enqueue, move_to_processed, synthetic_peer_bgp_id, Frame, PeerKey, SessionRegistry,
};
use crate::supervisor::Shutdown;
use crate::sync::archive::{scan_staged_dir, MrtFileKind, StagedFile};
use chrono::NaiveDateTime;
use crossbeam_channel::Sender;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How long to wait before re-scanning the master directory when no new
/// file is staged yet.
const SCAN_INTERVAL: Duration = Duration::from_secs(5);

pub struct UpdatesProcessor<'a> {
    registry: &'a Arc<SessionRegistry>,
    tx: &'a Sender<Frame>,
    shutdown: &'a Shutdown,
    master_dir: &'a Path,
    processed_dir: &'a Path,
    emit_peer_down: bool,
}

impl<'a> UpdatesProcessor<'a> {
    pub fn new(
        registry: &'a Arc<SessionRegistry>,
        tx: &'a Sender<Frame>,
        shutdown: &'a Shutdown,
        master_dir: &'a Path,
        processed_dir: &'a Path,
        emit_peer_down: bool,
    ) -> UpdatesProcessor<'a> {
        UpdatesProcessor {
            registry,
            tx,
            shutdown,
            master_dir,
            processed_dir,
            emit_peer_down,
        }
    }

    /// Consume staged UPDATES files in timestamp order, forever. Sleeps and
    /// re-scans when the synchronizer has nothing new staged.
    pub fn run(&self, mut last_processed: Option<NaiveDateTime>) -> Result<(), ReplayError> {
        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            let next = self.next_file(last_processed)?;
            match next {
                Some(file) => {
                    match self.process_file(&file) {
                        Ok(()) | Err(ReplayError::MalformedMrt { .. }) => {}
                        Err(e) => return Err(e),
                    }
                    last_processed = Some(file.timestamp);
                }
                None => {
                    if !self.shutdown.sleep(SCAN_INTERVAL) {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// The oldest staged UPDATES file newer than the last processed one.
    fn next_file(
        &self,
        last_processed: Option<NaiveDateTime>,
    ) -> Result<Option<StagedFile>, ReplayError> {
        let files = scan_staged_dir(self.master_dir)?;
        Ok(files
            .into_iter()
            .find(|f| {
                f.kind == MrtFileKind::Updates
                    && last_processed.is_none_or(|ts| f.timestamp > ts)
            }))
    }

    /// Replay one UPDATES file, then move it to processed. A malformed
    /// record forwards everything decoded so far and quarantines the file.
    pub fn process_file(&self, file: &StagedFile) -> Result<(), ReplayError> {
        log::info!("replaying updates file {}", file.path.display());
        let mut reader = MrtReader::from_path(&file.path)?;
        let mut forwarded: u64 = 0;

        loop {
            if self.shutdown.is_triggered() {
                return Err(ReplayError::ShutdownRequested);
            }
            match reader.next_record() {
                Ok(Some(record)) => {
                    let (sec, usec) = record.timestamp();
                    match record.message {
                        MrtMessage::Bgp4Mp(Bgp4Mp::Message(msg)) => {
                            forwarded += self.forward_message(&msg, sec, usec)?;
                        }
                        MrtMessage::Bgp4Mp(Bgp4Mp::StateChange(change)) => {
                            self.apply_state_change(&change, sec, usec)?;
                        }
                        MrtMessage::TableDumpV2Message(_) => {
                            log::debug!("ignoring TABLE_DUMP_V2 record inside updates file");
                        }
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    log::error!(
                        "malformed record in {}, quarantining file: {error}",
                        file.path.display()
                    );
                    let dest = move_to_processed(&file.path, self.processed_dir, true)?;
                    return Err(ReplayError::MalformedMrt {
                        path: dest,
                        error,
                    });
                }
            }
        }

        log::info!(
            "updates replay of {} complete, {forwarded} message(s) forwarded",
            file.path.display()
        );
        move_to_processed(&file.path, self.processed_dir, false)?;
        Ok(())
    }

    /// Forward one BGP4MP message, announcing its peer first if this is the
    /// first time the session sees it.
    fn forward_message(
        &self,
        msg: &Bgp4MpMessage,
        sec: u32,
        usec: u32,
    ) -> Result<u64, ReplayError> {
        if !msg.is_update() {
            log::debug!(
                "skipping non-UPDATE BGP message (type {:?}) from {}",
                msg.bgp_message_type(),
                msg.peer_ip
            );
            return Ok(0);
        }

        let key = PeerKey::new(msg.peer_ip, msg.peer_asn);
        let per_peer = BmpPerPeerHeader::new(
            msg.peer_ip,
            msg.peer_asn,
            synthetic_peer_bgp_id(&msg.peer_ip),
            sec,
            usec,
        );
        self.ensure_announced(&key, &per_peer)?;
        enqueue(
            self.tx,
            self.shutdown,
            Frame::Data(route_monitoring(&per_peer, &msg.bgp_message)),
        )?;
        Ok(1)
    }

    /// Translate a BGP4MP state change: leaving Established downs the peer,
    /// reaching Established re-arms its announcement.
    fn apply_state_change(
        &self,
        change: &Bgp4MpStateChange,
        sec: u32,
        usec: u32,
    ) -> Result<(), ReplayError> {
        let key = PeerKey::new(change.peer_addr, change.peer_asn);
        let per_peer = BmpPerPeerHeader::new(
            change.peer_addr,
            change.peer_asn,
            synthetic_peer_bgp_id(&change.peer_addr),
            sec,
            usec,
        );
        match change.new_state {
            BgpState::Established => {
                self.ensure_announced(&key, &per_peer)?;
            }
            _ => {
                if self.emit_peer_down && self.registry.mark_down(&key) {
                    log::info!(
                        "peer {} as {} left Established ({:?} -> {:?})",
                        change.peer_addr,
                        change.peer_asn,
                        change.old_state,
                        change.new_state
                    );
                    enqueue(
                        self.tx,
                        self.shutdown,
                        Frame::PeerDown {
                            key,
                            bytes: peer_down_notification(&per_peer),
                        },
                    )?;
                }
            }
        }
        Ok(())
    }

    fn ensure_announced(
        &self,
        key: &PeerKey,
        per_peer: &BmpPerPeerHeader,
    ) -> Result<(), ReplayError> {
        if self.registry.is_up(key) {
            return Ok(());
        }
        let peer_up = peer_up_notification(per_peer, self.registry.local_bgp_id());
        if self.registry.announce(*key, peer_up.clone()) {
            log::info!("announcing peer {} as {}", key.peer_ip, key.peer_asn);
            enqueue(
                self.tx,
                self.shutdown,
                Frame::PeerUp {
                    key: *key,
                    bytes: peer_up,
                },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::initiation_message;
    use crate::replay::router_bgp_id;
    use bytes::{BufMut, Bytes, BytesMut};
    use crossbeam_channel::bounded;
    use std::fs;
    use std::net::Ipv4Addr;

    fn mrt_record(entry_type: u16, subtype: u16, timestamp: u32, body: &[u8]) -> Vec<u8> {
        let mut record = BytesMut::new();
        record.put_u32(timestamp);
        record.put_u16(entry_type);
        record.put_u16(subtype);
        record.put_u32(body.len() as u32);
        record.put_slice(body);
        record.to_vec()
    }

    fn bgp_update(body_len: usize) -> Vec<u8> {
        // minimal UPDATE: no withdrawals, no attributes, padded NLRI
        let mut msg = vec![0xff; 16];
        let total = 19 + 4 + body_len;
        msg.put_u16(total as u16);
        msg.put_u8(2); // UPDATE
        msg.put_u16(0); // withdrawn routes length
        msg.put_u16(0); // total path attribute length
        msg.extend(std::iter::repeat_n(0u8, body_len));
        msg
    }

    fn bgp4mp_message_as4(peer_ip: Ipv4Addr, peer_asn: u32, bgp: &[u8]) -> Vec<u8> {
        let mut body = BytesMut::new();
        body.put_u32(peer_asn);
        body.put_u32(64512); // local asn
        body.put_u16(0);
        body.put_u16(1); // afi ipv4
        body.put_u32(u32::from(peer_ip));
        body.put_u32(u32::from(Ipv4Addr::new(10, 255, 0, 1)));
        body.put_slice(bgp);
        body.to_vec()
    }

    fn bgp4mp_state_change_as4(
        peer_ip: Ipv4Addr,
        peer_asn: u32,
        old_state: u16,
        new_state: u16,
    ) -> Vec<u8> {
        let mut body = BytesMut::new();
        body.put_u32(peer_asn);
        body.put_u32(64512);
        body.put_u16(0);
        body.put_u16(1);
        body.put_u32(u32::from(peer_ip));
        body.put_u32(u32::from(Ipv4Addr::new(10, 255, 0, 1)));
        body.put_u16(old_state);
        body.put_u16(new_state);
        body.to_vec()
    }

    struct Harness {
        registry: Arc<SessionRegistry>,
        master: tempfile::TempDir,
        processed: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Harness {
            Harness {
                registry: Arc::new(SessionRegistry::new(
                    initiation_message("test-router"),
                    router_bgp_id("test-router"),
                )),
                master: tempfile::tempdir().unwrap(),
                processed: tempfile::tempdir().unwrap(),
            }
        }

        fn process(&self, name: &str, bytes: &[u8]) -> (Vec<Bytes>, Result<(), ReplayError>) {
            let path = self.master.path().join(name);
            fs::write(&path, bytes).unwrap();
            let (tx, rx) = bounded(1024);
            let shutdown = Shutdown::new();
            let processor = UpdatesProcessor::new(
                &self.registry,
                &tx,
                &shutdown,
                self.master.path(),
                self.processed.path(),
                true,
            );
            let staged = StagedFile {
                path,
                kind: MrtFileKind::Updates,
                timestamp: NaiveDateTime::default(),
            };
            let result = processor.process_file(&staged);
            drop(tx);
            let messages = rx.iter().map(|f| f.bytes().clone()).collect();
            (messages, result)
        }
    }

    #[test]
    fn test_peer_up_precedes_route_monitoring() {
        let harness = Harness::new();
        let peer = Ipv4Addr::new(203, 0, 113, 1);
        let update = bgp_update(0);
        let mut file = mrt_record(16, 4, 1_600_000_000, &bgp4mp_message_as4(peer, 65010, &update));
        file.extend(mrt_record(16, 4, 1_600_000_060, &bgp4mp_message_as4(peer, 65010, &update)));

        let (messages, result) = harness.process("updates.20211001.0000", &file);
        result.unwrap();

        // one Peer-Up for the new peer, then both Route Monitoring frames
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0][5], 3);
        assert_eq!(messages[1][5], 0);
        assert_eq!(messages[2][5], 0);
        // the BGP UPDATE travels byte-for-byte
        assert_eq!(&messages[1][6 + 42..], update.as_slice());
        assert!(harness.processed.path().join("updates.20211001.0000").exists());
    }

    #[test]
    fn test_state_change_down_then_up() {
        let harness = Harness::new();
        let peer = Ipv4Addr::new(203, 0, 113, 2);
        let update = bgp_update(0);
        let mut file = mrt_record(16, 4, 100, &bgp4mp_message_as4(peer, 65020, &update));
        // leaves Established
        file.extend(mrt_record(16, 5, 160, &bgp4mp_state_change_as4(peer, 65020, 6, 1)));
        // comes back
        file.extend(mrt_record(16, 5, 220, &bgp4mp_state_change_as4(peer, 65020, 1, 6)));
        file.extend(mrt_record(16, 4, 280, &bgp4mp_message_as4(peer, 65020, &update)));

        let (messages, result) = harness.process("updates.20211001.0000", &file);
        result.unwrap();

        let types: Vec<u8> = messages.iter().map(|m| m[5]).collect();
        // Peer-Up, RM, Peer-Down, Peer-Up, RM
        assert_eq!(types, vec![3, 0, 2, 3, 0]);
    }

    #[test]
    fn test_malformed_second_record_quarantines_file() {
        let harness = Harness::new();
        let peer = Ipv4Addr::new(203, 0, 113, 3);
        let update = bgp_update(0);
        let mut file = mrt_record(16, 4, 100, &bgp4mp_message_as4(peer, 65030, &update));
        // second record declares a length exceeding the remainder
        let mut broken = BytesMut::new();
        broken.put_u32(160);
        broken.put_u16(16);
        broken.put_u16(4);
        broken.put_u32(10_000);
        broken.put_slice(&[0u8; 8]);
        file.extend(broken);

        let (messages, result) = harness.process("updates.20211001.0015", &file);
        assert!(matches!(result, Err(ReplayError::MalformedMrt { .. })));

        // the first record was forwarded (Peer-Up + RM)
        assert_eq!(messages.len(), 2);
        assert!(harness
            .processed
            .path()
            .join("updates.20211001.0015.bad")
            .exists());
        assert!(!harness.master.path().join("updates.20211001.0015").exists());
    }

    #[test]
    fn test_non_update_bgp_messages_skipped() {
        let harness = Harness::new();
        let peer = Ipv4Addr::new(203, 0, 113, 4);
        // a KEEPALIVE must not produce any BMP output
        let mut keepalive = vec![0xff; 16];
        keepalive.put_u16(19);
        keepalive.put_u8(4);
        let file = mrt_record(16, 4, 100, &bgp4mp_message_as4(peer, 65040, &keepalive));

        let (messages, result) = harness.process("updates.20211001.0000", &file);
        result.unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn test_next_file_ordering() {
        let harness = Harness::new();
        for name in [
            "updates.20211001.0030",
            "updates.20211001.0000",
            "updates.20211001.0015",
        ] {
            fs::write(harness.master.path().join(name), b"").unwrap();
        }
        let (tx, _rx) = bounded(1);
        let shutdown = Shutdown::new();
        let processor = UpdatesProcessor::new(
            &harness.registry,
            &tx,
            &shutdown,
            harness.master.path(),
            harness.processed.path(),
            true,
        );

        let first = processor.next_file(None).unwrap().unwrap();
        assert!(first.path.ends_with("updates.20211001.0000"));

        let after = processor.next_file(Some(first.timestamp)).unwrap().unwrap();
        assert!(after.path.ends_with("updates.20211001.0015"));
    }
}
