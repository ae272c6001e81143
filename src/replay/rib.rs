//! RIB replay: runs once against the oldest staged RIB dump, announces
//! every peer from the PEER_INDEX_TABLE, then floods the full table as
//! Route Monitoring messages.

use crate::encoder::{peer_up_notification, route_monitoring, synthesize_rib_update, BmpPerPeerHeader};
use crate::error::ReplayError;
use crate::models::{MrtMessage, PeerIndexTable, TableDumpV2Message};
use crate::parser::MrtReader;
use crate::replay::{enqueue, move_to_processed, Frame, PeerKey, SessionRegistry};
use crate::supervisor::Shutdown;
use crate::sync::archive::StagedFile;
use crossbeam_channel::Sender;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct RibProcessor<'a> {
    registry: &'a Arc<SessionRegistry>,
    tx: &'a Sender<Frame>,
    shutdown: &'a Shutdown,
    processed_dir: &'a Path,
    delay_after_peer_ups: Duration,
}

impl<'a> RibProcessor<'a> {
    pub fn new(
        registry: &'a Arc<SessionRegistry>,
        tx: &'a Sender<Frame>,
        shutdown: &'a Shutdown,
        processed_dir: &'a Path,
        delay_after_peer_ups: Duration,
    ) -> RibProcessor<'a> {
        RibProcessor {
            registry,
            tx,
            shutdown,
            processed_dir,
            delay_after_peer_ups,
        }
    }

    /// Replay one RIB dump, then move it to the processed directory. A
    /// decode error mid-file forwards what was already decoded and
    /// quarantines the file; the pipeline keeps going either way.
    pub fn process(&self, file: &StagedFile) -> Result<(), ReplayError> {
        log::info!("replaying RIB dump {}", file.path.display());
        let mut reader = MrtReader::from_path(&file.path)?;

        let mut peer_table: Option<PeerIndexTable> = None;
        let mut forwarded: u64 = 0;

        loop {
            if self.shutdown.is_triggered() {
                return Err(ReplayError::ShutdownRequested);
            }
            let record = match reader.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(error) => {
                    log::error!(
                        "malformed record in {}, quarantining file: {error}",
                        file.path.display()
                    );
                    move_to_processed(&file.path, self.processed_dir, true)?;
                    return Ok(());
                }
            };

            let (timestamp_sec, timestamp_usec) = record.timestamp();
            match record.message {
                MrtMessage::TableDumpV2Message(TableDumpV2Message::PeerIndexTable(table)) => {
                    if peer_table.is_some() {
                        log::warn!("duplicate PEER_INDEX_TABLE in {}", file.path.display());
                        continue;
                    }
                    self.announce_peers(&table, timestamp_sec, timestamp_usec)?;
                    peer_table = Some(table);
                    // let the collector register the peers before the flood
                    if !self.shutdown.sleep(self.delay_after_peer_ups) {
                        return Err(ReplayError::ShutdownRequested);
                    }
                }
                MrtMessage::TableDumpV2Message(TableDumpV2Message::RibAfi(entries)) => {
                    let Some(table) = &peer_table else {
                        log::error!(
                            "RIB entries precede the peer index table in {}, quarantining file",
                            file.path.display()
                        );
                        move_to_processed(&file.path, self.processed_dir, true)?;
                        return Ok(());
                    };
                    for entry in &entries.rib_entries {
                        let Some(peer) = table.get_peer_by_index(entry.peer_index) else {
                            log::warn!(
                                "RIB entry references unknown peer index {}, skipping",
                                entry.peer_index
                            );
                            continue;
                        };
                        let update = match synthesize_rib_update(&entry.attributes, &entries.prefix)
                        {
                            Ok(update) => update,
                            Err(error) => {
                                log::warn!(
                                    "cannot synthesize update for {} entry {}: {error}",
                                    entries.prefix,
                                    entry.peer_index
                                );
                                continue;
                            }
                        };
                        let per_peer = BmpPerPeerHeader::for_peer(peer, entry.originated_time, 0);
                        enqueue(
                            self.tx,
                            self.shutdown,
                            Frame::Data(route_monitoring(&per_peer, &update)),
                        )?;
                        forwarded += 1;
                    }
                }
                MrtMessage::Bgp4Mp(_) => {
                    log::debug!("ignoring BGP4MP record inside RIB dump");
                }
            }
        }

        log::info!(
            "RIB replay of {} complete, {forwarded} route monitoring message(s) forwarded",
            file.path.display()
        );
        move_to_processed(&file.path, self.processed_dir, false)?;
        Ok(())
    }

    fn announce_peers(
        &self,
        table: &PeerIndexTable,
        timestamp_sec: u32,
        timestamp_usec: u32,
    ) -> Result<(), ReplayError> {
        log::info!("announcing {} peer(s) from peer index table", table.peers.len());
        for peer in &table.peers {
            let per_peer = BmpPerPeerHeader::for_peer(peer, timestamp_sec, timestamp_usec);
            let peer_up = peer_up_notification(&per_peer, self.registry.local_bgp_id());
            let key = PeerKey::new(peer.peer_ip, peer.peer_asn);
            if self.registry.announce(key, peer_up.clone()) {
                enqueue(self.tx, self.shutdown, Frame::PeerUp { key, bytes: peer_up })?;
            }
        }
        Ok(())
    }
}
