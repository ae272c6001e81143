/*!
BMP session writer: owns the TCP connection to the collector, drains the
bounded frame queue, and guarantees the session-level ordering invariants.

Every (re)connected socket starts with Initiation followed by the Peer-Up
of every currently-announced peer, replayed from the shared registry. Only
then does the writer resume draining the queue, so a collector that lost
the session rebuilds its per-peer view before seeing any Route Monitoring
traffic. The writer remembers which peers it already announced on the
current socket and drops queued Peer-Ups that the registry replay covered;
a Peer-Down clears that memory so a later re-establishment goes through.

A frame in flight when the connection drops is discarded; per-peer ordering
across the reconnect is preserved because the queue order is.
*/
use crate::error::ReplayError;
use crate::replay::{Frame, PeerKey, SessionRegistry};
use crate::supervisor::Shutdown;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::HashSet;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reconnect backoff starts here and doubles up to [MAX_BACKOFF].
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A socket write stuck longer than this counts as a dead collector.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for the queue to drain before Termination.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct SessionWriter {
    host: String,
    port: u16,
    registry: Arc<SessionRegistry>,
    rx: Receiver<Frame>,
    shutdown: Shutdown,
}

impl SessionWriter {
    pub fn new(
        host: String,
        port: u16,
        registry: Arc<SessionRegistry>,
        rx: Receiver<Frame>,
        shutdown: Shutdown,
    ) -> SessionWriter {
        SessionWriter {
            host,
            port,
            registry,
            rx,
            shutdown,
        }
    }

    /// Run until shutdown: connect, announce, drain, reconnect on failure.
    pub fn run(&self) -> Result<(), ReplayError> {
        'session: loop {
            let mut stream = match self.connect() {
                Some(stream) => stream,
                None => {
                    // shutdown while never connected: nothing to terminate
                    return Ok(());
                }
            };
            let mut announced = HashSet::new();
            if let Err(e) = self.announce(&mut stream, &mut announced) {
                log::warn!("collector connection lost during announcement: {e}");
                continue 'session;
            }

            loop {
                if self.shutdown.is_triggered() {
                    self.drain_and_terminate(&mut stream, &mut announced);
                    return Ok(());
                }
                match self.rx.recv_timeout(Duration::from_secs(1)) {
                    Ok(frame) => {
                        if let Err(e) = self.write_frame(&mut stream, &frame, &mut announced) {
                            // the in-flight frame is discarded by design
                            log::warn!("collector write failed, reconnecting: {e}");
                            continue 'session;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        self.drain_and_terminate(&mut stream, &mut announced);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Write one queued frame, reconciling peer lifecycle frames with what
    /// this connection has already announced.
    fn write_frame(
        &self,
        stream: &mut TcpStream,
        frame: &Frame,
        announced: &mut HashSet<PeerKey>,
    ) -> std::io::Result<()> {
        match frame {
            Frame::PeerUp { key, bytes } => {
                if !announced.insert(*key) {
                    // already covered by the registry replay on connect
                    return Ok(());
                }
                stream.write_all(bytes)
            }
            Frame::PeerDown { key, bytes } => {
                announced.remove(key);
                stream.write_all(bytes)
            }
            Frame::Data(bytes) => stream.write_all(bytes),
        }
    }

    /// Block until a connection is established, with bounded exponential
    /// backoff. Returns `None` when shutdown is triggered first.
    fn connect(&self) -> Option<TcpStream> {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if self.shutdown.is_triggered() {
                return None;
            }
            match self.try_connect() {
                Ok(stream) => {
                    log::info!("connected to collector {}:{}", self.host, self.port);
                    return Some(stream);
                }
                Err(e) => {
                    log::warn!(
                        "cannot connect to collector {}:{}, retrying in {}s: {e}",
                        self.host,
                        self.port,
                        backoff.as_secs()
                    );
                    if !self.shutdown.sleep(backoff) {
                        return None;
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    fn try_connect(&self) -> Result<TcpStream, ReplayError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ReplayError::Transport(format!("cannot resolve {}: {e}", self.host)))?
            .collect();
        let addr = addrs.first().ok_or_else(|| {
            ReplayError::Transport(format!("no address found for {}", self.host))
        })?;
        let stream = TcpStream::connect_timeout(addr, CONNECT_TIMEOUT)
            .map_err(|e| ReplayError::Transport(e.to_string()))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// First bytes on every session: Initiation, then the Peer-Up of every
    /// announced peer in announcement order.
    fn announce(
        &self,
        stream: &mut TcpStream,
        announced: &mut HashSet<PeerKey>,
    ) -> Result<(), ReplayError> {
        stream.write_all(&self.registry.initiation())?;
        let peer_ups = self.registry.peer_ups_for_replay();
        if !peer_ups.is_empty() {
            log::info!("re-announcing {} peer(s) to the collector", peer_ups.len());
        }
        for (key, peer_up) in peer_ups {
            stream.write_all(&peer_up)?;
            announced.insert(key);
        }
        Ok(())
    }

    /// Drain remaining frames within the grace period, then send
    /// Termination. Best effort: the collector may already be gone.
    fn drain_and_terminate(&self, stream: &mut TcpStream, announced: &mut HashSet<PeerKey>) {
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while Instant::now() < deadline {
            match self.rx.try_recv() {
                Ok(frame) => {
                    if self.write_frame(stream, &frame, announced).is_err() {
                        return;
                    }
                }
                Err(_) => break,
            }
        }
        if let Err(e) = stream.write_all(&crate::encoder::termination_message()) {
            log::debug!("could not send termination message: {e}");
        }
        log::info!("session to collector closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::initiation_message;
    use crate::replay::router_bgp_id;
    use crossbeam_channel::bounded;
    use std::io::Read;
    use std::net::{IpAddr, Ipv4Addr, TcpListener};
    use std::str::FromStr;

    fn read_frames(stream: &mut TcpStream, want: usize) -> Vec<(u8, Vec<u8>)> {
        let mut frames = vec![];
        while frames.len() < want {
            let mut header = [0u8; 6];
            stream.read_exact(&mut header).unwrap();
            assert_eq!(header[0], 3);
            let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
            let mut body = vec![0u8; length - 6];
            stream.read_exact(&mut body).unwrap();
            frames.push((header[5], body));
        }
        frames
    }

    fn test_peer_key() -> PeerKey {
        PeerKey::new(
            IpAddr::from_str("203.0.113.1").unwrap(),
            crate::models::Asn::new_32bit(65010),
        )
    }

    fn peer_up_frame(registry: &SessionRegistry) -> bytes::Bytes {
        let key = test_peer_key();
        let per_peer = crate::encoder::BmpPerPeerHeader::new(
            key.peer_ip,
            key.peer_asn,
            Ipv4Addr::new(203, 0, 113, 1),
            100,
            0,
        );
        crate::encoder::peer_up_notification(&per_peer, registry.local_bgp_id())
    }

    fn registry_with_peer() -> Arc<SessionRegistry> {
        let registry = Arc::new(SessionRegistry::new(
            initiation_message("test-router"),
            router_bgp_id("test-router"),
        ));
        let peer_up = peer_up_frame(&registry);
        registry.announce(test_peer_key(), peer_up);
        registry
    }

    fn route_monitoring_frame() -> Frame {
        Frame::Data(crate::encoder::bmp_frame(
            crate::encoder::BmpMsgType::RouteMonitoring,
            b"fake-update",
        ))
    }

    #[test]
    fn test_initiation_first_then_peer_ups_then_queue() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let registry = registry_with_peer();
        let (tx, rx) = bounded(16);
        let shutdown = Shutdown::new();
        let writer = SessionWriter::new(
            "127.0.0.1".to_string(),
            port,
            registry,
            rx,
            shutdown.clone(),
        );

        tx.send(route_monitoring_frame()).unwrap();

        let handle = std::thread::spawn(move || writer.run());

        let (mut socket, _) = listener.accept().unwrap();
        let frames = read_frames(&mut socket, 3);
        // Initiation strictly first, Peer-Up before any Route Monitoring
        assert_eq!(frames[0].0, 4);
        assert_eq!(frames[1].0, 3);
        assert_eq!(frames[2].0, 0);

        shutdown.trigger();
        drop(tx);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_queued_peer_up_deduplicated_against_replay() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let registry = registry_with_peer();
        let (tx, rx) = bounded(16);
        let shutdown = Shutdown::new();

        // the processor's queued copy of the Peer-Up the registry already
        // carries, followed by data
        tx.send(Frame::PeerUp {
            key: test_peer_key(),
            bytes: peer_up_frame(&registry),
        })
        .unwrap();
        tx.send(route_monitoring_frame()).unwrap();

        let writer = SessionWriter::new(
            "127.0.0.1".to_string(),
            port,
            registry,
            rx,
            shutdown.clone(),
        );
        let handle = std::thread::spawn(move || writer.run());

        let (mut socket, _) = listener.accept().unwrap();
        let frames = read_frames(&mut socket, 3);
        // exactly one Peer-Up reaches the wire
        assert_eq!(frames[0].0, 4);
        assert_eq!(frames[1].0, 3);
        assert_eq!(frames[2].0, 0);

        shutdown.trigger();
        drop(tx);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_reconnect_reannounces_before_resuming() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let registry = registry_with_peer();
        let (tx, rx) = bounded(16);
        let shutdown = Shutdown::new();
        let writer = SessionWriter::new(
            "127.0.0.1".to_string(),
            port,
            registry,
            rx,
            shutdown.clone(),
        );
        let handle = std::thread::spawn(move || writer.run());

        // first session: read the announcement, then slam the door; the
        // writer notices once its writes bounce off the closed socket
        {
            let (mut socket, _) = listener.accept().unwrap();
            let frames = read_frames(&mut socket, 2);
            assert_eq!(frames[0].0, 4);
            assert_eq!(frames[1].0, 3);
        }

        // keep feeding frames; some die against the closed socket
        let feeder = {
            let tx = tx.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    if tx.send(route_monitoring_frame()).is_err() {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            })
        };

        // second session: Initiation and Peer-Up precede resumed replay
        let (mut socket, _) = listener.accept().unwrap();
        let frames = read_frames(&mut socket, 3);
        assert_eq!(frames[0].0, 4);
        assert_eq!(frames[1].0, 3);
        assert_eq!(frames[2].0, 0);

        shutdown.trigger();
        feeder.join().unwrap();
        drop(tx);
        handle.join().unwrap().unwrap();
    }
}
