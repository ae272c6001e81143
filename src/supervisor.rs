/*!
Pipeline supervision: worker startup order, shared shutdown flag, and the
RIB-to-UPDATES handoff.

Startup order is writer, synchronizer, then the replay processors, so the
queue always has a consumer and the master directory always has a single
writer. Shutdown is a shared flag every worker polls at its loop
boundaries; blocking operations use timed waits so the flag is observed
within about a second.
*/
use crate::config::Config;
use crate::encoder::initiation_message;
use crate::error::ReplayError;
use crate::replay::{router_bgp_id, Frame, RibProcessor, SessionRegistry, UpdatesProcessor};
use crate::session::SessionWriter;
use crate::sync::archive::{scan_staged_dir, MrtFileKind, StagedFile};
use crate::sync::{MirrorSource, Synchronizer};
use chrono::NaiveDateTime;
use crossbeam_channel::bounded;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Cooperative cancellation flag shared by every worker.
#[derive(Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Shutdown {
        Shutdown::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep in short slices, waking early on shutdown. Returns false when
    /// shutdown was triggered before the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            if self.is_triggered() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(remaining.min(Duration::from_millis(200)));
        }
        !self.is_triggered()
    }
}

/// Where the MRT files for the replayed router come from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Files are provided locally in the master directory.
    Local,
    /// Files are synchronized from a public mirror.
    Mirror(MirrorSource),
}

/// Wire up and run the whole pipeline for one router until shutdown.
pub fn run_replay(
    config: &Config,
    router: &str,
    source: DataSource,
    shutdown: Shutdown,
) -> Result<(), ReplayError> {
    let master_dir = config.router_data.master_directory_path.join(router);
    let processed_dir = config.router_data.processed_directory_path.join(router);
    fs::create_dir_all(&master_dir)?;
    fs::create_dir_all(&processed_dir)?;

    let registry = Arc::new(SessionRegistry::new(
        initiation_message(router),
        router_bgp_id(router),
    ));
    let (tx, rx) = bounded(config.router_data.max_queue_size);

    let writer = SessionWriter::new(
        config.collector.host.clone(),
        config.collector.port,
        Arc::clone(&registry),
        rx,
        shutdown.clone(),
    );
    let writer_shutdown = shutdown.clone();
    let writer_handle = thread::Builder::new()
        .name("session-writer".to_string())
        .spawn(move || {
            if let Err(e) = writer.run() {
                log::error!("session writer failed: {e}");
                writer_shutdown.trigger();
            }
        })
        .expect("spawning the writer thread cannot fail");

    let sync_handle = match source {
        DataSource::Local => None,
        DataSource::Mirror(mirror) => {
            let synchronizer = Synchronizer::new(
                mirror,
                router.to_string(),
                master_dir.clone(),
                processed_dir.clone(),
                config.router_data.timestamp_interval_limit,
                config.router_data.ignore_timestamp_interval_abnormality,
                shutdown.clone(),
            );
            Some(
                thread::Builder::new()
                    .name("synchronizer".to_string())
                    .spawn(move || synchronizer.run())
                    .expect("spawning the synchronizer thread cannot fail"),
            )
        }
    };

    // replay runs on the supervisor thread: RIB once, then UPDATES forever
    let result = run_processors(
        config,
        &registry,
        &tx,
        &shutdown,
        &master_dir,
        &processed_dir,
    );
    match &result {
        Ok(()) | Err(ReplayError::ShutdownRequested) => {}
        Err(e) => log::error!("replay pipeline failed: {e}"),
    }

    // unwind everyone else, then let the writer drain and terminate
    shutdown.trigger();
    drop(tx);
    if let Some(handle) = sync_handle {
        let _ = handle.join();
    }
    let _ = writer_handle.join();

    match result {
        Err(ReplayError::ShutdownRequested) => Ok(()),
        other => other,
    }
}

fn run_processors(
    config: &Config,
    registry: &Arc<SessionRegistry>,
    tx: &crossbeam_channel::Sender<Frame>,
    shutdown: &Shutdown,
    master_dir: &Path,
    processed_dir: &Path,
) -> Result<(), ReplayError> {
    let processed = scan_staged_dir(processed_dir)?;
    let rib_already_replayed = processed.iter().any(|f| f.kind == MrtFileKind::Rib);
    let mut updates_baseline: Option<NaiveDateTime> = processed
        .iter()
        .filter(|f| f.kind == MrtFileKind::Updates)
        .map(|f| f.timestamp)
        .max();

    if rib_already_replayed {
        log::info!("RIB already replayed in an earlier run, resuming with updates");
    } else {
        let Some(rib) = wait_for_rib(shutdown, master_dir)? else {
            return Ok(()); // shutdown while waiting
        };
        let rib_processor = RibProcessor::new(
            registry,
            tx,
            shutdown,
            processed_dir,
            Duration::from_secs(config.collector.delay_after_init_and_peer_ups),
        );
        rib_processor.process(&rib)?;
        // updates sharing the RIB's timestamp still need to replay after it
        let baseline = rib.timestamp - chrono::Duration::seconds(1);
        if updates_baseline.is_none_or(|ts| ts < baseline) {
            updates_baseline = Some(baseline);
        }
    }

    let updates_processor = UpdatesProcessor::new(
        registry,
        tx,
        shutdown,
        master_dir,
        processed_dir,
        config.router_data.emit_peer_down,
    );
    updates_processor.run(updates_baseline)
}

/// Block until the synchronizer (or the operator) stages a RIB dump.
fn wait_for_rib(
    shutdown: &Shutdown,
    master_dir: &Path,
) -> Result<Option<StagedFile>, ReplayError> {
    let mut logged = false;
    loop {
        if shutdown.is_triggered() {
            return Ok(None);
        }
        let staged = scan_staged_dir(master_dir)?;
        if let Some(rib) = staged.into_iter().find(|f| f.kind == MrtFileKind::Rib) {
            return Ok(Some(rib));
        }
        if !logged {
            log::info!("waiting for a RIB dump in {}", master_dir.display());
            logged = true;
        }
        if !shutdown.sleep(Duration::from_secs(1)) {
            return Ok(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_sleep_interrupted() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.trigger();
        });
        let start = Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_shutdown_sleep_completes() {
        let shutdown = Shutdown::new();
        assert!(shutdown.sleep(Duration::from_millis(10)));
    }
}
