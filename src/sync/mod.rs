/*!
Archive synchronization: discover per-router MRT files on a public mirror,
download and decompress them into the master directory, and retire the
responsibility of ordering to the embedded filename timestamps.

Two mirrors are supported behind one interface: RouteViews publishes RIB
dumps every two hours and UPDATES every 15 minutes under
`<router>/bgpdata/YYYY.MM/{RIBS,UPDATES}/`; RIPE RIS publishes `bview.*`
and `updates.*` together under `<rrc>/YYYY.MM/`.

Staging is atomic: a file is downloaded decompressed to `<name>.partial`
and renamed once complete, so a file visible to the processors is always
fully written. That rename replaces any cross-worker locking.
*/
pub mod archive;
pub mod http;

use crate::error::ReplayError;
use crate::supervisor::Shutdown;
use self::archive::{newest_known_timestamp, parse_archive_filename, MrtFileKind, PARTIAL_SUFFIX};
use chrono::{Datelike, NaiveDateTime, Utc};
use itertools::Itertools;
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// How often the remote index is polled for new files.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Back off this long after a transport failure before retrying.
const TRANSPORT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Upstream archive mirrors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MirrorSource {
    RouteViews,
    RipeRis,
}

impl MirrorSource {
    pub fn base_url(&self) -> &'static str {
        match self {
            MirrorSource::RouteViews => "http://archive.routeviews.org",
            MirrorSource::RipeRis => "https://data.ris.ripe.net",
        }
    }

    /// The root of a router's archive tree.
    fn router_base(&self, router: &str) -> String {
        match self {
            // route-views2 is the original collector and lives at the
            // archive root rather than under its own directory
            MirrorSource::RouteViews if router == "route-views2" => {
                format!("{}/bgpdata", self.base_url())
            }
            MirrorSource::RouteViews => format!("{}/{router}/bgpdata", self.base_url()),
            MirrorSource::RipeRis => format!("{}/{router}", self.base_url()),
        }
    }

    /// Index pages to list for one `YYYY.MM` month.
    fn monthly_index_urls(&self, router: &str, month: &str) -> Vec<String> {
        let base = self.router_base(router);
        match self {
            MirrorSource::RouteViews => vec![
                format!("{base}/{month}/RIBS/"),
                format!("{base}/{month}/UPDATES/"),
            ],
            MirrorSource::RipeRis => vec![format!("{base}/{month}/")],
        }
    }

    /// Routers this mirror currently publishes, scraped from its root index.
    pub fn list_routers(&self) -> Result<Vec<String>, ReplayError> {
        let entries = http::list_index(&format!("{}/", self.base_url()))?;
        let pattern = match self {
            MirrorSource::RouteViews => Regex::new(r"^route-views[\w.-]*$"),
            MirrorSource::RipeRis => Regex::new(r"^rrc\d+$"),
        }
        .expect("static regex compiles");

        let mut routers: Vec<String> = entries
            .into_iter()
            .filter(|name| pattern.is_match(name))
            .collect();
        if *self == MirrorSource::RouteViews {
            // the collector publishing at the archive root
            routers.push("route-views2".to_string());
        }
        Ok(routers.into_iter().sorted().dedup().collect())
    }
}

impl std::fmt::Display for MirrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MirrorSource::RouteViews => write!(f, "routeviews"),
            MirrorSource::RipeRis => write!(f, "ripe-ris"),
        }
    }
}

/// One file discovered on the mirror.
#[derive(Debug, Clone)]
struct RemoteFile {
    name: String,
    url: String,
    kind: MrtFileKind,
    timestamp: NaiveDateTime,
}

/// Continuously mirrors one router's archive into the master directory.
pub struct Synchronizer {
    source: MirrorSource,
    router: String,
    master_dir: PathBuf,
    processed_dir: PathBuf,
    timestamp_interval_limit: i64,
    ignore_abnormality: bool,
    shutdown: Shutdown,
}

impl Synchronizer {
    pub fn new(
        source: MirrorSource,
        router: String,
        master_dir: PathBuf,
        processed_dir: PathBuf,
        timestamp_interval_limit: i64,
        ignore_abnormality: bool,
        shutdown: Shutdown,
    ) -> Synchronizer {
        Synchronizer {
            source,
            router,
            master_dir,
            processed_dir,
            timestamp_interval_limit,
            ignore_abnormality,
            shutdown,
        }
    }

    /// Poll the mirror until shutdown. Transport errors never kill the
    /// loop; the synchronizer backs off and retries indefinitely.
    pub fn run(&self) {
        log::info!(
            "synchronizing router {} from {} into {}",
            self.router,
            self.source,
            self.master_dir.display()
        );
        while !self.shutdown.is_triggered() {
            let delay = match self.poll_once() {
                Ok(staged) => {
                    if staged > 0 {
                        log::info!("staged {staged} new file(s) for {}", self.router);
                    }
                    POLL_INTERVAL
                }
                Err(ReplayError::ContinuityAnomaly { .. }) => POLL_INTERVAL,
                Err(ReplayError::ShutdownRequested) => break,
                Err(e) => {
                    log::warn!("synchronizer poll failed, will retry: {e}");
                    TRANSPORT_RETRY_DELAY
                }
            };
            if !self.shutdown.sleep(delay) {
                break;
            }
        }
        log::info!("synchronizer for {} stopped", self.router);
    }

    /// One index poll: discover remote files, stage everything new, in
    /// timestamp order, stopping at the first continuity anomaly.
    pub fn poll_once(&self) -> Result<usize, ReplayError> {
        let newest_known =
            newest_known_timestamp(&[self.master_dir.as_path(), self.processed_dir.as_path()])?;

        let remote = self.discover(newest_known)?;

        // before anything is staged, replay starts from the most recent RIB;
        // afterwards only newer UPDATES files matter
        let candidates: Vec<&RemoteFile> = match newest_known {
            None => {
                let Some(rib) = remote
                    .iter()
                    .filter(|f| f.kind == MrtFileKind::Rib)
                    .max_by_key(|f| f.timestamp)
                else {
                    log::info!("no RIB dump published yet for {}", self.router);
                    return Ok(0);
                };
                std::iter::once(rib)
                    .chain(remote.iter().filter(|f| {
                        f.kind == MrtFileKind::Updates && f.timestamp >= rib.timestamp
                    }))
                    .collect()
            }
            Some(horizon) => remote
                .iter()
                .filter(|f| f.kind == MrtFileKind::Updates && f.timestamp > horizon)
                .collect(),
        };

        let mut previous = newest_known;
        let mut staged = 0;
        for file in candidates {
            if self.shutdown.is_triggered() {
                return Err(ReplayError::ShutdownRequested);
            }
            if file.kind == MrtFileKind::Updates {
                if let Some(previous) = previous {
                    if let Err(e) = archive::check_continuity(
                        previous,
                        file.timestamp,
                        self.timestamp_interval_limit,
                        self.ignore_abnormality,
                    ) {
                        log::error!(
                            "withholding {} until the gap resolves or the abnormality flag is set: {e}",
                            file.name
                        );
                        return Err(e);
                    }
                }
            }
            self.stage(file)?;
            previous = Some(file.timestamp);
            staged += 1;
        }
        Ok(staged)
    }

    /// List the mirror's monthly indexes that can contain new files.
    fn discover(&self, newest_known: Option<NaiveDateTime>) -> Result<Vec<RemoteFile>, ReplayError> {
        let now = Utc::now().naive_utc();
        let mut months = vec![format!("{:04}.{:02}", now.year(), now.month())];
        // a horizon in an earlier month, or a cold start early in a month,
        // needs the previous month's index as well
        let previous_month = match now.month() {
            1 => format!("{:04}.12", now.year() - 1),
            m => format!("{:04}.{:02}", now.year(), m - 1),
        };
        match newest_known {
            None => months.insert(0, previous_month),
            Some(ts) => {
                let horizon_month = format!("{:04}.{:02}", ts.year(), ts.month());
                if !months.contains(&horizon_month) {
                    months.insert(0, previous_month);
                }
            }
        }

        let mut remote = vec![];
        for month in &months {
            for index_url in self.source.monthly_index_urls(&self.router, month) {
                let entries = match http::list_index(&index_url) {
                    Ok(entries) => entries,
                    Err(e) => {
                        // monthly directories appear lazily on the mirrors
                        log::debug!("cannot list {index_url}: {e}");
                        continue;
                    }
                };
                for name in entries {
                    if let Some((kind, timestamp)) = parse_archive_filename(&name) {
                        remote.push(RemoteFile {
                            url: format!("{index_url}{name}"),
                            name,
                            kind,
                            timestamp,
                        });
                    }
                }
            }
        }
        remote.sort_by_key(|f| f.timestamp);
        Ok(remote)
    }

    /// Download one remote file into the master directory, decompressed,
    /// made visible only by the final rename.
    fn stage(&self, file: &RemoteFile) -> Result<(), ReplayError> {
        let stem = file
            .name
            .trim_end_matches(".bz2")
            .trim_end_matches(".gz")
            .to_string();
        let dest = self.master_dir.join(&stem);
        if dest.exists() || self.processed_dir.join(&stem).exists() {
            return Ok(());
        }

        fs::create_dir_all(&self.master_dir)?;
        let partial = self.master_dir.join(format!("{stem}{PARTIAL_SUFFIX}"));

        let result = http::download_to(&file.url, &partial).or_else(|first| {
            log::warn!("download of {} failed, retrying once: {first}", file.url);
            http::download_to(&file.url, &partial)
        });
        match result {
            Ok(bytes) => {
                fs::rename(&partial, &dest)?;
                log::debug!("staged {} ({bytes} bytes decompressed)", dest.display());
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(e)
            }
        }
    }
}
