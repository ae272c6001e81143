//! Staged MRT archive files: filename conventions, directory scanning,
//! timestamp continuity.
//!
//! Archives are published on fixed cadences with the capture time embedded
//! in the filename (`rib.20211001.0000.bz2`, `updates.20211001.0015.gz`,
//! RIPE RIS uses `bview.` for RIB dumps). Everything the pipeline knows
//! about ordering derives from those embedded timestamps.

use crate::error::ReplayError;
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of a file still being written by the synchronizer. Files carrying
/// it are invisible to the processors; the rename dropping it is atomic.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Suffix appended when a file failed decoding and was quarantined.
pub const BAD_SUFFIX: &str = ".bad";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MrtFileKind {
    Rib,
    Updates,
}

/// One staged MRT file, ordered by embedded timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub kind: MrtFileKind,
    pub timestamp: NaiveDateTime,
}

/// Parse an archive filename into its kind and embedded timestamp.
///
/// Accepts optional `.gz`/`.bz2` compression suffixes. Returns `None` for
/// names that do not follow the archive convention.
pub fn parse_archive_filename(name: &str) -> Option<(MrtFileKind, NaiveDateTime)> {
    let stem = name
        .strip_suffix(".gz")
        .or_else(|| name.strip_suffix(".bz2"))
        .unwrap_or(name);

    let (kind, rest) = if let Some(rest) = stem.strip_prefix("rib.") {
        (MrtFileKind::Rib, rest)
    } else if let Some(rest) = stem.strip_prefix("bview.") {
        (MrtFileKind::Rib, rest)
    } else if let Some(rest) = stem.strip_prefix("updates.") {
        (MrtFileKind::Updates, rest)
    } else {
        return None;
    };

    let timestamp = NaiveDateTime::parse_from_str(rest, "%Y%m%d.%H%M").ok()?;
    Some((kind, timestamp))
}

/// Scan a staging directory for archive files, sorted by timestamp.
///
/// `.partial` downloads and `.bad` quarantined files are ignored, as is
/// anything that does not parse as an archive name.
pub fn scan_staged_dir(dir: &Path) -> Result<Vec<StagedFile>, ReplayError> {
    let mut files = vec![];
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.ends_with(PARTIAL_SUFFIX) || name.ends_with(BAD_SUFFIX) {
            continue;
        }
        if let Some((kind, timestamp)) = parse_archive_filename(name) {
            files.push(StagedFile {
                path: entry.path(),
                kind,
                timestamp,
            });
        } else {
            log::debug!("ignoring non-archive file in staging directory: {name}");
        }
    }
    files.sort_by_key(|f| f.timestamp);
    Ok(files)
}

/// The timestamp of the newest archive file known in any of the given
/// directories, staged or already processed.
pub fn newest_known_timestamp(dirs: &[&Path]) -> Result<Option<NaiveDateTime>, ReplayError> {
    let mut newest = None;
    for dir in dirs {
        for file in scan_staged_dir(dir)? {
            if newest.is_none_or(|ts| file.timestamp > ts) {
                newest = Some(file.timestamp);
            }
        }
    }
    Ok(newest)
}

/// Enforce the timestamp continuity limit between consecutive UPDATES files.
///
/// A gap above `limit_minutes` is a [ReplayError::ContinuityAnomaly] unless
/// `ignore_abnormality` is set, in which case the caller stages the file
/// anyway and only a warning is logged.
pub fn check_continuity(
    previous: NaiveDateTime,
    next: NaiveDateTime,
    limit_minutes: i64,
    ignore_abnormality: bool,
) -> Result<(), ReplayError> {
    let gap_minutes = (next - previous).num_minutes();
    if gap_minutes <= limit_minutes {
        return Ok(());
    }
    if ignore_abnormality {
        log::warn!(
            "timestamp gap of {gap_minutes} minutes exceeds limit of {limit_minutes} minutes, \
             staging anyway (abnormality ignored by configuration)"
        );
        return Ok(());
    }
    Err(ReplayError::ContinuityAnomaly {
        gap_minutes,
        limit_minutes,
    })
}
