//! Minimal HTTP capabilities for the synchronizer: list an archive
//! directory index, download one file.

use crate::error::ReplayError;
use regex::Regex;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="([^"]+)""#).expect("static regex compiles"))
}

/// Fetch an HTML directory index and return the entries it links to.
pub fn list_index(url: &str) -> Result<Vec<String>, ReplayError> {
    let mut reader = oneio::get_reader(url)?;
    let mut body = String::new();
    reader
        .read_to_string(&mut body)
        .map_err(|e| ReplayError::Transport(format!("failed reading index {url}: {e}")))?;
    Ok(extract_index_entries(&body))
}

/// Pull file and subdirectory names out of an index page.
///
/// Query links, parent links and absolute links are dropped; mirrors only
/// ever link files and immediate subdirectories from their index pages.
fn extract_index_entries(body: &str) -> Vec<String> {
    let mut entries = vec![];
    for captures in href_regex().captures_iter(body) {
        let href = &captures[1];
        if href.starts_with('?') || href.starts_with('/') || href.contains("://") {
            continue;
        }
        if href == "../" || href.is_empty() {
            continue;
        }
        entries.push(href.trim_end_matches('/').to_string());
    }
    entries
}

/// Download `url` into `dest`, decompressing `.gz`/`.bz2` on the fly.
///
/// The destination is written through a `.partial` sibling and renamed into
/// place by the caller once complete; this function only fills the file it
/// was given.
pub fn download_to(url: &str, dest: &Path) -> Result<u64, ReplayError> {
    let mut reader = oneio::get_reader(url)?;
    let mut file = File::create(dest)?;
    let written = std::io::copy(&mut reader, &mut file)
        .map_err(|e| ReplayError::Transport(format!("failed downloading {url}: {e}")))?;
    file.flush()?;
    Ok(written)
}
