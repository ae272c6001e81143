//! Readers for local MRT files, transparently decompressed.

use crate::error::ReplayError;
use std::io::Read;
use std::path::Path;

/// Create a reader for a staged MRT file. Decompression is selected by the
/// file extension (`.gz`, `.bz2`), anything else is read as-is.
pub(crate) fn open_mrt_file(path: &Path) -> Result<Box<dyn Read + Send>, ReplayError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ReplayError::Config(format!("non-UTF8 path: {}", path.display())))?;
    let reader = oneio::get_reader(path_str)?;
    Ok(reader)
}
