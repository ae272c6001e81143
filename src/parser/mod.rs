/*!
MRT decoding: common header, TABLE_DUMP_V2 and BGP4MP message bodies, and a
lazy reader that yields one typed record at a time without buffering whole
files.
*/
pub mod bgp4mp;
pub mod mrt_record;
pub mod table_dump_v2;
pub mod utils;

use crate::error::{ParserError, ReplayError};
use crate::models::MrtRecord;
use std::io::Read;
use std::path::Path;

pub use mrt_record::{parse_common_header, parse_mrt_body, try_parse_mrt_record};
pub use utils::ReadUtils;

/// Lazy MRT record reader over any byte source.
pub struct MrtReader {
    reader: Box<dyn Read + Send>,
}

impl MrtReader {
    pub fn new(reader: Box<dyn Read + Send>) -> MrtReader {
        MrtReader { reader }
    }

    /// Open a local MRT file, transparently decompressing `.gz`/`.bz2`.
    pub fn from_path(path: &Path) -> Result<MrtReader, ReplayError> {
        Ok(MrtReader::new(crate::io::open_mrt_file(path)?))
    }

    /// The next record, `None` at a clean end of file.
    pub fn next_record(&mut self) -> Result<Option<MrtRecord>, ParserError> {
        try_parse_mrt_record(&mut self.reader)
    }
}

impl Iterator for MrtReader {
    type Item = Result<MrtRecord, ParserError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
