/*!
error module defines the error types used in mrt2bmp.

Two layers: [ParserError] covers MRT/BGP wire decoding, [ReplayError]
covers everything the replay pipeline itself can fail on (configuration,
archive transport, continuity violations). A decoding failure only ever
affects the record or file it came from; the pipeline error decides
whether the process keeps running.
*/
use crate::models::{Bgp4MpType, BgpState, EntryType, TableDumpV2Type};
use num_enum::TryFromPrimitiveError;
use oneio::OneIoError;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::{error::Error, fmt, io};

#[derive(Debug)]
pub enum ParserError {
    IoError(io::Error),
    EofError(io::Error),
    ParseError(String),
    TruncatedMsg(String),
    UnrecognizedMrtType(u16),
    UnsupportedMrtType { mrt_type: EntryType, subtype: u16 },
}

impl Error for ParserError {}

impl Display for ParserError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParserError::IoError(e) => write!(f, "Error: {e}"),
            ParserError::EofError(e) => write!(f, "Error: {e}"),
            ParserError::ParseError(s) => write!(f, "Error: {s}"),
            ParserError::TruncatedMsg(s) => write!(f, "Error: {s}"),
            ParserError::UnrecognizedMrtType(t) => write!(f, "Error: unrecognized MRT type: {t}"),
            ParserError::UnsupportedMrtType { mrt_type, subtype } => {
                write!(f, "Error: unsupported MRT type {mrt_type:?} subtype {subtype}")
            }
        }
    }
}

impl From<io::Error> for ParserError {
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            ErrorKind::UnexpectedEof => ParserError::EofError(io_error),
            _ => ParserError::IoError(io_error),
        }
    }
}

impl From<TryFromPrimitiveError<Bgp4MpType>> for ParserError {
    fn from(value: TryFromPrimitiveError<Bgp4MpType>) -> Self {
        ParserError::ParseError(format!("cannot parse bgp4mp subtype: {}", value.number))
    }
}

impl From<TryFromPrimitiveError<BgpState>> for ParserError {
    fn from(value: TryFromPrimitiveError<BgpState>) -> Self {
        ParserError::ParseError(format!("cannot parse bgp4mp state: {}", value.number))
    }
}

impl From<TryFromPrimitiveError<TableDumpV2Type>> for ParserError {
    fn from(value: TryFromPrimitiveError<TableDumpV2Type>) -> Self {
        ParserError::ParseError(format!("cannot parse table dump v2 type: {}", value.number))
    }
}

/// Pipeline-level errors.
///
/// [ReplayError::MalformedMrt] and [ReplayError::ContinuityAnomaly] are
/// recoverable by policy: the offending file is quarantined or withheld and
/// replay continues. [ReplayError::Config] is fatal at startup.
#[derive(Debug)]
pub enum ReplayError {
    Config(String),
    MalformedMrt { path: PathBuf, error: ParserError },
    ContinuityAnomaly { gap_minutes: i64, limit_minutes: i64 },
    Transport(String),
    Io(io::Error),
    ShutdownRequested,
}

impl Error for ReplayError {}

impl Display for ReplayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::Config(s) => write!(f, "configuration error: {s}"),
            ReplayError::MalformedMrt { path, error } => {
                write!(f, "malformed MRT file {}: {error}", path.display())
            }
            ReplayError::ContinuityAnomaly { gap_minutes, limit_minutes } => write!(
                f,
                "timestamp continuity anomaly: gap of {gap_minutes} minutes exceeds limit of {limit_minutes} minutes"
            ),
            ReplayError::Transport(s) => write!(f, "transport error: {s}"),
            ReplayError::Io(e) => write!(f, "io error: {e}"),
            ReplayError::ShutdownRequested => write!(f, "shutdown requested"),
        }
    }
}

impl From<io::Error> for ReplayError {
    fn from(error: io::Error) -> Self {
        ReplayError::Io(error)
    }
}

impl From<OneIoError> for ReplayError {
    fn from(error: OneIoError) -> Self {
        ReplayError::Transport(error.to_string())
    }
}

impl From<serde_yaml::Error> for ReplayError {
    fn from(error: serde_yaml::Error) -> Self {
        ReplayError::Config(error.to_string())
    }
}
