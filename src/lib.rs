/*!
mrt2bmp replays archived MRT routing data as a live BMP stream towards an
OpenBMP collector.

The replay impersonates a BGP router: it opens a TCP session to the
collector, identifies itself with a BMP Initiation message, announces the
peers found in a RIB dump, floods the full table as Route Monitoring
messages, and then follows the per-interval UPDATES archives in
chronological order, maintaining the illusion of a live monitoring feed.

# Pipeline

```text
mirror ──> synchronizer ──> master directory ──> RIB processor ──┐
                                            └──> UPDATE processor ┤
                                                                  v
                                            bounded queue ──> session writer ──> collector
```

- The **synchronizer** ([sync]) discovers per-router MRT files on the
  RouteViews or RIPE RIS mirror, downloads and decompresses them, and
  stages them atomically so a visible file is always complete.
- The **MRT decoder** ([parser]) lazily yields TABLE_DUMP_V2 and BGP4MP
  records, skipping unknown types by their declared length.
- The **replay processors** ([replay]) turn the RIB dump into Peer-Up
  notifications plus a Route Monitoring flood, and every later UPDATES file
  into chronologically ordered Route Monitoring messages, preserving
  per-peer ordering and the archived timestamps.
- The **BMP encoder** ([encoder]) produces bit-exact BMP v3 frames,
  including the synthetic OPEN messages Peer-Up requires.
- The **session writer** ([session]) owns the collector connection and
  guarantees that every (re)connected socket starts with Initiation
  followed by all announced Peer-Ups.

# Example

Replaying a locally provided archive:

```no_run
use mrt2bmp::config::Config;
use mrt2bmp::supervisor::{run_replay, DataSource, Shutdown};
use std::path::Path;

let config = Config::load(Path::new("mrt2bmp.yml")).unwrap();
let shutdown = Shutdown::new();
run_replay(&config, "route-views2", DataSource::Local, shutdown).unwrap();
```

Synchronizing from a mirror instead is one enum variant away:
`DataSource::Mirror(MirrorSource::RouteViews)`.
*/

pub mod config;
pub mod encoder;
pub mod error;
pub(crate) mod io;
pub mod models;
pub mod parser;
pub mod replay;
pub mod session;
pub mod supervisor;
pub mod sync;

pub use crate::error::{ParserError, ReplayError};
pub use crate::parser::MrtReader;
