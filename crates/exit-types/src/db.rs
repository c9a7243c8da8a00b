//! Opaque persistence deltas emitted by ingest operations.
//!
//! The core never performs I/O; it hands the driver a list of these after
//! every ingest call, and the driver is responsible for applying them
//! atomically alongside accepting the triggering event, and for
//! serializing the carried values into whatever wire format the backing
//! store expects.

use alloy_primitives::B256;
use watcher_position::Position;

use crate::{competitor::CompetitorInfo, exit::ExitInfo, ife::InFlightExitInfo};

/// A single persistence-layer write the driver must apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DbUpdate {
    PutExit { position: Position, exit: ExitInfo },
    DeleteExit { position: Position },
    PutIfe { tx_hash: B256, ife: InFlightExitInfo },
    PutCompetitor { tx_hash: B256, competitor: CompetitorInfo },
}
