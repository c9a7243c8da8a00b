//! Domain types for the watcher exit processor: exit and in-flight-exit
//! records, the state container they live in, and the event/db-update
//! surface the core emits.

mod bitmap;
mod competitor;
mod db;
mod event;
mod exit;
mod ife;
mod state;

pub use bitmap::{ExitMap, PiggybackBitmap};
pub use competitor::CompetitorInfo;
pub use db::DbUpdate;
pub use event::{ChainStatus, Event, PiggybackSlot};
pub use exit::ExitInfo;
pub use ife::{InFlightExitInfo, InclusionProof, InclusionWitness};
pub use state::State;
