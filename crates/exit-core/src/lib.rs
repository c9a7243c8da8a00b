//! The watcher exit processor core: a pure, single-owner state machine
//! over Plasma-style standard exits and in-flight exits.
//!
//! `Core` owns a [`watcher_exit_types::State`] exclusively. Every ingest
//! method takes `&mut self` and the event payload the driver read off the
//! root contract, mutates state in place, and returns the
//! [`watcher_exit_types::DbUpdate`]s the driver must persist atomically
//! with accepting the call — a conceptual `(State, event) -> (State',
//! updates)` transition, rendered as in-place mutation plus a returned
//! delta list rather than a cloned-and-returned `State`, since `Core` is
//! the state's sole owner and nothing else ever reads it mid-mutation.
//!
//! Read-only analysis (`check_validity`, challenge-data assembly) takes
//! `&self`/`&State` only, so a driver can snapshot-read concurrently with
//! a single writer holding the mutation path.

pub mod appendix;
pub mod challenge;
pub mod collab;
pub mod errors;
pub mod ingest;
pub mod request;

mod analysis;

#[cfg(test)]
pub(crate) mod test_utils;

pub use appendix::{KnownTxEntry, KnownTxIndex};
pub use collab::{Block, BlockStore, Ledger};
pub use errors::{ChallengeError, IngestError};
pub use request::Request;
pub use watcher_exit_types::{ChainStatus, DbUpdate, Event};

use watcher_exit_types::State;

/// The exit processor state machine.
#[derive(Clone, Debug, Default)]
pub struct Core {
    state: State,
}

impl Core {
    /// Constructs the state the persistence layer replays at startup.
    pub fn init(state: State) -> Self {
        Self { state }
    }

    /// The current state, for snapshotting or persistence-layer readback.
    pub fn state(&self) -> &State {
        &self.state
    }
}
