//! Error taxonomy for the watcher exit processor core.

use alloy_primitives::B256;
use thiserror::Error;
use watcher_position::Position;

/// Errors an ingest operation can return.
#[derive(Debug, Error)]
pub enum IngestError {
    /// `events` and `contract_statuses` (or similar paired lists) had
    /// different lengths.
    #[error("unexpected events: {events} events paired with {statuses} statuses")]
    UnexpectedEvents { events: usize, statuses: usize },

    /// A finalization or challenge referenced an in-flight exit id the core
    /// has no record of.
    #[error("unknown in-flight exit ids: {0:?}")]
    UnknownInFlightExit(Vec<B256>),

    /// A finalization referenced an `(id, output_index)` pair that was
    /// never piggybacked.
    #[error("unknown piggybacks: {0:?}")]
    UnknownPiggybacks(Vec<(B256, u8)>),

    /// An operation referenced an in-flight exit by tx hash that the core
    /// has no record of.
    #[error("no in-flight exit known for tx hash {0}")]
    IfeNotKnownForTx(B256),

    /// Decoding a raw or signed transaction failed.
    #[error(transparent)]
    Decode(#[from] watcher_tx::DecodeError),
}

/// Errors assembling challenge evidence.
#[derive(Debug, Error)]
pub enum ChallengeError {
    /// No known transaction competes with the given in-flight exit.
    #[error("no competitor found for in-flight exit {0}")]
    CompetitorNotFound(B256),

    /// No fetched block contains the in-flight exit's raw transaction.
    #[error("in-flight exit {0} not found included in any fetched block")]
    CanonicalNotFound(B256),

    /// No double-spend evidence exists for the requested piggybacked slot.
    #[error("no double-spend found for piggybacked slot {index} on in-flight exit {ife}")]
    NoDoubleSpendOnParticularPiggyback { ife: B256, index: u8 },

    /// The requested input or output index is outside `[0, MAX_INPUTS)` /
    /// `[0, MAX_OUTPUTS)`.
    #[error("piggybacked index {0} out of range")]
    PiggybackedIndexOutOfRange(u8),

    /// The in-flight exit referenced by tx hash is unknown.
    #[error("no in-flight exit known for tx hash {0}")]
    IfeNotKnownForTx(B256),

    /// No standard exit is known at the given position.
    #[error("no standard exit known at position {0}")]
    ExitNotFound(Position),

    /// A standard exit's spend could not be located: either the ledger
    /// hasn't reported a `spent_blknum` for it, or no transaction in the
    /// fetched block at that height actually spends it.
    #[error("spend not located for standard exit at position {0}")]
    SpendNotLocated(Position),

    /// Decoding a raw or signed transaction failed.
    #[error(transparent)]
    Decode(#[from] watcher_tx::DecodeError),
}
