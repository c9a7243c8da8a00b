//! External collaborator traits.
//!
//! The core never performs I/O. Instead, a driver answers these queries
//! (typically backed by an Ethereum JSON-RPC client and a child-chain block
//! store) and feeds the results back into a [`crate::Request`] before
//! calling [`crate::Core::check_validity`]. Mirrors the collect-then-serve
//! split in `strata-asm-common`'s `AuxRequestCollector`/`AuxDataProvider`
//! pair, generalized from a pre-process/process phase split to an
//! explicit trait boundary since this core has no zkVM guest/host split to
//! preserve.
//!
//! `Persistence` is deliberately not modeled as a trait here: the core only
//! ever *emits* [`watcher_exit_types::DbUpdate`] values from ingest calls,
//! it never calls into a persistence backend itself.

use alloy_primitives::B256;
use watcher_position::Position;

/// A fetched child-chain block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub transactions: Vec<Vec<u8>>,
}

/// Queries the canonical UTXO set and spend history.
///
/// The core never mutates or owns the UTXO set itself — it only ever asks.
pub trait Ledger {
    /// Reports, for each requested position (in the same order), whether a
    /// UTXO currently exists there.
    fn utxo_exists(&self, positions: &[Position]) -> Vec<bool>;

    /// The block number a position was spent in, if known.
    fn spent_blknum(&self, position: Position) -> Option<u64>;
}

/// Fetches child-chain blocks and the Merkle inclusion proofs within them.
pub trait BlockStore {
    /// Fetches each requested block by number, in order. A missing entry is
    /// `None`.
    fn get_blocks(&self, blknums: &[u64]) -> Vec<Option<Block>>;

    /// The Merkle inclusion proof for the transaction at `txindex` within
    /// `block`, verifiable against `block.hash` by the root contract. The
    /// core never verifies this itself — proof verification is the root
    /// contract's job.
    fn inclusion_proof(&self, block: &Block, txindex: u32) -> Vec<u8>;
}
