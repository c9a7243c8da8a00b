//! The tagged event surface emitted to downstream consumers.

use alloy_primitives::{Address, B256};
use watcher_position::Position;

/// A single available piggyback slot: the input or output index and the
/// address (recovered spender, or output owner) that may claim it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PiggybackSlot {
    pub index: u8,
    pub address: Address,
}

/// Whether the chain, as of the last validity analysis, is healthy or has
/// an unchallenged invalid exit past its SLA margin.
///
/// Not an error — a signal carried alongside the emitted [`Event`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChainStatus {
    #[default]
    Ok,
    UnchallengedExit,
}

/// A single actionable output of the watcher core: an invalid-exit finding,
/// a non-canonical in-flight exit, an available piggyback, and so on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    InvalidExit {
        utxo_pos: Position,
        owner: Address,
        currency: Address,
        amount: u64,
        eth_height: u64,
    },
    UnchallengedExit {
        utxo_pos: Position,
        owner: Address,
        currency: Address,
        amount: u64,
        eth_height: u64,
    },
    NonCanonicalIfe {
        txbytes: Vec<u8>,
    },
    InvalidIfeChallenge {
        txbytes: Vec<u8>,
    },
    InvalidPiggyback {
        txbytes: Vec<u8>,
        inputs: Vec<u8>,
        outputs: Vec<u8>,
    },
    PiggybackAvailable {
        txbytes: Vec<u8>,
        available_inputs: Vec<PiggybackSlot>,
        available_outputs: Vec<PiggybackSlot>,
    },
    ExitFinalized {
        utxo_pos: Position,
        owner: Address,
        currency: Address,
        amount: u64,
    },
}

impl Event {
    /// The in-flight exit's identifying hash, for events that carry one.
    pub fn ife_txhash(&self) -> Option<B256> {
        let txbytes = match self {
            Event::NonCanonicalIfe { txbytes }
            | Event::InvalidIfeChallenge { txbytes }
            | Event::InvalidPiggyback { txbytes, .. }
            | Event::PiggybackAvailable { txbytes, .. } => txbytes,
            _ => return None,
        };
        Some(alloy_primitives::keccak256(txbytes))
    }
}
