//! In-flight exit records.

use serde::{Deserialize, Serialize};
use watcher_position::Position;
use watcher_tx::SignedTransaction;

use crate::bitmap::{ExitMap, PiggybackBitmap};

/// A Merkle inclusion proof against a child-chain block hash. Opaque to the
/// core — produced and consumed by the [`BlockStore`](crate) collaborator
/// and the root contract, never interpreted here.
pub type InclusionProof = Vec<u8>;

/// Where (and how) an in-flight exit's transaction has been found included
/// in a fetched block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionWitness {
    pub position: Position,
    pub proof: InclusionProof,
}

/// One in-flight exit, keyed externally by the exiting transaction's
/// `raw_txhash`.
///
/// `is_canonical` starts `true` and flips to `false` on the first successful
/// competitor challenge; it is not automatically flipped back (see
/// `DESIGN.md`). `is_active` mirrors contract state, additionally forced
/// back to `true` on invalid finalization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightExitInfo {
    pub signed_tx: SignedTransaction,
    pub contract_id: [u8; 24],
    pub timestamp: u64,
    pub eth_height: u64,
    pub is_active: bool,
    pub is_canonical: bool,
    pub piggybacked_inputs: PiggybackBitmap,
    pub piggybacked_outputs: PiggybackBitmap,
    pub tx_seen_in_blocks_at: Option<InclusionWitness>,
    pub exit_map: ExitMap,
}

impl InFlightExitInfo {
    pub fn new(
        signed_tx: SignedTransaction,
        contract_id: [u8; 24],
        timestamp: u64,
        eth_height: u64,
    ) -> Self {
        Self {
            signed_tx,
            contract_id,
            timestamp,
            eth_height,
            is_active: timestamp != 0,
            is_canonical: true,
            piggybacked_inputs: PiggybackBitmap::new(),
            piggybacked_outputs: PiggybackBitmap::new(),
            tx_seen_in_blocks_at: None,
            exit_map: ExitMap::new(),
        }
    }

    /// Raw transaction bytes, used as the identity compared against
    /// fetched-block transactions and as the evidence payload on events.
    pub fn txbytes(&self) -> Vec<u8> {
        self.signed_tx.raw.encode_raw()
    }

    /// `true` if `oindex` (0..=3 input, 4..=7 output) has been piggybacked.
    pub fn is_piggybacked(&self, oindex: u8) -> bool {
        if oindex < watcher_position::MAX_INPUTS as u8 {
            self.piggybacked_inputs.is_set(oindex)
        } else {
            self.piggybacked_outputs
                .is_set(oindex - watcher_position::MAX_INPUTS as u8)
        }
    }

    /// Sets the piggyback bit for `oindex`. Idempotent.
    pub fn set_piggybacked(&mut self, oindex: u8) {
        if oindex < watcher_position::MAX_INPUTS as u8 {
            self.piggybacked_inputs.set(oindex);
        } else {
            self.piggybacked_outputs
                .set(oindex - watcher_position::MAX_INPUTS as u8);
        }
    }

    /// Clears the piggyback bit for `oindex`. Idempotent.
    pub fn clear_piggybacked(&mut self, oindex: u8) {
        if oindex < watcher_position::MAX_INPUTS as u8 {
            self.piggybacked_inputs.clear(oindex);
        } else {
            self.piggybacked_outputs
                .clear(oindex - watcher_position::MAX_INPUTS as u8);
        }
    }

    /// `true` if the exiting transaction has been confirmed included in a
    /// fetched block.
    pub fn has_inclusion_witness(&self) -> bool {
        self.tx_seen_in_blocks_at.is_some()
    }
}
