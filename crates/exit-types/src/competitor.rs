//! Competitor records attached to in-flight exits.

use alloy_primitives::Signature;
use serde::{Deserialize, Serialize};
use watcher_tx::{RawTransaction, SignedTransaction};

/// A known transaction that competes with (double-spends an input of) an
/// in-flight exit, keyed externally by the IFE's `raw_txhash`.
///
/// Stored as a `signed_tx` per spec, but only the one signature the contract
/// challenge call actually needs — `signed_tx.sigs` holds a single element at
/// `competing_input_index`'s slot, not one per input as on a normal
/// `SignedTransaction`; the competing transaction's other signatures are
/// never required as challenge evidence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorInfo {
    pub signed_tx: SignedTransaction,
    pub competing_input_index: u8,
}

impl CompetitorInfo {
    pub fn new(raw_tx: RawTransaction, competing_input_index: u8, competing_sig: Signature) -> Self {
        Self {
            signed_tx: SignedTransaction::new(raw_tx, vec![competing_sig]),
            competing_input_index,
        }
    }

    /// The one signature carried for the competing input.
    pub fn competing_sig(&self) -> &Signature {
        &self.signed_tx.sigs[0]
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, U256};
    use watcher_position::Position;

    use super::*;

    fn dummy_sig() -> Signature {
        Signature::new(U256::from(3u64), U256::from(4u64), true)
    }

    /// `CompetitorInfo`'s persisted-blob roundtrip (`to_db` ∘ `from_db` = id).
    #[test]
    fn competitor_info_serde_roundtrip() {
        let input = Position::new(1000, 0, 0).unwrap();
        let raw = RawTransaction::new(&[input], &[], B256::ZERO);
        let competitor = CompetitorInfo::new(raw, 2, dummy_sig());

        let blob = serde_json::to_vec(&competitor).unwrap();
        let reloaded: CompetitorInfo = serde_json::from_slice(&blob).unwrap();
        assert_eq!(competitor, reloaded);
        assert_eq!(competitor.competing_sig(), &dummy_sig());
    }
}
