//! The unified view over "every transaction the core currently knows
//! about" — the double-spend search substrate for `check_validity` and
//! challenge-data assembly.

use alloy_primitives::B256;
use watcher_position::Position;
use watcher_tx::SignedTransaction;

use crate::Request;

/// A known transaction, with its inclusion position if it came from a
/// fetched block rather than an in-flight exit's appendix entry.
#[derive(Clone, Debug)]
pub struct KnownTxEntry {
    pub signed_tx: SignedTransaction,
    pub position: Option<Position>,
}

/// `KnownTx = (IFE appendix) ∪ (fetched block transactions)`.
///
/// Entries from fetched blocks are ordered ascending by `(blknum, txindex)`
/// and come before appendix entries, so a linear scan for the first match
/// naturally prefers the oldest on-chain competitor over a merely
/// in-flight one.
#[derive(Clone, Debug, Default)]
pub struct KnownTxIndex {
    entries: Vec<KnownTxEntry>,
}

impl KnownTxIndex {
    /// Builds the index from a request's fetched blocks plus the current
    /// IFE appendix. Transactions that fail to decode are skipped rather
    /// than failing the whole build — a malformed block transaction can't
    /// be used as evidence of anything either way.
    pub fn build(state: &watcher_exit_types::State, request: &Request) -> Self {
        let mut entries = Vec::new();

        let mut blknums: Vec<u64> = request.blocks_result.keys().copied().collect();
        blknums.sort();
        for blknum in blknums {
            let block = &request.blocks_result[&blknum];
            for (txindex, txbytes) in block.transactions.iter().enumerate() {
                if let Ok(signed_tx) = SignedTransaction::decode(txbytes) {
                    let position = Position::new(blknum, txindex as u32, 0).ok();
                    entries.push(KnownTxEntry { signed_tx, position });
                }
            }
        }

        for ife in state.in_flight_exits.values() {
            entries.push(KnownTxEntry {
                signed_tx: ife.signed_tx.clone(),
                position: None,
            });
        }

        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &KnownTxEntry> {
        self.entries.iter()
    }

    /// Entries (other than the one hashing to `exclude`) whose inputs
    /// include `position`.
    pub fn spenders_of<'a>(
        &'a self,
        position: Position,
        exclude: B256,
    ) -> impl Iterator<Item = &'a KnownTxEntry> {
        self.entries.iter().filter(move |entry| {
            entry.signed_tx.raw.raw_txhash() != exclude
                && entry.signed_tx.raw.get_inputs().contains(&position)
        })
    }

    /// The first entry whose raw transaction bytes equal `txbytes` exactly
    /// — used to test whether an in-flight exit's exact transaction
    /// appears included in a block.
    pub fn find_by_raw_bytes(&self, txbytes: &[u8]) -> Option<&KnownTxEntry> {
        self.entries
            .iter()
            .find(|entry| entry.signed_tx.raw.encode_raw() == txbytes)
    }

    /// Like [`KnownTxIndex::find_by_raw_bytes`] but restricted to entries
    /// that came from a fetched block, excluding the IFE-appendix entry
    /// that would otherwise trivially match itself.
    pub fn find_in_blocks_by_raw_bytes(&self, txbytes: &[u8]) -> Option<&KnownTxEntry> {
        self.entries
            .iter()
            .find(|entry| entry.position.is_some() && entry.signed_tx.raw.encode_raw() == txbytes)
    }
}

/// The set of all signed transactions currently "known" purely from
/// in-flight exits. `KnownTxIndex` subsumes this for analysis purposes;
/// kept as a named view since challenge-data assembly reasons about "is
/// this competitor only in the appendix" explicitly.
pub fn tx_appendix(state: &watcher_exit_types::State) -> Vec<SignedTransaction> {
    state
        .in_flight_exits
        .values()
        .map(|ife| ife.signed_tx.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use watcher_exit_types::{InFlightExitInfo, State};

    use super::*;
    use crate::collab::Block;
    use crate::request::Request;
    use crate::test_utils::{make_signed_tx, random_key};

    #[test]
    fn build_orders_blocks_before_appendix() {
        let key = random_key();
        let input = Position::new(1000, 0, 0).unwrap();
        let block_tx = make_signed_tx(&[input], &[key], &[]);

        let other_key = random_key();
        let other_input = Position::new(2000, 0, 0).unwrap();
        let appendix_tx = make_signed_tx(&[other_input], &[other_key], &[]);

        let mut state = State::default();
        state.in_flight_exits.insert(
            appendix_tx.raw.raw_txhash(),
            InFlightExitInfo::new(appendix_tx.clone(), [0u8; 24], 1, 1),
        );

        let mut request = Request::new(0, 5000);
        request.blocks_result.insert(
            900,
            Block {
                number: 900,
                hash: B256::ZERO,
                transactions: vec![block_tx.raw.encode_raw()],
            },
        );

        let index = KnownTxIndex::build(&state, &request);
        let entries: Vec<_> = index.iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].position.unwrap().blknum(), 900);
        assert!(entries[1].position.is_none());
    }

    #[test]
    fn spenders_of_excludes_the_given_hash() {
        let key = random_key();
        let shared = Position::new(1000, 0, 0).unwrap();
        let tx = make_signed_tx(&[shared], &[key], &[]);
        let tx_hash = tx.raw.raw_txhash();

        let mut state = State::default();
        state
            .in_flight_exits
            .insert(tx_hash, InFlightExitInfo::new(tx, [0u8; 24], 1, 1));

        let request = Request::new(0, 5000);
        let index = KnownTxIndex::build(&state, &request);
        assert!(index.spenders_of(shared, tx_hash).next().is_none());
    }

    #[test]
    fn tx_appendix_reflects_all_known_ifes() {
        let key = random_key();
        let input = Position::new(1000, 0, 0).unwrap();
        let tx = make_signed_tx(&[input], &[key], &[]);
        let tx_hash = tx.raw.raw_txhash();

        let mut state = State::default();
        state
            .in_flight_exits
            .insert(tx_hash, InFlightExitInfo::new(tx, [0u8; 24], 1, 1));

        assert_eq!(tx_appendix(&state).len(), 1);
    }
}
