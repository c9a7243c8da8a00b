//! The request object threaded through query planning and validity
//! analysis, carrying both the collaborator queries a driver must answer
//! and the answers it has collected so far.

use std::collections::BTreeMap;

use tracing::warn;
use watcher_exit_types::InFlightExitInfo;
use watcher_position::Position;

use crate::{Core, collab::Block};

/// The real on-chain positions of an in-flight exit's piggybacked outputs.
///
/// An output only has a concrete position once the exiting transaction's
/// inclusion is known (see [`InFlightExitInfo::tx_seen_in_blocks_at`]); a
/// piggybacked output on a not-yet-included IFE contributes no position to
/// check, since there is nothing yet to check existence of.
fn piggybacked_output_positions(ife: &InFlightExitInfo) -> Vec<Position> {
    let Some(witness) = &ife.tx_seen_in_blocks_at else {
        return Vec::new();
    };
    ife.piggybacked_outputs
        .active_indices()
        .filter_map(|index| Position::new(witness.position.blknum(), witness.position.txindex(), index).ok())
        .collect()
}

/// Immutable-by-convention carrier for one validity cycle: the driver
/// repeatedly mutates it by calling `Core`'s planning methods, answering
/// the collaborator queries those methods produce, and feeding the answers
/// back in, until [`Core::check_validity`] can run.
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub eth_height_now: u64,
    pub blknum_now: u64,

    /// Positions the driver should check for existence via `Ledger`.
    pub utxos_to_check: Vec<Position>,
    /// The driver's `Ledger::utxo_exists` answers, keyed by position.
    pub utxo_exists_result: BTreeMap<Position, bool>,

    /// Positions the driver should resolve via `Ledger::spent_blknum`.
    pub spends_to_get: Vec<Position>,
    /// The driver's `Ledger::spent_blknum` answers, keyed by position.
    pub spent_blknum_result: BTreeMap<Position, Option<u64>>,

    /// Block numbers the driver should fetch via `BlockStore`.
    pub blocks_to_fetch: Vec<u64>,
    /// The driver's fetched blocks, keyed by block number.
    pub blocks_result: BTreeMap<u64, Block>,
}

impl Request {
    pub fn new(eth_height_now: u64, blknum_now: u64) -> Self {
        Self {
            eth_height_now,
            blknum_now,
            ..Default::default()
        }
    }

    /// `utxo_exists_result` with "not yet checked" defaulting to `true`:
    /// a UTXO not present in the existence map is assumed to exist.
    pub fn utxo_exists(&self, position: &Position) -> bool {
        self.utxo_exists_result
            .get(position)
            .copied()
            .unwrap_or(true)
    }
}

impl Core {
    /// Plans the UTXO-existence query for active standard exits and active
    /// IFE input/piggybacked-output positions, filtered to
    /// `0 < blknum < blknum_now`.
    pub fn determine_utxo_existence_to_get(&self, request: &mut Request) {
        let mut positions: Vec<Position> = self.state.active_exit_positions().collect();

        for (_, ife) in self.state.active_ifes() {
            positions.extend(ife.signed_tx.raw.get_inputs());
            positions.extend(piggybacked_output_positions(ife));
        }

        positions.retain(|p| p.blknum() > 0 && p.blknum() < request.blknum_now);
        positions.sort();
        positions.dedup();
        request.utxos_to_check = positions;
    }

    /// Plans the UTXO-existence query for the inputs of active IFEs that
    /// have at least one piggybacked output — output-piggybacks must prove
    /// non-spend of inputs, so their inputs need checking too even when no
    /// input slot was itself piggybacked.
    pub fn determine_ife_input_utxos_existence_to_get(&self, request: &mut Request) {
        let mut positions: Vec<Position> = self
            .state
            .active_ifes()
            .filter(|(_, ife)| !ife.piggybacked_outputs.is_empty())
            .flat_map(|(_, ife)| ife.signed_tx.raw.get_inputs())
            .collect();

        positions.retain(|p| p.blknum() > 0 && p.blknum() < request.blknum_now);
        request.utxos_to_check.extend(positions);
        request.utxos_to_check.sort();
        request.utxos_to_check.dedup();
    }

    /// After the ledger has answered existence, plans the spend-blknum
    /// query: the union of IFE inputs and piggybacked outputs reported
    /// *missing*.
    pub fn determine_spends_to_get(&self, request: &mut Request) {
        let mut positions = Vec::new();
        for (_, ife) in self.state.active_ifes() {
            for input in ife.signed_tx.raw.get_inputs() {
                if !request.utxo_exists(&input) {
                    positions.push(input);
                }
            }
            for pos in piggybacked_output_positions(ife) {
                if !request.utxo_exists(&pos) {
                    positions.push(pos);
                }
            }
        }
        positions.sort();
        positions.dedup();
        request.spends_to_get = positions;
    }

    /// Filters `NotFound` spend results (which legitimately arise when a
    /// UTXO was removed by exit finalization rather than by a spend) with a
    /// warning, and returns the unique block numbers the driver must fetch.
    pub fn handle_spent_blknum_result(&self, request: &mut Request) -> Vec<u64> {
        let mut blknums: Vec<u64> = request
            .spent_blknum_result
            .iter()
            .filter_map(|(position, blknum)| match blknum {
                Some(b) => Some(*b),
                None => {
                    warn!(%position, "spend query returned not-found; likely removed by finalization");
                    None
                }
            })
            .collect();
        blknums.sort();
        blknums.dedup();
        request.blocks_to_fetch = blknums.clone();
        blknums
    }
}

#[cfg(test)]
mod tests {
    use watcher_exit_types::ExitInfo;

    use super::*;
    use crate::Core;
    use crate::test_utils::{make_signed_tx, random_key};

    #[test]
    fn utxo_existence_plan_excludes_out_of_range_positions() {
        let mut core = Core::default();
        let in_range = Position::new(1000, 0, 0).unwrap();
        let not_yet_included = Position::new(9_000, 0, 0).unwrap();
        core.state.exits.insert(
            in_range,
            ExitInfo {
                amount: 1,
                currency: watcher_tx::ZERO_ADDR,
                owner: alloy_primitives::Address::repeat_byte(1),
                is_active: true,
                eth_height: 1,
            },
        );
        core.state.exits.insert(
            not_yet_included,
            ExitInfo {
                amount: 1,
                currency: watcher_tx::ZERO_ADDR,
                owner: alloy_primitives::Address::repeat_byte(1),
                is_active: true,
                eth_height: 1,
            },
        );

        let mut request = Request::new(0, 5000);
        core.determine_utxo_existence_to_get(&mut request);

        assert_eq!(request.utxos_to_check, vec![in_range]);
    }

    #[test]
    fn spends_to_get_only_includes_missing_inputs() {
        let key = random_key();
        let present = Position::new(1000, 0, 0).unwrap();
        let signed = make_signed_tx(&[present], &[key], &[]);
        let tx_hash = signed.raw.raw_txhash();

        let mut core = Core::default();
        core.state
            .in_flight_exits
            .insert(tx_hash, watcher_exit_types::InFlightExitInfo::new(signed, [0u8; 24], 1, 1));

        let mut request = Request::new(0, 5000);
        request.utxo_exists_result.insert(present, false);
        core.determine_spends_to_get(&mut request);

        assert_eq!(request.spends_to_get, vec![present]);
    }

    #[test]
    fn not_found_spend_results_are_filtered_with_a_warning() {
        let pos_a = Position::new(1000, 0, 0).unwrap();
        let pos_b = Position::new(2000, 0, 0).unwrap();
        let mut request = Request::new(0, 5000);
        request.spent_blknum_result.insert(pos_a, Some(1000));
        request.spent_blknum_result.insert(pos_b, None);

        let core = Core::default();
        let blknums = core.handle_spent_blknum_result(&mut request);

        assert_eq!(blknums, vec![1000]);
        assert_eq!(request.blocks_to_fetch, vec![1000]);
    }

    #[test]
    fn unchecked_position_defaults_to_exists() {
        let request = Request::new(0, 5000);
        assert!(request.utxo_exists(&Position::new(1000, 0, 0).unwrap()));
    }
}
