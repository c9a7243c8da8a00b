//! Validity analysis: canonicity and double-spend checks for standard
//! exits and in-flight exits.

use std::collections::BTreeSet;

use watcher_exit_types::{ChainStatus, Event, PiggybackSlot};
use watcher_position::Position;

use crate::{Core, KnownTxIndex, Request};

impl Core {
    /// Runs all eight validity-analysis substeps against a request whose
    /// `utxos_to_check`, `utxo_exists_result` and `blocks_result` are
    /// populated, returning the resulting chain status and the
    /// concatenated event list.
    ///
    /// Read-only: takes `&self`, mutates nothing. Safe to call against a
    /// snapshot while the ingest path continues on another `Core`.
    pub fn check_validity(&self, request: &Request) -> (ChainStatus, Vec<Event>) {
        let known = KnownTxIndex::build(&self.state, request);
        let mut events = Vec::new();
        let mut status = ChainStatus::Ok;

        // 1. Missing positions: explicitly reported non-existent.
        let missing: BTreeSet<Position> = request
            .utxos_to_check
            .iter()
            .copied()
            .filter(|p| request.utxo_exists_result.get(p) == Some(&false))
            .collect();

        // 2. Invalid standard exits: active, and their position is missing.
        let mut invalid_positions: BTreeSet<Position> = self
            .state
            .active_exit_positions()
            .filter(|p| missing.contains(p))
            .collect();

        // 8 (first half): standard exits overlapping an IFE-appendix input.
        let ife_appendix_inputs: BTreeSet<Position> = self
            .state
            .in_flight_exits
            .values()
            .flat_map(|ife| ife.signed_tx.raw.get_inputs())
            .collect();
        invalid_positions.extend(
            self.state
                .active_exit_positions()
                .filter(|p| ife_appendix_inputs.contains(p)),
        );

        // 3 + 8: emit InvalidExit (and UnchallengedExit for late ones).
        for position in &invalid_positions {
            let exit = &self.state.exits[position];
            events.push(Event::InvalidExit {
                utxo_pos: *position,
                owner: exit.owner,
                currency: exit.currency,
                amount: exit.amount,
                eth_height: exit.eth_height,
            });
            if exit.is_late(request.eth_height_now, self.state.sla_margin) {
                status = ChainStatus::UnchallengedExit;
                events.push(Event::UnchallengedExit {
                    utxo_pos: *position,
                    owner: exit.owner,
                    currency: exit.currency,
                    amount: exit.amount,
                    eth_height: exit.eth_height,
                });
            }
        }

        // 4. Canonical IFEs double-spent by a known transaction.
        for (tx_hash, ife) in self.state.active_ifes().filter(|(_, ife)| ife.is_canonical) {
            let has_competitor = ife
                .signed_tx
                .raw
                .get_inputs()
                .iter()
                .any(|input| known.spenders_of(*input, *tx_hash).next().is_some());
            if has_competitor {
                events.push(Event::NonCanonicalIfe {
                    txbytes: ife.txbytes(),
                });
            }
        }

        // 5. Non-canonical IFEs whose tx verbatim appears in a fetched block.
        for ife in self
            .state
            .in_flight_exits
            .values()
            .filter(|ife| !ife.is_canonical)
        {
            let txbytes = ife.txbytes();
            if known.find_in_blocks_by_raw_bytes(&txbytes).is_some() {
                events.push(Event::InvalidIfeChallenge { txbytes });
            }
        }

        // 6. Invalid piggybacks: a piggybacked slot with a known double-spend.
        for (tx_hash, ife) in self.state.active_ifes() {
            let inputs = ife.signed_tx.raw.get_inputs();
            let bad_inputs: Vec<u8> = ife
                .piggybacked_inputs
                .active_indices()
                .filter(|&i| {
                    inputs
                        .get(i as usize)
                        .is_some_and(|pos| known.spenders_of(*pos, *tx_hash).next().is_some())
                })
                .collect();

            let bad_outputs: Vec<u8> = ife
                .piggybacked_outputs
                .active_indices()
                .filter(|&i| output_double_spent(ife, i, &known, *tx_hash))
                .collect();

            if !bad_inputs.is_empty() || !bad_outputs.is_empty() {
                events.push(Event::InvalidPiggyback {
                    txbytes: ife.txbytes(),
                    inputs: bad_inputs,
                    outputs: bad_outputs,
                });
            }
        }

        // 7. Available piggybacks: active IFEs not found in any fetched
        // block, reporting not-yet-piggybacked slots with a non-zero
        // claimant.
        for (_, ife) in self.state.active_ifes() {
            let txbytes = ife.txbytes();
            if known.find_in_blocks_by_raw_bytes(&txbytes).is_some() {
                continue;
            }

            let spenders = ife.signed_tx.get_spenders().ok();
            let available_inputs: Vec<PiggybackSlot> = spenders
                .as_deref()
                .unwrap_or(&[])
                .iter()
                .enumerate()
                .filter(|(i, addr)| {
                    !ife.piggybacked_inputs.is_set(*i as u8) && **addr != watcher_tx::ZERO_ADDR
                })
                .map(|(i, addr)| PiggybackSlot {
                    index: i as u8,
                    address: *addr,
                })
                .collect();

            let outputs = ife.signed_tx.raw.get_outputs();
            let available_outputs: Vec<PiggybackSlot> = outputs
                .iter()
                .enumerate()
                .filter(|(i, output)| {
                    !ife.piggybacked_outputs.is_set(*i as u8) && output.owner != watcher_tx::ZERO_ADDR
                })
                .map(|(i, output)| PiggybackSlot {
                    index: i as u8,
                    address: output.owner,
                })
                .collect();

            if !available_inputs.is_empty() || !available_outputs.is_empty() {
                events.push(Event::PiggybackAvailable {
                    txbytes,
                    available_inputs,
                    available_outputs,
                });
            }
        }

        (status, events)
    }
}

/// `true` if output-piggyback slot `output_index` on `ife` is double-spent
/// by some other known transaction. An output only has a checkable
/// position once the IFE's inclusion is known.
fn output_double_spent(
    ife: &watcher_exit_types::InFlightExitInfo,
    output_index: u8,
    known: &KnownTxIndex,
    exclude: alloy_primitives::B256,
) -> bool {
    let Some(witness) = &ife.tx_seen_in_blocks_at else {
        return false;
    };
    let Ok(pos) = Position::new(witness.position.blknum(), witness.position.txindex(), output_index)
    else {
        return false;
    };
    known.spenders_of(pos, exclude).next().is_some()
}

#[cfg(test)]
mod tests {

    use alloy_primitives::Address;
    use watcher_exit_types::ExitInfo;

    use super::*;
    use crate::{collab::Block, request::Request, test_utils::random_key};
    use crate::test_utils::make_signed_tx;

    fn block(number: u64, transactions: Vec<Vec<u8>>) -> Block {
        Block {
            number,
            hash: alloy_primitives::B256::repeat_byte(number as u8),
            transactions,
        }
    }

    /// An invalid exit left unchallenged past its SLA margin flips chain status.
    #[test]
    fn late_invalid_exit_flips_chain_status() {
        let pos = Position::new(1000, 0, 0).unwrap();
        let mut core = Core::default();
        core.state.sla_margin = 10;
        core.state.exits.insert(
            pos,
            ExitInfo {
                amount: 10,
                currency: watcher_tx::ZERO_ADDR,
                owner: Address::repeat_byte(1),
                is_active: true,
                eth_height: 100,
            },
        );

        let mut request = Request::new(110, 2000);
        request.utxos_to_check = vec![pos];
        request.utxo_exists_result.insert(pos, false);

        let (status, events) = core.check_validity(&request);

        assert_eq!(status, ChainStatus::UnchallengedExit);
        assert!(events.iter().any(|e| matches!(e, Event::InvalidExit { utxo_pos, .. } if *utxo_pos == pos)));
        assert!(events.iter().any(|e| matches!(e, Event::UnchallengedExit { utxo_pos, .. } if *utxo_pos == pos)));
    }

    #[test]
    fn exit_within_sla_margin_stays_ok() {
        let pos = Position::new(1000, 0, 0).unwrap();
        let mut core = Core::default();
        core.state.sla_margin = 10;
        core.state.exits.insert(
            pos,
            ExitInfo {
                amount: 10,
                currency: watcher_tx::ZERO_ADDR,
                owner: Address::repeat_byte(1),
                is_active: true,
                eth_height: 100,
            },
        );

        let mut request = Request::new(109, 2000);
        request.utxos_to_check = vec![pos];
        request.utxo_exists_result.insert(pos, false);

        let (status, events) = core.check_validity(&request);
        assert_eq!(status, ChainStatus::Ok);
        assert!(events.iter().any(|e| matches!(e, Event::InvalidExit { .. })));
        assert!(!events.iter().any(|e| matches!(e, Event::UnchallengedExit { .. })));
    }

    /// A non-canonical IFE whose raw tx is actually included raises an invalid-challenge event.
    #[test]
    fn invalid_ife_challenge_when_noncanonical_tx_appears_in_block() {
        let key = random_key();
        let input = Position::new(1000, 0, 0).unwrap();
        let signed = make_signed_tx(&[input], &[key], &[]);
        let tx_hash = signed.raw.raw_txhash();
        let txbytes = signed.raw.encode_raw();

        let mut core = Core::default();
        let mut ife = make_ife(signed);
        ife.is_canonical = false;
        core.state.in_flight_exits.insert(tx_hash, ife);

        let mut request = Request::new(100, 6000);
        request
            .blocks_result
            .insert(5000, block(5000, vec![txbytes.clone()]));

        let (_, events) = core.check_validity(&request);
        assert!(events.iter().any(
            |e| matches!(e, Event::InvalidIfeChallenge { txbytes: t } if *t == txbytes)
        ));
    }

    /// An IFE found in a fetched block never reports available piggybacks.
    #[test]
    fn piggyback_available_never_emitted_for_included_ife() {
        let key = random_key();
        let input = Position::new(1000, 0, 0).unwrap();
        let signed = make_signed_tx(&[input], &[key], &[]);
        let tx_hash = signed.raw.raw_txhash();
        let txbytes = signed.raw.encode_raw();

        let mut core = Core::default();
        core.state
            .in_flight_exits
            .insert(tx_hash, make_ife(signed));

        let mut request = Request::new(100, 6000);
        request
            .blocks_result
            .insert(5000, block(5000, vec![txbytes]));

        let (_, events) = core.check_validity(&request);
        assert!(!events.iter().any(|e| matches!(e, Event::PiggybackAvailable { .. })));
    }

    #[test]
    fn piggyback_available_for_active_ife_not_in_any_block() {
        let key = random_key();
        let owner = crate::test_utils::address_of(&key);
        let input = Position::new(1000, 0, 0).unwrap();
        let signed = make_signed_tx(&[input], &[key], &[]);
        let tx_hash = signed.raw.raw_txhash();

        let mut core = Core::default();
        core.state
            .in_flight_exits
            .insert(tx_hash, make_ife(signed));

        let request = Request::new(100, 6000);
        let (_, events) = core.check_validity(&request);
        assert!(events.iter().any(|e| matches!(
            e,
            Event::PiggybackAvailable { available_inputs, .. }
                if available_inputs.iter().any(|s| s.index == 0 && s.address == owner)
        )));
    }

    /// Standard exits that equal an IFE-appendix input are flagged invalid
    /// even without an explicit existence check (step 8).
    #[test]
    fn exit_overlapping_ife_input_is_invalid() {
        let key = random_key();
        let pos = Position::new(1000, 0, 0).unwrap();
        let signed = make_signed_tx(&[pos], &[key], &[]);
        let ife_hash = signed.raw.raw_txhash();

        let mut core = Core::default();
        core.state.in_flight_exits.insert(ife_hash, make_ife(signed));
        core.state.exits.insert(
            pos,
            ExitInfo {
                amount: 5,
                currency: watcher_tx::ZERO_ADDR,
                owner: Address::repeat_byte(9),
                is_active: true,
                eth_height: 10,
            },
        );

        let request = Request::new(100, 6000);
        let (_, events) = core.check_validity(&request);
        assert!(events.iter().any(|e| matches!(e, Event::InvalidExit { utxo_pos, .. } if *utxo_pos == pos)));
    }

    fn make_ife(signed_tx: watcher_tx::SignedTransaction) -> watcher_exit_types::InFlightExitInfo {
        watcher_exit_types::InFlightExitInfo::new(signed_tx, [0u8; 24], 1, 10)
    }
}
