//! Event-ingestion operations: translating root-contract events into
//! state mutations and the persistence deltas they produce.
//!
//! Every operation here mutates `Core`'s state in place and returns the
//! `DbUpdate`s (and, where the operation surfaces something actionable,
//! `Event`s) the driver must apply/forward atomically with accepting the
//! call.

use std::collections::BTreeMap;

use alloy_primitives::{B256, Signature};
use tracing::{debug, info};
use watcher_exit_types::{CompetitorInfo, DbUpdate, Event, ExitInfo, InFlightExitInfo};
use watcher_position::Position;
use watcher_tx::{RawTransaction, SignedTransaction};

use crate::{Core, errors::IngestError};

/// A standard-exit-started event read off the root contract: the position
/// being exited, and the raw bytes of the transaction whose output is
/// being exited.
#[derive(Clone, Debug)]
pub struct NewExitEvent {
    pub position: Position,
    pub output_tx_bytes: Vec<u8>,
}

/// The contract's current view of an exit at the time it's ingested.
#[derive(Clone, Copy, Debug)]
pub struct ExitContractStatus {
    pub owner: alloy_primitives::Address,
    pub eth_height: u64,
}

/// An in-flight-exit-started event read off the root contract.
#[derive(Clone, Debug)]
pub struct NewIfeEvent {
    pub raw_tx_bytes: Vec<u8>,
    pub input_sigs: Vec<Signature>,
    pub contract_id: [u8; 24],
}

/// The contract's current view of an in-flight exit at ingestion time.
#[derive(Clone, Copy, Debug)]
pub struct IfeContractStatus {
    pub timestamp: u64,
    pub eth_height: u64,
}

/// A piggyback (or piggyback-challenge) target: an IFE and one of its 8
/// slots (`0..=3` input, `4..=7` output).
#[derive(Clone, Copy, Debug)]
pub struct PiggybackTarget {
    pub tx_hash: B256,
    pub output_index: u8,
}

/// An in-flight-exit challenge: a competing transaction double-spending
/// one of the IFE's inputs.
#[derive(Clone, Debug)]
pub struct IfeChallengeEvent {
    pub tx_hash: B256,
    pub competing_tx_bytes: Vec<u8>,
    pub competing_input_index: u8,
    pub competing_sig: Signature,
}

/// The two position sets `finalize_exits` splits its input into.
#[derive(Clone, Debug, Default)]
pub struct FinalizeExitsRequest {
    pub valid_positions: Vec<Position>,
    pub invalid_positions: Vec<Position>,
}

/// The two-phase input to `finalize_in_flight_exits`.
#[derive(Clone, Debug, Default)]
pub struct FinalizeIfesRequest {
    /// `(in_flight_exit_id, output_index)` pairs being finalized.
    pub finalizations: Vec<(B256, u8)>,
    /// IDs with at least one invalidity reported, forcing reactivation.
    pub invalidities_by_ife_id: BTreeMap<B256, Vec<String>>,
}

impl Core {
    /// Ingests standard-exit-started events.
    pub fn new_exits(
        &mut self,
        events: &[NewExitEvent],
        statuses: &[ExitContractStatus],
    ) -> Result<Vec<DbUpdate>, IngestError> {
        if events.len() != statuses.len() {
            return Err(IngestError::UnexpectedEvents {
                events: events.len(),
                statuses: statuses.len(),
            });
        }

        let mut updates = Vec::with_capacity(events.len());
        for (event, status) in events.iter().zip(statuses) {
            let raw = RawTransaction::decode(&event.output_tx_bytes)?;
            let output = raw
                .output_slots()
                .get(event.position.oindex() as usize)
                .copied()
                .unwrap_or(watcher_tx::Output::EMPTY);

            let exit = ExitInfo {
                amount: output.amount,
                currency: output.currency,
                owner: status.owner,
                is_active: status.owner != watcher_tx::ZERO_ADDR,
                eth_height: status.eth_height,
            };

            // Insertion never overwrites — the contract guarantees unique positions.
            if self.state.exits.insert(event.position, exit).is_none() {
                updates.push(DbUpdate::PutExit {
                    position: event.position,
                    exit,
                });
            }
        }
        Ok(updates)
    }

    /// Ingests in-flight-exit-started events.
    pub fn new_in_flight_exits(
        &mut self,
        events: &[NewIfeEvent],
        statuses: &[IfeContractStatus],
    ) -> Result<Vec<DbUpdate>, IngestError> {
        if events.len() != statuses.len() {
            return Err(IngestError::UnexpectedEvents {
                events: events.len(),
                statuses: statuses.len(),
            });
        }

        let mut updates = Vec::with_capacity(events.len());
        for (event, status) in events.iter().zip(statuses) {
            let raw = RawTransaction::decode(&event.raw_tx_bytes)?;
            let tx_hash = raw.raw_txhash();
            let signed_tx = SignedTransaction::new(raw, event.input_sigs.clone());
            let ife = InFlightExitInfo::new(
                signed_tx,
                event.contract_id,
                status.timestamp,
                status.eth_height,
            );
            self.state.in_flight_exits.insert(tx_hash, ife.clone());
            updates.push(DbUpdate::PutIfe { tx_hash, ife });
        }
        Ok(updates)
    }

    /// Sets piggyback bits. Idempotent per `(tx_hash, output_index)`.
    pub fn new_piggybacks(
        &mut self,
        targets: &[PiggybackTarget],
    ) -> Result<Vec<DbUpdate>, IngestError> {
        let mut updates = Vec::new();
        for target in targets {
            let ife = self
                .state
                .in_flight_exits
                .get_mut(&target.tx_hash)
                .ok_or(IngestError::IfeNotKnownForTx(target.tx_hash))?;
            ife.set_piggybacked(target.output_index);
            updates.push(DbUpdate::PutIfe {
                tx_hash: target.tx_hash,
                ife: ife.clone(),
            });
        }
        Ok(updates)
    }

    /// Clears piggyback bits. Silently skips unknown IFEs or slots that
    /// were never piggybacked.
    pub fn challenge_piggybacks(&mut self, targets: &[PiggybackTarget]) -> Vec<DbUpdate> {
        let mut updates = Vec::new();
        for target in targets {
            let Some(ife) = self.state.in_flight_exits.get_mut(&target.tx_hash) else {
                debug!(tx_hash = %target.tx_hash, "challenge_piggybacks: unknown ife, skipping");
                continue;
            };
            if !ife.is_piggybacked(target.output_index) {
                continue;
            }
            ife.clear_piggybacked(target.output_index);
            updates.push(DbUpdate::PutIfe {
                tx_hash: target.tx_hash,
                ife: ife.clone(),
            });
        }
        updates
    }

    /// Drops challenged standard exits. Unknown positions are silently
    /// skipped.
    pub fn challenge_exits(&mut self, positions: &[Position]) -> Vec<DbUpdate> {
        let mut updates = Vec::new();
        for position in positions {
            if self.state.exits.remove(position).is_some() {
                updates.push(DbUpdate::DeleteExit { position: *position });
            }
        }
        updates
    }

    /// Finalizes standard exits: valid ones are removed and trigger
    /// [`Event::ExitFinalized`]; invalid ones are forced active so they
    /// keep producing [`Event::InvalidExit`] until properly challenged.
    pub fn finalize_exits(
        &mut self,
        request: &FinalizeExitsRequest,
    ) -> (Vec<DbUpdate>, Vec<Event>) {
        let mut updates = Vec::new();
        let mut events = Vec::new();

        for position in &request.valid_positions {
            if let Some(exit) = self.state.exits.remove(position) {
                events.push(Event::ExitFinalized {
                    utxo_pos: *position,
                    owner: exit.owner,
                    currency: exit.currency,
                    amount: exit.amount,
                });
                updates.push(DbUpdate::DeleteExit { position: *position });
            }
        }

        for position in &request.invalid_positions {
            if let Some(exit) = self.state.exits.get_mut(position) {
                exit.is_active = true;
                updates.push(DbUpdate::PutExit {
                    position: *position,
                    exit: *exit,
                });
                info!(%position, "invalid finalization reactivated exit");
            }
        }

        (updates, events)
    }

    /// Ingests in-flight-exit challenges: stores the competitor and flips
    /// the referenced IFE non-canonical.
    pub fn new_ife_challenges(
        &mut self,
        events: &[IfeChallengeEvent],
    ) -> Result<Vec<DbUpdate>, IngestError> {
        let mut updates = Vec::new();
        for event in events {
            let ife = self
                .state
                .in_flight_exits
                .get_mut(&event.tx_hash)
                .ok_or(IngestError::IfeNotKnownForTx(event.tx_hash))?;
            ife.is_canonical = false;
            updates.push(DbUpdate::PutIfe {
                tx_hash: event.tx_hash,
                ife: ife.clone(),
            });

            let competing_raw = RawTransaction::decode(&event.competing_tx_bytes)?;
            let competitor = CompetitorInfo::new(
                competing_raw,
                event.competing_input_index,
                event.competing_sig.clone(),
            );
            self.state.competitors.insert(event.tx_hash, competitor.clone());
            updates.push(DbUpdate::PutCompetitor {
                tx_hash: event.tx_hash,
                competitor,
            });
        }
        Ok(updates)
    }

    /// Two-phase in-flight-exit finalization: validates every referenced id
    /// and piggyback is known before mutating anything.
    pub fn finalize_in_flight_exits(
        &mut self,
        request: &FinalizeIfesRequest,
    ) -> Result<Vec<DbUpdate>, IngestError> {
        let mut unknown_ids = Vec::new();
        let mut unknown_piggybacks = Vec::new();
        for &(id, output_index) in &request.finalizations {
            match self.state.in_flight_exits.get(&id) {
                None => unknown_ids.push(id),
                Some(ife) if !ife.is_piggybacked(output_index) => {
                    unknown_piggybacks.push((id, output_index))
                }
                Some(_) => {}
            }
        }
        if !unknown_ids.is_empty() {
            return Err(IngestError::UnknownInFlightExit(unknown_ids));
        }
        if !unknown_piggybacks.is_empty() {
            return Err(IngestError::UnknownPiggybacks(unknown_piggybacks));
        }

        let mut updates = Vec::new();
        for &(id, output_index) in &request.finalizations {
            let ife = self
                .state
                .in_flight_exits
                .get_mut(&id)
                .expect("validated above");
            if ife.is_active {
                ife.exit_map.set(output_index);
            }
            if request
                .invalidities_by_ife_id
                .get(&id)
                .is_some_and(|list| !list.is_empty())
            {
                ife.is_active = true;
            }
            updates.push(DbUpdate::PutIfe {
                tx_hash: id,
                ife: ife.clone(),
            });
        }
        Ok(updates)
    }

    /// Dry-run variant of [`Core::finalize_in_flight_exits`]: for each IFE
    /// id in the request, the positions that should actually be exited —
    /// inputs for slots `0..=3`, the corresponding output position for
    /// slots `4..=7`.
    pub fn prepare_utxo_exits_for_in_flight_exit_finalizations(
        &self,
        finalizations: &[(B256, u8)],
    ) -> Result<BTreeMap<B256, (Vec<Position>, Vec<Position>)>, IngestError> {
        let mut out: BTreeMap<B256, (Vec<Position>, Vec<Position>)> = BTreeMap::new();
        for &(id, output_index) in finalizations {
            let ife = self
                .state
                .in_flight_exits
                .get(&id)
                .ok_or(IngestError::IfeNotKnownForTx(id))?;
            let entry = out.entry(id).or_default();
            if output_index < watcher_position::MAX_INPUTS as u8 {
                if let Some(pos) = ife.signed_tx.raw.get_inputs().get(output_index as usize) {
                    entry.0.push(*pos);
                }
            } else {
                let witness = ife.tx_seen_in_blocks_at.as_ref();
                let real_index = output_index - watcher_position::MAX_INPUTS as u8;
                if let Some(witness) = witness {
                    if let Ok(pos) =
                        Position::new(witness.position.blknum(), witness.position.txindex(), real_index)
                    {
                        entry.1.push(pos);
                    }
                }
            }
        }
        Ok(out)
    }
}
