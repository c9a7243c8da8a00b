//! Challenge-data assembly: locating competing transactions and proving
//! canonicity for in-flight exits, plus the standard-exit challenge
//! specialisation that locates a spender of an exited output.
//!
//! All functions here are read-only over `&self`/`&Request`, except
//! [`Core::find_ifes_in_blocks`] which updates in-memory inclusion
//! witnesses only (no `DbUpdate`s — see `DESIGN.md`).

use alloy_primitives::{B256, Signature};
use watcher_exit_types::InclusionWitness;
use watcher_position::Position;
use watcher_tx::{RawTransaction, SignedTransaction};

use crate::{BlockStore, Core, KnownTxIndex, Request, errors::ChallengeError};

/// Evidence that some known transaction double-spends an in-flight exit's
/// input — the contract-facing challenge payload for both
/// `get_competitor_for_ife` and the per-slot piggyback challenge data.
#[derive(Clone, Debug)]
pub struct CompetitorEvidence {
    pub in_flight_txbytes: Vec<u8>,
    pub in_flight_input_index: u8,
    pub competing_txbytes: Vec<u8>,
    pub competing_input_index: u8,
    pub competing_sig: Signature,
    pub competing_tx_pos: Position,
    pub competing_proof: Vec<u8>,
}

/// Evidence that an in-flight exit's transaction is, in fact, included in
/// a child-chain block — proves canonicity against an invalid challenge.
#[derive(Clone, Debug)]
pub struct CanonicityEvidence {
    pub in_flight_txbytes: Vec<u8>,
    pub in_flight_tx_pos: Position,
    pub in_flight_proof: Vec<u8>,
}

/// [`CompetitorEvidence`] for one specific piggybacked output slot, plus
/// the IFE's own inclusion proof for that output.
#[derive(Clone, Debug)]
pub struct OutputChallengeData {
    pub competitor: CompetitorEvidence,
    pub in_flight_output_pos: Position,
    pub in_flight_proof: Vec<u8>,
}

/// Challenge evidence for a standard exit: the spender transaction and the
/// signature over the slot that consumed it.
#[derive(Clone, Debug)]
pub struct StandardExitChallengeEvidence {
    pub exit_pos: Position,
    pub input_index: u8,
    pub txbytes: Vec<u8>,
    pub sig: Signature,
}

impl Core {
    fn ife_by_txbytes(
        &self,
        txbytes: &[u8],
    ) -> Result<(B256, &watcher_exit_types::InFlightExitInfo), ChallengeError> {
        let raw = RawTransaction::decode(txbytes)?;
        let hash = raw.raw_txhash();
        let ife = self
            .state
            .in_flight_exits
            .get(&hash)
            .ok_or(ChallengeError::IfeNotKnownForTx(hash))?;
        Ok((hash, ife))
    }

    /// Locates the first known transaction (oldest fetched block wins,
    /// appendix entries as fallback) sharing an input position with the
    /// given in-flight exit.
    pub fn get_competitor_for_ife(
        &self,
        request: &Request,
        block_store: &dyn BlockStore,
        ife_txbytes: &[u8],
    ) -> Result<CompetitorEvidence, ChallengeError> {
        let (ife_hash, ife) = self.ife_by_txbytes(ife_txbytes)?;
        let ife_inputs = ife.signed_tx.raw.get_inputs();
        let known = KnownTxIndex::build(&self.state, request);

        for entry in known.iter() {
            if entry.signed_tx.raw.raw_txhash() == ife_hash {
                continue;
            }
            let competing_inputs = entry.signed_tx.raw.get_inputs();
            let Some(shared) = ife_inputs.iter().find(|p| competing_inputs.contains(p)) else {
                continue;
            };

            let in_flight_input_index =
                ife_inputs.iter().position(|p| p == shared).expect("just found") as u8;
            let competing_input_index = competing_inputs
                .iter()
                .position(|p| p == shared)
                .expect("just found") as u8;

            let ife_spenders = ife.signed_tx.get_spenders()?;
            let spender = ife_spenders[in_flight_input_index as usize];

            let competing_spenders = entry.signed_tx.get_spenders()?;
            let competing_sig = entry
                .signed_tx
                .sigs
                .iter()
                .zip(competing_spenders.iter())
                .find(|(_, addr)| **addr == spender)
                .map(|(sig, _)| sig.clone())
                .unwrap_or_else(|| {
                    panic!(
                        "invariant violation: no competitor signature recovers to expected spender \
                         {spender} for ife {ife_hash}"
                    )
                });

            let (competing_tx_pos, competing_proof) = match entry.position {
                Some(pos) => {
                    let block = request
                        .blocks_result
                        .get(&pos.blknum())
                        .expect("entry position implies a fetched block");
                    (pos, block_store.inclusion_proof(block, pos.txindex()))
                }
                None => (watcher_position::EMPTY, Vec::new()),
            };

            return Ok(CompetitorEvidence {
                in_flight_txbytes: ife_txbytes.to_vec(),
                in_flight_input_index,
                competing_txbytes: entry.signed_tx.raw.encode_raw(),
                competing_input_index,
                competing_sig,
                competing_tx_pos,
                competing_proof,
            });
        }

        Err(ChallengeError::CompetitorNotFound(ife_hash))
    }

    /// Proves an in-flight exit's transaction is included in a fetched
    /// block — the response to an invalid non-canonicity challenge.
    pub fn prove_canonical_for_ife(
        &self,
        request: &Request,
        block_store: &dyn BlockStore,
        ife_txbytes: &[u8],
    ) -> Result<CanonicityEvidence, ChallengeError> {
        let (ife_hash, _) = self.ife_by_txbytes(ife_txbytes)?;
        let known = KnownTxIndex::build(&self.state, request);
        let entry = known
            .find_in_blocks_by_raw_bytes(ife_txbytes)
            .ok_or(ChallengeError::CanonicalNotFound(ife_hash))?;
        let pos = entry.position.expect("matched via find_in_blocks_by_raw_bytes");
        let block = request
            .blocks_result
            .get(&pos.blknum())
            .expect("entry position implies a fetched block");
        Ok(CanonicityEvidence {
            in_flight_txbytes: ife_txbytes.to_vec(),
            in_flight_tx_pos: pos,
            in_flight_proof: block_store.inclusion_proof(block, pos.txindex()),
        })
    }

    /// Competitor evidence for one specific piggybacked input slot.
    pub fn get_input_challenge_data(
        &self,
        request: &Request,
        block_store: &dyn BlockStore,
        ife_txbytes: &[u8],
        index: u8,
    ) -> Result<CompetitorEvidence, ChallengeError> {
        if index as usize >= watcher_position::MAX_INPUTS {
            return Err(ChallengeError::PiggybackedIndexOutOfRange(index));
        }
        let (ife_hash, ife) = self.ife_by_txbytes(ife_txbytes)?;
        let position = *ife
            .signed_tx
            .raw
            .get_inputs()
            .get(index as usize)
            .ok_or(ChallengeError::NoDoubleSpendOnParticularPiggyback { ife: ife_hash, index })?;

        self.find_double_spend_evidence(request, block_store, ife_txbytes, ife_hash, index, position)
    }

    /// Competitor evidence for one specific piggybacked output slot, plus
    /// the IFE's own inclusion proof for that output.
    pub fn get_output_challenge_data(
        &self,
        request: &Request,
        block_store: &dyn BlockStore,
        ife_txbytes: &[u8],
        index: u8,
    ) -> Result<OutputChallengeData, ChallengeError> {
        if index as usize >= watcher_position::MAX_OUTPUTS {
            return Err(ChallengeError::PiggybackedIndexOutOfRange(index));
        }
        let (ife_hash, ife) = self.ife_by_txbytes(ife_txbytes)?;
        let witness = ife
            .tx_seen_in_blocks_at
            .as_ref()
            .ok_or(ChallengeError::NoDoubleSpendOnParticularPiggyback { ife: ife_hash, index })?;
        let output_pos = Position::new(witness.position.blknum(), witness.position.txindex(), index)
            .map_err(|_| ChallengeError::PiggybackedIndexOutOfRange(index))?;

        let competitor = self.find_double_spend_evidence(
            request,
            block_store,
            ife_txbytes,
            ife_hash,
            index,
            output_pos,
        )?;

        let block = request
            .blocks_result
            .get(&witness.position.blknum())
            .expect("inclusion witness implies a fetched block");
        Ok(OutputChallengeData {
            competitor,
            in_flight_output_pos: output_pos,
            in_flight_proof: block_store.inclusion_proof(block, witness.position.txindex()),
        })
    }

    fn find_double_spend_evidence(
        &self,
        request: &Request,
        block_store: &dyn BlockStore,
        ife_txbytes: &[u8],
        ife_hash: B256,
        slot_index: u8,
        position: Position,
    ) -> Result<CompetitorEvidence, ChallengeError> {
        let known = KnownTxIndex::build(&self.state, request);
        let entry = known.spenders_of(position, ife_hash).next().ok_or(
            ChallengeError::NoDoubleSpendOnParticularPiggyback {
                ife: ife_hash,
                index: slot_index,
            },
        )?;

        let competing_input_index = entry
            .signed_tx
            .raw
            .get_inputs()
            .iter()
            .position(|p| *p == position)
            .expect("spenders_of guarantees a matching input") as u8;

        let (competing_tx_pos, competing_proof) = match entry.position {
            Some(pos) => {
                let block = request
                    .blocks_result
                    .get(&pos.blknum())
                    .expect("entry position implies a fetched block");
                (pos, block_store.inclusion_proof(block, pos.txindex()))
            }
            None => (watcher_position::EMPTY, Vec::new()),
        };

        Ok(CompetitorEvidence {
            in_flight_txbytes: ife_txbytes.to_vec(),
            in_flight_input_index: slot_index,
            competing_txbytes: entry.signed_tx.raw.encode_raw(),
            competing_input_index,
            competing_sig: entry.signed_tx.sigs[competing_input_index as usize].clone(),
            competing_tx_pos,
            competing_proof,
        })
    }

    /// For every in-flight exit lacking an inclusion witness, scans fetched
    /// blocks for its exact encoded transaction. In-memory only: produces
    /// no `DbUpdate`s (see `DESIGN.md`).
    pub fn find_ifes_in_blocks(&mut self, request: &Request, block_store: &dyn BlockStore) {
        let mut blknums: Vec<u64> = request.blocks_result.keys().copied().collect();
        blknums.sort();

        let mut found: Vec<(B256, InclusionWitness)> = Vec::new();
        for (tx_hash, ife) in &self.state.in_flight_exits {
            if ife.has_inclusion_witness() {
                continue;
            }
            let txbytes = ife.txbytes();
            'blocks: for &blknum in &blknums {
                let block = &request.blocks_result[&blknum];
                for (txindex, raw_bytes) in block.transactions.iter().enumerate() {
                    let Ok(signed) = SignedTransaction::decode(raw_bytes) else {
                        continue;
                    };
                    if signed.raw.encode_raw() != txbytes {
                        continue;
                    }
                    if let Ok(position) = Position::new(blknum, txindex as u32, 0) {
                        let proof = block_store.inclusion_proof(block, txindex as u32);
                        found.push((*tx_hash, InclusionWitness { position, proof }));
                    }
                    break 'blocks;
                }
            }
        }

        for (tx_hash, witness) in found {
            if let Some(ife) = self.state.in_flight_exits.get_mut(&tx_hash) {
                ife.tx_seen_in_blocks_at = Some(witness);
            }
        }
    }

    /// Plans and (given the ledger/block-store answers) assembles a
    /// standard-exit challenge: the spender transaction's input slot and
    /// signature for the given position.
    pub fn standard_exit_challenge(
        &self,
        request: &Request,
        exit_pos: Position,
    ) -> Result<StandardExitChallengeEvidence, ChallengeError> {
        if !self.state.exits.contains_key(&exit_pos) {
            return Err(ChallengeError::ExitNotFound(exit_pos));
        }
        let blknum = request
            .spent_blknum_result
            .get(&exit_pos)
            .copied()
            .flatten()
            .ok_or(ChallengeError::SpendNotLocated(exit_pos))?;
        let block = request
            .blocks_result
            .get(&blknum)
            .ok_or(ChallengeError::SpendNotLocated(exit_pos))?;

        for raw_bytes in &block.transactions {
            let Ok(signed) = SignedTransaction::decode(raw_bytes) else {
                continue;
            };
            let inputs = signed.raw.get_inputs();
            let Some(input_index) = inputs.iter().position(|p| *p == exit_pos) else {
                continue;
            };
            return Ok(StandardExitChallengeEvidence {
                exit_pos,
                input_index: input_index as u8,
                txbytes: signed.raw.encode_raw(),
                sig: signed.sigs[input_index].clone(),
            });
        }
        Err(ChallengeError::SpendNotLocated(exit_pos))
    }
}
