//! Shared fixtures for the ingest/analysis/challenge test modules.

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, Signature, U256};
use k256::ecdsa::{SigningKey, signature::hazmat::PrehashSigner};
use rand::rngs::OsRng;
use watcher_position::Position;
use watcher_tx::{Output, RawTransaction, SignedTransaction};

use crate::collab::{Block, BlockStore};

pub(crate) fn random_key() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

pub(crate) fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    Address::from_raw_public_key(&point.as_bytes()[1..])
}

pub(crate) fn sign(key: &SigningKey, hash: B256) -> Signature {
    let (sig, recid): (k256::ecdsa::Signature, k256::ecdsa::RecoveryId) =
        key.sign_prehash(hash.as_slice()).unwrap();
    Signature::new(
        U256::from_be_slice(&sig.r().to_bytes()),
        U256::from_be_slice(&sig.s().to_bytes()),
        recid.is_y_odd(),
    )
}

/// Builds a raw transaction and signs each populated input slot with the
/// corresponding key (slot order must match `inputs`).
pub(crate) fn make_signed_tx(
    inputs: &[Position],
    keys: &[SigningKey],
    outputs: &[Output],
) -> SignedTransaction {
    assert_eq!(inputs.len(), keys.len());
    let raw = RawTransaction::new(inputs, outputs, B256::ZERO);
    let hash = raw.typed_data_hash();
    let sigs = keys.iter().map(|k| sign(k, hash)).collect();
    SignedTransaction::new(raw, sigs)
}

/// An in-memory [`BlockStore`] over a fixed set of blocks, with a
/// deterministic stand-in inclusion proof (`txindex` as a single byte) since
/// the core never interprets proof contents itself.
#[derive(Default)]
pub(crate) struct FakeBlockStore {
    blocks: BTreeMap<u64, Block>,
}

impl FakeBlockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_block(&mut self, number: u64, transactions: Vec<Vec<u8>>) -> Block {
        let block = Block {
            number,
            hash: B256::repeat_byte(number as u8),
            transactions,
        };
        self.blocks.insert(number, block.clone());
        block
    }
}

impl BlockStore for FakeBlockStore {
    fn get_blocks(&self, blknums: &[u64]) -> Vec<Option<Block>> {
        blknums.iter().map(|b| self.blocks.get(b).cloned()).collect()
    }

    fn inclusion_proof(&self, _block: &Block, txindex: u32) -> Vec<u8> {
        vec![txindex as u8]
    }
}
