//! Plasma transaction decoding, hashing, and spender recovery.
//!
//! A transaction has up to [`watcher_position::MAX_INPUTS`] inputs (each a
//! [`Position`], the zero position meaning "empty slot") and up to
//! [`watcher_position::MAX_OUTPUTS`] outputs. Encoding is RLP, matching the
//! root contract's expected wire format; hashing and signature recovery use
//! the same `alloy_primitives` keccak/secp256k1 primitives the workspace's
//! `reth`-derived crates already depend on.

use alloy_primitives::{Address, B256, Signature, keccak256};
use alloy_rlp::{Decodable, Encodable, Header, RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use watcher_position::Position;

/// Sentinel "ether" / "no owner" address.
pub const ZERO_ADDR: Address = Address::ZERO;

/// Domain-separator preimage for [`typed_data_hash`]. Mirrors EIP-712's
/// `\x19\x01 || domainSeparator || structHash` scheme using a fixed domain
/// rather than a chain-id-parameterized one, since the watcher core has no
/// notion of which root chain it's anchored to beyond what the driver tells
/// it out of band.
const DOMAIN_SEPARATOR_PREIMAGE: &[u8] = b"watcher-exit-processor/plasma-tx/v1";

/// One output slot: `{owner, currency, amount}`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize,
)]
pub struct Output {
    pub owner: Address,
    pub currency: Address,
    pub amount: u64,
}

impl Output {
    /// The sentinel value filling unused output slots.
    pub const EMPTY: Output = Output {
        owner: Address::ZERO,
        currency: Address::ZERO,
        amount: 0,
    };

    /// `true` if this slot carries no real output.
    pub fn is_empty(&self) -> bool {
        self.owner == ZERO_ADDR && self.amount == 0
    }
}

/// Errors decoding a raw or signed transaction.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The RLP payload is malformed or doesn't match the expected shape.
    #[error("rlp decode failed: {0}")]
    Rlp(#[from] alloy_rlp::Error),

    /// `sigs.len()` didn't match the number of populated input slots.
    #[error("signature arity mismatch: expected {expected} signatures, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// Recovering the spender address from a signature failed.
    #[error("invalid signature at input slot {index}: {source}")]
    InvalidSignature {
        index: usize,
        #[source]
        source: alloy_primitives::SignatureError,
    },
}

/// A decoded Plasma transaction: up to four inputs, up to four outputs, and
/// an opaque metadata word.
///
/// Always encodes all four input and output slots (unused slots filled with
/// [`Position::EMPTY`] / [`Output::EMPTY`]) so the wire format matches the
/// root contract's fixed-width ABI packing exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    inputs: [Position; watcher_position::MAX_INPUTS],
    outputs: [Output; watcher_position::MAX_OUTPUTS],
    metadata: B256,
}

impl RawTransaction {
    /// Builds a transaction from up to 4 inputs and up to 4 outputs, padding
    /// any remaining slots with the empty sentinel.
    pub fn new(inputs: &[Position], outputs: &[Output], metadata: B256) -> Self {
        let mut ins = [watcher_position::EMPTY; watcher_position::MAX_INPUTS];
        for (slot, input) in ins.iter_mut().zip(inputs.iter()) {
            *slot = *input;
        }
        let mut outs = [Output::EMPTY; watcher_position::MAX_OUTPUTS];
        for (slot, output) in outs.iter_mut().zip(outputs.iter()) {
            *slot = *output;
        }
        Self {
            inputs: ins,
            outputs: outs,
            metadata,
        }
    }

    /// The populated (non-empty) input positions, in slot order.
    pub fn get_inputs(&self) -> Vec<Position> {
        self.inputs
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect()
    }

    /// The populated (non-empty) outputs, in slot order.
    pub fn get_outputs(&self) -> Vec<Output> {
        self.outputs
            .iter()
            .filter(|o| !o.is_empty())
            .copied()
            .collect()
    }

    /// The raw input slot array, including empty slots.
    pub fn input_slots(&self) -> &[Position; watcher_position::MAX_INPUTS] {
        &self.inputs
    }

    /// The raw output slot array, including empty slots.
    pub fn output_slots(&self) -> &[Output; watcher_position::MAX_OUTPUTS] {
        &self.outputs
    }

    pub fn metadata(&self) -> B256 {
        self.metadata
    }

    fn payload_length(&self) -> usize {
        self.inputs.iter().map(Encodable::length).sum::<usize>()
            + self.outputs.iter().map(Encodable::length).sum::<usize>()
            + self.metadata.length()
    }

    /// Canonical RLP encoding — this, hashed, is `raw_txhash`.
    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.length());
        self.encode(&mut buf);
        buf
    }

    /// Inverse of [`RawTransaction::encode_raw`].
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = bytes;
        let raw = <Self as Decodable>::decode(&mut buf)?;
        Ok(raw)
    }

    /// Keccak of the canonical RLP encoding.
    pub fn raw_txhash(&self) -> B256 {
        keccak256(self.encode_raw())
    }

    /// The EIP-712-style typed-data hash fed to signature recovery.
    pub fn typed_data_hash(&self) -> B256 {
        let domain_separator = keccak256(DOMAIN_SEPARATOR_PREIMAGE);
        let struct_hash = keccak256(self.encode_raw());
        let mut preimage = Vec::with_capacity(2 + 32 + 32);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(domain_separator.as_slice());
        preimage.extend_from_slice(struct_hash.as_slice());
        keccak256(preimage)
    }
}

impl Encodable for RawTransaction {
    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }

    fn encode(&self, out: &mut dyn alloy_rlp::bytes::BufMut) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        for input in &self.inputs {
            input.encode(out);
        }
        for output in &self.outputs {
            output.encode(out);
        }
        self.metadata.encode(out);
    }
}

impl Decodable for RawTransaction {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let started_len = buf.len();

        let mut inputs = [watcher_position::EMPTY; watcher_position::MAX_INPUTS];
        for slot in inputs.iter_mut() {
            *slot = Position::decode(buf)?;
        }
        let mut outputs = [Output::EMPTY; watcher_position::MAX_OUTPUTS];
        for slot in outputs.iter_mut() {
            *slot = Output::decode(buf)?;
        }
        let metadata = B256::decode(buf)?;

        let consumed = started_len - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            });
        }
        Ok(Self {
            inputs,
            outputs,
            metadata,
        })
    }
}

/// A raw transaction bundled with one signature per populated input slot,
/// in slot order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub raw: RawTransaction,
    pub sigs: Vec<Signature>,
}

impl SignedTransaction {
    pub fn new(raw: RawTransaction, sigs: Vec<Signature>) -> Self {
        Self { raw, sigs }
    }

    /// Encodes as `[sig_count: u8][sig_count * 65-byte sigs][raw tx RLP]`.
    ///
    /// Only the trailing raw-tx RLP needs to match the root contract's hash
    /// exactly (see [`RawTransaction::raw_txhash`]); the signature framing
    /// here is this workspace's own wire convention for the `SignedTxBytes`
    /// a [`crate`]-level `BlockStore` hands back, not a contract-facing
    /// encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.sigs.len() * 65 + self.raw.length());
        buf.push(self.sigs.len() as u8);
        for sig in &self.sigs {
            buf.extend_from_slice(&sig.as_bytes());
        }
        buf.extend_from_slice(&self.raw.encode_raw());
        buf
    }

    /// Inverse of [`SignedTransaction::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (&sig_count, rest) = bytes.split_first().ok_or(DecodeError::Rlp(
            alloy_rlp::Error::InputTooShort,
        ))?;
        let sigs_len = sig_count as usize * 65;
        if rest.len() < sigs_len {
            return Err(DecodeError::Rlp(alloy_rlp::Error::InputTooShort));
        }
        let (sig_bytes, raw_bytes) = rest.split_at(sigs_len);
        let sigs = sig_bytes
            .chunks_exact(65)
            .map(|chunk| {
                let arr: [u8; 65] = chunk.try_into().expect("chunk is exactly 65 bytes");
                Signature::from_raw_array(&arr)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| DecodeError::InvalidSignature { index: 0, source })?;
        let raw = RawTransaction::decode(raw_bytes)?;
        Ok(Self { raw, sigs })
    }

    /// Recovers, for each populated input slot, the address that produced
    /// the matching signature.
    ///
    /// Fails with [`DecodeError::ArityMismatch`] if `sigs.len()` doesn't
    /// equal the number of populated input slots, or
    /// [`DecodeError::InvalidSignature`] if any recovery fails.
    pub fn get_spenders(&self) -> Result<Vec<Address>, DecodeError> {
        let inputs = self.raw.get_inputs();
        if self.sigs.len() != inputs.len() {
            return Err(DecodeError::ArityMismatch {
                expected: inputs.len(),
                actual: self.sigs.len(),
            });
        }
        let hash = self.raw.typed_data_hash();
        self.sigs
            .iter()
            .enumerate()
            .map(|(index, sig)| {
                sig.recover_address_from_prehash(&hash)
                    .map_err(|source| DecodeError::InvalidSignature { index, source })
            })
            .collect()
    }
}
