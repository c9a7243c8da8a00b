//! UTXO coordinates for the watcher exit processor.
//!
//! A [`Position`] is the primary key over outputs of child-chain transactions:
//! `(blknum, txindex, oindex)`. It packs into a single `u64` for storage
//! keying using the same encoding the root contract uses, so a `Position` can
//! be compared, hashed and stored without ever unpacking it.

use alloy_rlp::{Decodable, Encodable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Multiplier applied to `blknum` when packing a [`Position`] into a `u64`.
pub const BLOCK_OFFSET: u64 = 1_000_000_000;

/// Multiplier applied to `txindex` when packing a [`Position`] into a `u64`.
pub const TX_OFFSET: u64 = 10_000;

/// Number of input slots a transaction carries (`oindex` 0..=3).
pub const MAX_INPUTS: usize = 4;

/// Number of output slots a transaction carries (`oindex` 4..=7 when used as
/// a piggyback slot on an in-flight exit).
pub const MAX_OUTPUTS: usize = 4;

/// Position with `blknum == 0`, denoting "no position / not included".
pub const EMPTY: Position = Position {
    blknum: 0,
    txindex: 0,
    oindex: 0,
};

/// Errors constructing or decoding a [`Position`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PositionError {
    /// `oindex` must fit in the 3-bit slot range `[0, 7]`.
    #[error("oindex {0} out of range [0, 7]")]
    OindexOutOfRange(u8),

    /// `txindex` must fit under [`TX_OFFSET`] or it would collide with the
    /// next block's encoding.
    #[error("txindex {0} too large to encode (max {})", TX_OFFSET - 1)]
    TxindexOutOfRange(u32),

    /// `blknum` is large enough that `blknum * BLOCK_OFFSET` would overflow a `u64`.
    #[error("blknum {0} overflows the position encoding")]
    BlknumOverflow(u64),
}

/// A UTXO coordinate: `(blknum, txindex, oindex)`.
///
/// `oindex` doubles as a slot selector on in-flight exits: `0..=3` addresses
/// an input, `4..=7` addresses an output (the piggyback slot is `oindex - 4`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    blknum: u64,
    txindex: u32,
    oindex: u8,
}

impl Position {
    /// Builds a new position, validating the encoding constraints.
    pub fn new(blknum: u64, txindex: u32, oindex: u8) -> Result<Self, PositionError> {
        if oindex > 7 {
            return Err(PositionError::OindexOutOfRange(oindex));
        }
        if (txindex as u64) >= TX_OFFSET {
            return Err(PositionError::TxindexOutOfRange(txindex));
        }
        blknum
            .checked_mul(BLOCK_OFFSET)
            .ok_or(PositionError::BlknumOverflow(blknum))?;
        Ok(Self {
            blknum,
            txindex,
            oindex,
        })
    }

    /// The child-chain block number this position was created in.
    pub fn blknum(&self) -> u64 {
        self.blknum
    }

    /// The index of the transaction within its block.
    pub fn txindex(&self) -> u32 {
        self.txindex
    }

    /// The input (`0..=3`) or output-piggyback (`4..=7`) slot.
    pub fn oindex(&self) -> u8 {
        self.oindex
    }

    /// `true` if this is the sentinel "no position / not included" value.
    pub fn is_empty(&self) -> bool {
        self.blknum == 0
    }

    /// `true` if `oindex` addresses an input slot (`0..=3`).
    pub fn is_input_slot(&self) -> bool {
        self.oindex < MAX_INPUTS as u8
    }

    /// `true` if `oindex` addresses an output-piggyback slot (`4..=7`).
    pub fn is_output_slot(&self) -> bool {
        !self.is_input_slot()
    }

    /// The `0..=3` output index once an output-piggyback slot has been
    /// normalized out of the `4..=7` range. Meaningless for input slots.
    pub fn output_index(&self) -> u8 {
        self.oindex - MAX_INPUTS as u8
    }

    /// Packs this position into the single-integer key the contract and the
    /// persistence layer use.
    pub fn pack(&self) -> u64 {
        self.blknum * BLOCK_OFFSET + (self.txindex as u64) * TX_OFFSET + self.oindex as u64
    }

    /// Unpacks a position previously produced by [`Position::pack`].
    pub fn unpack(encoded: u64) -> Self {
        let blknum = encoded / BLOCK_OFFSET;
        let rem = encoded % BLOCK_OFFSET;
        let txindex = (rem / TX_OFFSET) as u32;
        let oindex = (rem % TX_OFFSET) as u8;
        Self {
            blknum,
            txindex,
            oindex,
        }
    }
}

impl From<Position> for u64 {
    fn from(pos: Position) -> u64 {
        pos.pack()
    }
}

impl From<u64> for Position {
    fn from(encoded: u64) -> Self {
        Self::unpack(encoded)
    }
}

impl alloy_rlp::Encodable for Position {
    fn length(&self) -> usize {
        self.pack().length()
    }

    fn encode(&self, out: &mut dyn alloy_rlp::bytes::BufMut) {
        self.pack().encode(out)
    }
}

impl alloy_rlp::Decodable for Position {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Ok(Self::unpack(u64::decode(buf)?))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}, {}, {}}}", self.blknum, self.txindex, self.oindex)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_is_empty() {
        assert!(EMPTY.is_empty());
        assert_eq!(EMPTY.pack(), 0);
    }

    #[test]
    fn rejects_bad_oindex() {
        assert_eq!(
            Position::new(1000, 0, 8),
            Err(PositionError::OindexOutOfRange(8))
        );
    }

    #[test]
    fn rejects_overflowing_txindex() {
        assert_eq!(
            Position::new(1000, TX_OFFSET as u32, 0),
            Err(PositionError::TxindexOutOfRange(TX_OFFSET as u32))
        );
    }

    #[test]
    fn input_output_slots() {
        let input = Position::new(1, 0, 2).unwrap();
        let output = Position::new(1, 0, 5).unwrap();
        assert!(input.is_input_slot());
        assert!(output.is_output_slot());
        assert_eq!(output.output_index(), 1);
    }

    #[test]
    fn total_order_matches_tuple_order() {
        let a = Position::new(1000, 0, 0).unwrap();
        let b = Position::new(1000, 1, 0).unwrap();
        let c = Position::new(2000, 0, 0).unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn rlp_roundtrip() {
        let pos = Position::new(1000, 3, 5).unwrap();
        let mut buf = Vec::new();
        pos.encode(&mut buf);
        let decoded = Position::decode(&mut &buf[..]).unwrap();
        assert_eq!(pos, decoded);
    }

    proptest! {
        #[test]
        fn encode_decode_roundtrip(
            blknum in 0u64..1_000_000,
            txindex in 0u32..(TX_OFFSET as u32),
            oindex in 0u8..8,
        ) {
            let pos = Position::new(blknum, txindex, oindex).unwrap();
            let decoded = Position::unpack(pos.pack());
            prop_assert_eq!(pos, decoded);
        }
    }
}
