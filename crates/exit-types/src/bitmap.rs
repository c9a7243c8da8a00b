//! Fixed-width 4-slot bitmap used for piggyback tracking.

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

/// Number of slots a piggyback bitmap tracks — one per input, or one per
/// output, on an in-flight exit.
pub const SLOTS: usize = watcher_position::MAX_INPUTS;

/// Which of an in-flight exit's 4 input (or 4 output) slots have been
/// piggybacked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiggybackBitmap {
    bits: BitArray<[u8; 1], Lsb0>,
}

impl PiggybackBitmap {
    /// An empty bitmap — no slots piggybacked.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if slot `index` has been piggybacked.
    ///
    /// Out-of-range indices (`>= SLOTS`) are always reported unset.
    pub fn is_set(&self, index: u8) -> bool {
        self.bits
            .get(index as usize)
            .map(|b| *b)
            .unwrap_or(false)
    }

    /// Marks slot `index` piggybacked. Idempotent.
    pub fn set(&mut self, index: u8) {
        if (index as usize) < SLOTS {
            self.bits.set(index as usize, true);
        }
    }

    /// Clears slot `index`. Idempotent.
    pub fn clear(&mut self, index: u8) {
        if (index as usize) < SLOTS {
            self.bits.set(index as usize, false);
        }
    }

    /// Iterates the piggybacked slot indices in ascending order.
    pub fn active_indices(&self) -> impl Iterator<Item = u8> + '_ {
        self.bits.iter_ones().map(|i| i as u8)
    }

    /// `true` if no slot is piggybacked.
    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }
}

/// Which of an in-flight exit's 8 total slots (4 inputs followed by 4
/// outputs, matching [`watcher_position::Position::oindex`]) have been
/// finalized on the root contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitMap {
    bits: BitArray<[u8; 1], Lsb0>,
}

impl ExitMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self, oindex: u8) -> bool {
        self.bits.get(oindex as usize).map(|b| *b).unwrap_or(false)
    }

    pub fn set(&mut self, oindex: u8) {
        if (oindex as usize) < 8 {
            self.bits.set(oindex as usize, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_idempotent() {
        let mut bm = PiggybackBitmap::new();
        bm.set(1);
        bm.set(1);
        assert!(bm.is_set(1));
        assert_eq!(bm.active_indices().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn clear_unknown_slot_is_noop() {
        let mut bm = PiggybackBitmap::new();
        bm.clear(2);
        assert!(bm.is_empty());
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut bm = PiggybackBitmap::new();
        bm.set(200);
        assert!(!bm.is_set(200));
        assert!(bm.is_empty());
    }
}
