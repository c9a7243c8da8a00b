//! Standard-exit records.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// One standard UTXO exit, keyed externally by the [`watcher_position::Position`]
/// it exits.
///
/// Invariant: once `is_active` is `true` it stays `true` until the exit is
/// either validly finalized (and removed) or challenged (and removed).
/// Invalid finalization re-activates it rather than removing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    pub amount: u64,
    pub currency: Address,
    pub owner: Address,
    pub is_active: bool,
    pub eth_height: u64,
}

impl ExitInfo {
    pub fn new(amount: u64, currency: Address, owner: Address, eth_height: u64) -> Self {
        Self {
            amount,
            currency,
            owner,
            is_active: owner != watcher_tx::ZERO_ADDR,
            eth_height,
        }
    }

    /// `true` if this exit has crossed the SLA margin as of `eth_height_now`.
    pub fn is_late(&self, eth_height_now: u64, sla_margin: u64) -> bool {
        self.eth_height + sla_margin <= eth_height_now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_owner_starts_inactive() {
        let exit = ExitInfo::new(10, watcher_tx::ZERO_ADDR, watcher_tx::ZERO_ADDR, 100);
        assert!(!exit.is_active);
    }

    #[test]
    fn sla_margin_is_exit_started_plus_margin() {
        let exit = ExitInfo::new(10, watcher_tx::ZERO_ADDR, Address::repeat_byte(1), 100);
        assert!(!exit.is_late(109, 10));
        assert!(exit.is_late(110, 10));
    }
}
