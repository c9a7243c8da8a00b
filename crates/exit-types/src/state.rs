//! The exit processor's state container.

use std::collections::BTreeMap;

use alloy_primitives::B256;
use watcher_position::Position;

use crate::{competitor::CompetitorInfo, exit::ExitInfo, ife::InFlightExitInfo};

/// The entire mutable state the watcher core owns.
///
/// `BTreeMap` keeps iteration order deterministic across runs, which
/// matters for tests asserting on emitted-event order and for snapshot
/// comparisons during resync.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct State {
    pub sla_margin: u64,
    pub exits: BTreeMap<Position, ExitInfo>,
    pub in_flight_exits: BTreeMap<B256, InFlightExitInfo>,
    pub competitors: BTreeMap<B256, CompetitorInfo>,
}

impl State {
    /// Constructs the state the persistence layer replays at startup.
    pub fn init(
        sla_margin: u64,
        exits: BTreeMap<Position, ExitInfo>,
        in_flight_exits: BTreeMap<B256, InFlightExitInfo>,
        competitors: BTreeMap<B256, CompetitorInfo>,
    ) -> Self {
        Self {
            sla_margin,
            exits,
            in_flight_exits,
            competitors,
        }
    }

    /// Active standard-exit positions.
    pub fn active_exit_positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.exits
            .iter()
            .filter(|(_, exit)| exit.is_active)
            .map(|(pos, _)| *pos)
    }

    /// In-flight exits that are currently active.
    pub fn active_ifes(&self) -> impl Iterator<Item = (&B256, &InFlightExitInfo)> {
        self.in_flight_exits.iter().filter(|(_, ife)| ife.is_active)
    }
}
