//! Rules for legally extending a vehicle's trip chain with a candidate.
//!
//! Answers, without search, whether one specific extension is legal:
//! the vehicle must depart from where it last arrived, rest out the
//! location's layover, and finish inside the horizon. Fleet-wide rules
//! (slot exclusivity, departure gaps) live in the solver, which sees all
//! vehicles at once.

use crate::candidate::Candidate;
use crate::fleet::Trip;
use crate::grid::{Slot, TimeGrid};
use crate::network::{Location, Network, NetworkError};

/// Chain-shape policy knobs that differ between model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainPolicy {
    /// Arrivals past the horizon wrap into the next cycle (single-day
    /// models) instead of being rejected (weekly models).
    pub wrap_horizon: bool,
    /// Upper bound on last-arrival minus first-departure for one chain,
    /// e.g. 48 slots to force a round trip to finish within 24 hours.
    pub max_chain_span: Option<u32>,
}

/// Chain-extension rule engine over one grid and network.
pub struct Feasibility<'a> {
    grid: &'a TimeGrid,
    network: &'a Network,
    policy: ChainPolicy,
}

impl<'a> Feasibility<'a> {
    pub fn new(grid: &'a TimeGrid, network: &'a Network, policy: ChainPolicy) -> Self {
        Self {
            grid,
            network,
            policy,
        }
    }

    pub fn grid(&self) -> &TimeGrid {
        self.grid
    }

    pub fn network(&self) -> &Network {
        self.network
    }

    pub fn policy(&self) -> ChainPolicy {
        self.policy
    }

    /// Unwrapped arrival slot for a candidate departure.
    pub fn arrival(&self, candidate: &Candidate) -> Result<Slot, NetworkError> {
        Ok(candidate.slot + self.network.duration(&candidate.route, candidate.slot)?)
    }

    /// Whether `candidate` is a legal next trip for a vehicle anchored at
    /// `anchor` that has already committed `trips` (in departure order).
    pub fn can_extend(&self, anchor: &Location, trips: &[Trip], candidate: &Candidate) -> bool {
        let Ok(arrival) = self.arrival(candidate) else {
            return false;
        };
        if !self.policy.wrap_horizon && arrival >= self.grid.slot_count() {
            return false;
        }
        if let Some(span) = self.policy.max_chain_span {
            let first_departure = trips.first().map_or(candidate.slot, |t| t.departure);
            if arrival > first_departure + span {
                return false;
            }
        }
        match trips.last() {
            None => candidate.route.origin == *anchor,
            Some(last) => {
                candidate.route.origin == last.route.destination
                    && candidate.slot
                        >= last.arrival + self.network.layover(&candidate.route.origin)
            }
        }
    }

    /// Materializes the trip a candidate produces.
    pub fn trip(&self, candidate: &Candidate) -> Result<Trip, NetworkError> {
        Ok(Trip {
            route: candidate.route.clone(),
            departure: candidate.slot,
            arrival: self.arrival(candidate)?,
            value: candidate.value,
        })
    }
}
