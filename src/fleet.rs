//! Fleet state: vehicle anchors and committed trip chains.
//!
//! During a solve the fleet only supplies initial locations; trips are
//! committed exactly once, after the optimizer has produced an assignment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::candidate::CandidateTable;
use crate::grid::Slot;
use crate::network::{Location, Network, NetworkError, Route};
use crate::solver::Assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One committed leg of a vehicle's chain. Arrivals are unwrapped; a
/// single-day model's display layer wraps them back into the day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trip {
    pub route: Route,
    pub departure: Slot,
    pub arrival: Slot,
    pub value: f64,
}

/// Where a vehicle is at a given slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehiclePosition<'a> {
    At(&'a Location),
    InTransit(&'a Route),
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    id: VehicleId,
    anchor: Location,
    trips: Vec<Trip>,
}

impl Vehicle {
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Location at horizon start.
    pub fn anchor(&self) -> &Location {
        &self.anchor
    }

    /// Committed trips, ordered by departure.
    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    /// Location once every committed trip has completed.
    pub fn final_location(&self) -> &Location {
        self.trips
            .last()
            .map(|t| &t.route.destination)
            .unwrap_or(&self.anchor)
    }

    pub fn position_at(&self, slot: Slot) -> VehiclePosition<'_> {
        let mut here = &self.anchor;
        for trip in &self.trips {
            if slot < trip.departure {
                break;
            }
            if slot < trip.arrival {
                return VehiclePosition::InTransit(&trip.route);
            }
            here = &trip.route.destination;
        }
        VehiclePosition::At(here)
    }
}

/// All vehicles for one run, in deterministic id order.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    vehicles: Vec<Vehicle>,
}

impl Fleet {
    /// Builds vehicles from `(location, count)` anchors. Locations are
    /// ordered by name and ids assigned sequentially, so the same
    /// configuration always yields the same fleet.
    pub fn from_anchors<I>(anchors: I) -> Self
    where
        I: IntoIterator<Item = (Location, u32)>,
    {
        let mut pairs: Vec<(Location, u32)> = anchors.into_iter().collect();
        pairs.sort();

        let mut vehicles = Vec::new();
        for (anchor, count) in pairs {
            for _ in 0..count {
                vehicles.push(Vehicle {
                    id: VehicleId(vehicles.len() as u32),
                    anchor: anchor.clone(),
                    trips: Vec::new(),
                });
            }
        }
        Self { vehicles }
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn get(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id.0 as usize)
    }

    /// Vehicles standing at `location` at `slot` (not in transit).
    pub fn idle_at(&self, location: &Location, slot: Slot) -> Vec<VehicleId> {
        self.vehicles
            .iter()
            .filter(|v| v.position_at(slot) == VehiclePosition::At(location))
            .map(|v| v.id)
            .collect()
    }

    /// Materializes a solved assignment into committed trips. Called once
    /// per run; chains arrive already validated by the solver.
    pub fn commit(
        &mut self,
        assignment: &Assignment,
        table: &CandidateTable,
        network: &Network,
    ) -> Result<(), NetworkError> {
        for (vehicle, chain) in self.vehicles.iter_mut().zip(assignment.chains()) {
            let mut trips = Vec::with_capacity(chain.len());
            for &index in chain {
                let candidate = table.get(index);
                let duration = network.duration(&candidate.route, candidate.slot)?;
                trips.push(Trip {
                    route: candidate.route.clone(),
                    departure: candidate.slot,
                    arrival: candidate.slot + duration,
                    value: candidate.value,
                });
            }
            vehicle.trips = trips;
        }
        Ok(())
    }
}
