//! Test fixtures for fleet-planner.
//!
//! Small networks and candidate builders shared by the integration tests.

use fleet_planner::candidate::{Candidate, CandidateTable};
use fleet_planner::fleet::Fleet;
use fleet_planner::grid::{Slot, TimeGrid};
use fleet_planner::network::{Location, Network, Route};

/// Two cities four slots apart, one slot of layover at each end.
pub fn shuttle_network() -> Network {
    Network::builder(48)
        .route("A", "B", 4)
        .route("B", "A", 4)
        .layover("A", 1)
        .layover("B", 1)
        .build()
        .unwrap()
}

/// Shuttle network plus a shorter spur B-C with a longer layover at C.
pub fn three_city_network() -> Network {
    Network::builder(48)
        .route("A", "B", 4)
        .route("B", "A", 4)
        .route("B", "C", 2)
        .route("C", "B", 2)
        .layover("A", 1)
        .layover("B", 1)
        .layover("C", 2)
        .build()
        .unwrap()
}

pub fn single_day_grid() -> TimeGrid {
    TimeGrid::new(48, 1)
}

pub fn weekly_grid() -> TimeGrid {
    TimeGrid::new(48, 7)
}

pub fn cand(route: &str, slot: Slot, value: f64) -> Candidate {
    Candidate::new(Route::parse(route).unwrap(), slot, value)
}

pub fn table(candidates: Vec<Candidate>) -> CandidateTable {
    CandidateTable::new(candidates)
}

pub fn fleet_at(anchors: &[(&str, u32)]) -> Fleet {
    Fleet::from_anchors(
        anchors
            .iter()
            .map(|&(location, count)| (Location::from(location), count)),
    )
}
