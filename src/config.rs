//! Run configuration: one deserializable document validated into typed
//! engine inputs.
//!
//! Configuration problems are fatal and surface here, before any candidate
//! is ingested or any search starts.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::candidate::{CandidateRecord, CandidateTable, IngestError, IngestPolicy};
use crate::feasibility::{ChainPolicy, Feasibility};
use crate::fleet::Fleet;
use crate::grid::{Slot, TimeGrid};
use crate::network::{DurationBand, Location, Network, NetworkError};
use crate::report::{render, ItineraryEntry};
use crate::solver::{solve, Plan, SolveError, SolveOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("min_trips {min} exceeds max_trips {max}")]
    TripBoundsReversed { min: usize, max: usize },
    #[error("max_trips must be at least 1")]
    ZeroMaxTrips,
    #[error("slots_per_day and slot_minutes must be positive")]
    EmptyGrid,
    #[error("horizon must cover at least one day")]
    EmptyHorizon,
    #[error("earliest departure slot {slot} is outside the {slots_per_day}-slot day")]
    EarliestDepartureOutOfDay { slot: Slot, slots_per_day: u32 },
    #[error("day start minute {minute} is outside the day")]
    DayStartOutOfDay { minute: u32 },
    #[error("route {route} needs a uniform duration or bands, not both")]
    ConflictingDuration { route: String },
    #[error("route {route} has neither a uniform duration nor bands")]
    MissingDuration { route: String },
    #[error("fleet anchors reference unknown location {0}")]
    UnknownAnchor(String),
    #[error("fleet has no vehicles")]
    EmptyFleet,
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// One route entry of the configuration document. Exactly one of
/// `duration` (uniform) or `bands` (step function) must be given.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub bands: Vec<BandConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BandConfig {
    pub from: Slot,
    pub to: Slot,
    pub duration: u32,
}

/// Whole-run configuration in its external form.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
    #[serde(default = "default_slots_per_day")]
    pub slots_per_day: u32,
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default)]
    pub day_start_minute: u32,
    #[serde(default)]
    pub earliest_departure_slot: Slot,

    /// Initial vehicle counts per anchor location.
    pub fleet: BTreeMap<String, u32>,
    /// Minimum turnaround per location, in slots.
    #[serde(default)]
    pub layover: BTreeMap<String, u32>,
    pub routes: Vec<RouteConfig>,

    #[serde(default = "default_min_trips")]
    pub min_trips: usize,
    #[serde(default = "default_max_trips")]
    pub max_trips: usize,
    #[serde(default = "default_true")]
    pub slot_uniqueness: bool,
    #[serde(default)]
    pub min_gap: Option<u32>,
    #[serde(default)]
    pub max_chain_span: Option<u32>,
    #[serde(default)]
    pub value_threshold: Option<f64>,
    #[serde(default)]
    pub wrap_horizon: bool,
    #[serde(default)]
    pub require_all_vehicles: bool,
    #[serde(default = "default_budget_ms")]
    pub time_budget_ms: u64,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub ingest_policy: IngestPolicy,
}

fn default_slot_minutes() -> u32 {
    30
}

fn default_slots_per_day() -> u32 {
    48
}

fn default_horizon_days() -> u32 {
    1
}

fn default_min_trips() -> usize {
    2
}

fn default_max_trips() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_budget_ms() -> u64 {
    60_000
}

impl PlannerConfig {
    /// Validates the document and builds the typed engine inputs.
    pub fn build(&self) -> Result<Instance, ConfigError> {
        if self.slots_per_day == 0 || self.slot_minutes == 0 {
            return Err(ConfigError::EmptyGrid);
        }
        if self.horizon_days == 0 {
            return Err(ConfigError::EmptyHorizon);
        }
        if self.earliest_departure_slot >= self.slots_per_day {
            return Err(ConfigError::EarliestDepartureOutOfDay {
                slot: self.earliest_departure_slot,
                slots_per_day: self.slots_per_day,
            });
        }
        if self.day_start_minute >= 24 * 60 {
            return Err(ConfigError::DayStartOutOfDay {
                minute: self.day_start_minute,
            });
        }

        let grid = TimeGrid::new(self.slots_per_day, self.horizon_days)
            .with_slot_minutes(self.slot_minutes)
            .with_day_start_minute(self.day_start_minute)
            .with_earliest_departure(self.earliest_departure_slot);

        let mut builder = Network::builder(self.slots_per_day);
        for route in &self.routes {
            let name = format!("{}-{}", route.origin, route.destination);
            match (route.duration, route.bands.is_empty()) {
                (Some(slots), true) => {
                    builder = builder.route(route.origin.as_str(), route.destination.as_str(), slots);
                }
                (None, false) => {
                    let bands = route
                        .bands
                        .iter()
                        .map(|b| DurationBand {
                            from: b.from,
                            to: b.to,
                            slots: b.duration,
                        })
                        .collect();
                    builder = builder.banded_route(
                        route.origin.as_str(),
                        route.destination.as_str(),
                        bands,
                    );
                }
                (Some(_), false) => {
                    return Err(ConfigError::ConflictingDuration { route: name });
                }
                (None, true) => {
                    return Err(ConfigError::MissingDuration { route: name });
                }
            }
        }
        for (location, slots) in &self.layover {
            builder = builder.layover(location.as_str(), *slots);
        }
        let network = builder.build()?;

        if self.fleet.values().all(|&count| count == 0) {
            return Err(ConfigError::EmptyFleet);
        }
        for location in self.fleet.keys() {
            if !network.has_location(&Location::new(location.clone())) {
                return Err(ConfigError::UnknownAnchor(location.clone()));
            }
        }
        let fleet = Fleet::from_anchors(
            self.fleet
                .iter()
                .map(|(location, count)| (Location::new(location.clone()), *count)),
        );

        let options = SolveOptions {
            min_trips: self.min_trips,
            max_trips: self.max_trips,
            slot_uniqueness: self.slot_uniqueness,
            min_gap: self.min_gap,
            require_all_vehicles: self.require_all_vehicles,
            time_budget: Duration::from_millis(self.time_budget_ms),
            parallel: self.parallel,
        };
        options.validate()?;

        Ok(Instance {
            grid,
            network,
            fleet,
            options,
            chain_policy: ChainPolicy {
                wrap_horizon: self.wrap_horizon,
                max_chain_span: self.max_chain_span,
            },
            ingest_policy: self.ingest_policy,
            value_threshold: self.value_threshold,
        })
    }
}

/// Validated engine inputs for one run.
#[derive(Debug, Clone)]
pub struct Instance {
    pub grid: TimeGrid,
    pub network: Network,
    pub fleet: Fleet,
    pub options: SolveOptions,
    pub chain_policy: ChainPolicy,
    pub ingest_policy: IngestPolicy,
    pub value_threshold: Option<f64>,
}

impl Instance {
    /// Resolves external candidate records under this instance's policy.
    pub fn ingest(&self, records: &[CandidateRecord]) -> Result<CandidateTable, IngestError> {
        CandidateTable::from_records(
            records,
            &self.grid,
            &self.network,
            self.ingest_policy,
            self.value_threshold,
        )
    }

    /// Runs the optimizer against this instance's fleet and rules.
    pub fn solve(&self, table: &CandidateTable) -> Result<Plan, SolveError> {
        let rules = Feasibility::new(&self.grid, &self.network, self.chain_policy);
        solve(&self.fleet, table, &rules, &self.options)
    }

    /// Commits a plan to a copy of the fleet and renders its itinerary.
    pub fn realize(
        &self,
        plan: &Plan,
        table: &CandidateTable,
    ) -> Result<Vec<ItineraryEntry>, NetworkError> {
        let mut fleet = self.fleet.clone();
        fleet.commit(&plan.assignment, table, &self.network)?;
        Ok(render(&fleet, &self.grid))
    }
}
