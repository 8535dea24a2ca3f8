//! Fixed location set and directed routes with slot-dependent travel times.
//!
//! Travel time is either uniform per route or a step function over
//! departure-slot bands within the day (e.g. longer evening runs). Each
//! location carries a minimum layover a vehicle must rest before its next
//! departure.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::Slot;

/// Opaque location identifier (a city code in the bus deployments).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Directed origin/destination pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub origin: Location,
    pub destination: Location,
}

impl Route {
    pub fn new(origin: impl Into<Location>, destination: impl Into<Location>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
        }
    }

    /// Parses the `"ORIGIN-DESTINATION"` shorthand used by candidate feeds.
    pub fn parse(spec: &str) -> Result<Self, NetworkError> {
        match spec.split_once('-') {
            Some((origin, destination)) if !origin.is_empty() && !destination.is_empty() => {
                Ok(Self::new(origin.trim(), destination.trim()))
            }
            _ => Err(NetworkError::MalformedRoute(spec.to_string())),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.origin, self.destination)
    }
}

/// Travel time over an inclusive range of within-day departure slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationBand {
    pub from: Slot,
    pub to: Slot,
    pub slots: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TravelTime {
    Uniform(u32),
    Banded(Vec<DurationBand>),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("unknown route {0}")]
    UnknownRoute(Route),
    #[error("unknown location {0}")]
    UnknownLocation(Location),
    #[error("malformed route spec {0:?}: expected \"ORIGIN-DESTINATION\"")]
    MalformedRoute(String),
    #[error("route {route}: {detail}")]
    InvalidBands { route: Route, detail: &'static str },
    #[error("no duration band covers slot {slot} on route {route}")]
    NoBand { route: Route, slot: Slot },
}

/// Immutable route graph: per-route travel times and per-location layovers.
#[derive(Debug, Clone)]
pub struct Network {
    routes: HashMap<Route, TravelTime>,
    layovers: HashMap<Location, u32>,
    slots_per_day: u32,
}

impl Network {
    pub fn builder(slots_per_day: u32) -> NetworkBuilder {
        NetworkBuilder {
            slots_per_day,
            routes: Vec::new(),
            layovers: Vec::new(),
        }
    }

    /// Travel time in slots for departing on `route` at `departure`.
    /// Deterministic given the departure slot.
    pub fn duration(&self, route: &Route, departure: Slot) -> Result<u32, NetworkError> {
        let travel = self
            .routes
            .get(route)
            .ok_or_else(|| NetworkError::UnknownRoute(route.clone()))?;
        match travel {
            TravelTime::Uniform(slots) => Ok(*slots),
            TravelTime::Banded(bands) => {
                let in_day = departure % self.slots_per_day;
                bands
                    .iter()
                    .find(|b| b.from <= in_day && in_day <= b.to)
                    .map(|b| b.slots)
                    .ok_or_else(|| NetworkError::NoBand {
                        route: route.clone(),
                        slot: departure,
                    })
            }
        }
    }

    /// Minimum turnaround at a location before the next departure.
    /// Locations without a configured layover may depart immediately.
    pub fn layover(&self, location: &Location) -> u32 {
        self.layovers.get(location).copied().unwrap_or(0)
    }

    pub fn has_route(&self, route: &Route) -> bool {
        self.routes.contains_key(route)
    }

    /// Whether the location is an endpoint of any configured route.
    pub fn has_location(&self, location: &Location) -> bool {
        self.routes
            .keys()
            .any(|r| r.origin == *location || r.destination == *location)
    }
}

/// Accumulates routes and layovers, validating band shapes on build.
#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    slots_per_day: u32,
    routes: Vec<(Route, TravelTime)>,
    layovers: Vec<(Location, u32)>,
}

impl NetworkBuilder {
    /// Route with one travel time regardless of departure slot.
    pub fn route(
        mut self,
        origin: impl Into<Location>,
        destination: impl Into<Location>,
        slots: u32,
    ) -> Self {
        self.routes
            .push((Route::new(origin, destination), TravelTime::Uniform(slots)));
        self
    }

    /// Route whose travel time steps across within-day departure bands.
    pub fn banded_route(
        mut self,
        origin: impl Into<Location>,
        destination: impl Into<Location>,
        bands: Vec<DurationBand>,
    ) -> Self {
        self.routes
            .push((Route::new(origin, destination), TravelTime::Banded(bands)));
        self
    }

    pub fn layover(mut self, location: impl Into<Location>, slots: u32) -> Self {
        self.layovers.push((location.into(), slots));
        self
    }

    pub fn build(self) -> Result<Network, NetworkError> {
        let mut routes = HashMap::new();
        for (route, travel) in self.routes {
            if let TravelTime::Banded(bands) = &travel {
                validate_bands(&route, bands, self.slots_per_day)?;
            }
            routes.insert(route, travel);
        }

        let network = Network {
            routes,
            layovers: self.layovers.iter().cloned().collect(),
            slots_per_day: self.slots_per_day,
        };
        for (location, _) in &self.layovers {
            if !network.has_location(location) {
                return Err(NetworkError::UnknownLocation(location.clone()));
            }
        }
        Ok(network)
    }
}

fn validate_bands(
    route: &Route,
    bands: &[DurationBand],
    slots_per_day: u32,
) -> Result<(), NetworkError> {
    let invalid = |detail| NetworkError::InvalidBands {
        route: route.clone(),
        detail,
    };
    if bands.is_empty() {
        return Err(invalid("banded route has no bands"));
    }
    let mut prev_end: Option<Slot> = None;
    for band in bands {
        if band.from > band.to {
            return Err(invalid("band range is reversed"));
        }
        if band.to >= slots_per_day {
            return Err(invalid("band extends past the end of the day"));
        }
        if let Some(end) = prev_end {
            if band.from <= end {
                return Err(invalid("bands overlap or are out of order"));
            }
        }
        prev_end = Some(band.to);
    }
    Ok(())
}
