//! Candidate departures and ingestion of external records.
//!
//! A candidate is one bookable (route, slot) opportunity with a forecast
//! occupancy value. The engine only ever selects among supplied candidates;
//! it never invents departures.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::grid::{GridError, Slot, TimeGrid};
use crate::network::{Network, NetworkError, Route};

/// Occupancy values are fractional; they are scaled to integers so the
/// objective stays exact.
pub const VALUE_SCALE: i64 = 1000;

/// One bookable departure opportunity.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub route: Route,
    pub slot: Slot,
    pub value: f64,
}

impl Candidate {
    pub fn new(route: Route, slot: Slot, value: f64) -> Self {
        Self { route, slot, value }
    }

    pub fn scaled_value(&self) -> i64 {
        (self.value * VALUE_SCALE as f64).round() as i64
    }
}

/// External record form: route shorthand plus either a pre-computed slot
/// index or a wall-clock time. A clock time without a day is replicated
/// across every day of the horizon.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateRecord {
    pub route: String,
    #[serde(default)]
    pub slot: Option<Slot>,
    #[serde(default)]
    pub day: Option<u32>,
    #[serde(default)]
    pub time: Option<String>,
    pub value: f64,
}

/// What to do with records that cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPolicy {
    /// Fail the whole run on the first bad record.
    #[default]
    Reject,
    /// Drop bad records but keep an exact count of how many were dropped.
    SkipAndCount,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("record {index}: {source}")]
    Time { index: usize, source: GridError },
    #[error("record {index}: {source}")]
    Route { index: usize, source: NetworkError },
    #[error("record {index}: needs either a slot or a wall-clock time")]
    MissingTime { index: usize },
    #[error("record {index}: negative value {value}")]
    NegativeValue { index: usize, value: f64 },
}

/// Normalized, slot-sorted set of candidates for one run.
#[derive(Debug, Clone, Default)]
pub struct CandidateTable {
    candidates: Vec<Candidate>,
    skipped: usize,
    filtered: usize,
}

impl CandidateTable {
    /// Table from already-resolved candidates.
    pub fn new(mut candidates: Vec<Candidate>) -> Self {
        sort_candidates(&mut candidates);
        Self {
            candidates,
            skipped: 0,
            filtered: 0,
        }
    }

    /// Resolves external records against the grid and network.
    ///
    /// Records below `value_threshold` are filtered (and counted) rather
    /// than treated as errors; unresolvable records follow `policy`.
    pub fn from_records(
        records: &[CandidateRecord],
        grid: &TimeGrid,
        network: &Network,
        policy: IngestPolicy,
        value_threshold: Option<f64>,
    ) -> Result<Self, IngestError> {
        let mut candidates = Vec::new();
        let mut skipped = 0usize;
        let mut filtered = 0usize;

        for (index, record) in records.iter().enumerate() {
            match resolve_record(index, record, grid, network) {
                Ok(resolved) => {
                    for candidate in resolved {
                        if value_threshold.is_some_and(|min| candidate.value < min) {
                            filtered += 1;
                        } else {
                            candidates.push(candidate);
                        }
                    }
                }
                Err(err) => match policy {
                    IngestPolicy::Reject => return Err(err),
                    IngestPolicy::SkipAndCount => {
                        warn!(%err, "skipping candidate record");
                        skipped += 1;
                    }
                },
            }
        }

        sort_candidates(&mut candidates);
        debug!(
            count = candidates.len(),
            skipped, filtered, "candidate table loaded"
        );
        Ok(Self {
            candidates,
            skipped,
            filtered,
        })
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn get(&self, index: usize) -> &Candidate {
        &self.candidates[index]
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Records dropped under [`IngestPolicy::SkipAndCount`].
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Candidates dropped by the value threshold.
    pub fn filtered(&self) -> usize {
        self.filtered
    }
}

fn sort_candidates(candidates: &mut [Candidate]) {
    // Stable, so duplicate (route, slot) entries keep input order.
    candidates.sort_by(|a, b| {
        (a.slot, &a.route.origin, &a.route.destination).cmp(&(
            b.slot,
            &b.route.origin,
            &b.route.destination,
        ))
    });
}

fn resolve_record(
    index: usize,
    record: &CandidateRecord,
    grid: &TimeGrid,
    network: &Network,
) -> Result<Vec<Candidate>, IngestError> {
    if record.value < 0.0 {
        return Err(IngestError::NegativeValue {
            index,
            value: record.value,
        });
    }
    let route =
        Route::parse(&record.route).map_err(|source| IngestError::Route { index, source })?;

    let slots: Vec<Slot> = if let Some(slot) = record.slot {
        vec![
            grid.check_departure(slot)
                .map_err(|source| IngestError::Time { index, source })?,
        ]
    } else if let Some(time) = &record.time {
        let clock =
            TimeGrid::parse_clock(time).map_err(|source| IngestError::Time { index, source })?;
        let days: Vec<u32> = match record.day {
            Some(day) => vec![day],
            None => (0..grid.horizon_days()).collect(),
        };
        days.into_iter()
            .map(|day| {
                grid.time_to_slot(day, clock)
                    .and_then(|slot| grid.check_departure(slot))
                    .map_err(|source| IngestError::Time { index, source })
            })
            .collect::<Result<_, _>>()?
    } else {
        return Err(IngestError::MissingTime { index });
    };

    // Every candidate must have a resolvable travel time up front, so the
    // solver never sees a departure it cannot complete.
    for &slot in &slots {
        network
            .duration(&route, slot)
            .map_err(|source| IngestError::Route { index, source })?;
    }

    Ok(slots
        .into_iter()
        .map(|slot| Candidate::new(route.clone(), slot, record.value))
        .collect())
}
