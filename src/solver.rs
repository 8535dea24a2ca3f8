//! Assigns candidate departures to vehicle chains, maximizing total value.
//!
//! The search is a deterministic depth-first branch-and-bound: vehicles are
//! processed in id order, chains grown one candidate at a time through the
//! feasibility rules, and subtrees abandoned when an optimistic bound cannot
//! beat the incumbent. The first complete assignment found becomes the
//! incumbent, so an expired time budget always has something valid to
//! return.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, trace};

use crate::candidate::CandidateTable;
use crate::config::ConfigError;
use crate::feasibility::Feasibility;
use crate::fleet::{Fleet, Trip, VehicleId};
use crate::grid::Slot;
use crate::network::Location;

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Mandatory trips per scheduled vehicle (2 is a round trip).
    pub min_trips: usize,
    /// Upper bound on trips per vehicle; positions past `min_trips` are
    /// optional.
    pub max_trips: usize,
    /// At most one vehicle fleet-wide per (route, slot). With this off,
    /// several physical vehicles may serve the same scheduled departure.
    pub slot_uniqueness: bool,
    /// Minimum slots between two vehicles' departures on the same route at
    /// the same chain position, to avoid bunching.
    pub min_gap: Option<u32>,
    /// Fail with [`SolveError::Infeasible`] when any vehicle cannot meet
    /// `min_trips`; otherwise such vehicles stay idle.
    pub require_all_vehicles: bool,
    /// Wall-clock budget. On expiry the search stops branching and returns
    /// the incumbent flagged [`SolveStatus::TimedOut`].
    pub time_budget: Duration,
    /// Explore root branches on the rayon pool. Branches keep private
    /// incumbents and are merged in branch order once all finish.
    pub parallel: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            min_trips: 2,
            max_trips: 3,
            slot_uniqueness: true,
            min_gap: None,
            require_all_vehicles: false,
            time_budget: Duration::from_secs(60),
            parallel: false,
        }
    }
}

impl SolveOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_trips == 0 {
            return Err(ConfigError::ZeroMaxTrips);
        }
        if self.min_trips > self.max_trips {
            return Err(ConfigError::TripBoundsReversed {
                min: self.min_trips,
                max: self.max_trips,
            });
        }
        Ok(())
    }
}

/// Solved mapping from vehicles to chains of candidate-table indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    chains: Vec<Vec<usize>>,
}

impl Assignment {
    /// Per-vehicle chains, in fleet order; each chain lists candidate
    /// indices in trip order.
    pub fn chains(&self) -> &[Vec<usize>] {
        &self.chains
    }

    pub fn chain(&self, vehicle: VehicleId) -> &[usize] {
        &self.chains[vehicle.0 as usize]
    }

    /// Every (vehicle, candidate index) selection, vehicles first.
    pub fn selected(&self) -> impl Iterator<Item = (VehicleId, usize)> + '_ {
        self.chains.iter().enumerate().flat_map(|(v, chain)| {
            chain.iter().map(move |&index| (VehicleId(v as u32), index))
        })
    }

    /// Vehicles left without any trips.
    pub fn idle_vehicles(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.chains
            .iter()
            .enumerate()
            .filter(|(_, chain)| chain.is_empty())
            .map(|(v, _)| VehicleId(v as u32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The search ran to exhaustion; the result is a proven optimum.
    Optimal,
    /// The budget expired first; the result is the best assignment found.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub assignment: Assignment,
    /// Objective in value-scale units (candidate values times 1000).
    pub objective_milli: i64,
    pub status: SolveStatus,
    /// Search nodes explored, for diagnostics.
    pub nodes: u64,
}

impl Plan {
    /// Objective in the candidates' own value units.
    pub fn objective(&self) -> f64 {
        self.objective_milli as f64 / crate::candidate::VALUE_SCALE as f64
    }
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("vehicle {vehicle} anchored at {location} cannot run {required} trips")]
    Infeasible {
        vehicle: VehicleId,
        location: Location,
        required: usize,
    },
}

// ============================================================================
// Search internals
// ============================================================================

/// Read-only context shared by every branch.
struct SearchCtx<'a> {
    table: &'a CandidateTable,
    rules: &'a Feasibility<'a>,
    fleet: &'a Fleet,
    opts: &'a SolveOptions,
    /// Candidate indices grouped by origin, each list slot-sorted.
    by_origin: HashMap<Location, Vec<usize>>,
    /// Interned (route id, slot) key per candidate, so the exclusivity set
    /// never hashes route strings during search.
    slot_key: Vec<(usize, Slot)>,
    /// `suffix_best[v]` bounds what vehicles `v..` can still add, ignoring
    /// cross-vehicle constraints.
    suffix_best: Vec<i64>,
    deadline: Option<Instant>,
}

impl SearchCtx<'_> {
    fn vehicle_count(&self) -> usize {
        self.fleet.len()
    }
}

#[derive(Clone)]
struct Incumbent {
    chains: Vec<Vec<usize>>,
    objective: i64,
    slack: i64,
}

/// Per-branch mutable search state. Branches own their state privately;
/// nothing here is shared across threads.
#[derive(Clone)]
struct SearchState {
    chains: Vec<Vec<usize>>,
    trips: Vec<Vec<Trip>>,
    used: HashSet<(usize, Slot)>,
    total: i64,
    nodes: u64,
    best: Option<Incumbent>,
    timed_out: bool,
    /// Deepest vehicle that could neither extend nor stay idle, for
    /// infeasibility diagnostics.
    blocked: Option<usize>,
}

impl SearchState {
    fn fresh(vehicles: usize) -> Self {
        Self {
            chains: vec![Vec::new(); vehicles],
            trips: vec![Vec::new(); vehicles],
            used: HashSet::new(),
            total: 0,
            nodes: 0,
            best: None,
            timed_out: false,
            blocked: None,
        }
    }
}

/// Maximizes total candidate value over feasible per-vehicle chains.
pub fn solve(
    fleet: &Fleet,
    table: &CandidateTable,
    rules: &Feasibility<'_>,
    options: &SolveOptions,
) -> Result<Plan, SolveError> {
    options.validate()?;
    debug!(
        vehicles = fleet.len(),
        candidates = table.len(),
        min_trips = options.min_trips,
        max_trips = options.max_trips,
        "starting solve"
    );

    let mut ctx = SearchCtx {
        table,
        rules,
        fleet,
        opts: options,
        by_origin: group_by_origin(table),
        slot_key: intern_slot_keys(table),
        suffix_best: Vec::new(),
        deadline: Instant::now().checked_add(options.time_budget),
    };

    // Solo pass: what each vehicle could earn alone. Feeds the optimistic
    // bound and surfaces definitely-infeasible vehicles before any search.
    let mut solo = Vec::with_capacity(fleet.len());
    for vehicle in fleet.vehicles() {
        let best = solo_best(&ctx, vehicle.anchor());
        if best.is_none() && options.require_all_vehicles {
            return Err(SolveError::Infeasible {
                vehicle: vehicle.id(),
                location: vehicle.anchor().clone(),
                required: options.min_trips,
            });
        }
        solo.push(best.unwrap_or(0));
    }
    let mut suffix = vec![0i64; fleet.len() + 1];
    for v in (0..fleet.len()).rev() {
        suffix[v] = suffix[v + 1] + solo[v];
    }
    ctx.suffix_best = suffix;

    let (best, nodes, timed_out, blocked) = if options.parallel && !fleet.is_empty() {
        solve_parallel(&ctx)
    } else {
        let mut st = SearchState::fresh(fleet.len());
        place_vehicle(0, &ctx, &mut st);
        (st.best, st.nodes, st.timed_out, st.blocked)
    };

    match best {
        Some(incumbent) => {
            let status = if timed_out {
                SolveStatus::TimedOut
            } else {
                SolveStatus::Optimal
            };
            debug!(
                objective = incumbent.objective,
                nodes,
                ?status,
                "solve finished"
            );
            Ok(Plan {
                assignment: Assignment {
                    chains: incumbent.chains,
                },
                objective_milli: incumbent.objective,
                status,
                nodes,
            })
        }
        None => {
            // Only reachable with require_all_vehicles: the idle fallback
            // otherwise guarantees a complete (possibly empty) assignment.
            let index = blocked.unwrap_or(0).min(fleet.len().saturating_sub(1));
            let vehicle = &fleet.vehicles()[index];
            debug!(vehicle = %vehicle.id(), nodes, "no complete assignment exists");
            Err(SolveError::Infeasible {
                vehicle: vehicle.id(),
                location: vehicle.anchor().clone(),
                required: options.min_trips,
            })
        }
    }
}

fn group_by_origin(table: &CandidateTable) -> HashMap<Location, Vec<usize>> {
    let mut by_origin: HashMap<Location, Vec<usize>> = HashMap::new();
    for (index, candidate) in table.candidates().iter().enumerate() {
        by_origin
            .entry(candidate.route.origin.clone())
            .or_default()
            .push(index);
    }
    by_origin
}

fn intern_slot_keys(table: &CandidateTable) -> Vec<(usize, Slot)> {
    let mut route_ids = HashMap::new();
    table
        .candidates()
        .iter()
        .map(|c| {
            let next = route_ids.len();
            let id = *route_ids.entry(c.route.clone()).or_insert(next);
            (id, c.slot)
        })
        .collect()
}

/// Best solo chain value for a vehicle anchored at `anchor`, ignoring
/// cross-vehicle constraints. `None` when no chain reaches `min_trips`.
fn solo_best(ctx: &SearchCtx<'_>, anchor: &Location) -> Option<i64> {
    let mut trips = Vec::new();
    let mut best = None;
    solo_dfs(ctx, anchor, &mut trips, 0, &mut best);
    best
}

fn solo_dfs(
    ctx: &SearchCtx<'_>,
    anchor: &Location,
    trips: &mut Vec<Trip>,
    total: i64,
    best: &mut Option<i64>,
) {
    if trips.len() >= ctx.opts.min_trips {
        *best = Some(best.map_or(total, |b: i64| b.max(total)));
    }
    if trips.len() == ctx.opts.max_trips {
        return;
    }
    let origin = trips.last().map_or(anchor, |t| &t.route.destination);
    let Some(indices) = ctx.by_origin.get(origin) else {
        return;
    };
    for &index in indices {
        let candidate = ctx.table.get(index);
        if !ctx.rules.can_extend(anchor, trips, candidate) {
            continue;
        }
        let Ok(trip) = ctx.rules.trip(candidate) else {
            continue;
        };
        trips.push(trip);
        solo_dfs(ctx, anchor, trips, total + candidate.scaled_value(), best);
        trips.pop();
    }
}

fn deadline_hit(ctx: &SearchCtx<'_>, st: &SearchState) -> bool {
    // Never abandon before the first incumbent: a cancelled search must
    // still return something complete.
    match ctx.deadline {
        Some(deadline) => st.best.is_some() && Instant::now() >= deadline,
        None => false,
    }
}

fn place_vehicle(v: usize, ctx: &SearchCtx<'_>, st: &mut SearchState) {
    if st.timed_out {
        return;
    }
    if deadline_hit(ctx, st) {
        st.timed_out = true;
        return;
    }
    if v == ctx.vehicle_count() {
        offer(ctx, st);
        return;
    }
    // Equal-objective subtrees are still explored so the slack tie-break
    // can improve on the incumbent.
    if let Some(best) = &st.best {
        if st.total + ctx.suffix_best[v] < best.objective {
            return;
        }
    }
    extend_chain(v, ctx, st);
}

fn extend_chain(v: usize, ctx: &SearchCtx<'_>, st: &mut SearchState) {
    if st.timed_out {
        return;
    }
    let len = st.chains[v].len();
    let options = chain_options(v, ctx, st);
    let extended = !options.is_empty();

    for (index, trip) in options {
        let value = ctx.table.get(index).scaled_value();
        st.chains[v].push(index);
        st.trips[v].push(trip);
        st.total += value;
        if ctx.opts.slot_uniqueness {
            st.used.insert(ctx.slot_key[index]);
        }
        st.nodes += 1;

        extend_chain(v, ctx, st);

        if ctx.opts.slot_uniqueness {
            st.used.remove(&ctx.slot_key[index]);
        }
        st.total -= value;
        st.trips[v].pop();
        st.chains[v].pop();
        if st.timed_out {
            return;
        }
    }

    // Accept the chain as-is: complete chains always, the empty chain only
    // when idle vehicles are tolerated.
    let acceptable = len >= ctx.opts.min_trips || (len == 0 && !ctx.opts.require_all_vehicles);
    if acceptable {
        place_vehicle(v + 1, ctx, st);
    } else if len == 0 && !extended {
        st.blocked = Some(st.blocked.map_or(v, |b| b.max(v)));
    }
}

/// Feasible next candidates for vehicle `v`, most valuable first.
fn chain_options(v: usize, ctx: &SearchCtx<'_>, st: &SearchState) -> Vec<(usize, Trip)> {
    if st.chains[v].len() >= ctx.opts.max_trips {
        return Vec::new();
    }
    let vehicle = &ctx.fleet.vehicles()[v];
    let trips = &st.trips[v];
    let origin = trips.last().map_or(vehicle.anchor(), |t| &t.route.destination);
    let Some(indices) = ctx.by_origin.get(origin) else {
        return Vec::new();
    };
    let position = trips.len();

    let mut options: Vec<(usize, Trip)> = indices
        .iter()
        .filter_map(|&index| {
            let candidate = ctx.table.get(index);
            if !ctx.rules.can_extend(vehicle.anchor(), trips, candidate) {
                return None;
            }
            if ctx.opts.slot_uniqueness && st.used.contains(&ctx.slot_key[index]) {
                return None;
            }
            if let Some(gap) = ctx.opts.min_gap {
                if bunches(v, position, index, gap, ctx, st) {
                    return None;
                }
            }
            let trip = ctx.rules.trip(candidate).ok()?;
            Some((index, trip))
        })
        .collect();

    // Most valuable first so the greedy first descent seeds a strong
    // incumbent; slot then table order keeps the sweep deterministic.
    options.sort_by_key(|&(index, _)| {
        let candidate = ctx.table.get(index);
        (
            std::cmp::Reverse(candidate.scaled_value()),
            candidate.slot,
            index,
        )
    });
    options
}

/// Whether taking `index` at `position` would put vehicle `v` within `gap`
/// slots of another vehicle's departure on the same route and leg.
fn bunches(
    v: usize,
    position: usize,
    index: usize,
    gap: u32,
    ctx: &SearchCtx<'_>,
    st: &SearchState,
) -> bool {
    let candidate = ctx.table.get(index);
    for (u, chain) in st.chains.iter().enumerate() {
        if u == v {
            continue;
        }
        if let Some(&other_index) = chain.get(position) {
            let other = ctx.table.get(other_index);
            if other.route == candidate.route && other.slot.abs_diff(candidate.slot) < gap {
                return true;
            }
        }
    }
    false
}

fn offer(ctx: &SearchCtx<'_>, st: &mut SearchState) {
    let slack = chain_slack(ctx, st);
    let better = match &st.best {
        None => true,
        Some(best) => {
            st.total > best.objective || (st.total == best.objective && slack > best.slack)
        }
    };
    if better {
        trace!(objective = st.total, slack, "new incumbent");
        st.best = Some(Incumbent {
            chains: st.chains.clone(),
            objective: st.total,
            slack,
        });
    }
}

/// Total idle slots beyond the mandatory layovers, summed over every
/// consecutive trip pair. The tie-break prefers schedules with more of it.
fn chain_slack(ctx: &SearchCtx<'_>, st: &SearchState) -> i64 {
    let network = ctx.rules.network();
    let mut slack = 0i64;
    for trips in &st.trips {
        for pair in trips.windows(2) {
            let rest = pair[1].departure - pair[0].arrival;
            slack += rest as i64 - network.layover(&pair[1].route.origin) as i64;
        }
    }
    slack
}

// ============================================================================
// Parallel root split
// ============================================================================

/// Explores each of vehicle 0's acceptable chains as an independent branch.
/// Branches never share mutable state; incumbents merge in branch order so
/// the result matches the sequential tie-break.
fn solve_parallel(
    ctx: &SearchCtx<'_>,
) -> (Option<Incumbent>, u64, bool, Option<usize>) {
    let seeds = root_seeds(ctx);
    if seeds.is_empty() {
        // Vehicle 0 has no acceptable chain at all.
        return (None, 0, false, Some(0));
    }
    let mut results: Vec<(SearchState, usize)> = seeds
        .into_par_iter()
        .enumerate()
        .map(|(branch, mut st)| {
            place_vehicle(1, ctx, &mut st);
            (st, branch)
        })
        .collect();
    results.sort_by_key(|&(_, branch)| branch);

    let mut best: Option<Incumbent> = None;
    let mut nodes = 0u64;
    let mut timed_out = false;
    let mut blocked: Option<usize> = None;
    for (st, _) in results {
        nodes += st.nodes;
        timed_out |= st.timed_out;
        blocked = match (blocked, st.blocked) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        if let Some(candidate) = st.best {
            let better = match &best {
                None => true,
                Some(current) => {
                    candidate.objective > current.objective
                        || (candidate.objective == current.objective
                            && candidate.slack > current.slack)
                }
            };
            if better {
                best = Some(candidate);
            }
        }
    }
    (best, nodes, timed_out, blocked)
}

/// Seeds: one primed search state per acceptable chain of vehicle 0.
fn root_seeds(ctx: &SearchCtx<'_>) -> Vec<SearchState> {
    let mut seeds = Vec::new();
    let mut st = SearchState::fresh(ctx.vehicle_count());
    collect_seeds(ctx, &mut st, &mut seeds);
    seeds
}

fn collect_seeds(ctx: &SearchCtx<'_>, st: &mut SearchState, seeds: &mut Vec<SearchState>) {
    let len = st.chains[0].len();
    if len < ctx.opts.max_trips {
        for (index, trip) in chain_options(0, ctx, st) {
            let value = ctx.table.get(index).scaled_value();
            st.chains[0].push(index);
            st.trips[0].push(trip);
            st.total += value;
            if ctx.opts.slot_uniqueness {
                st.used.insert(ctx.slot_key[index]);
            }

            collect_seeds(ctx, st, seeds);

            if ctx.opts.slot_uniqueness {
                st.used.remove(&ctx.slot_key[index]);
            }
            st.total -= value;
            st.trips[0].pop();
            st.chains[0].pop();
        }
    }
    let acceptable = len >= ctx.opts.min_trips || (len == 0 && !ctx.opts.require_all_vehicles);
    if acceptable {
        seeds.push(st.clone());
    }
}
