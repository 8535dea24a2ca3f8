//! Comprehensive solver tests
//!
//! Round trips, layover and horizon rules, slot exclusivity, departure
//! gaps, optional trips, and the anytime/timeout contract.

use std::collections::HashSet;
use std::time::Duration;

use fleet_planner::feasibility::{ChainPolicy, Feasibility};
use fleet_planner::fleet::{Fleet, VehicleId};
use fleet_planner::network::{DurationBand, Network};
use fleet_planner::solver::{solve, Plan, SolveError, SolveOptions, SolveStatus};

mod fixtures;
use fixtures::*;

// ============================================================================
// Helpers
// ============================================================================

fn round_trip_options() -> SolveOptions {
    SolveOptions {
        min_trips: 2,
        max_trips: 3,
        slot_uniqueness: true,
        ..SolveOptions::default()
    }
}

fn single_trip_options() -> SolveOptions {
    SolveOptions {
        min_trips: 1,
        max_trips: 1,
        slot_uniqueness: true,
        ..SolveOptions::default()
    }
}

/// Commits the plan and checks the physical invariants on every chain:
/// departure ordering, location continuity, layover, and (when enabled)
/// fleet-wide slot exclusivity.
fn assert_invariants(
    plan: &Plan,
    fleet: &Fleet,
    table: &fleet_planner::candidate::CandidateTable,
    network: &Network,
    slot_uniqueness: bool,
) {
    let mut fleet = fleet.clone();
    fleet.commit(&plan.assignment, table, network).unwrap();

    let mut seen = HashSet::new();
    for vehicle in fleet.vehicles() {
        let trips = vehicle.trips();
        if let Some(first) = trips.first() {
            assert_eq!(
                &first.route.origin,
                vehicle.anchor(),
                "vehicle {} must start from its anchor",
                vehicle.id()
            );
        }
        for pair in trips.windows(2) {
            assert_eq!(
                pair[0].route.destination, pair[1].route.origin,
                "vehicle {} breaks location continuity",
                vehicle.id()
            );
            assert!(
                pair[1].departure >= pair[0].arrival + network.layover(&pair[1].route.origin),
                "vehicle {} violates layover between slots {} and {}",
                vehicle.id(),
                pair[0].arrival,
                pair[1].departure
            );
        }
        if slot_uniqueness {
            for trip in trips {
                assert!(
                    seen.insert((trip.route.clone(), trip.departure)),
                    "slot {} on {} taken twice",
                    trip.departure,
                    trip.route
                );
            }
        }
    }
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn assigns_round_trip_to_one_vehicle() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 2)]);
    let table = table(vec![cand("A-B", 0, 10.0), cand("B-A", 6, 8.0)]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());

    let plan = solve(&fleet, &table, &rules, &round_trip_options()).unwrap();

    assert_eq!(plan.objective_milli, 18_000);
    assert_eq!(plan.status, SolveStatus::Optimal);
    assert_eq!(plan.assignment.chain(VehicleId(0)).len(), 2);
    let idle: Vec<VehicleId> = plan.assignment.idle_vehicles().collect();
    assert_eq!(idle, vec![VehicleId(1)]);
    assert_invariants(&plan, &fleet, &table, &network, true);
}

#[test]
fn reports_infeasible_when_every_vehicle_must_run() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 2)]);
    let table = table(vec![cand("A-B", 0, 10.0), cand("B-A", 6, 8.0)]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());
    let options = SolveOptions {
        require_all_vehicles: true,
        ..round_trip_options()
    };

    // Both vehicles could run the pair alone, but exclusivity leaves only
    // one of them a chain.
    let err = solve(&fleet, &table, &rules, &options).unwrap_err();
    match err {
        SolveError::Infeasible {
            vehicle,
            location,
            required,
        } => {
            assert_eq!(vehicle, VehicleId(1));
            assert_eq!(location.as_str(), "A");
            assert_eq!(required, 2);
        }
        other => panic!("expected Infeasible, got {other:?}"),
    }
}

#[test]
fn layover_violation_is_never_scheduled() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 1)]);
    // Return departs the same slot the outbound arrives: zero rest.
    let table = table(vec![cand("A-B", 0, 10.0), cand("B-A", 4, 8.0)]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());

    let plan = solve(&fleet, &table, &rules, &round_trip_options()).unwrap();
    // No legal pair exists, so the vehicle stays idle.
    assert_eq!(plan.objective_milli, 0);

    let options = SolveOptions {
        min_trips: 1,
        ..round_trip_options()
    };
    let plan = solve(&fleet, &table, &rules, &options).unwrap();
    // Only the outbound is schedulable.
    assert_eq!(plan.objective_milli, 10_000);
    assert_eq!(plan.assignment.chain(VehicleId(0)).len(), 1);
    assert_invariants(&plan, &fleet, &table, &network, true);
}

// ============================================================================
// Fleet-wide rules
// ============================================================================

#[test]
fn exclusive_slot_goes_to_exactly_one_vehicle() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 2)]);
    let table = table(vec![cand("A-B", 0, 5.0)]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());

    let plan = solve(&fleet, &table, &rules, &single_trip_options()).unwrap();
    assert_eq!(plan.objective_milli, 5_000);
    let scheduled: Vec<_> = plan.assignment.selected().collect();
    assert_eq!(scheduled.len(), 1);
}

#[test]
fn shared_slot_carries_two_vehicles_without_exclusivity() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 2)]);
    let table = table(vec![cand("A-B", 0, 5.0)]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());
    let options = SolveOptions {
        slot_uniqueness: false,
        ..single_trip_options()
    };

    let plan = solve(&fleet, &table, &rules, &options).unwrap();
    assert_eq!(plan.objective_milli, 10_000);
    assert_eq!(plan.assignment.selected().count(), 2);
}

#[test]
fn min_gap_spreads_same_leg_departures() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 2)]);
    let table = table(vec![
        cand("A-B", 0, 10.0),
        cand("A-B", 1, 9.0),
        cand("A-B", 6, 8.0),
    ]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());
    let options = SolveOptions {
        min_gap: Some(4),
        ..single_trip_options()
    };

    let plan = solve(&fleet, &table, &rules, &options).unwrap();
    // Slots 0 and 1 bunch; the best spread pairing is 0 and 6.
    assert_eq!(plan.objective_milli, 18_000);
    let slots: Vec<u32> = plan
        .assignment
        .selected()
        .map(|(_, index)| table.get(index).slot)
        .collect();
    assert_eq!(slots.len(), 2);
    assert!(slots[0].abs_diff(slots[1]) >= 4);
}

// ============================================================================
// Optional trips
// ============================================================================

#[test]
fn takes_profitable_third_trip() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 1)]);
    let table = table(vec![
        cand("A-B", 0, 10.0),
        cand("B-A", 6, 8.0),
        cand("A-B", 12, 7.0),
    ]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());

    let plan = solve(&fleet, &table, &rules, &round_trip_options()).unwrap();
    assert_eq!(plan.objective_milli, 25_000);
    assert_eq!(plan.assignment.chain(VehicleId(0)).len(), 3);
    assert_invariants(&plan, &fleet, &table, &network, true);
}

#[test]
fn skips_third_trip_inside_layover() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 1)]);
    // Third departure at slot 10 clashes with the return arriving at 10
    // plus one slot of layover.
    let table = table(vec![
        cand("A-B", 0, 10.0),
        cand("B-A", 6, 8.0),
        cand("A-B", 10, 7.0),
    ]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());

    let plan = solve(&fleet, &table, &rules, &round_trip_options()).unwrap();
    assert_eq!(plan.objective_milli, 18_000);
    assert_eq!(plan.assignment.chain(VehicleId(0)).len(), 2);
}

// ============================================================================
// Objective properties
// ============================================================================

#[test]
fn adding_a_candidate_never_hurts() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 2)]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());
    let options = SolveOptions {
        min_trips: 1,
        max_trips: 3,
        slot_uniqueness: true,
        ..SolveOptions::default()
    };

    let base = vec![cand("A-B", 0, 10.0), cand("B-A", 6, 8.0)];
    let before = solve(&fleet, &table(base.clone()), &rules, &options).unwrap();

    let mut extended = base;
    extended.push(cand("A-B", 20, 3.0));
    let after = solve(&fleet, &table(extended), &rules, &options).unwrap();

    assert!(after.objective_milli >= before.objective_milli);
    assert_eq!(after.objective_milli, 21_000);
}

#[test]
fn identical_inputs_give_identical_plans() {
    let grid = weekly_grid();
    let network = three_city_network();
    let fleet = fleet_at(&[("A", 2), ("B", 1)]);
    let candidates = vec![
        cand("A-B", 10, 0.9),
        cand("A-B", 12, 0.8),
        cand("B-A", 20, 0.7),
        cand("B-C", 18, 0.6),
        cand("C-B", 30, 0.5),
        cand("B-A", 40, 0.4),
        cand("A-B", 60, 0.9),
        cand("B-A", 70, 0.6),
    ];
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());
    let options = SolveOptions {
        min_trips: 1,
        max_trips: 3,
        slot_uniqueness: true,
        ..SolveOptions::default()
    };

    let first = solve(&fleet, &table(candidates.clone()), &rules, &options).unwrap();
    let second = solve(&fleet, &table(candidates), &rules, &options).unwrap();

    assert_eq!(first.assignment, second.assignment);
    assert_eq!(first.objective_milli, second.objective_milli);
}

#[test]
fn parallel_search_matches_sequential_objective() {
    let grid = weekly_grid();
    let network = three_city_network();
    let fleet = fleet_at(&[("A", 2), ("B", 1)]);
    let candidates = vec![
        cand("A-B", 10, 0.9),
        cand("A-B", 12, 0.8),
        cand("B-A", 20, 0.7),
        cand("B-C", 18, 0.6),
        cand("C-B", 30, 0.5),
        cand("B-A", 40, 0.4),
    ];
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());
    let sequential = SolveOptions {
        min_trips: 1,
        max_trips: 3,
        slot_uniqueness: true,
        ..SolveOptions::default()
    };
    let parallel = SolveOptions {
        parallel: true,
        ..sequential.clone()
    };

    let a = solve(&fleet, &table(candidates.clone()), &rules, &sequential).unwrap();
    let b = solve(&fleet, &table(candidates), &rules, &parallel).unwrap();
    assert_eq!(a.objective_milli, b.objective_milli);
    assert_eq!(a.assignment, b.assignment);
}

// ============================================================================
// Horizon handling
// ============================================================================

#[test]
fn horizon_overflow_rejected_unless_wrapping() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 1)]);
    // Departs slot 46 of a 48-slot day and would arrive at 50.
    let table = table(vec![cand("A-B", 46, 9.0)]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());

    let plan = solve(&fleet, &table, &rules, &single_trip_options()).unwrap();
    assert_eq!(plan.objective_milli, 0);

    let wrapping = Feasibility::new(
        &grid,
        &network,
        ChainPolicy {
            wrap_horizon: true,
            ..ChainPolicy::default()
        },
    );
    let plan = solve(&fleet, &table, &wrapping, &single_trip_options()).unwrap();
    assert_eq!(plan.objective_milli, 9_000);
}

#[test]
fn banded_durations_decide_feasibility() {
    let grid = single_day_grid();
    // Morning runs take 12 slots, evening runs 16.
    let network = Network::builder(48)
        .banded_route(
            "A",
            "B",
            vec![
                DurationBand { from: 10, to: 35, slots: 12 },
                DurationBand { from: 36, to: 47, slots: 16 },
            ],
        )
        .build()
        .unwrap();
    let fleet = fleet_at(&[("A", 1)]);
    // An evening departure at 40 would arrive at 56, past the day.
    let table = table(vec![cand("A-B", 40, 5.0), cand("A-B", 30, 4.0)]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());

    let plan = solve(&fleet, &table, &rules, &single_trip_options()).unwrap();
    assert_eq!(plan.objective_milli, 4_000);
    let chosen: Vec<u32> = plan
        .assignment
        .selected()
        .map(|(_, index)| table.get(index).slot)
        .collect();
    assert_eq!(chosen, vec![30]);
}

// ============================================================================
// Diagnostics and the anytime contract
// ============================================================================

#[test]
fn infeasible_names_the_stranded_vehicle() {
    let grid = single_day_grid();
    let network = three_city_network();
    // One vehicle at A, one stranded at C with no departures on offer.
    let fleet = fleet_at(&[("A", 1), ("C", 1)]);
    let table = table(vec![cand("A-B", 0, 10.0), cand("B-A", 6, 8.0)]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());
    let options = SolveOptions {
        require_all_vehicles: true,
        ..round_trip_options()
    };

    let err = solve(&fleet, &table, &rules, &options).unwrap_err();
    match err {
        SolveError::Infeasible {
            vehicle, location, ..
        } => {
            assert_eq!(vehicle, VehicleId(1));
            assert_eq!(location.as_str(), "C");
        }
        other => panic!("expected Infeasible, got {other:?}"),
    }
}

#[test]
fn exhausted_budget_still_returns_a_valid_plan() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 2)]);
    let table = table(vec![
        cand("A-B", 0, 10.0),
        cand("A-B", 2, 9.0),
        cand("B-A", 6, 8.0),
        cand("B-A", 8, 7.0),
        cand("A-B", 14, 6.0),
        cand("B-A", 20, 5.0),
    ]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());
    let options = SolveOptions {
        time_budget: Duration::ZERO,
        ..round_trip_options()
    };

    let plan = solve(&fleet, &table, &rules, &options).unwrap();
    assert_eq!(plan.status, SolveStatus::TimedOut);
    assert!(plan.objective_milli > 0);
    assert_invariants(&plan, &fleet, &table, &network, true);
}

#[test]
fn empty_candidate_table_leaves_fleet_idle() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 2)]);
    let table = table(Vec::new());
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());

    let plan = solve(&fleet, &table, &rules, &round_trip_options()).unwrap();
    assert_eq!(plan.objective_milli, 0);
    assert_eq!(plan.status, SolveStatus::Optimal);
    assert_eq!(plan.assignment.idle_vehicles().count(), 2);
}

#[test]
fn rejects_reversed_trip_bounds() {
    let grid = single_day_grid();
    let network = shuttle_network();
    let fleet = fleet_at(&[("A", 1)]);
    let table = table(vec![cand("A-B", 0, 1.0)]);
    let rules = Feasibility::new(&grid, &network, ChainPolicy::default());
    let options = SolveOptions {
        min_trips: 3,
        max_trips: 2,
        ..SolveOptions::default()
    };

    assert!(matches!(
        solve(&fleet, &table, &rules, &options),
        Err(SolveError::Config(_))
    ));
}
