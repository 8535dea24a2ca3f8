//! fleet-planner core engine
//!
//! Assigns a fixed fleet of vehicles to candidate departures over a discrete
//! time grid, maximizing total forecast occupancy while keeping every
//! vehicle's trip chain physically realizable: each departure leaves the
//! location the vehicle last arrived at, after its layover, inside the
//! planning horizon.

pub mod candidate;
pub mod config;
pub mod feasibility;
pub mod fleet;
pub mod grid;
pub mod network;
pub mod report;
pub mod solver;
