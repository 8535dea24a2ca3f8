//! Itinerary projection of a committed fleet schedule.
//!
//! A pure read of fleet state into per-vehicle chronological entries with
//! wall-clock times. Printing or persisting the itinerary is the caller's
//! business.

use serde::Serialize;

use crate::fleet::{Fleet, VehicleId};
use crate::grid::{Slot, SlotTime, TimeGrid};
use crate::network::Route;

/// One trip of one vehicle, ready for display or export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItineraryEntry {
    pub vehicle: VehicleId,
    pub route: Route,
    pub departure_slot: Slot,
    pub arrival_slot: Slot,
    pub departure: SlotTime,
    pub arrival: SlotTime,
    pub value: f64,
}

impl ItineraryEntry {
    /// One-line rendering, e.g.
    /// `bus 0  A-B  depart Monday 05:30 AM  arrive Monday 01:30 PM  value 0.820`.
    pub fn describe(&self, grid: &TimeGrid) -> String {
        format!(
            "bus {}  {}  depart {}  arrive {}  value {:.3}",
            self.vehicle,
            self.route,
            grid.describe(self.departure_slot),
            grid.describe(self.arrival_slot % grid.slot_count().max(1)),
            self.value,
        )
    }
}

/// Projects committed trips into entries ordered by vehicle id, then
/// departure slot. Arrivals past the horizon wrap for display.
pub fn render(fleet: &Fleet, grid: &TimeGrid) -> Vec<ItineraryEntry> {
    let slot_count = grid.slot_count().max(1);
    let mut entries = Vec::new();
    for vehicle in fleet.vehicles() {
        for trip in vehicle.trips() {
            entries.push(ItineraryEntry {
                vehicle: vehicle.id(),
                route: trip.route.clone(),
                departure_slot: trip.departure,
                arrival_slot: trip.arrival,
                departure: grid.slot_to_time(trip.departure),
                arrival: grid.slot_to_time(trip.arrival % slot_count),
                value: trip.value,
            });
        }
    }
    entries
}
