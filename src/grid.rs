//! Discrete time grid over the planning horizon.
//!
//! The horizon is split into fixed-width slots (30 minutes by default).
//! Slot 0 begins at the configured day-start minute of day 0; wall-clock
//! inputs that do not align to a slot boundary round down.

use std::fmt;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index of one grid interval; slot 0 starts the horizon.
pub type Slot = u32;

const MINUTES_PER_DAY: u32 = 24 * 60;

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Errors from resolving wall-clock times or slot indices against the grid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("unparsable clock time {0:?}")]
    Unparsable(String),
    #[error("day {day} lies outside the {horizon_days}-day horizon")]
    DayOutOfRange { day: u32, horizon_days: u32 },
    #[error("{0} falls before the grid's day start")]
    BeforeGridStart(String),
    #[error("slot {slot} is before the earliest allowed departure (slot {earliest})")]
    BeforeEarliestDeparture { slot: Slot, earliest: Slot },
    #[error("slot {slot} lies outside the horizon of {slot_count} slots")]
    OutsideHorizon { slot: Slot, slot_count: u32 },
}

/// Wall-clock position of a slot within the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTime {
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} {:02}:{:02}", self.day, self.hour, self.minute)
    }
}

/// Slot discretization of the planning horizon.
#[derive(Debug, Clone)]
pub struct TimeGrid {
    slot_minutes: u32,
    slots_per_day: u32,
    horizon_days: u32,
    day_start_minute: u32,
    earliest_departure_slot: Slot,
}

impl TimeGrid {
    /// Grid with 30-minute slots starting at midnight, departures allowed
    /// from slot 0.
    pub fn new(slots_per_day: u32, horizon_days: u32) -> Self {
        Self {
            slot_minutes: 30,
            slots_per_day,
            horizon_days,
            day_start_minute: 0,
            earliest_departure_slot: 0,
        }
    }

    pub fn with_slot_minutes(mut self, minutes: u32) -> Self {
        self.slot_minutes = minutes;
        self
    }

    /// Minute of the day at which slot 0 of each day begins (e.g. 240 for a
    /// grid starting at 04:00).
    pub fn with_day_start_minute(mut self, minute: u32) -> Self {
        self.day_start_minute = minute;
        self
    }

    /// First within-day slot at which departures are allowed.
    pub fn with_earliest_departure(mut self, slot: Slot) -> Self {
        self.earliest_departure_slot = slot;
        self
    }

    pub fn slots_per_day(&self) -> u32 {
        self.slots_per_day
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    pub fn slot_count(&self) -> u32 {
        self.slots_per_day * self.horizon_days
    }

    pub fn earliest_departure_slot(&self) -> Slot {
        self.earliest_departure_slot
    }

    /// Wall-clock position of a slot. Total: slots past the horizon keep
    /// counting days; callers wrap first if they want cyclic display.
    pub fn slot_to_time(&self, slot: Slot) -> SlotTime {
        let day = slot / self.slots_per_day;
        let in_day = slot % self.slots_per_day;
        let minutes = (self.day_start_minute + in_day * self.slot_minutes) % MINUTES_PER_DAY;
        SlotTime {
            day,
            hour: minutes / 60,
            minute: minutes % 60,
        }
    }

    /// Slot containing the given wall-clock time on the given horizon day.
    /// Times inside a slot round down to its start.
    pub fn time_to_slot(&self, day: u32, time: NaiveTime) -> Result<Slot, GridError> {
        if day >= self.horizon_days {
            return Err(GridError::DayOutOfRange {
                day,
                horizon_days: self.horizon_days,
            });
        }
        let minutes = time.hour() * 60 + time.minute();
        if minutes < self.day_start_minute {
            return Err(GridError::BeforeGridStart(time.format("%H:%M").to_string()));
        }
        let in_day = (minutes - self.day_start_minute) / self.slot_minutes;
        let slot = day * self.slots_per_day + in_day;
        if in_day >= self.slots_per_day {
            return Err(GridError::OutsideHorizon {
                slot,
                slot_count: self.slot_count(),
            });
        }
        Ok(slot)
    }

    /// Validates that a slot is inside the horizon and the allowed
    /// departure window. Signals rather than clamps, so callers choose
    /// whether to discard or fail.
    pub fn check_departure(&self, slot: Slot) -> Result<Slot, GridError> {
        if slot >= self.slot_count() {
            return Err(GridError::OutsideHorizon {
                slot,
                slot_count: self.slot_count(),
            });
        }
        if slot % self.slots_per_day < self.earliest_departure_slot {
            return Err(GridError::BeforeEarliestDeparture {
                slot,
                earliest: self.earliest_departure_slot,
            });
        }
        Ok(slot)
    }

    /// Parses a wall-clock string in 12-hour ("05:30 AM") or 24-hour
    /// ("17:30") form.
    pub fn parse_clock(s: &str) -> Result<NaiveTime, GridError> {
        let trimmed = s.trim();
        NaiveTime::parse_from_str(trimmed, "%I:%M %p")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .map_err(|_| GridError::Unparsable(s.to_string()))
    }

    /// Human label for a slot: the half-open interval ("05:00-05:29") on
    /// one-day grids, day name plus clock time ("Tuesday 05:30 AM") on
    /// longer horizons.
    pub fn describe(&self, slot: Slot) -> String {
        let t = self.slot_to_time(slot);
        if self.horizon_days == 1 {
            let start = t.hour * 60 + t.minute;
            let end = (start + self.slot_minutes - 1) % MINUTES_PER_DAY;
            format!(
                "{:02}:{:02}-{:02}:{:02}",
                t.hour,
                t.minute,
                end / 60,
                end % 60
            )
        } else {
            let name = DAY_NAMES[(t.day % 7) as usize];
            format!("{} {}", name, format_ampm(t.hour, t.minute))
        }
    }
}

fn format_ampm(hour: u32, minute: u32) -> String {
    let period = if hour < 12 { "AM" } else { "PM" };
    let h12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{:02}:{:02} {}", h12, minute, period)
}
