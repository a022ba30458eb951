//! Actuator render state
//!
//! Holds the last-known occupancy flag for the zone of interest and the
//! free-running toggle phase. The render tick is driven at a fixed period
//! by the actuator binary; this module only decides the output level, so
//! the timing-independent behavior stays testable.
//!
//! A staleness timeout bounds how long a stalled producer can hold the
//! output: once no update has arrived for the configured window, the tick
//! renders the zone as unoccupied until a fresh message lands.

use std::time::{Duration, Instant};

/// Last-known state for the zone of interest plus the toggle phase
#[derive(Debug, Clone)]
pub struct RenderState {
    /// Most recently received occupancy flag
    occupied: bool,
    /// When the flag was last updated (message arrival or forced off)
    updated_at: Instant,
    /// Free-running toggle phase, reset whenever the output is forced off
    output_on: bool,
}

impl RenderState {
    pub fn new(now: Instant) -> Self {
        Self { occupied: false, updated_at: now, output_on: false }
    }

    /// Apply a received occupancy flag, refreshing the staleness clock
    pub fn apply(&mut self, occupied: bool, now: Instant) {
        self.occupied = occupied;
        self.updated_at = now;
    }

    /// Force the state off, e.g. on transport loss
    pub fn force_off(&mut self, now: Instant) {
        self.occupied = false;
        self.updated_at = now;
        self.output_on = false;
    }

    /// Advance one render tick and return the output level to drive
    ///
    /// Occupied and fresh: toggle the output (the caller's tick period is
    /// the toggle period). Otherwise: off, phase reset.
    pub fn tick(&mut self, now: Instant, staleness_timeout: Option<Duration>) -> bool {
        let fresh = staleness_timeout
            .map_or(true, |limit| now.duration_since(self.updated_at) < limit);

        if self.occupied && fresh {
            self.output_on = !self.output_on;
        } else {
            self.output_on = false;
        }
        self.output_on
    }

    pub fn occupied(&self) -> bool {
        self.occupied
    }
}
