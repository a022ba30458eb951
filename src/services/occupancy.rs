//! Per-zone occupancy state machine
//!
//! Converts noisy per-frame containment signals into stable zone lights
//! using a two-stage latch:
//! - A zone turns on only after an object has dwelled continuously for
//!   the dwell threshold (confirm-by-dwell).
//! - After the object leaves, its contribution survives for the grace
//!   threshold before being forgotten (release-by-grace).
//!
//! Re-entry after an exit is a fresh dwell: no dwell credit is kept
//! across an exit/re-entry cycle. An object that was confirmed active
//! and then leaves keeps the zone lit for the full grace period; this
//! hysteresis absorbs detector flicker and brief tracker ID loss.

use crate::domain::geometry::ZoneDefinition;
use crate::domain::types::{TrackedObject, ZoneLights};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Dwell state for a single track in a single zone
#[derive(Debug, Clone)]
pub struct DwellRecord {
    /// When the track entered (or re-entered) the zone
    pub entered_at: Instant,
    /// When the track left the zone (None while inside)
    pub exited_at: Option<Instant>,
    /// Latched true once continuous containment reaches the dwell
    /// threshold; cleared only by re-entry reset or record deletion
    pub active: bool,
}

impl DwellRecord {
    fn new(entered_at: Instant) -> Self {
        Self { entered_at, exited_at: None, active: false }
    }
}

/// Debounced zone-occupancy engine
///
/// Single-threaded: invoked once per input frame from the frame loop.
pub struct OccupancyEngine {
    zones: Vec<ZoneDefinition>,
    /// records[zone_name][track_id] = DwellRecord
    records: HashMap<String, HashMap<i64, DwellRecord>>,
    dwell_threshold: Duration,
    grace_threshold: Duration,
}

impl OccupancyEngine {
    pub fn new(
        zones: Vec<ZoneDefinition>,
        dwell_threshold: Duration,
        grace_threshold: Duration,
    ) -> Self {
        Self { zones, records: HashMap::new(), dwell_threshold, grace_threshold }
    }

    /// Process one frame of tracked objects and return the light vector
    ///
    /// The returned map has one entry per configured zone, true if any
    /// record for that zone is active.
    pub fn update(&mut self, now: Instant, objects: &[TrackedObject]) -> ZoneLights {
        for zone in &self.zones {
            let zone_records = self.records.entry(zone.name.clone()).or_default();

            for obj in objects {
                let contained = zone.region.contains(obj.center());

                if contained {
                    match zone_records.get_mut(&obj.track_id.0) {
                        None => {
                            zone_records.insert(obj.track_id.0, DwellRecord::new(now));
                            debug!(track_id = %obj.track_id, zone = %zone.name, "zone_entered");
                        }
                        Some(record) => {
                            if record.exited_at.is_some() {
                                // Fresh dwell: the exit/re-entry cycle keeps no credit
                                record.entered_at = now;
                                record.exited_at = None;
                                record.active = false;
                                debug!(track_id = %obj.track_id, zone = %zone.name, "zone_reentered");
                            }

                            if !record.active
                                && now.duration_since(record.entered_at) >= self.dwell_threshold
                            {
                                record.active = true;
                                debug!(track_id = %obj.track_id, zone = %zone.name, "dwell_confirmed");
                            }
                        }
                    }
                } else if let Some(record) = zone_records.get_mut(&obj.track_id.0) {
                    if record.exited_at.is_none() {
                        // Departure starts the grace countdown; active stays latched
                        record.exited_at = Some(now);
                        debug!(track_id = %obj.track_id, zone = %zone.name, "zone_exited");
                    }
                }
            }
        }

        // Sweep expired records, independent of the objects in this frame
        let grace = self.grace_threshold;
        for (zone_name, zone_records) in &mut self.records {
            zone_records.retain(|track_id, record| {
                let expired = record
                    .exited_at
                    .is_some_and(|exited| now.duration_since(exited) >= grace);
                if expired {
                    debug!(track_id = %track_id, zone = %zone_name, "record_expired");
                }
                !expired
            });
        }

        self.lights()
    }

    /// Current light vector: OR of active flags per zone
    pub fn lights(&self) -> ZoneLights {
        self.zones
            .iter()
            .map(|zone| {
                let lit = self
                    .records
                    .get(&zone.name)
                    .is_some_and(|records| records.values().any(|r| r.active));
                (zone.name.clone(), lit)
            })
            .collect()
    }

    /// Number of live records across all zones (for metrics)
    pub fn record_count(&self) -> usize {
        self.records.values().map(|z| z.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::{Point, Region};
    use crate::domain::types::TrackId;

    const DWELL_MS: u64 = 2000;
    const GRACE_MS: u64 = 5000;

    fn engine() -> OccupancyEngine {
        let zone_a = ZoneDefinition::new(
            "a",
            Region::Polygon(vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ]),
        );
        let zone_b = ZoneDefinition::new(
            "b",
            Region::rect(Point::new(100.0, 100.0), Point::new(200.0, 200.0)),
        );
        OccupancyEngine::new(
            vec![zone_a, zone_b],
            Duration::from_millis(DWELL_MS),
            Duration::from_millis(GRACE_MS),
        )
    }

    /// Object centered inside zone "a"
    fn inside() -> Vec<TrackedObject> {
        vec![TrackedObject { track_id: TrackId(1), bbox: [4.0, 4.0, 6.0, 6.0] }]
    }

    /// Same track, centered well outside both zones
    fn outside() -> Vec<TrackedObject> {
        vec![TrackedObject { track_id: TrackId(1), bbox: [40.0, 40.0, 60.0, 60.0] }]
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn test_light_off_before_dwell_threshold() {
        let mut engine = engine();
        let t0 = Instant::now();

        let lights = engine.update(t0, &inside());
        assert_eq!(lights["a"], false);

        let lights = engine.update(at(t0, DWELL_MS - 1), &inside());
        assert_eq!(lights["a"], false);
    }

    #[test]
    fn test_light_on_exactly_at_dwell_threshold() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.update(t0, &inside());
        let lights = engine.update(at(t0, DWELL_MS), &inside());
        assert_eq!(lights["a"], true);
    }

    #[test]
    fn test_exit_keeps_light_on_through_grace() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.update(t0, &inside());
        engine.update(at(t0, DWELL_MS), &inside());

        // Leaves at t=3s; light holds until grace expires
        let lights = engine.update(at(t0, 3000), &outside());
        assert_eq!(lights["a"], true);

        let lights = engine.update(at(t0, 3000 + GRACE_MS - 1), &outside());
        assert_eq!(lights["a"], true);
    }

    #[test]
    fn test_record_swept_after_grace() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.update(t0, &inside());
        engine.update(at(t0, DWELL_MS), &inside());
        engine.update(at(t0, 3000), &outside());

        let lights = engine.update(at(t0, 3000 + GRACE_MS), &outside());
        assert_eq!(lights["a"], false);
        assert_eq!(engine.record_count(), 0);
    }

    #[test]
    fn test_sweep_runs_without_tracked_objects() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.update(t0, &inside());
        engine.update(at(t0, DWELL_MS), &inside());
        engine.update(at(t0, 3000), &outside());

        // Track ID vanishes entirely; the sweep still expires the record
        let lights = engine.update(at(t0, 3000 + GRACE_MS), &[]);
        assert_eq!(lights["a"], false);
    }

    #[test]
    fn test_reentry_resets_dwell_clock() {
        let mut engine = engine();
        let t0 = Instant::now();

        // Dwell 1.5s, leave, come back 1s later - no credit kept
        engine.update(t0, &inside());
        engine.update(at(t0, 1500), &outside());
        engine.update(at(t0, 2500), &inside());

        // 1.5s + 1.9s of separate dwell does not cross the threshold
        let lights = engine.update(at(t0, 2500 + DWELL_MS - 100), &inside());
        assert_eq!(lights["a"], false);

        // A full fresh dwell from re-entry does
        let lights = engine.update(at(t0, 2500 + DWELL_MS), &inside());
        assert_eq!(lights["a"], true);
    }

    #[test]
    fn test_reentry_clears_active_latch() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.update(t0, &inside());
        engine.update(at(t0, DWELL_MS), &inside());
        engine.update(at(t0, 3000), &outside());

        // Re-entry within grace starts a fresh unconfirmed dwell
        let lights = engine.update(at(t0, 4000), &inside());
        assert_eq!(lights["a"], false);
    }

    #[test]
    fn test_enter_confirm_leave_scenario() {
        // Zone "a" square; enter at t=0, stay to t=3s, leave.
        // Expected: off for [0,2), on for [2,8), off from t=8 (3 + 5 grace).
        let mut engine = engine();
        let t0 = Instant::now();

        assert_eq!(engine.update(t0, &inside())["a"], false);
        assert_eq!(engine.update(at(t0, 1999), &inside())["a"], false);
        assert_eq!(engine.update(at(t0, 2000), &inside())["a"], true);
        assert_eq!(engine.update(at(t0, 3000), &outside())["a"], true);
        assert_eq!(engine.update(at(t0, 7999), &outside())["a"], true);
        assert_eq!(engine.update(at(t0, 8000), &outside())["a"], false);
    }

    #[test]
    fn test_zone_isolation() {
        let mut engine = engine();
        let t0 = Instant::now();

        let objects = vec![
            TrackedObject { track_id: TrackId(1), bbox: [4.0, 4.0, 6.0, 6.0] },
            TrackedObject { track_id: TrackId(2), bbox: [140.0, 140.0, 160.0, 160.0] },
        ];
        engine.update(t0, &objects);
        let lights = engine.update(at(t0, DWELL_MS), &objects);

        assert_eq!(lights["a"], true);
        assert_eq!(lights["b"], true);

        // Track 2 leaves zone "b" and its grace runs out; "a" unaffected
        let only_first = inside();
        engine.update(at(t0, 3000), &only_first);
        let lights = engine.update(at(t0, 3000 + GRACE_MS), &only_first);
        assert_eq!(lights["a"], true);
        assert_eq!(lights["b"], false);
    }

    #[test]
    fn test_light_is_or_over_records() {
        let mut engine = engine();
        let t0 = Instant::now();

        let both = vec![
            TrackedObject { track_id: TrackId(1), bbox: [2.0, 2.0, 4.0, 4.0] },
            TrackedObject { track_id: TrackId(2), bbox: [6.0, 6.0, 8.0, 8.0] },
        ];
        engine.update(t0, &both);
        assert_eq!(engine.update(at(t0, DWELL_MS), &both)["a"], true);

        // One confirmed occupant leaving does not turn the zone off
        let one = vec![
            TrackedObject { track_id: TrackId(1), bbox: [40.0, 40.0, 60.0, 60.0] },
            TrackedObject { track_id: TrackId(2), bbox: [6.0, 6.0, 8.0, 8.0] },
        ];
        let lights = engine.update(at(t0, 3000), &one);
        assert_eq!(lights["a"], true);

        // After track 1's grace runs out only track 2 holds the zone
        let lights = engine.update(at(t0, 3000 + GRACE_MS), &one);
        assert_eq!(lights["a"], true);
        assert_eq!(engine.record_count(), 1);
    }

    #[test]
    fn test_lights_cover_all_zones() {
        let mut engine = engine();
        let lights = engine.update(Instant::now(), &[]);
        assert_eq!(lights.len(), 2);
        assert!(lights.contains_key("a"));
        assert!(lights.contains_key("b"));
    }
}
