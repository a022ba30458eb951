//! Shared types for zonelink

use crate::domain::geometry::Point;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Newtype wrapper for track IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub i64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Peer role declared once per connection via the handshake line
///
/// The set is closed: any other token is a protocol error and the
/// relay closes the connection without registering anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Occupancy state producer (the sensor pipeline)
    Sensor,
    /// State consumer (the actuator renderer)
    Actuator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sensor => "sensor",
            Role::Actuator => "actuator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for handshake tokens outside the recognized role set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl std::fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role token: {:?}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sensor" => Ok(Role::Sensor),
            "actuator" => Ok(Role::Actuator),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// One tracked entity in a frame, as reported by the upstream tracker
#[derive(Debug, Clone, Deserialize)]
pub struct TrackedObject {
    pub track_id: TrackId,
    /// Bounding box as [x1, y1, x2, y2]
    pub bbox: [f64; 4],
}

impl TrackedObject {
    /// Bounding box center, the point used for zone containment
    #[inline]
    pub fn center(&self) -> Point {
        Point::new(
            (self.bbox[0] + self.bbox[2]) / 2.0,
            (self.bbox[1] + self.bbox[3]) / 2.0,
        )
    }
}

/// One frame of tracker output, received as a JSON line on the feed socket
#[derive(Debug, Deserialize)]
pub struct FeedFrame {
    #[serde(default)]
    pub tracked_objects: Vec<TrackedObject>,
}

/// Current zone light vector: zone name -> occupied flag
///
/// BTreeMap keeps the wire encoding stable across updates.
pub type ZoneLights = BTreeMap<String, bool>;
