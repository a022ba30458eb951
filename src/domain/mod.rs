//! Domain models - core types shared across the system
//!
//! This module contains the canonical data types used throughout zonelink:
//! - `Role` - peer role established via the connection handshake
//! - `TrackedObject` / `FeedFrame` - per-frame tracker input
//! - `ZoneLights` - the current zone -> occupied mapping
//! - `geometry` - points, regions, and containment tests

pub mod geometry;
pub mod types;

pub use geometry::{Point, Region, ZoneDefinition};
pub use types::{FeedFrame, Role, TrackId, TrackedObject, ZoneLights};
