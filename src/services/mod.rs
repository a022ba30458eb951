//! Services - core state machines
//!
//! This module contains the business logic of the system:
//! - `occupancy` - debounced per-zone dwell/grace state machine
//! - `renderer` - actuator render state (last-known flag, toggle phase)

pub mod occupancy;
pub mod renderer;

pub use occupancy::OccupancyEngine;
pub use renderer::RenderState;
