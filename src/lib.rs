//! zonelink library
//!
//! Links a visual occupancy sensor to a remote actuator through a
//! role-based relay. Exposes modules for integration testing and
//! binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
