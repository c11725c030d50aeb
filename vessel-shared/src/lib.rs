//! Vessel shared - definitions common to the engine core and its frontends.
//!
//! This crate contains the engine-wide error type and the constants that
//! every component (library, CLI, service surfaces) must agree on.

pub mod constants;
pub mod errors;

pub use errors::{VesselError, VesselResult};
