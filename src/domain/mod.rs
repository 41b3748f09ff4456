//! Domain models - core telemetry types and topic naming
//!
//! - `Reading` - one vehicle count observation for an intersection
//! - `Override` - operator control directive
//! - `IntersectionState` - latest reading plus active override
//! - `CountMessage` - wire payload published by sensing agents
//! - `topic` - `<prefix>/<id>/counts` naming and parsing

pub mod topic;
pub mod types;

pub use types::{CountMessage, IntersectionState, LinkStatus, Override, Reading};
