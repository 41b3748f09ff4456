//! Junction telemetry library
//!
//! Intersection vehicle counts: sensing agents publish counts over MQTT, a
//! hub aggregates them per intersection and serves snapshots and operator
//! overrides over HTTP. Exposes modules for integration testing and binary
//! reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
