//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `store` - Aggregation store, the authoritative per-intersection state
//! - `counter` - Motion-based vehicle counter over video frames
//! - `simulated` - Random count source for running without a camera
//! - `agent` - Sensing agent loop feeding counts to the publisher

pub mod agent;
pub mod counter;
pub mod simulated;
pub mod store;

// Re-export commonly used types
pub use agent::{run_agent, AgentStats, CountSink, CountSource};
pub use counter::{CameraCounter, MotionCounter};
pub use simulated::SimulatedSource;
pub use store::{AggregationStore, Snapshot};
