//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT connection setup with a bounded handshake
//! - `ingest` - Subscription task feeding the aggregation store
//! - `publisher` - Count publisher used by sensing agents
//! - `http` - Status, override and Prometheus metrics endpoints

pub mod http;
pub mod ingest;
pub mod mqtt;
pub mod publisher;

// Re-export commonly used types
pub use http::{start_http_server, HttpState};
pub use ingest::{handle_publish, start_ingestion, IngestionHandle};
pub use publisher::TelemetryPublisher;
