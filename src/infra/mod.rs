//! Infrastructure - configuration, errors, metrics, and broker
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `error` - Transport / decode / sensing error classification
//! - `metrics` - Lock-free metrics collection
//! - `broker` - Embedded MQTT broker (rumqttd)

pub mod broker;
pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::{AgentMode, Config, CounterConfig};
pub use error::{DecodeError, SensingError, TransportError};
pub use metrics::Metrics;
