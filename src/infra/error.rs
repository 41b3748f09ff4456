//! Error classification for transport, decode and sensing failures
//!
//! None of these are process-fatal. Transport errors stop the affected
//! link, decode errors drop one message, sensing errors end the agent loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out after {timeout_ms}ms connecting to {host}:{port}")]
    ConnectTimeout { host: String, port: u16, timeout_ms: u64 },
    #[error("connection to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: rumqttc::ConnectionError,
    },
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] rumqttc::ConnectionError),
    #[error("subscribe to {filter} failed: {source}")]
    Subscribe {
        filter: String,
        #[source]
        source: rumqttc::ClientError,
    },
    #[error("publish to {topic} failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload for {intersection} is not valid UTF-8")]
    InvalidUtf8 { intersection: String },
    #[error("malformed payload for {intersection}: {source}")]
    Malformed {
        intersection: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    pub fn intersection(&self) -> &str {
        match self {
            DecodeError::InvalidUtf8 { intersection } => intersection,
            DecodeError::Malformed { intersection, .. } => intersection,
        }
    }
}

#[derive(Debug, Error)]
pub enum SensingError {
    #[error("frame source exhausted")]
    Exhausted,
    #[error("failed to read frame {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("frame source unavailable: {0}")]
    Source(#[from] std::io::Error),
    #[error("frame is {got_w}x{got_h}, background model is {want_w}x{want_h}")]
    DimensionMismatch { got_w: usize, got_h: usize, want_w: usize, want_h: usize },
    #[error("frame buffer holds {len} bytes, expected {expected}")]
    BadBuffer { len: usize, expected: usize },
}
