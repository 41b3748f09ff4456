//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Which count source a sensing agent runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Simulate,
    Camera,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic_prefix() -> String {
    "puthisaalai".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_keep_alive_secs() -> u64 {
    60
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            topic_prefix: default_topic_prefix(),
            connect_timeout_ms: default_connect_timeout_ms(),
            keep_alive_secs: default_keep_alive_secs(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Run an embedded rumqttd broker inside the hub process
    #[serde(default)]
    pub embedded: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            embedded: false,
            bind_address: default_broker_bind_address(),
            port: default_mqtt_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Issuer recorded on overrides that do not name one
    #[serde(default = "default_issuer")]
    pub default_issuer: String,
}

fn default_http_port() -> u16 {
    5000
}

fn default_issuer() -> String {
    "police".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: default_http_port(), default_issuer: default_issuer() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_intersection")]
    pub intersection: String,
    #[serde(default = "default_agent_mode")]
    pub mode: AgentMode,
    /// Directory of frame images consumed in camera mode
    #[serde(default = "default_frame_dir")]
    pub frame_dir: String,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_simulate_interval_secs")]
    pub simulate_interval_secs: u64,
}

fn default_intersection() -> String {
    "A".to_string()
}

fn default_agent_mode() -> AgentMode {
    AgentMode::Simulate
}

fn default_frame_dir() -> String {
    "frames".to_string()
}

fn default_frame_interval_ms() -> u64 {
    33
}

fn default_simulate_interval_secs() -> u64 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            intersection: default_intersection(),
            mode: default_agent_mode(),
            frame_dir: default_frame_dir(),
            frame_interval_ms: default_frame_interval_ms(),
            simulate_interval_secs: default_simulate_interval_secs(),
        }
    }
}

/// Motion counter tuning
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CounterConfig {
    /// Minimum blob area in pixels to count as a vehicle
    #[serde(default = "default_min_area")]
    pub min_area: usize,
    /// Number of frames the background model effectively averages over
    #[serde(default = "default_history")]
    pub history: u32,
    /// Squared deviation, in units of variance, marking a pixel as foreground
    #[serde(default = "default_var_threshold")]
    pub var_threshold: f32,
    /// Initial per-pixel variance
    #[serde(default = "default_var_init")]
    pub var_init: f32,
    /// Lower bound on per-pixel variance
    #[serde(default = "default_var_min")]
    pub var_min: f32,
    /// Side of the square structuring element used for opening
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
}

fn default_min_area() -> usize {
    500
}

fn default_history() -> u32 {
    300
}

fn default_var_threshold() -> f32 {
    16.0
}

fn default_var_init() -> f32 {
    15.0
}

fn default_var_min() -> f32 {
    4.0
}

fn default_kernel_size() -> usize {
    3
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            min_area: default_min_area(),
            history: default_history(),
            var_threshold: default_var_threshold(),
            var_init: default_var_init(),
            var_min: default_var_min(),
            kernel_size: default_kernel_size(),
        }
    }
}

/// Variance settings must be finite and positive
fn positive_or(value: f32, fallback: f32, field: &str) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        tracing::warn!(
            field = %field,
            value = %value,
            fallback = %fallback,
            "counter_config_invalid"
        );
        fallback
    }
}

impl CounterConfig {
    /// Replace out-of-range values loaded from `[counter]`
    ///
    /// Variances and the threshold fall back to their defaults, `history`
    /// is at least 1 and an even `kernel_size` grows to the next odd size.
    pub fn sanitized(self) -> Self {
        let kernel_size = if self.kernel_size % 2 == 0 {
            tracing::warn!(kernel_size = %self.kernel_size, "counter_kernel_size_even");
            self.kernel_size + 1
        } else {
            self.kernel_size
        };
        Self {
            min_area: self.min_area,
            history: self.history.max(1),
            var_threshold: positive_or(
                self.var_threshold,
                default_var_threshold(),
                "var_threshold",
            ),
            var_init: positive_or(self.var_init, default_var_init(), "var_init"),
            var_min: positive_or(self.var_min, default_var_min(), "var_min"),
            kernel_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub counter: CounterConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    mqtt_host: String,
    mqtt_port: u16,
    topic_prefix: String,
    connect_timeout_ms: u64,
    keep_alive_secs: u64,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    broker_embedded: bool,
    broker_bind_address: String,
    broker_port: u16,
    http_port: u16,
    default_issuer: String,
    metrics_interval_secs: u64,
    intersection: String,
    agent_mode: AgentMode,
    frame_dir: String,
    frame_interval_ms: u64,
    simulate_interval_secs: u64,
    counter: CounterConfig,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            topic_prefix: toml_config.mqtt.topic_prefix,
            connect_timeout_ms: toml_config.mqtt.connect_timeout_ms,
            keep_alive_secs: toml_config.mqtt.keep_alive_secs,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            broker_embedded: toml_config.broker.embedded,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            http_port: toml_config.http.port,
            default_issuer: toml_config.http.default_issuer,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            intersection: toml_config.agent.intersection,
            agent_mode: toml_config.agent.mode,
            frame_dir: toml_config.agent.frame_dir,
            frame_interval_ms: toml_config.agent.frame_interval_ms,
            simulate_interval_secs: toml_config.agent.simulate_interval_secs,
            counter: toml_config.counter.sanitized(),
            config_file,
        }
    }

    /// Determine config file path from an explicit argument or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    // Overrides applied from agent command-line flags
    pub fn with_intersection(mut self, intersection: impl Into<String>) -> Self {
        self.intersection = intersection.into();
        self
    }

    pub fn with_agent_mode(mut self, mode: AgentMode) -> Self {
        self.agent_mode = mode;
        self
    }

    pub fn with_mqtt_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.mqtt_host = host.into();
        self.mqtt_port = port;
        self
    }

    pub fn with_frame_dir(mut self, dir: impl Into<String>) -> Self {
        self.frame_dir = dir.into();
        self
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn connect_timeout_ms(&self) -> u64 {
        self.connect_timeout_ms
    }

    pub fn keep_alive_secs(&self) -> u64 {
        self.keep_alive_secs
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn broker_embedded(&self) -> bool {
        self.broker_embedded
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn default_issuer(&self) -> &str {
        &self.default_issuer
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn intersection(&self) -> &str {
        &self.intersection
    }

    pub fn agent_mode(&self) -> AgentMode {
        self.agent_mode
    }

    pub fn frame_dir(&self) -> &str {
        &self.frame_dir
    }

    pub fn frame_interval_ms(&self) -> u64 {
        self.frame_interval_ms
    }

    pub fn simulate_interval_secs(&self) -> u64 {
        self.simulate_interval_secs
    }

    pub fn counter(&self) -> &CounterConfig {
        &self.counter
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.topic_prefix(), "puthisaalai");
        assert_eq!(config.http_port(), 5000);
        assert_eq!(config.default_issuer(), "police");
        assert_eq!(config.intersection(), "A");
        assert_eq!(config.agent_mode(), AgentMode::Simulate);
        assert_eq!(config.simulate_interval_secs(), 3);
        assert_eq!(config.counter().min_area, 500);
        assert_eq!(config.counter().kernel_size, 3);
        assert!(!config.broker_embedded());
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        assert_eq!(Config::resolve_config_path(Some("config/hub.toml")), "config/hub.toml");
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[mqtt]
host = "broker.local"

[agent]
mode = "camera"
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.mqtt_host(), "broker.local");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.agent_mode(), AgentMode::Camera);
        assert_eq!(config.frame_dir(), "frames");
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default()
            .with_intersection("B")
            .with_agent_mode(AgentMode::Camera)
            .with_mqtt_endpoint("10.0.0.2", 1884)
            .with_frame_dir("/data/frames");
        assert_eq!(config.intersection(), "B");
        assert_eq!(config.frame_dir(), "/data/frames");
        assert_eq!(config.agent_mode(), AgentMode::Camera);
        assert_eq!(config.mqtt_host(), "10.0.0.2");
        assert_eq!(config.mqtt_port(), 1884);
    }

    #[test]
    fn test_counter_values_are_sanitized() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [counter]
            var_init = -15.0
            var_min = 0.0
            var_threshold = nan
            history = 0
            kernel_size = 4
            "#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "test".to_string());
        let counter = config.counter();
        assert_eq!(counter.var_init, 15.0);
        assert_eq!(counter.var_min, 4.0);
        assert_eq!(counter.var_threshold, 16.0);
        assert_eq!(counter.history, 1);
        assert_eq!(counter.kernel_size, 5);
    }

    #[test]
    fn test_valid_counter_values_are_kept() {
        let counter = CounterConfig { var_init: 30.0, var_min: 2.0, ..CounterConfig::default() };
        assert_eq!(counter.sanitized(), counter);
    }
}
