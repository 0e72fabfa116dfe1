use crate::error::{AppError, Result};
use crate::model::{SensorValueSet, UnitRating};
use crate::status::DEFAULT_THRESHOLD_FRACTION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::Path, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub history: HistoryConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub demand: DemandConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    /// Per-unit rating overrides keyed by unit id.
    #[serde(default)]
    pub units: BTreeMap<String, UnitOverride>,
    #[serde(default)]
    pub sensors: SensorValueSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub clean_session: Option<bool>,
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
}

fn default_client_id_prefix() -> String {
    "village-monitor".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Base URL of the history service, e.g. "http://node-red:1880"
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Unit id or "all" to start polling immediately.
    #[serde(default)]
    pub initial_selection: Option<String>,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            initial_selection: None,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    #[serde(default = "default_capacity_w")]
    pub rated_capacity_w: f64,
    #[serde(default = "default_max_rpm")]
    pub rated_max_rpm: f64,
    /// Capacity used when the selection is "all".
    #[serde(default = "default_capacity_w")]
    pub aggregate_capacity_w: f64,
    #[serde(default = "default_threshold_fraction")]
    pub threshold_fraction: f64,
}

fn default_capacity_w() -> f64 {
    7000.0
}
fn default_max_rpm() -> f64 {
    4000.0
}
fn default_threshold_fraction() -> f64 {
    DEFAULT_THRESHOLD_FRACTION
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            rated_capacity_w: default_capacity_w(),
            rated_max_rpm: default_max_rpm(),
            aggregate_capacity_w: default_capacity_w(),
            threshold_fraction: default_threshold_fraction(),
        }
    }
}

impl PowerConfig {
    pub fn default_rating(&self) -> UnitRating {
        UnitRating {
            capacity_w: self.rated_capacity_w,
            max_rpm: self.rated_max_rpm,
        }
    }

    pub fn aggregate_rating(&self) -> UnitRating {
        UnitRating {
            capacity_w: self.aggregate_capacity_w,
            max_rpm: self.rated_max_rpm,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DemandConfig {
    Simulated {
        #[serde(default = "default_baseline_fraction")]
        baseline_fraction: f64,
        #[serde(default = "default_range_fraction")]
        range_fraction: f64,
    },
    Fixed {
        watts: f64,
    },
}

fn default_baseline_fraction() -> f64 {
    0.60
}
fn default_range_fraction() -> f64 {
    0.20
}

impl Default for DemandConfig {
    fn default() -> Self {
        DemandConfig::Simulated {
            baseline_fraction: default_baseline_fraction(),
            range_fraction: default_range_fraction(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_qos")]
    pub qos: u8,
}

fn default_debounce_ms() -> u64 {
    300
}
fn default_qos() -> u8 {
    1
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            qos: default_qos(),
        }
    }
}

impl PublisherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitOverride {
    pub rated_capacity_w: Option<f64>,
    pub rated_max_rpm: Option<f64>,
}

impl Config {
    /// Load YAML from disk, substitute $(VAR)/${VAR} with env vars, then parse.
    /// Afterwards MQTT_* and HISTORY_BASE_URL env vars override the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let expanded = expand_env_placeholders(raw)?;
        let mut cfg: Self = serde_yaml::from_str(&expanded)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Ok(port) = std::env::var("MQTT_PORT") {
            self.mqtt.port = port
                .parse()
                .map_err(|_| AppError::Config(format!("MQTT_PORT is not a port: {port}")))?;
        }
        if let Ok(user) = std::env::var("MQTT_USERNAME") {
            self.mqtt.username = Some(user);
        }
        if let Ok(pass) = std::env::var("MQTT_PASSWORD") {
            self.mqtt.password = Some(pass);
        }
        if let Ok(url) = std::env::var("HISTORY_BASE_URL") {
            self.history.base_url = url;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.mqtt.host.is_empty() {
            return Err(AppError::Config("MQTT host cannot be empty".into()));
        }
        if self.mqtt.port == 0 {
            return Err(AppError::Config("MQTT port cannot be 0".into()));
        }
        if self.history.base_url.is_empty() {
            return Err(AppError::Config("history base_url cannot be empty".into()));
        }
        if self.history.timeout_secs == 0 {
            return Err(AppError::Config("history timeout must be positive".into()));
        }
        if self.polling.interval_secs == 0 {
            return Err(AppError::Config("polling interval must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.power.threshold_fraction) {
            return Err(AppError::Config(
                "threshold_fraction must be within [0, 1]".into(),
            ));
        }
        check_rating("defaults", self.power.rated_capacity_w, self.power.rated_max_rpm)?;
        if self.power.aggregate_capacity_w < 0.0 {
            return Err(AppError::Config(
                "aggregate_capacity_w cannot be negative".into(),
            ));
        }
        for (id, o) in &self.units {
            check_rating(
                id,
                o.rated_capacity_w.unwrap_or(self.power.rated_capacity_w),
                o.rated_max_rpm.unwrap_or(self.power.rated_max_rpm),
            )?;
        }
        if let DemandConfig::Fixed { watts } = self.demand {
            if watts < 0.0 {
                return Err(AppError::Config("fixed demand cannot be negative".into()));
            }
        }
        Ok(())
    }
}

fn check_rating(scope: &str, capacity_w: f64, max_rpm: f64) -> Result<()> {
    if !(capacity_w >= 0.0) {
        return Err(AppError::Config(format!(
            "{scope}: rated capacity must be >= 0"
        )));
    }
    if !(max_rpm > 0.0) {
        return Err(AppError::Config(format!("{scope}: rated max RPM must be > 0")));
    }
    Ok(())
}

/// Expand $(VAR) and ${VAR} placeholders using environment variables.
/// "$$" becomes a literal "$".
fn expand_env_placeholders(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let close = match it.peek().copied() {
            Some('$') => {
                it.next();
                out.push('$');
                continue;
            }
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                continue;
            }
        };
        it.next();
        let var = read_until(&mut it, close).ok_or_else(|| {
            AppError::Config(format!("unterminated env placeholder: missing '{close}'"))
        })?;
        let val = std::env::var(&var)
            .map_err(|_| AppError::Config(format!("missing environment variable: {var}")))?;
        out.push_str(&val);
    }

    Ok(out)
}

/// Consumes the closing delimiter.
fn read_until<I>(it: &mut std::iter::Peekable<I>, end: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut buf = String::new();
    for ch in it.by_ref() {
        if ch == end {
            return Some(buf);
        }
        buf.push(ch);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const MINIMAL: &str = r#"
mqtt:
  host: "broker.local"
  port: 1883
history:
  base_url: "http://node-red:1880"
"#;

    #[test]
    #[serial]
    fn test_defaults() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.polling.interval_secs, 60);
        assert_eq!(cfg.power.rated_capacity_w, 7000.0);
        assert_eq!(cfg.power.rated_max_rpm, 4000.0);
        assert_eq!(cfg.power.threshold_fraction, 0.10);
        assert_eq!(cfg.publisher.debounce_ms, 300);
        assert_eq!(cfg.sensors, SensorValueSet::default());
        assert!(matches!(
            cfg.demand,
            DemandConfig::Simulated { baseline_fraction, range_fraction }
                if baseline_fraction == 0.60 && range_fraction == 0.20
        ));
    }

    #[test]
    #[serial]
    fn test_placeholders() {
        std::env::set_var("VM_TEST_HOST", "mqtt.example");
        let raw = "host: ${VM_TEST_HOST}\nalt: $(VM_TEST_HOST)\nprice: $$5\njsonpath: $.x";
        let out = expand_env_placeholders(raw).unwrap();
        assert_eq!(
            out,
            "host: mqtt.example\nalt: mqtt.example\nprice: $5\njsonpath: $.x"
        );
        std::env::remove_var("VM_TEST_HOST");

        assert!(expand_env_placeholders("x: ${VM_TEST_MISSING_VAR}").is_err());
        assert!(expand_env_placeholders("x: ${UNTERMINATED").is_err());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("MQTT_PORT", "8883");
        std::env::set_var("HISTORY_BASE_URL", "http://override:1880");
        let cfg = Config::from_yaml(MINIMAL);
        std::env::remove_var("MQTT_PORT");
        std::env::remove_var("HISTORY_BASE_URL");

        let cfg = cfg.unwrap();
        assert_eq!(cfg.mqtt.port, 8883);
        assert_eq!(cfg.history.base_url, "http://override:1880");
    }

    #[test]
    #[serial]
    fn test_fixed_demand_and_overrides() {
        let raw = format!(
            "{MINIMAL}demand:\n  source: fixed\n  watts: 4000\nunits:\n  unit02:\n    rated_capacity_w: 12000\n"
        );
        let cfg = Config::from_yaml(&raw).unwrap();
        assert!(matches!(cfg.demand, DemandConfig::Fixed { watts } if watts == 4000.0));
        assert_eq!(cfg.units["unit02"].rated_capacity_w, Some(12000.0));
    }

    #[test]
    #[serial]
    fn test_example_config_uses_tcp_listener() {
        for (k, v) in [
            ("MQTT_HOST", "broker.local"),
            ("MQTT_USERNAME", "sim"),
            ("MQTT_PASSWORD", "secret"),
        ] {
            std::env::set_var(k, v);
        }
        let cfg = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/config.example.yaml"));
        for k in ["MQTT_HOST", "MQTT_USERNAME", "MQTT_PASSWORD"] {
            std::env::remove_var(k);
        }

        let cfg = cfg.unwrap();
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.history.base_url, "http://broker.local:1880");
        assert_eq!(cfg.polling.initial_selection.as_deref(), Some("all"));
    }

    #[test]
    #[serial]
    fn test_validation() {
        let bad_interval = format!("{MINIMAL}polling:\n  interval_secs: 0\n");
        assert!(matches!(
            Config::from_yaml(&bad_interval),
            Err(AppError::Config(_))
        ));

        let bad_timeout = MINIMAL.replace(
            "base_url: \"http://node-red:1880\"",
            "base_url: \"http://node-red:1880\"\n  timeout_secs: 0",
        );
        assert!(matches!(
            Config::from_yaml(&bad_timeout),
            Err(AppError::Config(msg)) if msg.contains("timeout")
        ));

        let bad_rpm = format!("{MINIMAL}power:\n  rated_max_rpm: 0\n");
        assert!(Config::from_yaml(&bad_rpm).is_err());

        let bad_threshold = format!("{MINIMAL}power:\n  threshold_fraction: 1.5\n");
        assert!(Config::from_yaml(&bad_threshold).is_err());
    }
}
